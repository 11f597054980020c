//! Template leaf syntax.
//!
//! Pure string classification with no knowledge of contexts or builders:
//! [`classify`] decides whether a leaf string is a literal, a field
//! reference or a named-function reference, and the parsers here extract
//! the tokens the resolver needs.

/// Marks a field reference: `*name`.
pub const FIELD_SIGIL: char = '*';

/// Marks a named-function reference: `&name|*p1,*p2`.
pub const FUNCTION_SIGIL: char = '&';

/// Prefix on a field reference that converts an epoch to ISO-8601.
pub const ISO_MARKER: &str = "{ISO}";

/// Separates a function name from its parameter list.
pub const PARAM_SEPARATOR: char = '|';

/// Separates id segments.
pub const ID_SEPARATOR: char = ':';

/// Template key resolved by the id derivation rule.
pub const ID_KEY: &str = "id";

/// Template key handed to the builder's bulk-data hook.
pub const DATA_KEY: &str = "data";

/// A `*name` occurrence inside a leaf string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldToken {
    pub name: String,
    /// Whether the token carried the `{ISO}` conversion marker.
    pub iso: bool,
    /// Byte offset of the token, including any marker.
    pub start: usize,
    /// Byte offset one past the token.
    pub end: usize,
}

/// Where a function parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    Field { name: String, iso: bool },
    Literal(String),
}

/// One parameter of a named-function reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParam {
    /// Key of this parameter in the map handed to the function.
    pub key: String,
    pub source: ParamSource,
}

/// A parsed `&name|params` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub params: Vec<FunctionParam>,
}

impl FunctionCall {
    /// Parse a named-function reference. Returns `None` when `raw` does
    /// not start with the function sigil or names no function.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix(FUNCTION_SIGIL)?;
        let (name, params) = match body.split_once(PARAM_SEPARATOR) {
            Some((name, params)) => (name.trim(), params),
            None => (body.trim(), ""),
        };
        if name.is_empty() {
            return None;
        }

        let params = params
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(parse_param)
            .collect();

        Some(Self {
            name: name.to_string(),
            params,
        })
    }
}

fn parse_param(raw: &str) -> FunctionParam {
    let (iso, rest) = match raw.strip_prefix(ISO_MARKER) {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    match rest.strip_prefix(FIELD_SIGIL) {
        Some(name) if !name.is_empty() => FunctionParam {
            key: name.to_string(),
            source: ParamSource::Field {
                name: name.to_string(),
                iso,
            },
        },
        _ => FunctionParam {
            key: raw.to_string(),
            source: ParamSource::Literal(raw.to_string()),
        },
    }
}

/// Classification of a leaf string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    Literal,
    Fields(Vec<FieldToken>),
    Function(FunctionCall),
}

/// Classify a leaf string by its sigils.
pub fn classify(raw: &str) -> Leaf {
    if raw.starts_with(FUNCTION_SIGIL) {
        if let Some(call) = FunctionCall::parse(raw) {
            return Leaf::Function(call);
        }
    }
    let tokens = field_tokens(raw);
    if tokens.is_empty() {
        Leaf::Literal
    } else {
        Leaf::Fields(tokens)
    }
}

/// Find every `*name` token in `raw`, left to right.
///
/// A `*` not followed by an identifier character is plain text.
pub fn field_tokens(raw: &str) -> Vec<FieldToken> {
    let bytes = raw.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != FIELD_SIGIL as u8 {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < bytes.len() && is_ident_byte(bytes[end]) {
            end += 1;
        }
        if end == i + 1 {
            i += 1;
            continue;
        }

        let iso = raw[..i].ends_with(ISO_MARKER);
        let start = if iso { i - ISO_MARKER.len() } else { i };
        tokens.push(FieldToken {
            name: raw[i + 1..end].to_string(),
            iso,
            start,
            end,
        });
        i = end;
    }

    tokens
}

/// True when `raw` is exactly one field token and nothing else.
pub fn is_single_token(raw: &str, tokens: &[FieldToken]) -> bool {
    matches!(tokens, [only] if only.start == 0 && only.end == raw.len())
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert_eq!(classify("DD"), Leaf::Literal);
        assert_eq!(classify("5 * 3"), Leaf::Literal);
        assert_eq!(classify(""), Leaf::Literal);
    }

    #[test]
    fn test_field_tokens() {
        let tokens = field_tokens("*a at *b");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].name, "a");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 2));
        assert_eq!(tokens[1].name, "b");
        assert_eq!((tokens[1].start, tokens[1].end), (6, 8));
        assert!(!is_single_token("*a at *b", &tokens));
    }

    #[test]
    fn test_iso_marker() {
        let raw = "valid {ISO}*fcstValidEpoch";
        let tokens = field_tokens(raw);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].iso);
        assert_eq!(tokens[0].start, 6);
        assert_eq!(tokens[0].name, "fcstValidEpoch");

        let single = "{ISO}*fcstValidEpoch";
        assert!(is_single_token(single, &field_tokens(single)));
    }

    #[test]
    fn test_function_parse() {
        let call = FunctionCall::parse("&diff|*msl,*sfc").unwrap();
        assert_eq!(call.name, "diff");
        assert_eq!(call.params.len(), 2);
        assert_eq!(call.params[0].key, "msl");
        assert_eq!(
            call.params[1].source,
            ParamSource::Field {
                name: "sfc".to_string(),
                iso: false
            }
        );
    }

    #[test]
    fn test_function_parse_literal_and_iso_params() {
        let call = FunctionCall::parse("&round|*temp, 2, {ISO}*time").unwrap();
        assert_eq!(call.params[1].source, ParamSource::Literal("2".to_string()));
        assert_eq!(call.params[1].key, "2");
        assert_eq!(
            call.params[2].source,
            ParamSource::Field {
                name: "time".to_string(),
                iso: true
            }
        );
    }

    #[test]
    fn test_function_without_params() {
        let call = FunctionCall::parse("&now").unwrap();
        assert_eq!(call.name, "now");
        assert!(call.params.is_empty());
        assert!(FunctionCall::parse("&|*a").is_none());
        assert!(FunctionCall::parse("*a").is_none());
    }

    #[test]
    fn test_classify_function() {
        match classify("&kelvin_to_celsius|*temperature") {
            Leaf::Function(call) => assert_eq!(call.name, "kelvin_to_celsius"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
