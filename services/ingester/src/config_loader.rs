//! Configuration loader for the ingester.
//!
//! Loads a single YAML file with these sections, all optional:
//! - `store`: which document store to use and how to reach it
//! - `workers`: worker count, drain bound, job descriptor
//! - `persistence`: chunking, retry pause, optional file output directory
//! - `logging`: level and format
//! - `descriptors`: inline ingest descriptors seeded into the store
//!
//! Supports environment variable substitution using ${VAR} syntax.

use anyhow::{Context, Result};
use ingest_common::IngestDescriptor;
use ingestion::{OutputMode, WorkerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::PersistConfig;

// ============================================================================
// Ingester Configuration (ingester.yaml)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    pub store: StoreConfig,
    pub workers: WorkersConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    /// Raw descriptor documents; parsed by [`IngesterConfig::descriptors`].
    pub descriptors: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub url: String,
    pub key_prefix: String,
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Redis,
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            op_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
    pub drain_max_polls: u32,
    pub drain_pause_ms: u64,
    /// Descriptor applied to source-file work items.
    pub job_descriptor: Option<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 4,
            drain_max_polls: ingestion::worker::DEFAULT_DRAIN_MAX_POLLS,
            drain_pause_ms: ingestion::worker::DEFAULT_DRAIN_PAUSE.as_millis() as u64,
            job_descriptor: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub chunk_size: usize,
    pub retry_pause_ms: u64,
    /// When set, documents are written here as JSON files instead of the store.
    pub output_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            chunk_size: storage::persist::DEFAULT_CHUNK_SIZE,
            retry_pause_ms: storage::persist::DEFAULT_RETRY_PAUSE.as_millis() as u64,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl IngesterConfig {
    /// Worker settings derived from the `workers` and `persistence` sections.
    pub fn worker_config(&self) -> WorkerConfig {
        let output = match &self.persistence.output_dir {
            Some(dir) => OutputMode::File(dir.clone()),
            None => OutputMode::Store,
        };
        WorkerConfig {
            drain_max_polls: self.workers.drain_max_polls,
            drain_pause: Duration::from_millis(self.workers.drain_pause_ms),
            output,
            job_descriptor: self.workers.job_descriptor.clone(),
            persist: PersistConfig {
                chunk_size: self.persistence.chunk_size,
                retry_pause: Duration::from_millis(self.persistence.retry_pause_ms),
            },
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.store.op_timeout_ms)
    }

    /// Parse the inline descriptors, rejecting duplicates and builder types
    /// not in `known_types`.
    pub fn descriptors(&self, known_types: &[&str]) -> Result<Vec<IngestDescriptor>> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(self.descriptors.len());

        for (index, value) in self.descriptors.iter().enumerate() {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .with_context(|| format!("Descriptor #{} has no string id", index))?;
            let descriptor = IngestDescriptor::from_value(id, value.clone())
                .with_context(|| format!("Invalid descriptor {}", id))?;

            anyhow::ensure!(
                known_types.contains(&descriptor.builder_type.as_str()),
                "Descriptor {} names unknown builder type {}. Must be one of: {:?}",
                id,
                descriptor.builder_type,
                known_types
            );
            anyhow::ensure!(seen.insert(id.to_string()), "Duplicate descriptor id: {}", id);
            parsed.push(descriptor);
        }

        Ok(parsed)
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Read, expand and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<IngesterConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse configuration from YAML text.
pub fn parse_config(content: &str) -> Result<IngesterConfig> {
    let expanded = expand_env_vars(content)?;
    let config: IngesterConfig =
        serde_yaml::from_str(&expanded).context("Failed to parse YAML")?;
    validate_config(&config)?;
    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next(); // '{'

        let mut var_expr = String::new();
        let mut depth = 1;
        while depth > 0 {
            match chars.next() {
                Some('{') => {
                    depth += 1;
                    var_expr.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth > 0 {
                        var_expr.push('}');
                    }
                }
                Some(c) => var_expr.push(c),
                None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
            }
        }

        result.push_str(&resolve_var_expr(&var_expr)?);
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`. An empty variable takes the default.
fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr)),
    }
}

// ============================================================================
// Validation
// ============================================================================

pub const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const VALID_FORMATS: [&str; 2] = ["json", "pretty"];

pub fn validate_config(config: &IngesterConfig) -> Result<()> {
    if config.store.kind == StoreKind::Redis {
        anyhow::ensure!(!config.store.url.is_empty(), "Redis store url cannot be empty");
    }
    anyhow::ensure!(
        config.store.op_timeout_ms > 0,
        "Store op_timeout_ms must be greater than 0"
    );

    anyhow::ensure!(config.workers.count > 0, "Worker count must be greater than 0");
    anyhow::ensure!(
        config.persistence.chunk_size > 0,
        "Persistence chunk_size must be greater than 0"
    );

    anyhow::ensure!(
        VALID_LEVELS.contains(&config.logging.level.as_str()),
        "Invalid log level: {}. Must be one of: {:?}",
        config.logging.level,
        VALID_LEVELS
    );
    anyhow::ensure!(
        VALID_FORMATS.contains(&config.logging.format.as_str()),
        "Invalid log format: {}. Must be one of: {:?}",
        config.logging.format,
        VALID_FORMATS
    );

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
