//! Runtime configuration shared by the watcher, coordinator and writer.

use crate::{KubesdError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_METRIC_ANNOTATION: &str = "metrics";
pub const DEFAULT_NAME_LABEL: &str = "name";
pub const DEFAULT_NODE_PORT: u16 = 9100;
pub const DEFAULT_REFRESH_SECS: u64 = 300;
/// Upper bound on the refresh interval (one week)
pub const MAX_REFRESH_SECS: u64 = 7 * 24 * 60 * 60;

/// Serialization format of the rendered target documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = KubesdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            other => Err(KubesdError::ConfigError(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between forced regenerations
    pub refresh_interval: Duration,
    pub with_nodes: bool,
    pub with_pods: bool,
    /// Namespaces scanned for pods; an empty entry means all namespaces
    pub namespaces: Vec<String>,
    /// Pod annotation carrying the metrics descriptors
    pub metric_annotation: String,
    /// Pod label holding the logical service name
    pub name_label: String,
    pub node_port: u16,
    pub config_directory: PathBuf,
    pub nodes_filename: String,
    pub pods_filename: String,
    pub format: OutputFormat,
    pub dry_run: bool,
    pub metrics_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            with_nodes: true,
            with_pods: true,
            namespaces: vec!["default".to_string()],
            metric_annotation: DEFAULT_METRIC_ANNOTATION.to_string(),
            name_label: DEFAULT_NAME_LABEL.to_string(),
            node_port: DEFAULT_NODE_PORT,
            config_directory: PathBuf::from("."),
            nodes_filename: "nodes.yml".to_string(),
            pods_filename: "pods.yml".to_string(),
            format: OutputFormat::Yaml,
            dry_run: false,
            metrics_file: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval.is_zero() {
            return Err(KubesdError::ConfigError(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.refresh_interval > Duration::from_secs(MAX_REFRESH_SECS) {
            return Err(KubesdError::ConfigError(format!(
                "refresh interval must be at most {} seconds",
                MAX_REFRESH_SECS
            )));
        }
        if self.node_port == 0 {
            return Err(KubesdError::ConfigError(
                "node port must be between 1 and 65535".to_string(),
            ));
        }
        if self.metric_annotation.trim().is_empty() {
            return Err(KubesdError::ConfigError(
                "metrics annotation key must not be empty".to_string(),
            ));
        }
        if self.nodes_filename.is_empty() || self.pods_filename.is_empty() {
            return Err(KubesdError::ConfigError(
                "output filenames must not be empty".to_string(),
            ));
        }
        if !self.with_nodes && !self.with_pods {
            return Err(KubesdError::ConfigError(
                "nothing to render: both nodes and pods are disabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits a comma separated namespace list. A blank list selects all namespaces.
pub fn parse_namespaces(value: &str) -> Vec<String> {
    let namespaces: Vec<String> = value
        .split(',')
        .map(|ns| ns.trim().to_string())
        .collect();

    if namespaces.iter().all(|ns| ns.is_empty()) {
        return vec![String::new()];
    }

    let mut seen = Vec::with_capacity(namespaces.len());
    for ns in namespaces.into_iter().filter(|ns| !ns.is_empty()) {
        if !seen.contains(&ns) {
            seen.push(ns);
        }
    }
    seen
}
