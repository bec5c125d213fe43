//! Decoding of the per-pod metrics annotation.
//!
//! The annotation holds a YAML (or JSON) sequence of records:
//!
//! ```yaml
//! - name: collectd-exporter
//!   port: 9103
//!   endpoint: /metrics
//! ```

use crate::{KubesdError, Result};
use serde::{Deserialize, Serialize};

/// A scrape endpoint exported by a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

pub fn decode_metrics(text: &str) -> Result<Vec<MetricDescriptor>> {
    let invalid = |reason: String| KubesdError::InvalidAnnotation {
        annotation: text.to_string(),
        reason,
    };

    if text.trim().is_empty() {
        return Err(invalid("value is empty".to_string()));
    }

    let metrics: Vec<MetricDescriptor> =
        serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;

    if let Some(metric) = metrics.iter().find(|m| m.port == 0) {
        return Err(invalid(format!(
            "port 0 is not valid for metric {}",
            metric.name.as_deref().unwrap_or("<unnamed>")
        )));
    }

    Ok(metrics)
}
