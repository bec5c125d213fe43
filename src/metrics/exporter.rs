use crate::metrics::collector::Metrics;
use crate::output::write_atomic;
use crate::{KubesdError, Result};
use prometheus::{Encoder, TextEncoder};
use std::path::PathBuf;
use tracing::debug;

/// Renders the registry in the text exposition format, optionally to a
/// textfile for a node exporter style collector.
pub struct TextfileExporter {
    metrics: Metrics,
    path: Option<PathBuf>,
}

impl TextfileExporter {
    pub fn new(metrics: Metrics, path: Option<PathBuf>) -> Self {
        Self { metrics, path }
    }

    pub fn format_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.metrics.registry().gather(), &mut buffer)
            .map_err(|e| KubesdError::MetricsError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| KubesdError::MetricsError(e.to_string()))
    }

    /// Writes the current metrics when a textfile path is configured.
    pub async fn export(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = self.format_metrics()?;
        write_atomic(path, content.as_bytes()).await?;
        debug!("Exported metrics to {}", path.display());

        Ok(())
    }
}
