use crate::config::OutputFormat;
use crate::targets::group::TargetGroup;
use crate::{KubesdError, Result};

/// Serializes target groups into a file_sd document.
pub fn encode_groups(groups: &[TargetGroup], format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(groups)
            .map(String::into_bytes)
            .map_err(|e| KubesdError::SerializationFailed(e.to_string())),
        OutputFormat::Json => {
            let mut content = serde_json::to_vec_pretty(groups)
                .map_err(|e| KubesdError::SerializationFailed(e.to_string()))?;
            content.push(b'\n');
            Ok(content)
        }
    }
}
