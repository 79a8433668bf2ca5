//! Engine configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::ToolState;

/// Default limit for a single uploaded file (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime settings. The display scale is intentionally absent: it is the
/// fixed [`crate::raster::DISPLAY_SCALE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage prefix for exported artifacts.
    pub artifact_prefix: String,
    /// Storage prefix for submission attachments.
    pub attachment_prefix: String,
    /// Files larger than this are skipped during batch upload.
    pub max_upload_bytes: u64,
    /// Tool state a new session starts with.
    pub default_tool: ToolState,
    /// Declared content types accepted as document bytes.
    pub accepted_content_types: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            artifact_prefix: "corrections".to_string(),
            attachment_prefix: "submissions".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            default_tool: ToolState::default(),
            accepted_content_types: vec![
                "application/pdf".to_string(),
                "application/x-pdf".to_string(),
                "application/octet-stream".to_string(),
                "binary/octet-stream".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolMode;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_upload_bytes": 2048 }"#).unwrap();
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.artifact_prefix, "corrections");
        assert_eq!(config.default_tool.mode, ToolMode::Mark);
    }

    #[test]
    fn test_tool_state_from_json() {
        let config = EngineConfig::from_json(
            r#"{ "default_tool": { "mode": "erase", "color": { "r": 0, "g": 0, "b": 0, "a": 255 }, "stroke_width": 12.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.default_tool.mode, ToolMode::Erase);
        assert_eq!(config.default_tool.stroke_width, 12.0);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(Path::new("/nonexistent/pagemark.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
