use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

pub const DEFAULT_EXTRACTION_ENDPOINT: &str = "http://localhost:8000/extract-outline";
pub const DEFAULT_UPLOAD_FIELD: &str = "pdf_file";
pub const DEFAULT_FILE_NAME: &str = "Document.pdf";
const CONFIG_FILE_NAME: &str = "insight.toml";

/// Static settings read once at startup.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub extraction_endpoint: String,
    pub upload_field: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "request_timeout_secs")]
    pub request_timeout: Duration,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub container_id: String,
    pub default_file_name: String,
    /// Where the viewer engine's native library lives, when it is not on the
    /// default search path.
    pub engine_library: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            extraction_endpoint: DEFAULT_EXTRACTION_ENDPOINT.to_string(),
            upload_field: DEFAULT_UPLOAD_FIELD.to_string(),
            request_timeout: Duration::from_secs(60),
            viewer: ViewerConfig::default(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            container_id: "insight-view".to_string(),
            default_file_name: DEFAULT_FILE_NAME.to_string(),
            engine_library: None,
        }
    }
}

impl PreviewConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PreviewConfig = toml::from_str(raw).context("failed to parse configuration")?;
        if config.extraction_endpoint.trim().is_empty() {
            return Err(anyhow!("extraction_endpoint must not be empty"));
        }
        if config.upload_field.trim().is_empty() {
            return Err(anyhow!("upload_field must not be empty"));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid configuration in {:?}", path))
    }

    /// Reads `insight.toml` from the platform config directory, falling back
    /// to defaults when there is none.
    pub fn load_or_default() -> Result<Self> {
        Self::load_or_default_from(default_config_path().as_deref())
    }

    pub fn load_or_default_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!(?path, "no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("net", "insight", "insight")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PreviewConfig::from_toml_str("").unwrap();
        assert_eq!(config, PreviewConfig::default());
        assert_eq!(config.extraction_endpoint, DEFAULT_EXTRACTION_ENDPOINT);
        assert_eq!(config.upload_field, "pdf_file");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn load_reads_partial_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        std::fs::write(
            &path,
            r#"
extraction_endpoint = "http://outline.internal:9000/extract"
request_timeout_secs = 5

[viewer]
engine_library = "/opt/pdfium/libpdfium.so"
"#,
        )
        .unwrap();

        let config = PreviewConfig::load(&path).unwrap();
        assert_eq!(config.extraction_endpoint, "http://outline.internal:9000/extract");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.upload_field, DEFAULT_UPLOAD_FIELD);
        assert_eq!(
            config.viewer.engine_library.as_deref(),
            Some(Path::new("/opt/pdfium/libpdfium.so"))
        );
        assert_eq!(config.viewer.default_file_name, DEFAULT_FILE_NAME);
    }

    #[test]
    fn blank_endpoint_is_rejected() {
        assert!(PreviewConfig::from_toml_str("extraction_endpoint = \"  \"").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(PreviewConfig::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn absent_config_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        assert_eq!(
            PreviewConfig::load_or_default_from(Some(&path)).unwrap(),
            PreviewConfig::default()
        );
        assert_eq!(
            PreviewConfig::load_or_default_from(None).unwrap(),
            PreviewConfig::default()
        );
    }

    #[test]
    fn present_config_file_is_loaded_and_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        std::fs::write(&path, "upload_field = \"document\"\n").unwrap();
        let config = PreviewConfig::load_or_default_from(Some(&path)).unwrap();
        assert_eq!(config.upload_field, "document");

        std::fs::write(&path, "upload_field = \"\"\n").unwrap();
        assert!(PreviewConfig::load_or_default_from(Some(&path)).is_err());
    }
}
