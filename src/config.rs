// Application configuration loaded from YAML.
//
// Only presentation and persistence knobs live here. Risk weights and band
// thresholds are fixed constants in `crate::metrics`.
use crate::error::{Result, RiskError};
use crate::mapping::KNOWN_DATASET_MIN_ROWS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file names searched in the working directory.
const CONFIG_FILE_NAMES: &[&str] = &["supplier-risk.yaml", "supplier-risk.yml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mapping confidence below which an uploaded mapping must be reviewed.
    pub confidence_threshold: f64,
    /// Minimum row count before header markers can identify the known dataset.
    pub known_dataset_min_rows: usize,
    /// JSON file holding saved column mappings.
    pub mapping_store: PathBuf,
    /// Directory that report exports are written to.
    pub output_dir: PathBuf,
    /// Rows shown in console table previews.
    pub preview_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.45,
            known_dataset_min_rows: KNOWN_DATASET_MIN_ROWS,
            mapping_store: PathBuf::from(".supplier-risk-mappings.json"),
            output_dir: PathBuf::from("."),
            preview_rows: 5,
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RiskError::io(path, e))?;
        Self::from_yaml_str(&content)
    }

    /// Load `explicit` if given, otherwise a discovered file, otherwise the
    /// defaults. An explicit path that fails to load is an error; a
    /// discovered one only warns.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let Some(path) = discover_config_file() else {
            return Ok((Self::default(), None));
        };
        match Self::load(&path) {
            Ok(config) => Ok((config, Some(path))),
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Ok((Self::default(), None))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RiskError::Config(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

fn discover_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| cwd.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str("preview_rows: 10\noutput_dir: out\n").unwrap();
        assert_eq!(config.preview_rows, 10);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.confidence_threshold, 0.45);
        assert_eq!(config.known_dataset_min_rows, 600);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = AppConfig::from_yaml_str("confidence_threshold: 1.5").unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supplier-risk.yaml");
        std::fs::write(&path, "mapping_store: maps.json\n").unwrap();
        let (config, found) = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.mapping_store, PathBuf::from("maps.json"));
        assert_eq!(found, Some(path));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_or_default(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, RiskError::Io { .. }));
    }
}
