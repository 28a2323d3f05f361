use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Search order used when no config path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["nfa.yaml", "/etc/nfa/config.yaml"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// `text` or `json`; file extension decides when unset
    #[serde(default)]
    pub default_format: Option<String>,
    #[serde(default)]
    pub redundancy: RedundancyConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyConfig {
    /// Inputs above this many rules are refused by the pairwise scan
    #[serde(default = "default_max_rules")]
    pub max_rules: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub show_trace: bool,
}

fn default_max_rules() -> usize {
    5000
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            max_rules: default_max_rules(),
        }
    }
}

impl AnalyzerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&content)
    }
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            search_paths: DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load an explicitly requested config; a missing file is an error.
    pub fn load(&self, path: &Path) -> Result<AnalyzerConfig> {
        let config = AnalyzerConfig::from_file(path)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// First readable file on the search path, or defaults.
    pub fn load_default(&self) -> AnalyzerConfig {
        for path in &self.search_paths {
            if !path.exists() {
                continue;
            }
            match self.load(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Ignoring config {:?}: {}", path, e);
                }
            }
        }

        AnalyzerConfig::default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("nfa-config-{}-{}", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AnalyzerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert_eq!(config.redundancy.max_rules, 5000);
        assert!(!config.evaluation.show_trace);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
default_format: json
redundancy:
  max_rules: 200
"#;
        let config = AnalyzerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.redundancy.max_rules, 200);
        assert!(!config.evaluation.show_trace);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = AnalyzerConfig::from_yaml("redundancy: [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let loader = ConfigLoader::new();
        let err = loader.load(Path::new("/nonexistent/nfa.yaml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_load_default_skips_broken_files() {
        let broken = temp_file("broken.yaml", "evaluation: [");
        let good = temp_file("good.yaml", "evaluation:\n  show_trace: true\n");

        let loader = ConfigLoader::with_search_paths(vec![
            PathBuf::from("/nonexistent/nfa.yaml"),
            broken.clone(),
            good.clone(),
        ]);
        let config = loader.load_default();
        assert!(config.evaluation.show_trace);

        let empty = ConfigLoader::with_search_paths(vec![]);
        assert_eq!(empty.load_default(), AnalyzerConfig::default());

        std::fs::remove_file(broken).ok();
        std::fs::remove_file(good).ok();
    }
}
