//! Run configuration.

use std::io;
use std::path::{Component, Path, PathBuf};

use common::FileFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combine::{CombineError, SigmaClipConfig};
use crate::ledger::RunContext;

pub const DEFAULT_LEDGER_FILE: &str = "provenance.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error(transparent)]
    Clip(#[from] CombineError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything one reduction run needs to know.
///
/// Unset fields fall back to their defaults, so a YAML file only needs the
/// keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory searched recursively for raw frames.
    pub input_dir: PathBuf,
    /// Root of the raw and preprocessed areas. Defaults to `input_dir`.
    pub output_root: Option<PathBuf>,
    pub raw_dir_name: String,
    pub preprocessed_dir_name: String,
    /// Defaults to `<output_root>/provenance.yaml`.
    pub ledger_path: Option<PathBuf>,
    pub clip: SigmaClipConfig,
    /// Science frames corrected concurrently.
    pub max_concurrent: usize,
    pub context: RunContext,
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_root: None,
            raw_dir_name: "raw".to_string(),
            preprocessed_dir_name: "preprocessed".to_string(),
            ledger_path: None,
            clip: SigmaClipConfig::default(),
            max_concurrent: 4,
            context: RunContext::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.input_dir.clone())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.output_root().join(&self.raw_dir_name)
    }

    pub fn preprocessed_dir(&self) -> PathBuf {
        self.output_root().join(&self.preprocessed_dir_name)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.output_root().join(DEFAULT_LEDGER_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clip.validate()?;

        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        for (field, name) in [
            ("raw_dir_name", &self.raw_dir_name),
            ("preprocessed_dir_name", &self.preprocessed_dir_name),
        ] {
            let mut components = Path::new(name).components();
            let single_normal = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !single_normal {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be a single directory name, got '{name}'"
                )));
            }
        }
        if self.raw_dir_name == self.preprocessed_dir_name {
            return Err(ConfigError::Invalid(
                "raw and preprocessed directories must differ".to_string(),
            ));
        }

        let ledger_path = self.ledger_path();
        FileFormat::from_path(&ledger_path).map_err(|err| {
            ConfigError::Invalid(format!("ledger path '{}': {err}", ledger_path.display()))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_derive_from_input_dir() {
        let config = RunConfig::new("/data/2015-10-27");
        assert_eq!(config.output_root(), Path::new("/data/2015-10-27"));
        assert_eq!(config.raw_dir(), Path::new("/data/2015-10-27/raw"));
        assert_eq!(config.preprocessed_dir(), Path::new("/data/2015-10-27/preprocessed"));
        assert_eq!(config.ledger_path(), Path::new("/data/2015-10-27/provenance.yaml"));
        assert_eq!(config.clip, SigmaClipConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"input_dir: /data/night\n\
              output_root: /reduced/night\n\
              ledger_path: /reduced/night/ledger.json\n\
              max_concurrent: 8\n\
              clip:\n  low_sigma: 4.0\n  high_sigma: 2.5\n\
              context:\n  observatory:\n    name: CASLEO\n    latitude: -31.8\n    longitude: -69.3\n",
        )
        .unwrap();

        let config = RunConfig::from_yaml_file(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.input_dir, Path::new("/data/night"));
        assert_eq!(config.raw_dir(), Path::new("/reduced/night/raw"));
        assert_eq!(config.ledger_path(), Path::new("/reduced/night/ledger.json"));
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.clip.low_sigma, 4.0);
        assert_eq!(config.clip.high_sigma, 2.5);
        assert_eq!(config.clip.max_iterations, 5);
        assert_eq!(config.context.observatory.unwrap().name, "CASLEO");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"max_concurrent: [not, a, number]\n").unwrap();
        let err = RunConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::from_yaml_file(Path::new("/nonexistent/run.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RunConfig::new("/data");
        config.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RunConfig::new("/data");
        config.raw_dir_name = "../raw".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RunConfig::new("/data");
        config.preprocessed_dir_name = "raw".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RunConfig::new("/data");
        config.ledger_path = Some("/data/ledger.sqlite".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RunConfig::new("/data");
        config.clip.high_sigma = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Clip(_))));
    }
}
