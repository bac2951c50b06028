use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub mod file_utils;
pub mod log_setup;
pub mod parallel;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(file_name: &str) -> Option<&str> {
    Path::new(file_name)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_file_name(file_name: &str) -> FileFormatResult<Self> {
        let extension = get_file_extension(file_name)
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or(FileExtensionError::MissingFileExtension)?;

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(FileExtensionError::UnsupportedFileExtension(
                file_name.to_string(),
            )),
        }
    }

    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        Self::from_file_name(&path.to_string_lossy())
    }
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    let mut text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        exptime: f64,
    }

    #[test]
    fn file_format_from_name() {
        assert_eq!(FileFormat::from_file_name("ledger.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(FileFormat::from_file_name("ledger.YML").unwrap(), FileFormat::Yaml);
        assert_eq!(FileFormat::from_file_name("ledger.json").unwrap(), FileFormat::Json);
        assert!(matches!(
            FileFormat::from_file_name("ledger"),
            Err(FileExtensionError::MissingFileExtension)
        ));
        assert!(matches!(
            FileFormat::from_file_name("ledger.db"),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn serialize_then_deserialize_yaml_and_json() {
        let sample = Sample {
            name: "dark_master_30s".to_string(),
            exptime: 30.0,
        };

        for format in [FileFormat::Yaml, FileFormat::Json] {
            let text = serialize(&sample, format).unwrap();
            assert!(text.ends_with('\n'));
            let back: Sample = deserialize(&text, format).unwrap();
            assert_eq!(back, sample);
        }
    }
}
