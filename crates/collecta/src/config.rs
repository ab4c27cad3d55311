//! Application configuration file.
//!
//! One TOML file carries everything a deployment needs:
//!
//! ```toml
//! [message]
//! senderId = "EFSA01"
//! senderOrg = "IZSVe"
//!
//! [parser.composite]
//! tag = "sampInfo"
//! column = "sampInfoValue"
//!
//! [[schemas]]
//! name = "report"
//! traversable = true
//!
//! [[schemas.columns]]
//! id = "repYear"
//! output = "record"
//!
//! [[relations]]
//! parent = "report"
//! child = "sample"
//! ```

use collecta_schema::{Catalog, CatalogDef, SchemaError};
use collecta_wire::{MessageConfig, MessageError, ParserOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid [message] section: {0}")]
    Message(#[from] MessageError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub parser: ParserOptions,
    /// `[[schemas]]` and `[[relations]]` live at the top level
    #[serde(flatten)]
    pub catalog: CatalogDef,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.message.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            schemas = config.catalog.schemas.len(),
            relations = config.catalog.relations.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Build and validate the schema catalog.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        Ok(Catalog::build(self.catalog.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collecta_protocol::HeaderField;
    use std::io::Write;

    const CONFIG: &str = r#"
[message]
senderId = "EFSA01"
senderOrg = "IZSVe"

[parser.composite]
tag = "sampInfo"
column = "sampInfoValue"

[[schemas]]
name = "report"
traversable = true

[[schemas.columns]]
id = "repYear"
output = "record"

[[schemas]]
name = "sample"
generates_record = true

[[schemas.columns]]
id = "sampInfoValue"
output = "record"

[[relations]]
parent = "report"
child = "sample"
"#;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.message.value(HeaderField::SenderOrg), Some("IZSVe"));
        assert_eq!(
            config.parser.composite.as_ref().map(|c| c.column.as_str()),
            Some("sampInfoValue")
        );

        let catalog = config.catalog().unwrap();
        let sample = catalog.schema("sample").unwrap();
        assert!(sample.has_column("reportId"));
        assert!(sample.generates_record());
    }

    #[test]
    fn test_missing_sender_is_rejected() {
        let err = AppConfig::from_toml_str("[message]\nsenderOrg = \"X\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Message(MessageError::MissingField(HeaderField::SenderId))));
    }

    #[test]
    fn test_unknown_header_field_is_rejected() {
        let err = AppConfig::from_toml_str(
            "[message]\nsenderId = \"A\"\nsenderOrg = \"B\"\nsenderMood = \"ok\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_catalog_defects_surface_on_build() {
        let config = AppConfig::from_toml_str(
            "[message]\nsenderId = \"A\"\nsenderOrg = \"B\"\n\n\
             [[schemas]]\nname = \"report\"\n\n\
             [[relations]]\nparent = \"report\"\nchild = \"report\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.catalog().unwrap_err(),
            ConfigError::Schema(SchemaError::SelfRelation(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/collecta.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
