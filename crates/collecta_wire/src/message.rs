//! Envelope values: configured header fields and the per-send operation.

use crate::error::MessageError;
use chrono::{DateTime, SecondsFormat, Utc};
use collecta_ids::MessageId;
use collecta_protocol::defaults::PROTOCOL_VERSION;
use collecta_protocol::{HeaderField, OperationField, OperationType};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Header values taken from the `[message]` configuration table.
///
/// Keys are header tag names. `messageId` and `created` are generated per
/// message and may not be configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>")]
pub struct MessageConfig {
    values: BTreeMap<HeaderField, String>,
}

impl TryFrom<BTreeMap<String, String>> for MessageConfig {
    type Error = MessageError;

    fn try_from(table: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut config = MessageConfig::default();
        for (key, value) in table {
            config.set(key.parse::<HeaderField>()?, value)?;
        }
        Ok(config)
    }
}

impl MessageConfig {
    pub fn new(sender_id: impl Into<String>, sender_org: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(HeaderField::SenderId, sender_id.into());
        values.insert(HeaderField::SenderOrg, sender_org.into());
        Self { values }
    }

    pub fn set(&mut self, field: HeaderField, value: impl Into<String>) -> Result<(), MessageError> {
        if field.is_generated() {
            return Err(MessageError::GeneratedField(field));
        }
        self.values.insert(field, value.into());
        Ok(())
    }

    pub fn value(&self, field: HeaderField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Every configurable field without a built-in default must be set.
    pub fn validate(&self) -> Result<(), MessageError> {
        for field in HeaderField::ALL {
            if field.is_generated() || field == HeaderField::ProtocolVersion {
                continue;
            }
            if self.value(field).map_or(true, |v| v.trim().is_empty()) {
                return Err(MessageError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Header fields for one message, in emission order.
    pub fn header(&self, message_id: &MessageId, created: DateTime<Utc>) -> Vec<(HeaderField, String)> {
        HeaderField::ALL
            .iter()
            .map(|&field| {
                let value = match field {
                    HeaderField::MessageId => message_id.to_string(),
                    HeaderField::Created => created.to_rfc3339_opts(SecondsFormat::Secs, true),
                    HeaderField::ProtocolVersion => self
                        .value(field)
                        .unwrap_or(PROTOCOL_VERSION)
                        .to_string(),
                    other => self.value(other).unwrap_or_default().to_string(),
                };
                (field, value)
            })
            .collect()
    }
}

/// The `operation` block of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub op_type: OperationType,
    pub data_collection: Option<String>,
    pub comment: Option<String>,
}

impl Operation {
    pub fn new(op_type: OperationType) -> Self {
        Self {
            op_type,
            data_collection: None,
            comment: None,
        }
    }

    pub fn with_data_collection(mut self, code: impl Into<String>) -> Self {
        self.data_collection = Some(code.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Fields in emission order; absent optional fields are omitted.
    pub fn fields(&self) -> Vec<(OperationField, String)> {
        let mut fields = vec![(OperationField::OpType, self.op_type.to_string())];
        if let Some(code) = &self.data_collection {
            fields.push((OperationField::DataCollection, code.clone()));
        }
        if let Some(comment) = &self.comment {
            fields.push((OperationField::Comment, comment.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Deserialize)]
    struct Wrapper {
        message: MessageConfig,
    }

    #[test]
    fn test_from_toml_table() {
        let parsed: Wrapper = toml::from_str(
            r#"
            [message]
            senderId = "EFSA01"
            senderOrg = "IZS"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.message.value(HeaderField::SenderId), Some("EFSA01"));
        assert!(parsed.message.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let table: BTreeMap<String, String> =
            [("sender".to_string(), "x".to_string())].into_iter().collect();
        assert!(matches!(
            MessageConfig::try_from(table),
            Err(MessageError::UnknownField(_))
        ));
    }

    #[test]
    fn test_generated_key_rejected() {
        let table: BTreeMap<String, String> =
            [("messageId".to_string(), "x".to_string())].into_iter().collect();
        assert_eq!(
            MessageConfig::try_from(table),
            Err(MessageError::GeneratedField(HeaderField::MessageId))
        );
    }

    #[test]
    fn test_validate_requires_sender() {
        let config = MessageConfig::default();
        assert_eq!(
            config.validate(),
            Err(MessageError::MissingField(HeaderField::SenderId))
        );
    }

    #[test]
    fn test_header_order_and_defaults() {
        let config = MessageConfig::new("EFSA01", "IZS");
        let id = MessageId::new();
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let header = config.header(&id, created);

        let tags: Vec<_> = header.iter().map(|(f, _)| f.tag()).collect();
        assert_eq!(
            tags,
            vec!["messageId", "senderId", "senderOrg", "created", "protocolVersion"]
        );
        assert_eq!(header[0].1, id.to_string());
        assert_eq!(header[3].1, "2024-03-01T12:00:00Z");
        assert_eq!(header[4].1, PROTOCOL_VERSION);
    }

    #[test]
    fn test_operation_fields() {
        let op = Operation::new(OperationType::Insert).with_data_collection("TEST_DC");
        let fields = op.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], (OperationField::OpType, "Insert".to_string()));
    }
}
