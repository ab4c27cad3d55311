//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use collecta::ConfigError;
use collecta_wire::ParseError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// File does not exist
    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("File not found: {}", path.display()))
            .with_context("The specified file does not exist")
            .with_suggestions([
                format!("TRY: Check if the file exists: ls -la {}", path.display()),
                format!(
                    "TRY: Look for similar files: ls {}",
                    path.parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ".".to_string())
                ),
            ])
    }

    /// Configuration file could not be loaded or is inconsistent
    pub fn invalid_config(path: &Path, err: &ConfigError) -> Self {
        let base = Self::new(format!("Invalid configuration: {}", err))
            .with_context(format!("While loading {}", path.display()));
        match err {
            ConfigError::Io { .. } => base.with_suggestions([
                format!("TRY: Check the path: ls -la {}", path.display()),
                "TRY: Pass the file explicitly with --config".to_string(),
            ]),
            ConfigError::Message(_) => base.with_suggestions([
                "TRY: Set senderId and senderOrg in the [message] table".to_string(),
                "TRY: Allowed keys: senderId, senderOrg, protocolVersion".to_string(),
            ]),
            ConfigError::Parse(_) | ConfigError::Schema(_) => base.with_suggestion(format!(
                "TRY: Validate the file: collecta check-config --config {}",
                path.display()
            )),
        }
    }

    /// Table name not declared in the configuration
    pub fn unknown_table(table: &str, known: &[String]) -> Self {
        Self::new(format!("Unknown table: '{}'", table))
            .with_context("Tables are declared as [[schemas]] in the configuration file")
            .with_suggestion(format!("TRY: Known tables: {}", known.join(", ")))
    }

    /// Wire document is malformed
    pub fn wire_parse_error(path: &Path, records: usize, err: &ParseError) -> Self {
        Self::new(format!("Wire parse error: {}", err))
            .with_context(format!(
                "Failed to read {} at byte {} after {} record(s)",
                path.display(),
                err.position(),
                records
            ))
            .with_suggestions([
                "TRY: Check that the document is complete (not truncated)".to_string(),
                "TRY: Records printed before this error are valid".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
