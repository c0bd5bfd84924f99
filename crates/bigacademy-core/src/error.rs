//! Error types for BigAcademy

use thiserror::Error;

/// Result type alias using BigAcademy's Error
pub type Result<T> = std::result::Result<T, Error>;

/// BigAcademy error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors (E400-E499)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    // Generation errors (E500-E599)
    #[error("Template '{0}' not found. Register it with the template registry first.")]
    TemplateNotFound(String),

    #[error("Sample generation failed: {0}")]
    Generation(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "E400",
            Self::Serialization(_) => "E401",
            Self::CorruptRecord(_) => "E402",
            Self::TemplateNotFound(_) => "E500",
            Self::Generation(_) => "E501",
            Self::Config(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Storage(_) => {
                Some("Check that the knowledge base file is readable and writable".to_string())
            }
            Self::CorruptRecord(_) => {
                Some("Re-ingest the affected source into a fresh knowledge base".to_string())
            }
            Self::TemplateNotFound(name) => Some(format!("Register a template named '{}'", name)),
            Self::Config(_) => {
                Some("Check config.toml in the BigAcademy config directory".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error comes from the persistent layer
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::CorruptRecord(_)
        )
    }

    /// Whether this error is a per-sample generation failure
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::TemplateNotFound(_) | Self::Generation(_))
    }
}
