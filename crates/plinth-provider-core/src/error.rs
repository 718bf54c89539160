//! Error types shared by providers and the plugin server.

use crate::schema::Diagnostic;
use thiserror::Error;

/// Errors a provider can return from any lifecycle operation.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The requested resource type is not part of the provider schema.
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// A resource operation was attempted before `configure` succeeded.
    #[error("Provider is not configured")]
    NotConfigured,

    /// The remote object backing a resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration failed validation.
    #[error("Invalid configuration: {}", summarize(.0))]
    InvalidConfig(Vec<Diagnostic>),

    /// The provider's schema is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Generic provider failure.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.attribute {
            Some(attr) => format!("{}: {}", attr, d.summary),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_lists_diagnostics() {
        let err = ProviderError::InvalidConfig(vec![
            Diagnostic::error("missing required attribute").with_attribute("filename"),
            Diagnostic::error("configuration must be an object"),
        ]);

        assert_eq!(
            err.to_string(),
            "Invalid configuration: filename: missing required attribute; configuration must be an object"
        );
    }
}
