//! # plinth-provider-core
//!
//! Core traits and types for Plinth providers.
//!
//! A provider describes its configuration and resource types through a
//! [`ProviderSchema`] and implements the [`Provider`] trait with one method
//! per lifecycle operation the host drives: validation, configuration,
//! create/read/update/delete and import.
//!
//! The plugin server never constructs a provider itself. It receives a
//! [`ProviderFunc`] and calls it when it needs an instance.

pub mod error;
pub mod provider;
pub mod schema;

pub use error::{ProviderError, Result};
pub use provider::{provider_func, Provider, ProviderFunc};
pub use schema::{
    has_errors, Attribute, AttributeType, Diagnostic, ImportedResource, ProviderSchema, Schema,
    Severity,
};

/// Convenience re-exports for provider implementations.
pub mod prelude {
    pub use crate::error::{ProviderError, Result};
    pub use crate::provider::{provider_func, Provider, ProviderFunc};
    pub use crate::schema::{
        has_errors, Attribute, AttributeType, Diagnostic, ImportedResource, ProviderSchema,
        Schema, Severity,
    };
    pub use async_trait::async_trait;
}
