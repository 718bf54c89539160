//! The provider capability interface.

use crate::error::{ProviderError, Result};
use crate::schema::{Diagnostic, ImportedResource, ProviderSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A resource-management provider.
///
/// The plugin server holds a single instance for the life of the process and
/// calls into it concurrently, so implementations keep mutable state behind
/// their own locks.
///
/// Resource state is passed around as JSON objects shaped by the resource's
/// [`Schema`](crate::schema::Schema).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name, e.g. `"local"`.
    fn name(&self) -> &str;

    /// Describe the provider configuration block and all resource types.
    fn schema(&self) -> ProviderSchema;

    /// Validate the provider configuration block.
    async fn validate_provider_config(&self, config: &Value) -> Result<Vec<Diagnostic>> {
        Ok(self.schema().provider.validate_config(config))
    }

    /// Apply provider configuration (credentials, roots, endpoints).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>>;

    /// Validate the configuration of a single resource.
    async fn validate_resource_config(
        &self,
        type_name: &str,
        config: &Value,
    ) -> Result<Vec<Diagnostic>> {
        let schema = self.schema();
        let resource = schema
            .resource(type_name)
            .ok_or_else(|| ProviderError::UnknownResourceType(type_name.to_string()))?;
        Ok(resource.validate_config(config))
    }

    /// Create a resource and return its full state.
    async fn create(&self, type_name: &str, planned_state: Value) -> Result<Value>;

    /// Refresh a resource. Returns `None` when it no longer exists.
    async fn read(&self, type_name: &str, current_state: Value) -> Result<Option<Value>>;

    /// Update a resource in place and return its new state.
    async fn update(&self, type_name: &str, prior_state: Value, planned_state: Value)
        -> Result<Value>;

    /// Destroy a resource.
    async fn delete(&self, type_name: &str, current_state: Value) -> Result<()>;

    /// Bring an existing object under management by its id.
    async fn import(&self, type_name: &str, id: &str) -> Result<Vec<ImportedResource>>;

    /// Cancel in-flight work. Called when the host stops the provider.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// A zero-argument factory producing a fresh provider instance.
///
/// This is the opaque capability the entrypoint hands to the plugin server.
pub type ProviderFunc = Arc<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

/// Wrap a closure as a [`ProviderFunc`].
pub fn provider_func<F>(f: F) -> ProviderFunc
where
    F: Fn() -> Box<dyn Provider> + Send + Sync + 'static,
{
    Arc::new(f)
}
