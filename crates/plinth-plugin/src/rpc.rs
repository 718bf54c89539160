//! JSON-RPC surface exposed to the host.
//!
//! Every method delegates to the provider instance. Before a resource call
//! reaches the provider, the type name is checked against the schema cached
//! at startup, and create/read/update/delete/import are refused until the
//! provider has been configured.

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use plinth_provider_core::{
    has_errors, Diagnostic, ImportedResource, Provider, ProviderError, ProviderSchema,
};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CODE_PROVIDER_ERROR: i32 = -32000;
pub const CODE_UNKNOWN_RESOURCE_TYPE: i32 = -32001;
pub const CODE_NOT_CONFIGURED: i32 = -32002;
pub const CODE_NOT_FOUND: i32 = -32003;
pub const CODE_INVALID_CONFIG: i32 = -32004;

/// The plugin RPC interface.
#[rpc(server)]
pub trait PluginApi {
    /// Describe the provider and its resource types.
    #[method(name = "provider.get_schema")]
    async fn get_schema(&self) -> RpcResult<ProviderSchema>;

    /// Validate the provider configuration block.
    #[method(name = "provider.validate_config")]
    async fn validate_provider_config(&self, config: Value) -> RpcResult<Vec<Diagnostic>>;

    /// Configure the provider.
    #[method(name = "provider.configure")]
    async fn configure(&self, config: Value) -> RpcResult<Vec<Diagnostic>>;

    /// Ask the provider to cancel in-flight work.
    #[method(name = "provider.stop")]
    async fn stop_provider(&self) -> RpcResult<()>;

    /// Validate a resource configuration.
    #[method(name = "resource.validate_config")]
    async fn validate_resource_config(
        &self,
        type_name: String,
        config: Value,
    ) -> RpcResult<Vec<Diagnostic>>;

    #[method(name = "resource.create")]
    async fn create(&self, type_name: String, planned_state: Value) -> RpcResult<Value>;

    /// Refresh a resource; `null` means it is gone.
    #[method(name = "resource.read")]
    async fn read(&self, type_name: String, current_state: Value) -> RpcResult<Option<Value>>;

    #[method(name = "resource.update")]
    async fn update(
        &self,
        type_name: String,
        prior_state: Value,
        planned_state: Value,
    ) -> RpcResult<Value>;

    #[method(name = "resource.delete")]
    async fn delete(&self, type_name: String, current_state: Value) -> RpcResult<()>;

    #[method(name = "resource.import")]
    async fn import(&self, type_name: String, id: String) -> RpcResult<Vec<ImportedResource>>;

    /// Host is done with the plugin; the server stops after replying.
    #[method(name = "plugin.shutdown")]
    async fn shutdown(&self) -> RpcResult<()>;
}

/// Implementation of [`PluginApiServer`] around one provider instance.
pub struct PluginService {
    provider: Arc<dyn Provider>,
    schema: ProviderSchema,
    configured: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl PluginService {
    pub fn new(provider: Arc<dyn Provider>, shutdown_tx: watch::Sender<bool>) -> Self {
        let schema = provider.schema();
        Self {
            provider,
            schema,
            configured: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn check_resource_type(&self, type_name: &str) -> Result<(), ProviderError> {
        if self.schema.resource(type_name).is_some() {
            Ok(())
        } else {
            Err(ProviderError::UnknownResourceType(type_name.to_string()))
        }
    }

    fn check_ready(&self, type_name: &str) -> Result<(), ProviderError> {
        self.check_resource_type(type_name)?;
        if self.is_configured() {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured)
        }
    }

    /// Run one request inside a span tagged with a fresh request id.
    async fn dispatch<T, Fut>(&self, method: &'static str, fut: Fut) -> RpcResult<T>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let request_id = Uuid::new_v4();
        let span = info_span!("rpc", method = method, %request_id);

        async move {
            debug!("Handling request");
            fut.await.map_err(|e| {
                warn!("Request failed: {}", e);
                to_rpc_error(e)
            })
        }
        .instrument(span)
        .await
    }
}

/// Map a provider error onto a JSON-RPC error object.
pub fn to_rpc_error(err: ProviderError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        ProviderError::UnknownResourceType(_) => {
            ErrorObjectOwned::owned(CODE_UNKNOWN_RESOURCE_TYPE, message, None::<()>)
        }
        ProviderError::NotConfigured => {
            ErrorObjectOwned::owned(CODE_NOT_CONFIGURED, message, None::<()>)
        }
        ProviderError::NotFound(_) => ErrorObjectOwned::owned(CODE_NOT_FOUND, message, None::<()>),
        ProviderError::InvalidConfig(diagnostics) => {
            ErrorObjectOwned::owned(CODE_INVALID_CONFIG, message, Some(diagnostics))
        }
        _ => ErrorObjectOwned::owned(CODE_PROVIDER_ERROR, message, None::<()>),
    }
}

#[jsonrpsee::core::async_trait]
impl PluginApiServer for PluginService {
    async fn get_schema(&self) -> RpcResult<ProviderSchema> {
        self.dispatch("provider.get_schema", async {
            Ok::<_, ProviderError>(self.schema.clone())
        })
        .await
    }

    async fn validate_provider_config(&self, config: Value) -> RpcResult<Vec<Diagnostic>> {
        self.dispatch("provider.validate_config", async {
            self.provider.validate_provider_config(&config).await
        })
        .await
    }

    async fn configure(&self, config: Value) -> RpcResult<Vec<Diagnostic>> {
        self.dispatch("provider.configure", async {
            let diagnostics = self.provider.configure(config).await?;
            if !has_errors(&diagnostics) {
                self.configured.store(true, Ordering::SeqCst);
                info!("Provider {} configured", self.provider.name());
            }
            Ok::<_, ProviderError>(diagnostics)
        })
        .await
    }

    async fn stop_provider(&self) -> RpcResult<()> {
        self.dispatch("provider.stop", self.provider.stop()).await
    }

    async fn validate_resource_config(
        &self,
        type_name: String,
        config: Value,
    ) -> RpcResult<Vec<Diagnostic>> {
        self.dispatch("resource.validate_config", async {
            self.check_resource_type(&type_name)?;
            self.provider
                .validate_resource_config(&type_name, &config)
                .await
        })
        .await
    }

    async fn create(&self, type_name: String, planned_state: Value) -> RpcResult<Value> {
        self.dispatch("resource.create", async {
            self.check_ready(&type_name)?;
            self.provider.create(&type_name, planned_state).await
        })
        .await
    }

    async fn read(&self, type_name: String, current_state: Value) -> RpcResult<Option<Value>> {
        self.dispatch("resource.read", async {
            self.check_ready(&type_name)?;
            self.provider.read(&type_name, current_state).await
        })
        .await
    }

    async fn update(
        &self,
        type_name: String,
        prior_state: Value,
        planned_state: Value,
    ) -> RpcResult<Value> {
        self.dispatch("resource.update", async {
            self.check_ready(&type_name)?;
            self.provider
                .update(&type_name, prior_state, planned_state)
                .await
        })
        .await
    }

    async fn delete(&self, type_name: String, current_state: Value) -> RpcResult<()> {
        self.dispatch("resource.delete", async {
            self.check_ready(&type_name)?;
            self.provider.delete(&type_name, current_state).await
        })
        .await
    }

    async fn import(&self, type_name: String, id: String) -> RpcResult<Vec<ImportedResource>> {
        self.dispatch("resource.import", async {
            self.check_ready(&type_name)?;
            self.provider.import(&type_name, &id).await
        })
        .await
    }

    async fn shutdown(&self) -> RpcResult<()> {
        info!("Shutdown requested by host");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plinth_provider_core::{Attribute, Schema};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingProvider {
        creates: AtomicUsize,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_provider_config(
                    Schema::v0().with_attribute("token", Attribute::required_string()),
                )
                .with_resource(
                    "counting_item",
                    Schema::v0()
                        .with_attribute("id", Attribute::computed_string())
                        .with_attribute("name", Attribute::required_string()),
                )
        }

        async fn configure(&self, config: Value) -> plinth_provider_core::Result<Vec<Diagnostic>> {
            Ok(self.schema().provider.validate_config(&config))
        }

        async fn create(
            &self,
            _type_name: &str,
            planned_state: Value,
        ) -> plinth_provider_core::Result<Value> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let mut state = planned_state;
            state["id"] = json!("item-1");
            Ok(state)
        }

        async fn read(
            &self,
            _type_name: &str,
            _current_state: Value,
        ) -> plinth_provider_core::Result<Option<Value>> {
            Ok(None)
        }

        async fn update(
            &self,
            _type_name: &str,
            _prior_state: Value,
            planned_state: Value,
        ) -> plinth_provider_core::Result<Value> {
            Ok(planned_state)
        }

        async fn delete(
            &self,
            _type_name: &str,
            _current_state: Value,
        ) -> plinth_provider_core::Result<()> {
            Ok(())
        }

        async fn import(
            &self,
            _type_name: &str,
            id: &str,
        ) -> plinth_provider_core::Result<Vec<ImportedResource>> {
            Err(ProviderError::NotFound(id.to_string()))
        }
    }

    fn service() -> (PluginService, Arc<CountingProvider>, watch::Receiver<bool>) {
        let provider = Arc::new(CountingProvider::default());
        let (tx, rx) = watch::channel(false);
        let service = PluginService::new(provider.clone(), tx);
        (service, provider, rx)
    }

    #[tokio::test]
    async fn test_get_schema_returns_provider_schema() {
        let (service, provider, _rx) = service();
        let schema = service.get_schema().await.unwrap();
        assert_eq!(schema, provider.schema());
    }

    #[tokio::test]
    async fn test_crud_refused_before_configure() {
        let (service, provider, _rx) = service();

        let err = service
            .create("counting_item".to_string(), json!({ "name": "a" }))
            .await
            .unwrap_err();

        assert_eq!(err.code(), CODE_NOT_CONFIGURED);
        assert_eq!(provider.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_configure_with_errors_does_not_mark_configured() {
        let (service, _provider, _rx) = service();

        let diags = service.configure(json!({})).await.unwrap();
        assert!(has_errors(&diags));
        assert!(!service.is_configured());

        let diags = service.configure(json!({ "token": "t" })).await.unwrap();
        assert!(diags.is_empty());
        assert!(service.is_configured());
    }

    #[tokio::test]
    async fn test_create_after_configure() {
        let (service, provider, _rx) = service();
        service.configure(json!({ "token": "t" })).await.unwrap();

        let state = service
            .create("counting_item".to_string(), json!({ "name": "a" }))
            .await
            .unwrap();

        assert_eq!(state, json!({ "name": "a", "id": "item-1" }));
        assert_eq!(provider.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_resource_type_never_reaches_provider() {
        let (service, provider, _rx) = service();
        service.configure(json!({ "token": "t" })).await.unwrap();

        let err = service
            .create("counting_other".to_string(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_UNKNOWN_RESOURCE_TYPE);
        assert_eq!(provider.creates.load(Ordering::SeqCst), 0);

        let err = service
            .validate_resource_config("counting_other".to_string(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_UNKNOWN_RESOURCE_TYPE);
    }

    #[tokio::test]
    async fn test_read_of_missing_resource_is_none() {
        let (service, _provider, _rx) = service();
        service.configure(json!({ "token": "t" })).await.unwrap();

        let state = service
            .read("counting_item".to_string(), json!({ "id": "item-1" }))
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_import_not_found_maps_error_code() {
        let (service, _provider, _rx) = service();
        service.configure(json!({ "token": "t" })).await.unwrap();

        let err = service
            .import("counting_item".to_string(), "missing".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), CODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_signals_watchers() {
        let (service, _provider, rx) = service();
        assert!(!*rx.borrow());

        service.shutdown().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_invalid_config_error_carries_diagnostics() {
        let err = to_rpc_error(ProviderError::InvalidConfig(vec![Diagnostic::error("bad")]));
        assert_eq!(err.code(), CODE_INVALID_CONFIG);
        let data = err.data().expect("diagnostics attached");
        let diags: Vec<Diagnostic> = serde_json::from_str(data.get()).unwrap();
        assert_eq!(diags, vec![Diagnostic::error("bad")]);
    }
}
