//! Serving entry points.
//!
//! [`serve`] is the blocking call a provider binary makes from `main`. It owns
//! the whole plugin lifecycle: configuration, handshake, provider
//! construction, the RPC listener, and shutdown.

use crate::config::ServeConfig;
use crate::error::{ServeError, ServeResult};
use crate::handshake::Handshake;
use crate::logging;
use crate::rpc::{PluginApiServer, PluginService};
use jsonrpsee::server::{Server, ServerHandle};
use plinth_provider_core::{Provider, ProviderFunc};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// App protocol version spoken by this library.
pub const DEFAULT_APP_PROTOCOL_VERSION: u32 = 1;

/// Time given to the shutdown reply before connections are closed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(50);

/// Options passed to [`serve`].
pub struct ServeOpts {
    /// Factory invoked to obtain the provider instance.
    pub provider_func: ProviderFunc,

    /// App protocol versions this plugin can speak.
    pub app_protocol_versions: Vec<u32>,

    /// Explicit configuration. When `None`, the config file is loaded.
    pub config: Option<ServeConfig>,
}

impl ServeOpts {
    pub fn new(provider_func: ProviderFunc) -> Self {
        Self {
            provider_func,
            app_protocol_versions: vec![DEFAULT_APP_PROTOCOL_VERSION],
            config: None,
        }
    }

    pub fn with_protocol_versions(mut self, versions: Vec<u32>) -> Self {
        self.app_protocol_versions = versions;
        self
    }

    pub fn with_config(mut self, config: ServeConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Serve a provider to the plugin host, blocking until the host is done.
///
/// Returns `Ok(())` after a host-initiated shutdown, SIGINT or SIGTERM. Any
/// error is a startup failure and should end the process with a non-zero status.
pub fn serve(opts: ServeOpts) -> ServeResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ServeError::Runtime)?;

    runtime.block_on(serve_async(opts))
}

/// Async variant of [`serve`] for callers that already run a tokio runtime.
pub async fn serve_async(opts: ServeOpts) -> ServeResult<()> {
    let result = async {
        let plugin = RunningPlugin::start(opts, |key| std::env::var(key).ok()).await?;
        plugin.announce(&mut std::io::stdout())?;
        plugin.wait().await
    }
    .await;

    if let Err(ref e) = result {
        // Startup may fail before the configured subscriber is installed
        logging::init_logging("info");
        error!("Plugin server failed: {}", e);
    }
    result
}

/// A plugin whose listener is bound and answering requests.
pub struct RunningPlugin {
    handshake: Handshake,
    addr: SocketAddr,
    handle: ServerHandle,
    provider: Arc<dyn Provider>,
    shutdown_rx: watch::Receiver<bool>,
    signals: Signals,
}

impl RunningPlugin {
    /// Perform every startup step up to, but not including, the handshake
    /// announcement.
    ///
    /// `lookup` resolves environment variables.
    pub async fn start<F>(opts: ServeOpts, lookup: F) -> ServeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let handshake = Handshake::negotiate(&opts.app_protocol_versions, &lookup)?;

        let mut config = match opts.config {
            Some(config) => config,
            None => ServeConfig::load_default()?,
        };
        config.apply_env(&lookup)?;

        logging::init_logging(&config.log_level);
        info!("Starting plinth plugin server v{}", env!("CARGO_PKG_VERSION"));
        debug!(
            "Negotiated protocol core={} app={}",
            handshake.core_version, handshake.app_version
        );

        let provider: Arc<dyn Provider> = Arc::from((opts.provider_func)());
        provider
            .schema()
            .internal_validate()
            .map_err(ServeError::InvalidProvider)?;
        info!("Serving provider: {}", provider.name());

        let server = bind(&config).await?;
        let addr = server.local_addr()?;

        let signals = Signals::install()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let service = PluginService::new(Arc::clone(&provider), shutdown_tx);
        let handle = server.start(service.into_rpc());

        info!("Plugin RPC server listening on {}", addr);

        Ok(Self {
            handshake,
            addr,
            handle,
            provider,
            shutdown_rx,
            signals,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn handshake(&self) -> Handshake {
        self.handshake
    }

    pub fn handshake_line(&self) -> String {
        self.handshake.line(self.addr)
    }

    /// Write the handshake line so the host can connect.
    pub fn announce<W: Write>(&self, out: &mut W) -> ServeResult<()> {
        writeln!(out, "{}", self.handshake_line())?;
        out.flush()?;
        Ok(())
    }

    /// Block until the host asks the plugin to shut down or the process is
    /// interrupted or terminated, then stop the server and the provider.
    pub async fn wait(self) -> ServeResult<()> {
        let Self {
            handle,
            provider,
            mut shutdown_rx,
            mut signals,
            ..
        } = self;

        tokio::select! {
            _ = async {
                let _ = shutdown_rx.wait_for(|requested| *requested).await;
            } => {
                info!("Host requested shutdown");
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            }
            name = signals.recv() => info!("Received {}, shutting down", name),
            _ = handle.clone().stopped() => info!("RPC server stopped"),
        }

        if handle.stop().is_err() {
            debug!("RPC server already stopped");
        }
        handle.stopped().await;

        if let Err(e) = provider.stop().await {
            warn!("Provider stop failed: {}", e);
        }

        info!("Plugin server stopped");
        Ok(())
    }
}

/// Process signals that end the serve loop.
///
/// Handlers are registered at startup so a signal sent right after the
/// handshake line is not lost.
struct Signals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn install() -> ServeResult<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> ServeResult<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    }
}

/// Bind the first free port in the configured range on localhost.
async fn bind(config: &ServeConfig) -> ServeResult<Server> {
    for port in config.min_port..=config.max_port {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match Server::builder().build(addr).await {
            Ok(server) => return Ok(server),
            Err(e) => debug!("Port {} unavailable: {}", port, e),
        }
    }

    Err(ServeError::Bind {
        min: config.min_port,
        max: config.max_port,
    })
}
