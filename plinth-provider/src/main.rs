//! # plinth-provider
//!
//! Provider plugin binary. The host launches this process; everything after
//! start-up (handshake, RPC dispatch, shutdown) belongs to `plinth-plugin`.
//!
//! ## Running
//!
//! The binary refuses to start unless the host's magic cookie is present:
//!
//! ```bash
//! PLINTH_PLUGIN_MAGIC_COOKIE=<cookie> PLINTH_LOG=debug cargo run --bin plinth-provider
//! ```

use plinth_plugin::{provider_func, serve, ServeOpts};
use provider_local::LocalProvider;

fn main() -> anyhow::Result<()> {
    serve(ServeOpts::new(provider_func(|| Box::new(LocalProvider::new()))))?;
    Ok(())
}
