//! # plinth-plugin
//!
//! Plugin serving library for Plinth providers.
//!
//! A provider binary hands a provider factory to [`serve`] and lets this crate
//! run the rest of the process:
//!
//! ```no_run
//! use plinth_plugin::{provider_func, serve, ServeOpts};
//! # use plinth_plugin::Provider;
//! # fn make() -> Box<dyn Provider> { unimplemented!() }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     serve(ServeOpts::new(provider_func(make)))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! 1. Check the host's magic cookie and negotiate a protocol version.
//! 2. Load [`ServeConfig`] and install logging (stderr only).
//! 3. Call the factory once and validate the provider's schema.
//! 4. Bind a JSON-RPC listener on localhost and print the handshake line.
//! 5. Answer host requests until `plugin.shutdown`, SIGINT or SIGTERM.
//!
//! Failures in steps 1-4 are returned from [`serve`] and are fatal.

pub mod config;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod rpc;
pub mod server;

pub use config::ServeConfig;
pub use error::{ServeError, ServeResult};
pub use handshake::{Handshake, HandshakeError, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};
pub use server::{serve, serve_async, RunningPlugin, ServeOpts, DEFAULT_APP_PROTOCOL_VERSION};

pub use plinth_provider_core::{provider_func, Provider, ProviderFunc};
