//! Host handshake.
//!
//! The host launches the plugin binary with a few environment variables set.
//! The plugin checks the magic cookie, agrees on an application protocol
//! version, and announces where it is listening with a single line on stdout:
//!
//! ```text
//! CORE-VERSION|APP-VERSION|NETWORK|ADDRESS|PROTOCOL
//! 1|1|tcp|127.0.0.1:10000|jsonrpc
//! ```

use std::net::SocketAddr;
use thiserror::Error;

/// Version of the handshake line format itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "PLINTH_PLUGIN_MAGIC_COOKIE";

/// Value the host must set [`MAGIC_COOKIE_KEY`] to.
pub const MAGIC_COOKIE_VALUE: &str =
    "7c1a9b0e5d3f4e2a8b6c0d9e1f2a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c";

/// Comma-separated list of app protocol versions the host speaks.
pub const ENV_PROTOCOL_VERSIONS: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Lower bound of the port range the plugin may listen on.
pub const ENV_MIN_PORT: &str = "PLUGIN_MIN_PORT";

/// Upper bound of the port range the plugin may listen on.
pub const ENV_MAX_PORT: &str = "PLUGIN_MAX_PORT";

/// Wire protocol spoken on the announced address.
pub const WIRE_PROTOCOL: &str = "jsonrpc";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error(
        "This binary is a plugin. These are not meant to be executed directly. \
         Please execute the program that consumes these plugins, which will \
         load any plugins automatically"
    )]
    MissingCookie,

    #[error("Invalid protocol version {0:?} in PLUGIN_PROTOCOL_VERSIONS")]
    InvalidProtocolVersion(String),

    #[error("No supported app protocol versions configured")]
    NoSupportedVersions,

    #[error(
        "Incompatible plugin protocol: host supports {host:?}, plugin supports {plugin:?}"
    )]
    NoCommonVersion { host: Vec<u32>, plugin: Vec<u32> },
}

/// Outcome of a successful handshake negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub app_version: u32,
}

impl Handshake {
    /// Negotiate with the host.
    ///
    /// `lookup` resolves environment variables; pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn negotiate<F>(supported: &[u32], lookup: F) -> Result<Self, HandshakeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(MAGIC_COOKIE_KEY) {
            Some(cookie) if cookie == MAGIC_COOKIE_VALUE => {}
            _ => return Err(HandshakeError::MissingCookie),
        }

        let plugin_max = supported
            .iter()
            .copied()
            .max()
            .ok_or(HandshakeError::NoSupportedVersions)?;

        let app_version = match lookup(ENV_PROTOCOL_VERSIONS) {
            Some(raw) if !raw.trim().is_empty() => {
                let host = parse_versions(&raw)?;
                host.iter()
                    .copied()
                    .filter(|v| supported.contains(v))
                    .max()
                    .ok_or_else(|| HandshakeError::NoCommonVersion {
                        host,
                        plugin: supported.to_vec(),
                    })?
            }
            _ => plugin_max,
        };

        Ok(Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
        })
    }

    /// The line written to stdout once the listener is bound.
    pub fn line(&self, addr: SocketAddr) -> String {
        format!(
            "{}|{}|tcp|{}|{}",
            self.core_version, self.app_version, addr, WIRE_PROTOCOL
        )
    }
}

fn parse_versions(raw: &str) -> Result<Vec<u32>, HandshakeError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| HandshakeError::InvalidProtocolVersion(s.to_string()))
        })
        .collect()
}
