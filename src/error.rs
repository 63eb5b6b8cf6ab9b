//! Error types
//!
//! Connection-level failures are recovered by the connection state machine and
//! only ever leave it as lifecycle events. Configuration errors are the only
//! errors fatal to the whole relay, and only while the tree is being built.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `Relay::run` was called while (or after) the relay was running
    #[error("relay is already running")]
    AlreadyRunning,

    /// One or more connections of an endpoint terminated with a failure
    #[error("endpoint {path}: {failures} connection(s) terminated with failure")]
    EndpointFailed { path: String, failures: usize },

    /// One or more endpoints of a server reported a failure
    #[error("server {path}: {failures} endpoint(s) failed")]
    ServerFailed { path: String, failures: usize },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    /// Failed to parse configuration file
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Failed to parse an in-memory configuration document
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration parsed but describes a tree that cannot be built
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of a single connection
///
/// Cheap to clone so the same error can be carried by lifecycle events and
/// returned from `Connection::run`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// Dial, bind or accept failed
    #[error("failed to establish link with {address}: {source}")]
    Establish {
        address: String,
        source: Arc<io::Error>,
    },

    /// Dial did not complete within the connection timeout
    #[error("timed out after {timeout:?} establishing link with {address}")]
    EstablishTimeout { address: String, timeout: Duration },

    /// Read or write failed on an established link
    #[error("link with {address} failed: {source}")]
    Link {
        address: String,
        source: Arc<io::Error>,
    },

    /// The peer closed an established link
    #[error("peer {address} closed the link")]
    PeerClosed { address: String },

    /// The peer sent a byte stream the configured codec cannot frame
    #[error("malformed stream from {address}: {reason}")]
    Codec { address: String, reason: String },

    /// The reconnect budget ran out; terminal for the connection
    #[error("giving up on {address} after {attempts} reconnect attempt(s)")]
    ReconnectBudgetExhausted { address: String, attempts: u32 },
}

impl ConnectionError {
    pub(crate) fn establish(address: &str, source: io::Error) -> Self {
        ConnectionError::Establish {
            address: address.to_string(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn link(address: &str, source: io::Error) -> Self {
        ConnectionError::Link {
            address: address.to_string(),
            source: Arc::new(source),
        }
    }

    /// Whether this is a failure to set up a link (dial, bind, accept, timeout)
    pub fn is_establish_failure(&self) -> bool {
        matches!(
            self,
            ConnectionError::Establish { .. } | ConnectionError::EstablishTimeout { .. }
        )
    }

    /// Whether this is a failure of an already established link
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ConnectionError::Link { .. }
                | ConnectionError::PeerClosed { .. }
                | ConnectionError::Codec { .. }
        )
    }

    /// Whether the connection gave up for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionError::ReconnectBudgetExhausted { .. })
    }
}
