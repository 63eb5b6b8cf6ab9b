//! rtmp-relay: configurable RTMP/FLV relay
//!
//! A relay is a supervision tree built from configuration:
//!
//! ```text
//! Relay ─┬─ Server[0] ─┬─ Endpoint[0] ─┬─ Connection[0]  host, input   (publisher pushes here)
//!        │             │               ├─ Connection[1]  client, output (dials a CDN)
//!        │             │               └─ Connection[2]  client, output
//!        │             └─ Endpoint[1] ── ...
//!        └─ Server[1] ── ...
//! ```
//!
//! Every connection reconnects on its own after failures, within its retry
//! budget. Frames read by source connections are fanned out, through the
//! endpoint's filter, to a bounded queue per sink connection. A slow sink only
//! ever loses its own oldest frames.
//!
//! One cancellation token, owned by the [`Relay`], reaches every component.
//!
//! # Example
//!
//! ```no_run
//! use rtmp_relay::{Config, Relay};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("relay.yaml".as_ref())?;
//!     let relay = Relay::new(config)?;
//!
//!     let signal = CancellationToken::new();
//!     relay.run(signal).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod media;
pub mod relay;
pub mod server;
pub mod stats;
pub mod status;
pub mod transport;

mod shutdown;

pub use config::{
    AddressConfig, CodecKind, Config, ConnectionConfig, ConnectionRole, Direction, EndpointConfig,
    ListenMode, ReconnectPolicy, ServerConfig,
};
pub use connection::{Connection, ConnectionState};
pub use endpoint::Endpoint;
pub use error::{ConfigError, ConnectionError, RelayError, Result};
pub use event::{
    ChannelObserver, ComponentPath, EventKind, EventLog, LifecycleEvent, Observer,
    TracingObserver,
};
pub use media::{Frame, FrameTag};
pub use relay::{Relay, RelayBuilder};
pub use server::Server;
pub use status::RelayStatus;
pub use transport::{TcpTransport, Transport};
