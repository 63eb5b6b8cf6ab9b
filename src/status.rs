//! Point-in-time view of the relay tree
//!
//! Serializable so an external status page can render it as-is.

use serde::Serialize;

use crate::config::{ConnectionRole, Direction};
use crate::connection::ConnectionState;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub running: bool,
    pub servers: Vec<ServerStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub path: String,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub path: String,
    pub application_name: String,
    pub stream_name: String,
    pub connections: Vec<ConnectionStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub path: String,
    pub address: String,
    pub role: ConnectionRole,
    pub direction: Direction,
    pub state: ConnectionState,
    /// Reconnect attempts consumed since the last established link
    pub attempt: u32,
    pub last_error: Option<String>,
    /// Bound listener address (host connections)
    pub local_addr: Option<String>,
    /// Frames dropped by this connection's sink queue (sinks only)
    pub dropped_frames: Option<u64>,
    pub stats: StatsSnapshot,
}

impl RelayStatus {
    /// All connection statuses, flattened in tree order
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionStatus> {
        self.servers
            .iter()
            .flat_map(|s| s.endpoints.iter())
            .flat_map(|e| e.connections.iter())
    }
}
