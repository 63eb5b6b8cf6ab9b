//! Relay configuration
//!
//! The configuration tree is loaded from YAML and is never mutated once the
//! relay tree has been built from it. Every endpoint expands into one
//! [`ConnectionConfig`] per address.
//!
//! ```yaml
//! log:
//!   level: 3
//! servers:
//!   - endpoints:
//!       - applicationName: live
//!         streamName: main
//!         role: host
//!         direction: input
//!         addresses: ["0.0.0.0:1935"]
//!       - applicationName: live
//!         streamName: main
//!         role: client
//!         direction: output
//!         addresses: ["cdn.example.com:1935"]
//!         video: true
//!         reconnectCount: 10
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Status page configuration (served by an external collaborator)
    pub status_page: StatusPageConfig,

    /// Stop the relay after this many seconds (runs until signalled when unset)
    pub timeout: Option<f32>,

    /// Servers, each a scope of endpoints
    pub servers: Vec<ServerConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// 0 = off, 1 = error, 2 = warn, 3 = info, 4 = debug, 5+ = trace
    pub level: u32,

    /// Syslog identity (used by the process-level log sink)
    pub syslog_ident: Option<String>,

    /// Syslog facility (used by the process-level log sink)
    pub syslog_facility: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: 3,
            syslog_ident: None,
            syslog_facility: None,
        }
    }
}

impl LogConfig {
    /// Map the numeric level onto a tracing filter
    pub fn level_filter(&self) -> LevelFilter {
        match self.level {
            0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Status page configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusPageConfig {
    /// Address the status page listens on
    pub address: Option<String>,
}

/// One server scope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Endpoints declared under this server
    pub endpoints: Vec<EndpointConfig>,
}

impl ServerConfig {
    /// Create a server scope with the given endpoints
    pub fn new(endpoints: Vec<EndpointConfig>) -> Self {
        Self { endpoints }
    }
}

/// Whether a connection accepts or dials its link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Listen and accept one peer per link
    Host,
    /// Dial the address
    Client,
}

/// Which way payloads flow through a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The peer publishes into the relay (source)
    Input,
    /// The relay delivers to the peer (sink)
    Output,
}

/// What a host connection does after its peer disconnects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListenMode {
    /// Keep the listener and accept the next peer
    #[default]
    Persistent,
    /// Close the connection once the first peer is gone
    SingleShot,
}

/// How the byte stream of a link is cut into frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Every read is one untagged frame; pure byte relay
    #[default]
    Raw,
    /// FLV tags, tagged audio/video/data
    Flv,
}

/// AMF encoding used by the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32")]
pub enum AmfVersion {
    Amf0,
    Amf3,
}

impl TryFrom<u32> for AmfVersion {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AmfVersion::Amf0),
            3 => Ok(AmfVersion::Amf3),
            other => Err(format!("unsupported AMF version {other}, expected 0 or 3")),
        }
    }
}

/// Retry policy after a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconnectPolicy {
    /// Keep trying until cancelled
    Unlimited,
    /// Give up after this many consecutive reconnect attempts
    Bounded(u32),
}

impl ReconnectPolicy {
    /// Build from the configuration's literal count, where 0 means unlimited
    pub fn from_count(count: u32) -> Self {
        if count == 0 {
            ReconnectPolicy::Unlimited
        } else {
            ReconnectPolicy::Bounded(count)
        }
    }
}

/// One entry of an endpoint's address list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AddressConfig {
    /// `host:port`, using the endpoint's role and direction
    Plain(String),
    /// `host:port` with per-connection overrides
    Detailed {
        address: String,
        #[serde(default, alias = "type")]
        role: Option<ConnectionRole>,
        #[serde(default)]
        direction: Option<Direction>,
    },
}

impl AddressConfig {
    /// An address that overrides the endpoint's role and direction
    pub fn with_overrides(
        address: impl Into<String>,
        role: ConnectionRole,
        direction: Direction,
    ) -> Self {
        AddressConfig::Detailed {
            address: address.into(),
            role: Some(role),
            direction: Some(direction),
        }
    }

    /// The `host:port` string
    pub fn address(&self) -> &str {
        match self {
            AddressConfig::Plain(address) => address,
            AddressConfig::Detailed { address, .. } => address,
        }
    }
}

impl From<&str> for AddressConfig {
    fn from(address: &str) -> Self {
        AddressConfig::Plain(address.to_string())
    }
}

impl From<String> for AddressConfig {
    fn from(address: String) -> Self {
        AddressConfig::Plain(address)
    }
}

/// Endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Application name (e.g., "live")
    #[serde(default)]
    pub application_name: String,

    /// Stream name (e.g., "main")
    #[serde(default)]
    pub stream_name: String,

    /// Default role of the endpoint's connections
    #[serde(alias = "type")]
    pub role: ConnectionRole,

    /// Default direction of the endpoint's connections
    pub direction: Direction,

    /// One connection is created per address, in order
    #[serde(alias = "address", deserialize_with = "one_or_many")]
    pub addresses: Vec<AddressConfig>,

    /// Relay video frames
    #[serde(default = "default_true")]
    pub video: bool,

    /// Relay audio frames
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Relay data (metadata) frames
    #[serde(default = "default_true")]
    pub data: bool,

    /// Data frame keys that are never relayed
    #[serde(default, alias = "metaDataBlacklist")]
    pub metadata_blacklist: Vec<String>,

    /// Dial deadline in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: f32,

    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: f32,

    /// Maximum consecutive reconnect attempts (0 = unlimited)
    #[serde(default)]
    pub reconnect_count: u32,

    /// Keep-alive cadence for the protocol layer in seconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval: f32,

    /// Read buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,

    /// AMF version for the protocol layer (unset = protocol default)
    #[serde(default)]
    pub amf_version: Option<AmfVersion>,

    /// Behaviour of host connections after a peer disconnects
    #[serde(default)]
    pub listen_mode: ListenMode,

    /// Frames buffered per sink before the oldest is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How links are framed
    #[serde(default)]
    pub codec: CodecKind,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_connection_timeout() -> f32 {
    5.0
}

fn default_reconnect_interval() -> f32 {
    5.0
}

fn default_ping_interval() -> f32 {
    60.0
}

fn default_buffer_size() -> u32 {
    3000
}

fn default_queue_capacity() -> usize {
    512
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<AddressConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<AddressConfig>),
        One(AddressConfig),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(addresses) => addresses,
        OneOrMany::One(address) => vec![address],
    })
}

/// Seconds to `Duration`, saturating values out of range
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

fn representable(value: f32) -> bool {
    Duration::try_from_secs_f32(value).is_ok()
}

impl EndpointConfig {
    /// Create an endpoint with default options
    pub fn new(
        role: ConnectionRole,
        direction: Direction,
        addresses: impl IntoIterator<Item = impl Into<AddressConfig>>,
    ) -> Self {
        Self {
            application_name: String::new(),
            stream_name: String::new(),
            role,
            direction,
            addresses: addresses.into_iter().map(Into::into).collect(),
            video: true,
            audio: true,
            data: true,
            metadata_blacklist: Vec::new(),
            connection_timeout: default_connection_timeout(),
            reconnect_interval: default_reconnect_interval(),
            reconnect_count: 0,
            ping_interval: default_ping_interval(),
            buffer_size: default_buffer_size(),
            amf_version: None,
            listen_mode: ListenMode::default(),
            queue_capacity: default_queue_capacity(),
            codec: CodecKind::default(),
        }
    }

    /// Set the application and stream name
    pub fn stream(mut self, application: impl Into<String>, stream: impl Into<String>) -> Self {
        self.application_name = application.into();
        self.stream_name = stream.into();
        self
    }

    /// Append an address
    pub fn address(mut self, address: impl Into<AddressConfig>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Enable or disable video relaying
    pub fn video(mut self, enabled: bool) -> Self {
        self.video = enabled;
        self
    }

    /// Enable or disable audio relaying
    pub fn audio(mut self, enabled: bool) -> Self {
        self.audio = enabled;
        self
    }

    /// Enable or disable data relaying
    pub fn data(mut self, enabled: bool) -> Self {
        self.data = enabled;
        self
    }

    /// Never relay data frames with this key
    pub fn blacklist(mut self, key: impl Into<String>) -> Self {
        self.metadata_blacklist.push(key.into());
        self
    }

    /// Set the dial deadline
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout.as_secs_f32();
        self
    }

    /// Set the delay between reconnect attempts
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval.as_secs_f32();
        self
    }

    /// Set the reconnect budget (0 = unlimited)
    pub fn reconnect_count(mut self, count: u32) -> Self {
        self.reconnect_count = count;
        self
    }

    /// Set the read buffer size
    pub fn buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the per-sink queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the host listen mode
    pub fn listen_mode(mut self, mode: ListenMode) -> Self {
        self.listen_mode = mode;
        self
    }

    /// Set the link codec
    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// The retry policy described by `reconnect_count`
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::from_count(self.reconnect_count)
    }

    /// Expand into one connection configuration per address
    pub fn connections(&self) -> Vec<ConnectionConfig> {
        self.addresses
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let (role, direction) = match entry {
                    AddressConfig::Plain(_) => (self.role, self.direction),
                    AddressConfig::Detailed {
                        role, direction, ..
                    } => (role.unwrap_or(self.role), direction.unwrap_or(self.direction)),
                };

                ConnectionConfig {
                    index,
                    address: entry.address().to_string(),
                    role,
                    direction,
                    connection_timeout: secs(self.connection_timeout),
                    reconnect_interval: secs(self.reconnect_interval),
                    reconnect: self.reconnect_policy(),
                    ping_interval: secs(self.ping_interval),
                    buffer_size: self.buffer_size as usize,
                    amf_version: self.amf_version,
                    listen_mode: self.listen_mode,
                    codec: self.codec,
                }
            })
            .collect()
    }

    /// Check the endpoint can be turned into running connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.display_name();

        if self.addresses.is_empty() {
            return Err(ConfigError::Invalid(format!("endpoint {name} has no addresses")));
        }
        if self.addresses.iter().any(|a| a.address().trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("endpoint {name} has an empty address")));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid(format!("endpoint {name}: bufferSize must be positive")));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(format!(
                "endpoint {name}: queueCapacity must be positive"
            )));
        }
        if !(representable(self.connection_timeout) && self.connection_timeout > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "endpoint {name}: connectionTimeout must be a positive number of seconds"
            )));
        }
        for (field, value) in [
            ("reconnectInterval", self.reconnect_interval),
            ("pingInterval", self.ping_interval),
        ] {
            if !(representable(value) && value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {name}: {field} must be a non-negative number of seconds"
                )));
            }
        }

        Ok(())
    }

    fn display_name(&self) -> String {
        if self.application_name.is_empty() && self.stream_name.is_empty() {
            format!("at {}", self.addresses.first().map(AddressConfig::address).unwrap_or("?"))
        } else {
            format!("{}/{}", self.application_name, self.stream_name)
        }
    }
}

/// Fully resolved settings of one connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Position in the endpoint's address list
    pub index: usize,
    /// `host:port` to bind or dial
    pub address: String,
    pub role: ConnectionRole,
    pub direction: Direction,
    /// Dial deadline
    pub connection_timeout: Duration,
    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Carried for the protocol layer
    pub ping_interval: Duration,
    /// Read buffer size in bytes
    pub buffer_size: usize,
    /// Carried for the protocol layer
    pub amf_version: Option<AmfVersion>,
    pub listen_mode: ListenMode,
    pub codec: CodecKind,
}

impl Config {
    /// Create a configuration with the given servers and default everything else
    pub fn with_servers(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    /// Load and validate configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or describes an
    /// invalid relay tree.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The relay-wide run limit, if any
    pub fn run_timeout(&self) -> Option<Duration> {
        self.timeout.map(secs)
    }

    /// Check every endpoint, and that no two host connections share a listen address
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(timeout) = self.timeout {
            if !(representable(timeout) && timeout > 0.0) {
                return Err(ConfigError::Invalid(
                    "timeout must be a positive number of seconds".into(),
                ));
            }
        }

        let mut listen_addresses = HashSet::new();

        for (server_index, server) in self.servers.iter().enumerate() {
            for endpoint in &server.endpoints {
                endpoint.validate()?;

                for connection in endpoint.connections() {
                    if connection.role != ConnectionRole::Host {
                        continue;
                    }
                    let key = ListenKey::from(connection.address.as_str());
                    if key.is_ephemeral() {
                        continue;
                    }
                    if !listen_addresses.insert(key) {
                        return Err(ConfigError::Invalid(format!(
                            "server {server_index}: {} is listened on by more than one host connection",
                            connection.address
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Normalised listen address, used to spot duplicate host bindings
#[derive(Debug, PartialEq, Eq, Hash)]
enum ListenKey {
    Socket(SocketAddr),
    Name(String),
}

impl ListenKey {
    fn is_ephemeral(&self) -> bool {
        matches!(self, ListenKey::Socket(addr) if addr.port() == 0)
    }
}

impl From<&str> for ListenKey {
    fn from(address: &str) -> Self {
        match address.parse::<SocketAddr>() {
            Ok(addr) => ListenKey::Socket(addr),
            Err(_) => ListenKey::Name(address.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionRole::Host => write!(f, "host"),
            ConnectionRole::Client => write!(f, "client"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
servers:
  - endpoints:
      - applicationName: live
        streamName: main
        role: host
        direction: input
        addresses: ["127.0.0.1:1935"]
"#;

    #[test]
    fn test_endpoint_defaults() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();
        let endpoint = &config.servers[0].endpoints[0];

        assert!(endpoint.video);
        assert!(endpoint.audio);
        assert!(endpoint.data);
        assert_eq!(endpoint.connection_timeout, 5.0);
        assert_eq!(endpoint.reconnect_interval, 5.0);
        assert_eq!(endpoint.reconnect_count, 0);
        assert_eq!(endpoint.ping_interval, 60.0);
        assert_eq!(endpoint.buffer_size, 3000);
        assert_eq!(endpoint.amf_version, None);
        assert_eq!(endpoint.listen_mode, ListenMode::Persistent);
        assert_eq!(endpoint.codec, CodecKind::Raw);
        assert_eq!(endpoint.reconnect_policy(), ReconnectPolicy::Unlimited);
    }

    #[test]
    fn test_root_defaults() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.log.level, 3);
        assert_eq!(config.log.level_filter(), LevelFilter::INFO);
        assert!(config.status_page.address.is_none());
        assert!(config.run_timeout().is_none());
    }

    #[test]
    fn test_original_key_aliases() {
        let yaml = r#"
log:
  level: 4
  syslogIdent: rtmp_relay
statusPage:
  address: "0.0.0.0:8080"
timeout: 30
servers:
  - endpoints:
      - type: client
        direction: output
        address: "10.0.0.1:1935"
        metaDataBlacklist: [onCuePoint]
        amfVersion: 3
        reconnectCount: 4
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let endpoint = &config.servers[0].endpoints[0];

        assert_eq!(config.log.level_filter(), LevelFilter::DEBUG);
        assert_eq!(config.log.syslog_ident.as_deref(), Some("rtmp_relay"));
        assert_eq!(config.status_page.address.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(endpoint.role, ConnectionRole::Client);
        assert_eq!(endpoint.addresses, vec![AddressConfig::from("10.0.0.1:1935")]);
        assert_eq!(endpoint.metadata_blacklist, vec!["onCuePoint".to_string()]);
        assert_eq!(endpoint.amf_version, Some(AmfVersion::Amf3));
        assert_eq!(endpoint.reconnect_policy(), ReconnectPolicy::Bounded(4));
    }

    #[test]
    fn test_invalid_amf_version_rejected() {
        let yaml = r#"
servers:
  - endpoints:
      - role: host
        direction: input
        addresses: ["127.0.0.1:1935"]
        amfVersion: 2
"#;
        assert!(matches!(Config::from_yaml_str(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_role_rejected() {
        let yaml = r#"
servers:
  - endpoints:
      - direction: input
        addresses: ["127.0.0.1:1935"]
"#;
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_per_address_overrides() {
        let yaml = r#"
servers:
  - endpoints:
      - role: host
        direction: input
        codec: flv
        listenMode: singleShot
        addresses:
          - "127.0.0.1:1935"
          - address: "127.0.0.1:1936"
            role: client
            direction: output
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let connections = config.servers[0].endpoints[0].connections();

        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].role, ConnectionRole::Host);
        assert_eq!(connections[0].direction, Direction::Input);
        assert_eq!(connections[0].listen_mode, ListenMode::SingleShot);
        assert_eq!(connections[0].codec, CodecKind::Flv);
        assert_eq!(connections[1].index, 1);
        assert_eq!(connections[1].address, "127.0.0.1:1936");
        assert_eq!(connections[1].role, ConnectionRole::Client);
        assert_eq!(connections[1].direction, Direction::Output);
    }

    #[test]
    fn test_connection_durations() {
        let endpoint = EndpointConfig::new(ConnectionRole::Client, Direction::Output, ["a:1"])
            .connection_timeout(Duration::from_secs(1))
            .reconnect_interval(Duration::from_millis(250))
            .reconnect_count(3)
            .buffer_size(4096);

        let connection = &endpoint.connections()[0];
        assert_eq!(connection.connection_timeout, Duration::from_secs(1));
        assert_eq!(connection.reconnect_interval, Duration::from_millis(250));
        assert_eq!(connection.reconnect, ReconnectPolicy::Bounded(3));
        assert_eq!(connection.buffer_size, 4096);
        assert_eq!(connection.ping_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let base = || EndpointConfig::new(ConnectionRole::Client, Direction::Output, ["a:1"]);

        let no_addresses =
            EndpointConfig::new(ConnectionRole::Client, Direction::Output, Vec::<String>::new());
        assert!(no_addresses.validate().is_err());
        assert!(base().address("  ").validate().is_err());
        assert!(base().buffer_size(0).validate().is_err());
        assert!(base().queue_capacity(0).validate().is_err());

        let mut negative = base();
        negative.reconnect_interval = -1.0;
        assert!(negative.validate().is_err());

        let mut zero_timeout = base();
        zero_timeout.connection_timeout = 0.0;
        assert!(zero_timeout.validate().is_err());

        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let endpoint = || EndpointConfig::new(ConnectionRole::Client, Direction::Output, ["a:1"]);

        let mut huge_timeout = endpoint();
        huge_timeout.connection_timeout = 1e30;
        assert!(matches!(huge_timeout.validate(), Err(ConfigError::Invalid(_))));

        let mut huge_interval = endpoint();
        huge_interval.reconnect_interval = 1e30;
        assert!(matches!(huge_interval.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::with_servers(vec![ServerConfig::new(vec![endpoint()])]);
        config.timeout = Some(1e30);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        // Unvalidated configs never collapse to an instant timeout
        assert_eq!(config.run_timeout(), Some(Duration::MAX));
        assert_eq!(huge_timeout.connections()[0].connection_timeout, Duration::MAX);
    }

    #[test]
    fn test_validate_duplicate_listen_address() {
        let host = |address: &str| {
            EndpointConfig::new(ConnectionRole::Host, Direction::Input, [address])
        };

        let duplicate = Config::with_servers(vec![
            ServerConfig::new(vec![host("0.0.0.0:1935")]),
            ServerConfig::new(vec![host("0.0.0.0:1935")]),
        ]);
        assert!(matches!(duplicate.validate(), Err(ConfigError::Invalid(_))));

        let ephemeral = Config::with_servers(vec![ServerConfig::new(vec![
            host("127.0.0.1:0"),
            host("127.0.0.1:0"),
        ])]);
        assert!(ephemeral.validate().is_ok());
    }

    #[test]
    fn test_unresolvable_address_is_not_a_config_error() {
        let config = Config::with_servers(vec![ServerConfig::new(vec![EndpointConfig::new(
            ConnectionRole::Client,
            Direction::Output,
            ["not an address"],
        )])]);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/relay.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
