//! Endpoint
//!
//! Groups the connections of one application/stream scope and relays frames
//! between them:
//!
//! ```text
//!   source connection ──┐                 ┌──> SinkQueue ──> sink connection
//!                       ├──> FanOut ──────┼──> SinkQueue ──> sink connection
//!   source connection ──┘  (filter)       └──> SinkQueue ──> sink connection
//! ```

mod fanout;
mod filter;
mod queue;

pub use fanout::{Delivery, FanOut};
pub use filter::StreamFilter;
pub use queue::SinkQueue;

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Direction, EndpointConfig};
use crate::connection::{Connection, RelayPath};
use crate::error::{RelayError, Result};
use crate::event::{ComponentPath, EventKind, LifecycleEvent, Observer};
use crate::status::EndpointStatus;
use crate::transport::Transport;

/// A group of connections sharing one relay scope
pub struct Endpoint {
    path: ComponentPath,
    application_name: String,
    stream_name: String,
    fanout: Arc<FanOut>,
    connections: Vec<Arc<Connection>>,
    observer: Arc<dyn Observer>,
}

impl Endpoint {
    pub(crate) fn new(
        parent: &ComponentPath,
        index: usize,
        config: &EndpointConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let path = if config.application_name.is_empty() && config.stream_name.is_empty() {
            parent.child(format!("endpoint[{index}]"))
        } else {
            parent.child(format!(
                "endpoint[{index}:{}/{}]",
                config.application_name, config.stream_name
            ))
        };
        let connection_configs = config.connections();

        // One queue per sink, created before the fan-out that feeds them
        let queues: Vec<Option<Arc<SinkQueue>>> = connection_configs
            .iter()
            .map(|c| match c.direction {
                Direction::Output => Some(Arc::new(SinkQueue::new(config.queue_capacity))),
                Direction::Input => None,
            })
            .collect();

        let fanout = Arc::new(FanOut::new(
            StreamFilter::from_config(config),
            queues.iter().flatten().cloned().collect(),
        ));

        let connections = connection_configs
            .into_iter()
            .zip(queues)
            .map(|(connection_config, queue)| {
                let relay_path = match queue {
                    Some(queue) => RelayPath::Deliver(queue),
                    None => RelayPath::Publish(Arc::clone(&fanout)),
                };
                Arc::new(Connection::new(
                    &path,
                    connection_config,
                    relay_path,
                    Arc::clone(&transport),
                    Arc::clone(&observer),
                ))
            })
            .collect();

        Self {
            path,
            application_name: config.application_name.clone(),
            stream_name: config.stream_name.clone(),
            fanout,
            connections,
            observer,
        }
    }

    /// Run every connection until all of them have closed
    ///
    /// A connection that gives up does not affect its siblings. Returns
    /// `EndpointFailed` if any connection terminated with a failure.
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        self.emit(EventKind::Started);
        tracing::debug!(
            path = %self.path,
            connections = self.connections.len(),
            sinks = self.fanout.sink_count(),
            "Starting endpoint"
        );

        let mut tasks = JoinSet::new();
        for connection in &self.connections {
            let connection = Arc::clone(connection);
            let ctx = ctx.clone();
            tasks.spawn(async move { connection.run(ctx).await });
        }

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %self.path, error = %e, "Connection terminated");
                    failures += 1;
                }
                Err(e) => {
                    tracing::error!(path = %self.path, error = %e, "Connection task panicked");
                    failures += 1;
                }
            }
        }

        self.fanout.close();

        let result = if failures == 0 {
            Ok(())
        } else {
            Err(RelayError::EndpointFailed {
                path: self.path.to_string(),
                failures,
            })
        };

        self.emit(EventKind::Stopped {
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// Stop relaying, then close every connection; idempotent
    pub fn close(&self) {
        self.fanout.close();
        for connection in &self.connections {
            connection.close();
        }
    }

    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            path: self.path.to_string(),
            application_name: self.application_name.clone(),
            stream_name: self.stream_name.clone(),
            connections: self.connections.iter().map(|c| c.status()).collect(),
        }
    }

    fn emit(&self, kind: EventKind) {
        self.observer
            .on_event(LifecycleEvent::new(self.path.clone(), kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{AddressConfig, ConnectionRole};
    use crate::connection::ConnectionState;
    use crate::event::EventLog;
    use crate::transport::TcpTransport;

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn endpoint(config: &EndpointConfig, log: &Arc<EventLog>) -> Arc<Endpoint> {
        Arc::new(Endpoint::new(
            &ComponentPath::root(),
            0,
            config,
            Arc::new(TcpTransport::new()),
            log.clone(),
        ))
    }

    #[test]
    fn test_wiring() {
        let config = EndpointConfig::new(ConnectionRole::Host, Direction::Input, ["127.0.0.1:0"])
            .stream("live", "main")
            .address(AddressConfig::with_overrides(
                "127.0.0.1:1",
                ConnectionRole::Client,
                Direction::Output,
            ))
            .address(AddressConfig::with_overrides(
                "127.0.0.1:2",
                ConnectionRole::Client,
                Direction::Output,
            ));
        let log = Arc::new(EventLog::new());
        let endpoint = endpoint(&config, &log);

        assert_eq!(endpoint.path().as_str(), "relay/endpoint[0:live/main]");
        assert_eq!(endpoint.connections().len(), 3);
        assert_eq!(endpoint.fanout.sink_count(), 2);
        assert_eq!(
            endpoint.connections()[1].path().as_str(),
            "relay/endpoint[0:live/main]/connection[1:127.0.0.1:1]"
        );

        let status = endpoint.status();
        assert_eq!(status.connections.len(), 3);
        assert!(status.connections.iter().all(|c| c.state == ConnectionState::Idle));
    }

    #[tokio::test]
    async fn test_failed_connection_reported_siblings_unaffected() {
        let port = unused_port();
        let config = EndpointConfig::new(ConnectionRole::Host, Direction::Input, ["127.0.0.1:0"])
            .address(AddressConfig::with_overrides(
                format!("127.0.0.1:{port}"),
                ConnectionRole::Client,
                Direction::Output,
            ))
            .reconnect_count(2)
            .reconnect_interval(Duration::from_millis(5));
        let log = Arc::new(EventLog::new());
        let endpoint = endpoint(&config, &log);
        let ctx = CancellationToken::new();

        let handle = tokio::spawn({
            let endpoint = Arc::clone(&endpoint);
            let ctx = ctx.clone();
            async move { endpoint.run(ctx).await }
        });

        // The unreachable client gives up; the host keeps listening
        let client = Arc::clone(&endpoint.connections()[1]);
        let mut states = client.subscribe();
        tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| s.is_closed()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint.connections()[0].state(), ConnectionState::Establishing);

        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            result,
            Err(RelayError::EndpointFailed { failures: 1, .. })
        ));
        assert!(endpoint.fanout.is_closed());
        assert!(log.stopped().contains(endpoint.path()));
    }

    #[tokio::test]
    async fn test_close_stops_all_connections() {
        let config = EndpointConfig::new(
            ConnectionRole::Host,
            Direction::Input,
            ["127.0.0.1:0", "127.0.0.1:0"],
        );
        let log = Arc::new(EventLog::new());
        let endpoint = endpoint(&config, &log);

        let handle = tokio::spawn({
            let endpoint = Arc::clone(&endpoint);
            async move { endpoint.run(CancellationToken::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        endpoint.close();
        endpoint.close();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(endpoint
            .connections()
            .iter()
            .all(|c| c.state() == ConnectionState::Closed));
    }
}
