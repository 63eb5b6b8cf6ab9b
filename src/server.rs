//! Server
//!
//! A scope of endpoints. Runs them side by side and reports the ones that
//! fail without stopping the others.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::error::{RelayError, Result};
use crate::event::{ComponentPath, EventKind, LifecycleEvent, Observer};
use crate::status::ServerStatus;
use crate::transport::Transport;

pub struct Server {
    path: ComponentPath,
    endpoints: Vec<Arc<Endpoint>>,
    observer: Arc<dyn Observer>,
}

impl Server {
    pub(crate) fn new(
        parent: &ComponentPath,
        index: usize,
        config: &ServerConfig,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let path = parent.child(format!("server[{index}]"));
        let endpoints = config
            .endpoints
            .iter()
            .enumerate()
            .map(|(i, endpoint)| {
                Arc::new(Endpoint::new(
                    &path,
                    i,
                    endpoint,
                    Arc::clone(&transport),
                    Arc::clone(&observer),
                ))
            })
            .collect();

        Self {
            path,
            endpoints,
            observer,
        }
    }

    /// Run every endpoint until all of them have finished
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        self.emit(EventKind::Started);
        tracing::info!(path = %self.path, endpoints = self.endpoints.len(), "Server starting");

        let mut tasks = JoinSet::new();
        for endpoint in &self.endpoints {
            let endpoint = Arc::clone(endpoint);
            let ctx = ctx.clone();
            tasks.spawn(async move { endpoint.run(ctx).await });
        }

        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %self.path, error = %e, "Endpoint failed");
                    failures += 1;
                }
                Err(e) => {
                    tracing::error!(path = %self.path, error = %e, "Endpoint task panicked");
                    failures += 1;
                }
            }
        }

        let result = if failures == 0 {
            Ok(())
        } else {
            Err(RelayError::ServerFailed {
                path: self.path.to_string(),
                failures,
            })
        };

        tracing::info!(path = %self.path, failures, "Server stopped");
        self.emit(EventKind::Stopped {
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// Close every endpoint; idempotent
    pub fn close(&self) {
        for endpoint in &self.endpoints {
            endpoint.close();
        }
    }

    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            path: self.path.to_string(),
            endpoints: self.endpoints.iter().map(|e| e.status()).collect(),
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

    use crate::config::{ConnectionRole, Direction, EndpointConfig};
    use crate::event::EventLog;
    use crate::transport::TcpTransport;

    #[tokio::test]
    async fn test_endpoint_failure_does_not_stop_siblings() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let failing = EndpointConfig::new(
            ConnectionRole::Client,
            Direction::Output,
            [format!("127.0.0.1:{port}")],
        )
        .reconnect_count(1)
        .reconnect_interval(Duration::from_millis(5));
        let healthy = EndpointConfig::new(ConnectionRole::Host, Direction::Input, ["127.0.0.1:0"]);

        let log = Arc::new(EventLog::new());
        let server = Arc::new(Server::new(
            &ComponentPath::root(),
            0,
            &ServerConfig::new(vec![failing, healthy]),
            Arc::new(TcpTransport::new()),
            log.clone(),
        ));
        let ctx = CancellationToken::new();

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            let ctx = ctx.clone();
            async move { server.run(ctx).await }
        });

        let failed_path = server.endpoints()[0].path().clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !log.stopped().contains(&failed_path) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(!log.stopped().contains(server.endpoints()[1].path()));

        ctx.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RelayError::ServerFailed { failures: 1, .. })));
    }
}
