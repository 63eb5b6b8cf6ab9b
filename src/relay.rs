//! Relay
//!
//! Root of the supervision tree. Owns the cancellation token every component
//! watches, builds the servers from configuration and guarantees that
//! nothing under it is still running once `run` returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::event::{ComponentPath, EventKind, LifecycleEvent, Observer, TracingObserver};
use crate::server::Server;
use crate::status::RelayStatus;
use crate::transport::{TcpTransport, Transport};

/// Builds a [`Relay`] with a custom observer or transport
pub struct RelayBuilder {
    config: Config,
    observer: Arc<dyn Observer>,
    transport: Arc<dyn Transport>,
}

impl RelayBuilder {
    /// Deliver lifecycle events to `observer` instead of the log
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Open links through `transport` instead of TCP
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Validate the configuration and build the tree; no I/O happens yet
    pub fn build(self) -> Result<Relay> {
        self.config.validate()?;

        let path = ComponentPath::root();
        let servers = self
            .config
            .servers
            .iter()
            .enumerate()
            .map(|(i, server)| {
                Arc::new(Server::new(
                    &path,
                    i,
                    server,
                    Arc::clone(&self.transport),
                    Arc::clone(&self.observer),
                ))
            })
            .collect();

        Ok(Relay {
            path,
            config: self.config,
            servers,
            root: CancellationToken::new(),
            observer: self.observer,
            running: AtomicBool::new(false),
        })
    }
}

/// The relay daemon's core
pub struct Relay {
    path: ComponentPath,
    config: Config,
    servers: Vec<Arc<Server>>,
    root: CancellationToken,
    observer: Arc<dyn Observer>,
    running: AtomicBool,
}

impl Relay {
    /// Build the relay tree with the default observer and TCP transport
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> RelayBuilder {
        RelayBuilder {
            config,
            observer: Arc::new(TracingObserver),
            transport: Arc::new(TcpTransport::new()),
        }
    }

    /// Run every server until they all finish, `signal` fires, `close` is
    /// called or the configured timeout elapses
    ///
    /// Always waits for the whole tree to drain before returning. Server
    /// failures are reported, not returned.
    pub async fn run(&self, signal: CancellationToken) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(RelayError::AlreadyRunning);
        }

        self.emit(EventKind::Started);
        tracing::info!(servers = self.servers.len(), "Relay starting");

        let mut tasks = JoinSet::new();
        for server in &self.servers {
            let server = Arc::clone(server);
            let ctx = self.root.clone();
            tasks.spawn(async move { server.run(ctx).await });
        }

        let mut deadline: Pin<Box<dyn Future<Output = ()> + Send>> =
            match self.config.run_timeout() {
                Some(timeout) => Box::pin(tokio::time::sleep(timeout)),
                None => Box::pin(std::future::pending()),
            };

        let mut failures = 0;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => failures += Self::report(joined),
                    None => break,
                },
                _ = signal.cancelled() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                _ = self.root.cancelled() => break,
                _ = &mut deadline => {
                    tracing::info!("Run timeout elapsed");
                    break;
                }
            }
        }

        self.root.cancel();
        while let Some(joined) = tasks.join_next().await {
            failures += Self::report(joined);
        }

        tracing::info!(failures, "Relay stopped");
        self.emit(EventKind::Stopped {
            error: (failures > 0).then(|| format!("{failures} server(s) failed")),
        });
        Ok(())
    }

    /// Cancel everything; idempotent and safe whether or not `run` was called
    pub fn close(&self) {
        self.root.cancel();
        for server in &self.servers {
            server.close();
        }
    }

    /// The root token, fired on shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            running: self.running.load(Ordering::Acquire) && !self.root.is_cancelled(),
            servers: self.servers.iter().map(|s| s.status()).collect(),
        }
    }

    fn report(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> usize {
        match joined {
            Ok(Ok(())) => 0,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Server failed");
                1
            }
            Err(e) => {
                tracing::error!(error = %e, "Server task panicked");
                1
            }
        }
    }

    fn emit(&self, kind: EventKind) {
        self.observer
            .on_event(LifecycleEvent::new(self.path.clone(), kind));
    }
}
