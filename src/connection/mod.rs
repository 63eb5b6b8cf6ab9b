//! Connection
//!
//! One link to one peer, kept alive across failures:
//!
//! ```text
//!            start              link up
//!   Idle ------------> Establishing ------> Active
//!                        |    ^               |
//!               failure  |    | retry         | peer closed / link error
//!                        v    |               v
//!                      Reconnecting <---------+
//!                           |
//!            budget spent   |      cancel (any state)
//!                           |           |
//!                           |           v
//!                           |       Draining
//!                           |           |
//!                           v           v
//!                         Closed <------+
//! ```
//!
//! Source connections (`direction: input`) publish decoded frames into their
//! endpoint's fan-out. Sink connections (`direction: output`) write their
//! queue to the peer and only read to notice when it goes away.

mod state;

pub use state::{ConnectionState, RetryBudget};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use crate::codec::LinkCodec;
use crate::config::{ConnectionConfig, ConnectionRole, ListenMode};
use crate::endpoint::{Delivery, FanOut, SinkQueue};
use crate::error::ConnectionError;
use crate::event::{ComponentPath, EventKind, LifecycleEvent, Observer};
use crate::shutdown::{Outcome, Shutdown};
use crate::stats::ConnectionStats;
use crate::status::ConnectionStatus;
use crate::transport::{Acceptor, BoxLink, Transport};

/// Size of the buffer sinks use to watch for the peer closing
const SINK_READ_BUFFER: usize = 1024;

/// Where a connection's payloads go
#[derive(Debug, Clone)]
pub(crate) enum RelayPath {
    /// Publish decoded frames to the endpoint
    Publish(Arc<FanOut>),
    /// Deliver frames from the endpoint to the peer
    Deliver(Arc<SinkQueue>),
}

enum Step {
    Establish,
    Active(BoxLink),
    Reconnect(ConnectionError),
}

/// A supervised link to one address
pub struct Connection {
    path: ComponentPath,
    config: ConnectionConfig,
    relay_path: RelayPath,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
    state: watch::Sender<ConnectionState>,
    attempt: AtomicU32,
    dropped_reported: AtomicU64,
    last_error: Mutex<Option<String>>,
    local_addr: Mutex<Option<SocketAddr>>,
    stats: ConnectionStats,
    closed: CancellationToken,
    started: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        parent: &ComponentPath,
        config: ConnectionConfig,
        relay_path: RelayPath,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let path = parent.child(format!("connection[{}:{}]", config.index, config.address));
        let (state, _) = watch::channel(ConnectionState::Idle);

        Self {
            path,
            config,
            relay_path,
            transport,
            observer,
            state,
            attempt: AtomicU32::new(0),
            dropped_reported: AtomicU64::new(0),
            last_error: Mutex::new(None),
            local_addr: Mutex::new(None),
            stats: ConnectionStats::new(),
            closed: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Drive the connection until it is closed
    ///
    /// Returns `Ok(())` when cancelled or when a single-shot host's peer left,
    /// and the terminal error when the reconnect budget ran out. Calling `run`
    /// again, or after `close`, returns `Ok(())` immediately.
    pub async fn run(&self, ctx: CancellationToken) -> Result<(), ConnectionError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let shutdown = Shutdown::new(ctx, self.closed.clone());
        self.emit(EventKind::Started);

        let mut budget = RetryBudget::new(self.config.reconnect);
        let mut acceptor: Option<Box<dyn Acceptor>> = None;
        let mut step = Step::Establish;

        let result = loop {
            step = match step {
                Step::Establish => {
                    self.transition(ConnectionState::Establishing, budget.used(), None);

                    match self.establish(&shutdown, &mut acceptor).await {
                        Outcome::Cancelled => break Ok(()),
                        Outcome::Completed(Ok(link)) => {
                            budget.reset();
                            self.stats.record_link();
                            self.transition(ConnectionState::Active, 0, None);
                            Step::Active(link)
                        }
                        Outcome::Completed(Err(e)) => Step::Reconnect(e),
                    }
                }
                Step::Active(link) => match self.pump(link, &shutdown).await {
                    Outcome::Cancelled => break Ok(()),
                    Outcome::Completed(e) if self.is_single_shot() => {
                        tracing::debug!(path = %self.path, "Single-shot peer left");
                        break match e {
                            ConnectionError::PeerClosed { .. } => Ok(()),
                            e => Err(e),
                        };
                    }
                    Outcome::Completed(e) => Step::Reconnect(e),
                },
                Step::Reconnect(e) => {
                    self.transition(ConnectionState::Reconnecting, budget.used(), Some(e));

                    if !budget.try_consume() {
                        break Err(ConnectionError::ReconnectBudgetExhausted {
                            address: self.config.address.clone(),
                            attempts: budget.used(),
                        });
                    }
                    match shutdown
                        .race(tokio::time::sleep(self.config.reconnect_interval))
                        .await
                    {
                        Outcome::Cancelled => break Ok(()),
                        Outcome::Completed(()) => Step::Establish,
                    }
                }
            };
        };

        if shutdown.is_signalled() {
            self.transition(ConnectionState::Draining, budget.used(), None);
        }
        // Releases the listener
        drop(acceptor);
        *self.lock_local_addr() = None;

        self.transition(ConnectionState::Closed, budget.used(), result.clone().err());
        self.emit(EventKind::Stopped {
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    /// Request the connection to close; idempotent
    pub fn close(&self) {
        self.closed.cancel();
        if !self.started.swap(true, Ordering::AcqRel) {
            // Never ran, nothing to drain
            self.transition(ConnectionState::Closed, 0, None);
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Address of the bound listener (host connections while listening)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.lock_local_addr()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn path(&self) -> &ComponentPath {
        &self.path
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            path: self.path.to_string(),
            address: self.config.address.clone(),
            role: self.config.role,
            direction: self.config.direction,
            state: self.state(),
            attempt: self.attempt.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            local_addr: self.local_addr().map(|addr| addr.to_string()),
            dropped_frames: match &self.relay_path {
                RelayPath::Deliver(queue) => Some(queue.dropped()),
                RelayPath::Publish(_) => None,
            },
            stats: self.stats.snapshot(),
        }
    }

    fn is_single_shot(&self) -> bool {
        self.config.role == ConnectionRole::Host && self.config.listen_mode == ListenMode::SingleShot
    }

    fn lock_local_addr(&self) -> std::sync::MutexGuard<'_, Option<SocketAddr>> {
        self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: EventKind) {
        self.observer
            .on_event(LifecycleEvent::new(self.path.clone(), kind));
    }

    fn transition(&self, to: ConnectionState, attempt: u32, error: Option<ConnectionError>) {
        let from = self.state.send_replace(to);
        self.attempt.store(attempt, Ordering::Relaxed);
        if let Some(e) = &error {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
        }

        self.emit(EventKind::Transition {
            from,
            to,
            attempt,
            error,
        });
    }

    /// Produce one link: dial (client) or accept one peer (host)
    async fn establish(
        &self,
        shutdown: &Shutdown,
        acceptor: &mut Option<Box<dyn Acceptor>>,
    ) -> Outcome<Result<BoxLink, ConnectionError>> {
        let address = self.config.address.as_str();

        match self.config.role {
            ConnectionRole::Client => {
                let dial = tokio::time::timeout(
                    self.config.connection_timeout,
                    self.transport.dial(address),
                );

                match shutdown.race(dial).await {
                    Outcome::Cancelled => Outcome::Cancelled,
                    Outcome::Completed(Ok(Ok(link))) => {
                        tracing::debug!(path = %self.path, "Dialed peer");
                        Outcome::Completed(Ok(link))
                    }
                    Outcome::Completed(Ok(Err(e))) => {
                        Outcome::Completed(Err(ConnectionError::establish(address, e)))
                    }
                    Outcome::Completed(Err(_elapsed)) => {
                        Outcome::Completed(Err(ConnectionError::EstablishTimeout {
                            address: address.to_string(),
                            timeout: self.config.connection_timeout,
                        }))
                    }
                }
            }
            ConnectionRole::Host => {
                let mut listener = match acceptor.take() {
                    Some(listener) => listener,
                    None => match shutdown.race(self.transport.listen(address)).await {
                        Outcome::Cancelled => return Outcome::Cancelled,
                        Outcome::Completed(Err(e)) => {
                            return Outcome::Completed(Err(ConnectionError::establish(address, e)))
                        }
                        Outcome::Completed(Ok(listener)) => {
                            if let Ok(addr) = listener.local_addr() {
                                *self.lock_local_addr() = Some(addr);
                                self.emit(EventKind::Listening { addr });
                            }
                            listener
                        }
                    },
                };

                let accepted = shutdown.race(listener.accept()).await;
                // Kept across peers until the connection drains
                *acceptor = Some(listener);

                match accepted {
                    Outcome::Cancelled => Outcome::Cancelled,
                    Outcome::Completed(Ok((link, peer))) => {
                        tracing::debug!(path = %self.path, peer = %peer, "Accepted peer");
                        Outcome::Completed(Ok(link))
                    }
                    Outcome::Completed(Err(e)) => {
                        Outcome::Completed(Err(ConnectionError::establish(address, e)))
                    }
                }
            }
        }
    }

    /// Move payloads over an established link until it fails or shutdown
    async fn pump(&self, link: BoxLink, shutdown: &Shutdown) -> Outcome<ConnectionError> {
        let (mut reader, mut writer) = tokio::io::split(link);
        let codec = LinkCodec::new(self.config.codec);

        match &self.relay_path {
            RelayPath::Publish(fanout) => {
                self.run_source(&mut reader, fanout, codec, shutdown).await
            }
            RelayPath::Deliver(queue) => {
                let outcome = self
                    .run_sink(&mut reader, &mut writer, queue, codec, shutdown)
                    .await;
                self.report_drops(queue);
                outcome
            }
        }
    }

    async fn run_source<R>(
        &self,
        reader: &mut R,
        fanout: &FanOut,
        mut codec: LinkCodec,
        shutdown: &Shutdown,
    ) -> Outcome<ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let address = self.config.address.as_str();
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut pending = BytesMut::with_capacity(self.config.buffer_size);

        loop {
            let n = match shutdown.race(reader.read(&mut buf)).await {
                Outcome::Cancelled => return Outcome::Cancelled,
                Outcome::Completed(Ok(0)) => {
                    return Outcome::Completed(ConnectionError::PeerClosed {
                        address: address.to_string(),
                    })
                }
                Outcome::Completed(Ok(n)) => n,
                Outcome::Completed(Err(e)) => {
                    return Outcome::Completed(ConnectionError::link(address, e))
                }
            };
            self.stats.record_received(n);
            pending.extend_from_slice(&buf[..n]);

            loop {
                match codec.decode(&mut pending) {
                    Ok(Some(frame)) => {
                        self.stats.record_frame_in();
                        if fanout.publish(frame) == Delivery::Filtered {
                            self.stats.record_filtered();
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        return Outcome::Completed(ConnectionError::Codec {
                            address: address.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn run_sink<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        queue: &SinkQueue,
        mut codec: LinkCodec,
        shutdown: &Shutdown,
    ) -> Outcome<ConnectionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let address = self.config.address.as_str();
        let mut scratch = [0u8; SINK_READ_BUFFER];
        let mut out = BytesMut::new();

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.signalled() => return Outcome::Cancelled,
                read = reader.read(&mut scratch) => match read {
                    Ok(0) => {
                        return Outcome::Completed(ConnectionError::PeerClosed {
                            address: address.to_string(),
                        })
                    }
                    Ok(n) => {
                        // Sinks only read to detect the peer closing
                        self.stats.record_received(n);
                        continue;
                    }
                    Err(e) => return Outcome::Completed(ConnectionError::link(address, e)),
                },
                frame = queue.pop() => match frame {
                    Some(frame) => frame,
                    // Endpoint is tearing down
                    None => return Outcome::Cancelled,
                },
            };

            self.report_drops(queue);

            if let Err(e) = codec.encode(frame, &mut out) {
                tracing::warn!(path = %self.path, error = %e, "Skipping frame");
                out.clear();
                continue;
            }

            match shutdown.race(writer.write_all(&out)).await {
                Outcome::Cancelled => return Outcome::Cancelled,
                Outcome::Completed(Err(e)) => {
                    // The frame already left the queue
                    self.stats.record_lost();
                    return Outcome::Completed(ConnectionError::link(address, e));
                }
                Outcome::Completed(Ok(())) => {
                    self.stats.record_sent(out.len());
                    out.clear();
                }
            }
        }
    }

    /// Report queue overflow since the last report
    fn report_drops(&self, queue: &SinkQueue) {
        let total = queue.dropped();
        let reported = self.dropped_reported.swap(total, Ordering::Relaxed);
        if total > reported {
            self.emit(EventKind::FramesDropped {
                dropped: total - reported,
                total,
            });
        }
    }
}
