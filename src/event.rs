//! Lifecycle events
//!
//! Every component of the relay tree reports what happens to it through an
//! [`Observer`]. Events carry the hierarchical path of the component that
//! emitted them, e.g. `relay/server[0]/endpoint[1:live/main]/connection[0:10.0.0.1:1935]`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::connection::ConnectionState;
use crate::error::ConnectionError;

/// Hierarchical identifier of a component in the relay tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentPath(Arc<str>);

impl ComponentPath {
    /// The path of the relay itself
    pub fn root() -> Self {
        Self(Arc::from("relay"))
    }

    /// Path of a child component
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(Arc::from(format!("{}/{}", self.0, segment)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened
#[derive(Debug, Clone)]
pub enum EventKind {
    /// The component began running
    Started,

    /// The component finished; `error` is set when it ended in failure
    Stopped { error: Option<String> },

    /// A connection changed state
    Transition {
        from: ConnectionState,
        to: ConnectionState,
        /// Reconnect attempts consumed since the last established link
        attempt: u32,
        /// The failure that caused the transition, if any
        error: Option<ConnectionError>,
    },

    /// A host connection bound its listener
    Listening { addr: SocketAddr },

    /// A sink queue overflowed and discarded its oldest frames
    FramesDropped {
        /// Frames dropped since the last report
        dropped: u64,
        /// Frames dropped over the queue's lifetime
        total: u64,
    },
}

/// A lifecycle event emitted by a component of the relay tree
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub path: ComponentPath,
    pub kind: EventKind,
}

impl LifecycleEvent {
    pub fn new(path: ComponentPath, kind: EventKind) -> Self {
        Self { path, kind }
    }
}

/// Receiver of lifecycle events
///
/// Called synchronously from the emitting task, so implementations must not
/// block.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: LifecycleEvent);
}

impl<F> Observer for F
where
    F: Fn(LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: LifecycleEvent) {
        self(event)
    }
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: LifecycleEvent) {
        let path = event.path;

        match event.kind {
            EventKind::Started => {
                tracing::debug!(path = %path, "Started");
            }
            EventKind::Stopped { error: None } => {
                tracing::info!(path = %path, "Stopped");
            }
            EventKind::Stopped { error: Some(error) } => {
                tracing::error!(path = %path, error = %error, "Stopped with failure");
            }
            EventKind::Transition {
                from,
                to,
                attempt,
                error,
            } => match error {
                Some(error) if error.is_terminal() => {
                    tracing::error!(path = %path, %from, %to, attempt, error = %error, "Connection gave up");
                }
                Some(error) => {
                    tracing::warn!(path = %path, %from, %to, attempt, error = %error, "Connection failed");
                }
                None if to == ConnectionState::Active => {
                    tracing::info!(path = %path, %from, %to, "Connection established");
                }
                None => {
                    tracing::debug!(path = %path, %from, %to, attempt, "Connection state changed");
                }
            },
            EventKind::Listening { addr } => {
                tracing::info!(path = %path, addr = %addr, "Listening");
            }
            EventKind::FramesDropped { dropped, total } => {
                tracing::warn!(path = %path, dropped, total, "Sink queue overflowed, dropped oldest frames");
            }
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving half of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_event(&self, event: LifecycleEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Records every event in memory
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events emitted by the component at `path`
    pub fn events_for(&self, path: &str) -> Vec<EventKind> {
        self.events()
            .into_iter()
            .filter(|e| e.path.as_str() == path)
            .map(|e| e.kind)
            .collect()
    }

    /// `(from, to)` pairs of the connection at `path`, in order
    pub fn transitions_for(&self, path: &str) -> Vec<(ConnectionState, ConnectionState)> {
        self.events_for(path)
            .into_iter()
            .filter_map(|kind| match kind {
                EventKind::Transition { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Errors carried by the transitions of the connection at `path`
    pub fn errors_for(&self, path: &str) -> Vec<ConnectionError> {
        self.events_for(path)
            .into_iter()
            .filter_map(|kind| match kind {
                EventKind::Transition { error, .. } => error,
                _ => None,
            })
            .collect()
    }

    /// Paths of every component that emitted `Stopped`
    pub fn stopped(&self) -> Vec<ComponentPath> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::Stopped { .. }))
            .map(|e| e.path)
            .collect()
    }
}

impl Observer for EventLog {
    fn on_event(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_path() {
        let relay = ComponentPath::root();
        let server = relay.child("server[0]");
        let endpoint = server.child("endpoint[1:live/main]");

        assert_eq!(relay.to_string(), "relay");
        assert_eq!(server.as_str(), "relay/server[0]");
        assert_eq!(endpoint.as_str(), "relay/server[0]/endpoint[1:live/main]");
    }

    #[test]
    fn test_event_log_transitions() {
        let log = EventLog::new();
        let path = ComponentPath::root().child("connection[0:a:1]");

        log.on_event(LifecycleEvent::new(path.clone(), EventKind::Started));
        log.on_event(LifecycleEvent::new(
            path.clone(),
            EventKind::Transition {
                from: ConnectionState::Idle,
                to: ConnectionState::Establishing,
                attempt: 0,
                error: None,
            },
        ));
        log.on_event(LifecycleEvent::new(
            path.clone(),
            EventKind::Stopped { error: None },
        ));

        assert_eq!(log.events().len(), 3);
        assert_eq!(
            log.transitions_for(path.as_str()),
            vec![(ConnectionState::Idle, ConnectionState::Establishing)]
        );
        assert_eq!(log.stopped(), vec![path]);
    }

    #[tokio::test]
    async fn test_channel_observer() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_event(LifecycleEvent::new(ComponentPath::root(), EventKind::Started));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, ComponentPath::root());
        assert!(matches!(event.kind, EventKind::Started));

        drop(rx);
        // Must not panic once the receiver is gone
        observer.on_event(LifecycleEvent::new(ComponentPath::root(), EventKind::Started));
    }

    #[test]
    fn test_closure_observer() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let observer = move |_event: LifecycleEvent| {
            *counter.lock().unwrap() += 1;
        };

        observer.on_event(LifecycleEvent::new(ComponentPath::root(), EventKind::Started));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
