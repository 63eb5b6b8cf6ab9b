//! Endpoint fan-out
//!
//! Routes every frame published by one of the endpoint's source connections
//! to all of its sink queues. Publishing is synchronous and never waits on a
//! sink; overflowing queues drop their oldest frames instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::filter::StreamFilter;
use super::queue::SinkQueue;
use crate::media::Frame;

/// Result of publishing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on this many sinks
    Delivered(usize),
    /// Rejected by the endpoint's filter
    Filtered,
    /// The endpoint is closing
    Closed,
}

/// Shared routing point of one endpoint
#[derive(Debug)]
pub struct FanOut {
    filter: StreamFilter,
    sinks: Vec<Arc<SinkQueue>>,
    closed: AtomicBool,
}

impl FanOut {
    pub fn new(filter: StreamFilter, sinks: Vec<Arc<SinkQueue>>) -> Self {
        Self {
            filter,
            sinks,
            closed: AtomicBool::new(false),
        }
    }

    /// Filter the frame and queue it on every sink
    pub fn publish(&self, frame: Frame) -> Delivery {
        if self.closed.load(Ordering::Acquire) {
            return Delivery::Closed;
        }
        if !self.filter.allows(&frame) {
            return Delivery::Filtered;
        }

        let delivered = self
            .sinks
            .iter()
            .filter(|sink| sink.push(frame.clone()))
            .count();

        Delivery::Delivered(delivered)
    }

    /// Stop accepting frames and close every sink queue
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for sink in &self.sinks {
            sink.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionRole, Direction, EndpointConfig};

    fn fanout(sinks: usize, config: &EndpointConfig) -> (FanOut, Vec<Arc<SinkQueue>>) {
        let queues: Vec<_> = (0..sinks).map(|_| Arc::new(SinkQueue::new(8))).collect();
        let fanout = FanOut::new(StreamFilter::from_config(config), queues.clone());
        (fanout, queues)
    }

    fn config() -> EndpointConfig {
        EndpointConfig::new(ConnectionRole::Host, Direction::Input, ["127.0.0.1:0"])
    }

    #[tokio::test]
    async fn test_publish_reaches_every_sink() {
        let (fanout, queues) = fanout(3, &config());

        assert_eq!(fanout.publish(Frame::audio(7, &b"aac"[..])), Delivery::Delivered(3));
        for queue in &queues {
            let frame = queue.pop().await.unwrap();
            assert_eq!(frame.timestamp, 7);
            assert_eq!(&frame.data[..], b"aac");
        }
    }

    #[test]
    fn test_publish_without_sinks() {
        let (fanout, _) = fanout(0, &config());
        assert_eq!(fanout.publish(Frame::raw(&b"x"[..])), Delivery::Delivered(0));
    }

    #[test]
    fn test_filtered_frames_not_queued() {
        let (fanout, queues) = fanout(2, &config().video(false));

        assert_eq!(fanout.publish(Frame::video(0, &b"v"[..])), Delivery::Filtered);
        assert!(queues.iter().all(|q| q.is_empty()));
    }

    #[test]
    fn test_stalled_sink_does_not_block_siblings() {
        let queues = vec![Arc::new(SinkQueue::new(2)), Arc::new(SinkQueue::new(64))];
        let fanout = FanOut::new(StreamFilter::default(), queues.clone());

        for i in 0..10u32 {
            assert_eq!(fanout.publish(Frame::video(i, &b"v"[..])), Delivery::Delivered(2));
        }

        assert_eq!(queues[0].len(), 2);
        assert_eq!(queues[0].dropped(), 8);
        assert_eq!(queues[1].len(), 10);
        assert_eq!(queues[1].dropped(), 0);
    }

    #[test]
    fn test_close() {
        let (fanout, queues) = fanout(2, &config());

        fanout.close();
        fanout.close();

        assert!(fanout.is_closed());
        assert!(queues.iter().all(|q| q.is_closed()));
        assert_eq!(fanout.publish(Frame::raw(&b"x"[..])), Delivery::Closed);
    }
}
