//! Bounded per-sink frame queue
//!
//! A slow sink must never stall its source or its siblings, so pushing never
//! blocks: when the queue is full the oldest frame is discarded to make room.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::media::Frame;

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Queue between an endpoint's fan-out and one sink connection
#[derive(Debug)]
pub struct SinkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl SinkQueue {
    /// Create a queue holding at most `capacity` frames (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame, discarding the oldest one if full
    ///
    /// Returns false if the queue is closed.
    pub fn push(&self, frame: Frame) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            if inner.frames.len() >= self.capacity {
                inner.frames.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            inner.frames.push_back(frame);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next frame; `None` once the queue is closed
    ///
    /// Cancel safe: a frame is only removed when the future completes.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue, discarding anything still buffered
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.frames.clear();
        }
        self.notify.notify_waiters();
        // A permit for a consumer that checked just before closing
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames discarded due to overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = SinkQueue::new(4);
        queue.push(Frame::raw(&b"a"[..]));
        queue.push(Frame::raw(&b"b"[..]));

        assert_eq!(&queue.pop().await.unwrap().data[..], b"a");
        assert_eq!(&queue.pop().await.unwrap().data[..], b"b");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let queue = SinkQueue::new(2);
        for payload in ["1", "2", "3", "4"] {
            assert!(queue.push(Frame::raw(payload.as_bytes().to_vec())));
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(&queue.pop().await.unwrap().data[..], b"3");
        assert_eq!(&queue.pop().await.unwrap().data[..], b"4");
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(SinkQueue::new(4));

        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(Frame::raw(&b"late"[..]));

        let frame = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame.data[..], b"late");
    }

    #[tokio::test]
    async fn test_close_wakes_consumer() {
        let queue = Arc::new(SinkQueue::new(4));

        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.pop().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
        assert!(!queue.push(Frame::raw(&b"x"[..])));
        assert!(queue.is_closed());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = SinkQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
