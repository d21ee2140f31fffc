//! Bounded frame queue
//!
//! Fixed capacity FIFO that never blocks the producer: when full, the
//! oldest frame is discarded to make room for the newest.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;

use crate::error::ValidationError;
use crate::protocol::{PortAddress, MAX_DMX_SIZE};

/// Frames buffered between generation and transmission
pub const FRAME_QUEUE_CAPACITY: usize = 4;

/// One universe worth of channel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxFrame {
    pub address: PortAddress,
    pub data: Bytes,
}

impl DmxFrame {
    /// Build a frame, rejecting payloads over 512 bytes
    pub fn new(address: PortAddress, data: impl Into<Bytes>) -> Result<Self, ValidationError> {
        let data = data.into();
        if data.len() > MAX_DMX_SIZE {
            return Err(ValidationError::PayloadTooLarge(data.len()));
        }
        Ok(Self { address, data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lock-free drop-oldest queue of [`DmxFrame`]
pub struct FrameQueue {
    queue: ArrayQueue<DmxFrame>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
        }
    }

    /// Push a frame, returning the oldest frame if it had to be discarded
    pub fn push(&self, frame: DmxFrame) -> Option<DmxFrame> {
        self.queue.force_push(frame)
    }

    /// Take the oldest frame
    pub fn pop(&self) -> Option<DmxFrame> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Discard everything queued
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(FRAME_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> DmxFrame {
        DmxFrame::new(PortAddress::default(), vec![tag; 8]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::default();
        assert!(queue.push(frame(1)).is_none());
        assert!(queue.push(frame(2)).is_none());
        assert_eq!(queue.pop().unwrap().data[0], 1);
        assert_eq!(queue.pop().unwrap().data[0], 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = FrameQueue::default();
        let dropped: Vec<u8> = (1..=6)
            .filter_map(|tag| queue.push(frame(tag)))
            .map(|f| f.data[0])
            .collect();

        assert_eq!(dropped, vec![1, 2]);
        assert!(queue.is_full());
        let remaining: Vec<u8> = std::iter::from_fn(|| queue.pop()).map(|f| f.data[0]).collect();
        assert_eq!(remaining, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_frame_size_limit() {
        assert!(DmxFrame::new(PortAddress::default(), vec![0u8; 512]).is_ok());
        assert_eq!(
            DmxFrame::new(PortAddress::default(), vec![0u8; 513]),
            Err(ValidationError::PayloadTooLarge(513))
        );
    }

    #[test]
    fn test_clear() {
        let queue = FrameQueue::default();
        queue.push(frame(1));
        queue.push(frame(2));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), FRAME_QUEUE_CAPACITY);
    }
}
