//! Paced DMX output
//!
//! Frames produced by a caller-supplied generator pass through a small
//! drop-oldest queue and leave at a fixed rate.

pub mod queue;
pub mod scheduler;

pub use queue::{DmxFrame, FrameQueue, FRAME_QUEUE_CAPACITY};
pub use scheduler::{frame_interval, FrameGenerator, FrameOutput, FrameScheduler, TickReport};
