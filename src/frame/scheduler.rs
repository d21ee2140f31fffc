//! Fixed-rate frame scheduler
//!
//! Each tick asks the generator for a frame, queues it, takes the oldest
//! queued frame and hands it to a [`FrameOutput`]. Deadlines advance by a
//! whole interval per tick, so the cadence does not drift when one tick
//! runs long, and missed deadlines are skipped rather than replayed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::error::{ConfigError, Result};
use crate::frame::queue::{DmxFrame, FrameQueue};
use crate::protocol::PortAddress;
use crate::stats::Statistics;

/// Produces the next frame of channel data (at most 512 bytes)
pub type FrameGenerator = Box<dyn FnMut() -> anyhow::Result<Vec<u8>> + Send>;

/// Where dequeued frames go
pub trait FrameOutput: Send + Sync {
    fn transmit(&self, frame: &DmxFrame) -> Result<()>;
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub generated: bool,
    pub dropped: bool,
    pub sent: bool,
}

/// Interval between frames at `fps` frames per second
pub fn frame_interval(fps: u32) -> std::result::Result<Duration, ConfigError> {
    if fps == 0 {
        return Err(ConfigError::InvalidFrameRate(fps));
    }
    Ok(Duration::from_micros(1_000_000 / fps as u64))
}

/// Producer/consumer loop driving paced output
pub struct FrameScheduler {
    generator: FrameGenerator,
    address: PortAddress,
    interval: Duration,
    queue: Arc<FrameQueue>,
    stats: Arc<Statistics>,
    output: Arc<dyn FrameOutput>,
}

impl FrameScheduler {
    pub fn new(
        generator: FrameGenerator,
        address: PortAddress,
        fps: u32,
        queue: Arc<FrameQueue>,
        stats: Arc<Statistics>,
        output: Arc<dyn FrameOutput>,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            generator,
            address,
            interval: frame_interval(fps)?,
            queue,
            stats,
            output,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Call the generator, absorbing errors, panics and oversized frames
    fn generate(&mut self) -> Option<DmxFrame> {
        let generator = &mut self.generator;
        match panic::catch_unwind(AssertUnwindSafe(|| generator())) {
            Ok(Ok(data)) => match DmxFrame::new(self.address, data) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!("Discarding generated frame: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Frame generator failed: {:#}", e);
                None
            }
            Err(_) => {
                tracing::error!("Frame generator panicked");
                None
            }
        }
    }

    /// Queue a frame, discarding the oldest one when full
    ///
    /// Returns true when a frame was dropped.
    pub fn enqueue(&self, frame: DmxFrame) -> bool {
        let dropped = self.queue.push(frame).is_some();
        if dropped {
            self.stats.record_drop();
            tracing::debug!("Frame queue full, dropped oldest frame");
        }
        self.stats.set_queue_depth(self.queue.len());
        dropped
    }

    /// Run one generate/enqueue/dequeue/transmit cycle
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        if let Some(frame) = self.generate() {
            report.generated = true;
            report.dropped = self.enqueue(frame);
        }

        let next = self.queue.pop();
        self.stats.set_queue_depth(self.queue.len());

        if let Some(frame) = next {
            match self.output.transmit(&frame) {
                Ok(()) => {
                    self.stats.record_frame();
                    report.sent = true;
                }
                Err(e) => tracing::warn!("Failed to transmit frame: {}", e),
            }
        }

        self.stats.set_last_frame_time(started.elapsed());
        report
    }

    /// Tick until `running` is cleared
    pub fn run(mut self, running: &AtomicBool) {
        tracing::info!(
            "Frame scheduler started: {:.1} fps ({} us interval)",
            1_000_000.0 / self.interval.as_micros() as f64,
            self.interval.as_micros()
        );

        let mut next_deadline = Instant::now();
        while running.load(Ordering::Acquire) {
            next_deadline += self.interval;
            self.tick();

            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                // Stay on the deadline grid but never replay missed ticks.
                let behind = now - next_deadline;
                let missed = (behind.as_micros() / self.interval.as_micros().max(1)) as u32;
                if missed > 0 {
                    next_deadline += self.interval * missed;
                    self.stats.record_late_ticks(missed as u64);
                }
            }
        }

        tracing::info!("Frame scheduler stopped");
    }

    /// Run on a dedicated, priority-elevated thread
    pub fn spawn(
        self,
        running: Arc<AtomicBool>,
        span: tracing::Span,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("artnet-frames".to_string())
            .spawn(move || {
                let _guard = span.enter();
                if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
                    tracing::warn!("Could not raise frame thread priority: {:?}", e);
                }
                self.run(&running);
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingOutput {
        sent: Mutex<Vec<DmxFrame>>,
        fail: AtomicBool,
    }

    impl FrameOutput for RecordingOutput {
        fn transmit(&self, frame: &DmxFrame) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(NetworkError::SendFailed("unreachable".to_string()).into());
            }
            self.sent.lock().push(frame.clone());
            Ok(())
        }
    }

    fn scheduler_with(
        generator: FrameGenerator,
        output: Arc<RecordingOutput>,
    ) -> (FrameScheduler, Arc<Statistics>) {
        let stats = Arc::new(Statistics::new());
        let scheduler = FrameScheduler::new(
            generator,
            PortAddress::new(0, 0, 1),
            40,
            Arc::new(FrameQueue::default()),
            stats.clone(),
            output,
        )
        .unwrap();
        (scheduler, stats)
    }

    fn counting_generator() -> FrameGenerator {
        let mut n = 0u8;
        Box::new(move || {
            n = n.wrapping_add(1);
            Ok(vec![n; 4])
        })
    }

    #[test]
    fn test_interval() {
        assert_eq!(frame_interval(40).unwrap(), Duration::from_micros(25_000));
        assert_eq!(frame_interval(44).unwrap(), Duration::from_micros(22_727));
        assert_eq!(frame_interval(0), Err(ConfigError::InvalidFrameRate(0)));
    }

    #[test]
    fn test_tick_sends_generated_frame() {
        let output = Arc::new(RecordingOutput::default());
        let (mut scheduler, stats) = scheduler_with(counting_generator(), output.clone());

        let report = scheduler.tick();
        assert!(report.generated && report.sent && !report.dropped);

        let sent = output.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data.as_ref(), &[1, 1, 1, 1]);
        assert_eq!(sent[0].address, PortAddress::new(0, 0, 1));
        assert_eq!(stats.snapshot().total_frames, 1);
        assert_eq!(stats.snapshot().queue_depth, 0);
    }

    #[test]
    fn test_enqueue_overflow_counts_drops() {
        let output = Arc::new(RecordingOutput::default());
        let (scheduler, stats) = scheduler_with(counting_generator(), output);

        for tag in 1..=6u8 {
            let frame = DmxFrame::new(PortAddress::new(0, 0, 1), vec![tag]).unwrap();
            scheduler.enqueue(frame);
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dropped_frames, 2);
        assert_eq!(snapshot.queue_depth, 4);
        let queued: Vec<u8> = std::iter::from_fn(|| scheduler.queue.pop())
            .map(|f| f.data[0])
            .collect();
        assert_eq!(queued, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_generator_errors_do_not_stop_ticks() {
        let mut calls = 0;
        let generator: FrameGenerator = Box::new(move || {
            calls += 1;
            match calls {
                1 => Err(anyhow::anyhow!("sensor offline")),
                2 => panic!("generator bug"),
                3 => Ok(vec![0u8; 600]),
                _ => Ok(vec![7u8; 2]),
            }
        });
        let output = Arc::new(RecordingOutput::default());
        let (mut scheduler, stats) = scheduler_with(generator, output.clone());

        for _ in 0..3 {
            let report = scheduler.tick();
            assert!(!report.generated && !report.sent);
        }
        assert!(scheduler.tick().sent);
        assert_eq!(output.sent.lock().len(), 1);
        assert_eq!(stats.snapshot().total_frames, 1);
    }

    #[test]
    fn test_failed_transmit_not_counted() {
        let output = Arc::new(RecordingOutput::default());
        output.fail.store(true, Ordering::Relaxed);
        let (mut scheduler, stats) = scheduler_with(counting_generator(), output);

        let report = scheduler.tick();
        assert!(report.generated && !report.sent);
        assert_eq!(stats.snapshot().total_frames, 0);
    }

    #[test]
    fn test_run_paces_and_stops() {
        let output = Arc::new(RecordingOutput::default());
        let (scheduler, stats) = scheduler_with(counting_generator(), output.clone());
        let running = Arc::new(AtomicBool::new(true));

        let handle = scheduler
            .spawn(running.clone(), tracing::Span::none())
            .unwrap();
        thread::sleep(Duration::from_millis(220));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        // 40 fps for ~220 ms is about 9 frames; allow generous scheduling slack.
        let sent = stats.snapshot().total_frames;
        assert!((3..=12).contains(&sent), "sent {} frames", sent);

        let tags: Vec<u8> = output.sent.lock().iter().map(|f| f.data[0]).collect();
        assert!(tags.windows(2).all(|w| w[1] == w[0].wrapping_add(1)));
    }

    #[derive(Default)]
    struct TimedOutput {
        sent_at: Mutex<Vec<Instant>>,
    }

    impl FrameOutput for TimedOutput {
        fn transmit(&self, _frame: &DmxFrame) -> Result<()> {
            self.sent_at.lock().push(Instant::now());
            Ok(())
        }
    }

    #[test]
    fn test_stall_skips_missed_ticks_without_burst() {
        let mut calls = 0u32;
        let generator: FrameGenerator = Box::new(move || {
            calls += 1;
            if calls == 4 {
                thread::sleep(Duration::from_millis(130));
            }
            Ok(vec![calls as u8])
        });
        let output = Arc::new(TimedOutput::default());
        let stats = Arc::new(Statistics::new());
        let scheduler = FrameScheduler::new(
            generator,
            PortAddress::default(),
            40,
            Arc::new(FrameQueue::default()),
            stats.clone(),
            output.clone(),
        )
        .unwrap();
        let interval = scheduler.interval();

        let running = Arc::new(AtomicBool::new(true));
        let handle = scheduler
            .spawn(running.clone(), tracing::Span::none())
            .unwrap();
        thread::sleep(Duration::from_millis(600));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        assert!(stats.snapshot().late_ticks > 0);

        let sent_at = output.sent_at.lock().clone();
        let stalled = sent_at
            .windows(2)
            .position(|w| w[1] - w[0] >= Duration::from_millis(100))
            .map(|i| i + 1)
            .expect("stall not visible in output");
        let resumed = sent_at[stalled];

        // At most the immediate catch-up tick and the next grid tick fit in one interval
        let burst = sent_at[stalled + 1..]
            .iter()
            .take_while(|t| **t - resumed <= interval)
            .count();
        assert!(burst <= 2, "{} frames within one interval after the stall", burst);

        // Back on the grid afterwards
        let steady = &sent_at[stalled + 2..];
        assert!(steady.len() >= 5, "only {} frames after the stall", steady.len());
        let span = *steady.last().unwrap() - steady[0];
        let mean = span / (steady.len() as u32 - 1);
        assert!(
            mean >= interval * 3 / 5 && mean <= interval * 8 / 5,
            "mean gap {:?} after the stall",
            mean
        );
    }
}
