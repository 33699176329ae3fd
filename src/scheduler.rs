//! Per-frame callback driver shared by the backdrop and the scene viewer.
//!
//! The scheduler never re-arms itself from inside a tick. Each iteration of
//! [`FrameScheduler::run_frame`] checks the cancellation token before asking
//! the [`FrameSource`] for the next frame boundary and again once the wait
//! returns, so a cancel that lands while the host is waiting suppresses the
//! tick that would otherwise have fired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Result, VizError};

/// Shared cancellation flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Metadata handed to every tick
#[derive(Clone, Copy, Debug)]
pub struct FrameStamp {
    /// Zero-based frame counter of the source
    pub index: u64,
    pub at: Instant,
}

/// The host environment's animation cadence.
pub trait FrameSource {
    /// Checks that the host can deliver frames at all.
    fn probe(&self) -> Result<()>;

    /// Blocks until the next frame boundary.
    fn wait_for_frame(&mut self) -> Result<FrameStamp>;
}

/// Fixed-interval pacing with `thread::sleep`. Missed deadlines are not
/// replayed: a late frame re-anchors the schedule at the current instant.
#[derive(Debug)]
pub struct IntervalFrameSource {
    pacer: FramePacer,
}

impl IntervalFrameSource {
    pub fn new(fps: u32) -> Self {
        IntervalFrameSource {
            pacer: FramePacer::new(fps),
        }
    }
}

impl FrameSource for IntervalFrameSource {
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn wait_for_frame(&mut self) -> Result<FrameStamp> {
        let remaining = self.pacer.remaining(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        Ok(self.pacer.advance(Instant::now()))
    }
}

/// Deadline bookkeeping for interval-based frame sources
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Option<Instant>,
    index: u64,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        FramePacer {
            interval: Duration::from_secs(1) / fps.max(1),
            next_deadline: None,
            index: 0,
        }
    }

    /// Time left until the next frame boundary; the first frame is immediate
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Marks a frame boundary as reached and schedules the following one
    pub fn advance(&mut self, now: Instant) -> FrameStamp {
        let next = match self.next_deadline {
            Some(deadline) if deadline + self.interval > now => deadline + self.interval,
            _ => now + self.interval,
        };
        self.next_deadline = Some(next);
        let stamp = FrameStamp {
            index: self.index,
            at: now,
        };
        self.index += 1;
        stamp
    }
}

/// Drives a tick callback from a [`FrameSource`] until cancelled.
pub struct FrameScheduler {
    source: Box<dyn FrameSource>,
    active: Option<CancellationToken>,
    ticks: u64,
}

impl FrameScheduler {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        FrameScheduler {
            source,
            active: None,
            ticks: 0,
        }
    }

    /// Arms the scheduler. Fails when the host cannot supply frames instead
    /// of leaving the caller waiting for ticks that never come.
    pub fn start(&mut self) -> Result<CancellationToken> {
        if let Some(token) = self.active.as_ref().filter(|t| !t.is_cancelled()) {
            return Ok(token.clone());
        }
        self.source.probe()?;
        let token = CancellationToken::new();
        self.active = Some(token.clone());
        debug!("frame scheduler started");
        Ok(token)
    }

    /// Cancels `token`. Once this returns no further tick runs for it.
    pub fn cancel(&mut self, token: &CancellationToken) {
        token.cancel();
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.same_as(token))
        {
            self.active = None;
            debug!(ticks = self.ticks, "frame scheduler cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Total ticks delivered
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Waits for one frame and runs `tick`. Returns `Ok(false)` once the
    /// scheduler is cancelled, without invoking `tick`.
    pub fn run_frame<F>(&mut self, tick: F) -> Result<bool>
    where
        F: FnOnce(FrameStamp),
    {
        let Some(token) = self.active.clone() else {
            return Ok(false);
        };
        if token.is_cancelled() {
            self.active = None;
            return Ok(false);
        }
        let stamp = self.source.wait_for_frame()?;
        if token.is_cancelled() {
            trace!(frame = stamp.index, "frame dropped after cancellation");
            self.active = None;
            return Ok(false);
        }
        tick(stamp);
        self.ticks += 1;
        Ok(!token.is_cancelled())
    }

    /// Runs ticks until cancelled or the frame source fails.
    pub fn run<F>(&mut self, mut tick: F) -> Result<u64>
    where
        F: FnMut(FrameStamp),
    {
        while self.run_frame(&mut tick)? {}
        Ok(self.ticks)
    }
}

/// Frame source for hosts that cannot animate. Probing always fails.
#[derive(Debug, Default)]
pub struct Unavailable(pub String);

impl FrameSource for Unavailable {
    fn probe(&self) -> Result<()> {
        Err(VizError::FrameSourceUnavailable(self.0.clone()))
    }

    fn wait_for_frame(&mut self) -> Result<FrameStamp> {
        self.probe().map(|_| FrameStamp {
            index: 0,
            at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Immediate frames; optionally cancels a token while "waiting" on a given frame
    struct Immediate {
        index: u64,
        cancel_on: Option<(u64, CancellationToken)>,
    }

    impl FrameSource for Immediate {
        fn probe(&self) -> Result<()> {
            Ok(())
        }

        fn wait_for_frame(&mut self) -> Result<FrameStamp> {
            if let Some((frame, token)) = &self.cancel_on {
                if *frame == self.index {
                    token.cancel();
                }
            }
            let stamp = FrameStamp {
                index: self.index,
                at: Instant::now(),
            };
            self.index += 1;
            Ok(stamp)
        }
    }

    fn immediate() -> Box<dyn FrameSource> {
        Box::new(Immediate {
            index: 0,
            cancel_on: None,
        })
    }

    #[test]
    fn run_frame_before_start_does_nothing() {
        let mut scheduler = FrameScheduler::new(immediate());
        assert!(!scheduler.run_frame(|_| panic!("tick without start")).unwrap());
    }

    #[test]
    fn cancel_from_inside_tick_stops_the_loop() {
        let mut scheduler = FrameScheduler::new(immediate());
        let token = scheduler.start().unwrap();
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let total = scheduler
            .run(|_| {
                seen.set(seen.get() + 1);
                if seen.get() == 5 {
                    token.cancel();
                }
            })
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(count.get(), 5);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn cancel_racing_the_frame_wait_suppresses_the_tick() {
        let mut scheduler = FrameScheduler::new(Box::new(Immediate {
            index: 0,
            cancel_on: None,
        }));
        let token = scheduler.start().unwrap();
        scheduler.source = Box::new(Immediate {
            index: 0,
            cancel_on: Some((2, token.clone())),
        });
        let mut ticks = 0;
        while scheduler.run_frame(|_| ticks += 1).unwrap() {}
        assert_eq!(ticks, 2);
        assert_eq!(scheduler.ticks(), 2);
    }

    #[test]
    fn cancelled_scheduler_ignores_further_frames() {
        let mut scheduler = FrameScheduler::new(immediate());
        let token = scheduler.start().unwrap();
        assert!(scheduler.run_frame(|_| {}).unwrap());
        scheduler.cancel(&token);
        assert!(!scheduler.run_frame(|_| panic!("tick after cancel")).unwrap());
        assert_eq!(scheduler.ticks(), 1);
    }

    #[test]
    fn start_reports_missing_frame_source() {
        let mut scheduler = FrameScheduler::new(Box::new(Unavailable("headless".into())));
        let err = scheduler.start().unwrap_err();
        assert!(matches!(err, VizError::FrameSourceUnavailable(_)));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn interval_source_sleeps_until_the_next_boundary() {
        let mut source = IntervalFrameSource::new(100);
        source.probe().unwrap();
        let first = source.wait_for_frame().unwrap();
        let second = source.wait_for_frame().unwrap();
        assert_eq!((first.index, second.index), (0, 1));
        assert!(second.at.duration_since(first.at) >= Duration::from_millis(10));
    }

    #[test]
    fn pacer_first_frame_is_immediate_then_spaced() {
        let mut pacer = FramePacer::new(50);
        let t0 = Instant::now();
        assert_eq!(pacer.remaining(t0), Duration::ZERO);
        let stamp = pacer.advance(t0);
        assert_eq!(stamp.index, 0);
        assert_eq!(pacer.remaining(t0), Duration::from_millis(20));
    }
}
