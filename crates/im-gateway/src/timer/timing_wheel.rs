//! Hierarchical timing wheel
//!
//! Tens of thousands of connections each keep two heartbeat timers armed.
//! Tokio sleeps would work but cost a heap entry each; the wheel buckets timers
//! by tick instead and fires them from a single driver task. Cancelled timers
//! stay in their bucket until swept, so callers re-arm on expiry rather than on
//! every event.
//!
//! Level `L` spans `slots^(L+1)` ticks. A timer lands on the lowest level whose
//! span covers its remaining delay; when a higher level slot comes due its
//! timers cascade down. Delays beyond the top level park in the top level's
//! last slot and re-cascade until they fit.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

struct Entry {
    deadline: u64,
    cancelled: Arc<AtomicBool>,
    tx: oneshot::Sender<()>,
}

impl Entry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.tx.is_closed()
    }

    fn fire(self) {
        if !self.cancelled.load(Ordering::Acquire) {
            let _ = self.tx.send(());
        }
    }
}

struct WheelState {
    /// Current tick
    now: u64,
    /// Scheduled instant of the current tick
    ticked_at: Instant,
    /// `levels × slots` buckets
    buckets: Vec<Vec<Vec<Entry>>>,
    pending: usize,
}

/// Shared hierarchical timing wheel
pub struct TimingWheel {
    tick: Duration,
    slots: usize,
    levels: usize,
    state: Mutex<WheelState>,
    running: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TimingWheel {
    /// Create a stopped wheel
    ///
    /// `slots` is clamped to at least 2 and `levels` to at least 1.
    pub fn new(tick: Duration, slots: usize, levels: usize) -> Arc<Self> {
        let slots = slots.max(2);
        let levels = levels.max(1);
        let tick = tick.max(Duration::from_millis(1));

        Arc::new(Self {
            tick,
            slots,
            levels,
            state: Mutex::new(WheelState {
                now: 0,
                ticked_at: Instant::now(),
                buckets: (0..levels)
                    .map(|_| (0..slots).map(|_| Vec::new()).collect())
                    .collect(),
                pending: 0,
            }),
            running: AtomicBool::new(false),
            driver: Mutex::new(None),
        })
    }

    /// Tick duration
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Check if the driver task is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of timers not yet fired or swept
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Start the driver task
    ///
    /// Must be called within a tokio runtime. Starting a running wheel is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let tick = self.tick;
        let start = Instant::now();
        self.state.lock().ticked_at = start;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                let at = interval.tick().await;
                let Some(wheel) = weak.upgrade() else { break };
                if !wheel.is_running() {
                    break;
                }
                wheel.advance(at);
            }
        });

        *self.driver.lock() = Some(handle);
        tracing::debug!(
            tick_ms = self.tick.as_millis() as u64,
            slots = self.slots,
            levels = self.levels,
            "Timing wheel started"
        );
    }

    /// Stop the driver and drop every pending timer
    ///
    /// Tasks waiting on dropped timers never fire.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }

        let mut state = self.state.lock();
        for level in &mut state.buckets {
            for slot in level.iter_mut() {
                slot.clear();
            }
        }
        state.pending = 0;
        tracing::debug!("Timing wheel stopped");
    }

    /// Schedule a timer firing once after `delay`
    ///
    /// The delay is measured from the current tick and rounded up to whole
    /// ticks, so the timer never fires early. The minimum is one tick.
    pub fn after(&self, delay: Duration) -> TimerTask {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut state = self.state.lock();
        let since_tick = Instant::now().saturating_duration_since(state.ticked_at);
        let deadline = state.now + self.ticks_for(since_tick + delay);
        self.insert(
            &mut state,
            Entry {
                deadline,
                cancelled: Arc::clone(&cancelled),
                tx,
            },
        );

        TimerTask {
            rx,
            cancelled,
            done: false,
        }
    }

    fn ticks_for(&self, delay: Duration) -> u64 {
        let tick = self.tick.as_nanos().max(1);
        let ticks = delay.as_nanos().div_ceil(tick);
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }

    /// Span of one slot at `level`, in ticks
    fn unit(&self, level: usize) -> u64 {
        (self.slots as u64).saturating_pow(level as u32)
    }

    fn insert(&self, state: &mut WheelState, entry: Entry) {
        if entry.deadline <= state.now {
            entry.fire();
            return;
        }

        let remaining = entry.deadline - state.now;
        let slots = self.slots as u64;

        for level in 0..self.levels {
            let unit = self.unit(level);
            if remaining < unit.saturating_mul(slots) {
                let slot = ((entry.deadline / unit) % slots) as usize;
                state.buckets[level][slot].push(entry);
                state.pending += 1;
                return;
            }
        }

        // Beyond the top level: park in the slot that comes due last.
        let top = self.levels - 1;
        let unit = self.unit(top);
        let slot = ((state.now / unit + slots - 1) % slots) as usize;
        state.buckets[top][slot].push(entry);
        state.pending += 1;
    }

    /// Advance the wheel by one tick scheduled at `at`
    fn advance(&self, at: Instant) {
        let mut state = self.state.lock();
        state.now += 1;
        state.ticked_at = at;
        let now = state.now;
        let slots = self.slots as u64;

        for level in (1..self.levels).rev() {
            let unit = self.unit(level);
            if now % unit != 0 {
                continue;
            }
            let slot = ((now / unit) % slots) as usize;
            let entries = std::mem::take(&mut state.buckets[level][slot]);
            state.pending -= entries.len();
            for entry in entries {
                if !entry.is_cancelled() {
                    self.insert(&mut state, entry);
                }
            }
        }

        let slot = (now % slots) as usize;
        let entries = std::mem::take(&mut state.buckets[0][slot]);
        state.pending -= entries.len();
        for entry in entries {
            if entry.deadline <= now {
                entry.fire();
            } else if !entry.is_cancelled() {
                self.insert(&mut state, entry);
            }
        }
    }
}

impl Drop for TimingWheel {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TimingWheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingWheel")
            .field("tick", &self.tick)
            .field("slots", &self.slots)
            .field("levels", &self.levels)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Handle to a scheduled timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerTask {
    rx: oneshot::Receiver<()>,
    cancelled: Arc<AtomicBool>,
    done: bool,
}

impl TimerTask {
    /// Wait until the timer fires
    ///
    /// Resolves at most once; afterwards, or if the timer was cancelled or its
    /// wheel stopped, it never resolves. Cancel-safe inside `select!`.
    pub async fn fired(&mut self) {
        if self.done || self.cancelled.load(Ordering::Acquire) {
            return std::future::pending().await;
        }
        if (&mut self.rx).await.is_ok() {
            self.done = true;
        } else {
            self.done = true;
            std::future::pending::<()>().await;
        }
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if the timer was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TimerTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
