//! The single proactive-refresh timer.
//!
//! The scheduler never calls into the session manager itself. When a timer
//! fires it sends the generation it was armed for down a channel, and the
//! manager's refresh worker decides what to do with it.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Buffer size for the tick channel. Only one timer is ever pending, so a
/// handful of slots is plenty.
pub const TICK_CHANNEL_SIZE: usize = 4;

/// How an arm request treats a fire time that is already behind us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmPolicy {
    /// Report [`Arming::Due`] so the caller refreshes right away
    RefreshIfDue,
    /// Always schedule, waiting at least this long
    AtLeast(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arming {
    /// A timer is pending and fires at this instant (epoch millis)
    Scheduled { fire_at: i64 },
    /// The fire time has passed; no timer was armed
    Due,
    /// The session moved on since the caller read the generation
    Stale,
}

impl Arming {
    pub fn is_due(&self) -> bool {
        matches!(self, Arming::Due)
    }
}

struct PendingTimer {
    handle: JoinHandle<()>,
    fire_at: i64,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<PendingTimer>,
}

impl SchedulerState {
    fn cancel_pending(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.handle.abort();
        }
    }
}

pub struct RefreshScheduler {
    state: Mutex<SchedulerState>,
    ticks: mpsc::Sender<u64>,
}

impl RefreshScheduler {
    /// Create a scheduler and the receiving end its timers report to
    pub fn new() -> (Self, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel(TICK_CHANNEL_SIZE);
        let scheduler = Self {
            state: Mutex::new(SchedulerState::default()),
            ticks: tx,
        };
        (scheduler, rx)
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generation of the current session epoch
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a new session epoch: cancel any pending timer and invalidate
    /// every generation handed out before.
    pub fn advance_generation(&self) -> u64 {
        let mut state = self.lock();
        state.cancel_pending();
        state.generation += 1;
        debug!(generation = state.generation, "Session generation advanced");
        state.generation
    }

    /// Epoch millis at which the pending timer fires, if one is pending
    pub fn scheduled_at(&self) -> Option<i64> {
        self.lock()
            .pending
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.fire_at)
    }

    pub fn is_armed(&self) -> bool {
        self.scheduled_at().is_some()
    }

    /// Replace the pending timer with one firing at `fire_at`.
    ///
    /// Does nothing and returns [`Arming::Stale`] if `generation` is no
    /// longer current.
    pub fn arm(&self, generation: u64, fire_at: i64, now: i64, policy: ArmPolicy) -> Arming {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(generation, current = state.generation, "Not arming refresh for a stale generation");
            return Arming::Stale;
        }
        state.cancel_pending();

        let remaining = u64::try_from(fire_at.saturating_sub(now)).unwrap_or(0);
        let (delay, fire_at) = match policy {
            ArmPolicy::RefreshIfDue if remaining == 0 => return Arming::Due,
            ArmPolicy::RefreshIfDue => (Duration::from_millis(remaining), fire_at),
            ArmPolicy::AtLeast(floor) => {
                let delay = Duration::from_millis(remaining).max(floor);
                let fire_at = now.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
                (delay, fire_at)
            }
        };

        let tx = self.ticks.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(generation, "Refresh timer fired");
            let _ = tx.send(generation).await;
        });

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(generation, fire_at, delay_ms, "Refresh timer armed");
        state.pending = Some(PendingTimer { handle, fire_at });
        Arming::Scheduled { fire_at }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.lock().cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    #[tokio::test(start_paused = true)]
    async fn test_timer_sends_generation_when_it_fires() {
        let (scheduler, mut rx) = RefreshScheduler::new();
        let generation = scheduler.generation();

        let arming = scheduler.arm(generation, HOUR, 0, ArmPolicy::RefreshIfDue);
        assert_eq!(arming, Arming::Scheduled { fire_at: HOUR });
        assert_eq!(scheduler.scheduled_at(), Some(HOUR));

        let tick = rx.recv().await.expect("timer should fire");
        assert_eq!(tick, generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_fire_time_is_due_and_arms_nothing() {
        let (scheduler, _rx) = RefreshScheduler::new();
        let generation = scheduler.generation();
        scheduler.arm(generation, 10 * HOUR, 0, ArmPolicy::RefreshIfDue);

        let arming = scheduler.arm(generation, 5, 10, ArmPolicy::RefreshIfDue);
        assert!(arming.is_due());
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_least_policy_applies_floor() {
        let (scheduler, _rx) = RefreshScheduler::new();
        let generation = scheduler.generation();
        let arming = scheduler.arm(generation, 0, 1_000, ArmPolicy::AtLeast(Duration::from_secs(60)));
        assert_eq!(arming, Arming::Scheduled { fire_at: 61_000 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_pending_timer() {
        let (scheduler, mut rx) = RefreshScheduler::new();
        let generation = scheduler.generation();
        scheduler.arm(generation, HOUR, 0, ArmPolicy::RefreshIfDue);
        scheduler.arm(generation, 2 * HOUR, 0, ArmPolicy::RefreshIfDue);
        assert_eq!(scheduler.scheduled_at(), Some(2 * HOUR));

        assert_eq!(rx.recv().await, Some(generation));
        // Only the second timer was alive, so nothing else arrives.
        tokio::time::sleep(Duration::from_secs(10 * 3600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advancing_generation_cancels_and_blocks_stale_arms() {
        let (scheduler, mut rx) = RefreshScheduler::new();
        let old = scheduler.generation();
        scheduler.arm(old, HOUR, 0, ArmPolicy::RefreshIfDue);

        let new = scheduler.advance_generation();
        assert_ne!(old, new);
        assert!(!scheduler.is_armed());
        assert_eq!(scheduler.arm(old, HOUR, 0, ArmPolicy::RefreshIfDue), Arming::Stale);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert!(rx.try_recv().is_err());
    }
}
