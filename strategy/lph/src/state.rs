//! Operating State Tracker.
//!
//! `HedgeState` is owned by the cycle runner and threaded explicitly through
//! each cycle. Only the sequencer and explicit signals (degrade, clear, mode
//! requests) mutate it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::types::{ActionRecord, DegradedReason, ExecutionOutcome, HedgeAction, Mode, PositionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataHealth {
    Healthy,
    Degraded(DegradedReason),
}

/// Bounded rolling window of recent snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    items: VecDeque<PositionSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, snapshot: PositionSnapshot) {
        if self.capacity == 0 {
            return;
        }
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&PositionSnapshot> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSnapshot> {
        self.items.iter()
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.items.len() > capacity {
            self.items.pop_front();
        }
    }
}

/// Mutable operating state of the hedger.
#[derive(Debug, Clone)]
pub struct HedgeState {
    mode: Mode,
    pending_mode: Option<Mode>,
    health: DataHealth,
    /// Last time a degradation signal was received
    last_degraded_at: Option<i64>,
    cooldown_until: i64,
    last_action: Option<ActionRecord>,
    consecutive_failures: u32,
    recovery_quiet_period_ms: i64,
    history: SnapshotHistory,
}

impl HedgeState {
    pub fn new(mode: Mode, tracker: &TrackerConfig) -> Self {
        Self {
            mode,
            pending_mode: None,
            health: DataHealth::Healthy,
            last_degraded_at: None,
            cooldown_until: 0,
            last_action: None,
            consecutive_failures: 0,
            recovery_quiet_period_ms: secs_to_ms(tracker.recovery_quiet_period_secs),
            history: SnapshotHistory::new(tracker.history_capacity),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pending_mode(&self) -> Option<Mode> {
        self.pending_mode
    }

    pub fn data_health(&self) -> DataHealth {
        self.health
    }

    pub fn is_healthy(&self) -> bool {
        self.health == DataHealth::Healthy
    }

    pub fn cooldown_until(&self) -> i64 {
        self.cooldown_until
    }

    pub fn last_action(&self) -> Option<&ActionRecord> {
        self.last_action.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Queues a mode change; it takes effect at the start of the next cycle.
    pub fn request_mode(&mut self, mode: Mode) {
        self.pending_mode = Some(mode);
    }

    /// Applies a queued mode change. Returns `(from, to)` when the mode changed.
    pub fn begin_cycle(&mut self) -> Option<(Mode, Mode)> {
        let requested = self.pending_mode.take()?;
        if requested == self.mode {
            return None;
        }
        let from = self.mode;
        self.mode = requested;
        info!(%from, to = %requested, "mode changed");
        Some((from, requested))
    }

    /// Records a degradation signal. Returns true when the state was healthy before.
    ///
    /// A reason that needs an operator replaces one that could heal on its own.
    pub fn degrade(&mut self, reason: DegradedReason, now: i64) -> bool {
        self.last_degraded_at = Some(now);
        match self.health {
            DataHealth::Healthy => {
                warn!(%reason, "hedging degraded");
                self.health = DataHealth::Degraded(reason);
                true
            }
            DataHealth::Degraded(current) => {
                if current.auto_recoverable() && !reason.auto_recoverable() {
                    warn!(from = %current, to = %reason, "degradation escalated");
                    self.health = DataHealth::Degraded(reason);
                } else if current.auto_recoverable() && current != reason {
                    self.health = DataHealth::Degraded(reason);
                }
                false
            }
        }
    }

    /// Stores a valid snapshot and recovers data health once the quiet period has passed.
    ///
    /// Returns true on recovery.
    pub fn record_fresh_snapshot(&mut self, snapshot: PositionSnapshot, now: i64) -> bool {
        self.history.push(snapshot);
        let DataHealth::Degraded(reason) = self.health else {
            return false;
        };
        if !reason.auto_recoverable() {
            return false;
        }
        let quiet = self
            .last_degraded_at
            .map_or(true, |at| now - at >= self.recovery_quiet_period_ms);
        if quiet {
            info!(%reason, "data healthy again");
            self.health = DataHealth::Healthy;
        }
        quiet
    }

    /// Operator reset: healthy again, failure count zeroed. Returns true if it was degraded.
    pub fn clear(&mut self) -> bool {
        self.consecutive_failures = 0;
        self.last_degraded_at = None;
        let was_degraded = !self.is_healthy();
        if was_degraded {
            info!("degradation cleared by operator");
        }
        self.health = DataHealth::Healthy;
        was_degraded
    }

    pub fn apply_tracker_config(&mut self, tracker: &TrackerConfig) {
        self.recovery_quiet_period_ms = secs_to_ms(tracker.recovery_quiet_period_secs);
        self.history.set_capacity(tracker.history_capacity);
    }

    /// Bookkeeping after the sequencer has handled an action.
    ///
    /// Returns the degradation newly entered, if the failure ceiling was reached.
    pub(crate) fn record_outcome(
        &mut self,
        action: &HedgeAction,
        outcome: &ExecutionOutcome,
        now: i64,
        cooldown_ms: i64,
        max_consecutive_failures: u32,
    ) -> Option<DegradedReason> {
        self.last_action = Some(ActionRecord {
            action: action.clone(),
            outcome: outcome.clone(),
            timestamp: now,
        });
        if outcome.is_success() {
            self.consecutive_failures = 0;
            self.cooldown_until = now + cooldown_ms;
            return None;
        }
        if !outcome.is_failure() {
            return None;
        }
        self.consecutive_failures += 1;
        warn!(
            failures = self.consecutive_failures,
            ceiling = max_consecutive_failures,
            "execution sequence failed"
        );
        if self.consecutive_failures >= max_consecutive_failures
            && self.degrade(DegradedReason::ExecutionFailing, now)
        {
            return Some(DegradedReason::ExecutionFailing);
        }
        None
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AbortKind, ActionKind, DataSource, ReasonCode};

    fn tracker() -> TrackerConfig {
        TrackerConfig {
            recovery_quiet_period_secs: 60,
            history_capacity: 3,
        }
    }

    fn snapshot(ts: i64) -> PositionSnapshot {
        PositionSnapshot {
            timestamp: ts,
            lp_lower_price: 1800.0,
            lp_upper_price: 2200.0,
            lp_liquidity: 480.0,
            lp_token_a_amount: 0.5,
            lp_token_b_amount: 1000.0,
            perp_size: -0.5,
            perp_entry_price: 2000.0,
            spot_price: 2000.0,
            funding_rate: 0.0,
        }
    }

    fn action() -> HedgeAction {
        HedgeAction {
            kind: ActionKind::IncreaseShort,
            target_perp_size: -1.0,
            assumed_perp_size: -0.5,
            reason: ReasonCode::DeltaAboveBand,
        }
    }

    fn aborted(kind: AbortKind) -> ExecutionOutcome {
        ExecutionOutcome::Aborted {
            kind,
            completed: 0,
            message: "x".to_string(),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = HedgeState::new(Mode::Spectator, &tracker());
        for ts in 0..5 {
            state.record_fresh_snapshot(snapshot(ts), ts);
        }
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.history().latest().map(|s| s.timestamp), Some(4));
        assert_eq!(state.history().iter().next().map(|s| s.timestamp), Some(2));
    }

    #[test]
    fn test_data_degradation_recovers_after_quiet_period() {
        let mut state = HedgeState::new(Mode::Active, &tracker());
        let reason = DegradedReason::DataUnavailable(DataSource::Funding);
        assert!(state.degrade(reason, 1_000));
        assert!(!state.is_healthy());

        assert!(!state.record_fresh_snapshot(snapshot(30_000), 30_000));
        assert_eq!(state.data_health(), DataHealth::Degraded(reason));

        // a second signal restarts the quiet period
        assert!(!state.degrade(reason, 40_000));
        assert!(!state.record_fresh_snapshot(snapshot(61_000), 61_000));

        assert!(state.record_fresh_snapshot(snapshot(100_000), 100_000));
        assert!(state.is_healthy());
    }

    #[test]
    fn test_execution_failing_needs_operator() {
        let mut state = HedgeState::new(Mode::Active, &tracker());
        state.degrade(DegradedReason::InvalidSnapshot, 0);
        state.degrade(DegradedReason::ExecutionFailing, 0);
        assert_eq!(
            state.data_health(),
            DataHealth::Degraded(DegradedReason::ExecutionFailing)
        );

        assert!(!state.record_fresh_snapshot(snapshot(1_000_000), 1_000_000));
        assert!(!state.is_healthy());

        assert!(state.clear());
        assert!(state.is_healthy());
    }

    #[test]
    fn test_mode_change_is_queued_until_next_cycle() {
        let mut state = HedgeState::new(Mode::Spectator, &tracker());
        state.request_mode(Mode::Active);
        assert_eq!(state.mode(), Mode::Spectator);
        assert_eq!(state.begin_cycle(), Some((Mode::Spectator, Mode::Active)));
        assert_eq!(state.mode(), Mode::Active);
        assert_eq!(state.begin_cycle(), None);

        state.request_mode(Mode::Active);
        assert_eq!(state.begin_cycle(), None);
    }

    #[test]
    fn test_success_sets_cooldown_and_resets_failures() {
        let mut state = HedgeState::new(Mode::Active, &tracker());
        state.record_outcome(&action(), &aborted(AbortKind::Rejected), 10, 5_000, 3);
        assert_eq!(state.consecutive_failures(), 1);

        let ok = ExecutionOutcome::Succeeded { operations: 2 };
        assert_eq!(state.record_outcome(&action(), &ok, 20, 5_000, 3), None);
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.cooldown_until(), 5_020);
        assert_eq!(state.last_action().map(|r| r.timestamp), Some(20));
    }

    #[test]
    fn test_failure_ceiling_degrades_once() {
        let mut state = HedgeState::new(Mode::Active, &tracker());
        let failed = aborted(AbortKind::TransientExhausted);
        assert_eq!(state.record_outcome(&action(), &failed, 1, 0, 3), None);
        assert_eq!(state.record_outcome(&action(), &failed, 2, 0, 3), None);
        assert_eq!(
            state.record_outcome(&action(), &failed, 3, 0, 3),
            Some(DegradedReason::ExecutionFailing)
        );
        assert_eq!(state.record_outcome(&action(), &failed, 4, 0, 3), None);
        assert_eq!(state.consecutive_failures(), 4);
    }

    #[test]
    fn test_stale_and_cancelled_do_not_count() {
        let mut state = HedgeState::new(Mode::Active, &tracker());
        state.record_outcome(&action(), &aborted(AbortKind::Stale), 1, 0, 1);
        state.record_outcome(&action(), &aborted(AbortKind::Cancelled), 2, 0, 1);
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.is_healthy());
        assert_eq!(state.cooldown_until(), 0);
    }
}
