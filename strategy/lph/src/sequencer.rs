//! Execution Sequencer: turns one `HedgeAction` into ordered venue submissions.
//!
//! Each operation runs through a bounded retry state machine. Operations are
//! submitted strictly in order and the stop signal is only looked at between
//! them, never while one is in flight.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::error::HedgeError;
use crate::provider::{
    Clock, Confirmation, LpOperation, LpVenue, Notifier, PerpOperation, PerpVenue, Side,
    SubmitError, SubmitErrorKind,
};
use crate::state::HedgeState;
use crate::types::{AbortKind, ActionKind, DataSource, ExecutionOutcome, HedgeAction, HedgeEvent, Mode};

/// One submission of a plan.
#[derive(Debug, Clone, PartialEq)]
enum PlannedOp {
    Perp(PerpOperation),
    Lp(LpOperation),
}

impl fmt::Display for PlannedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedOp::Perp(op) => write!(f, "{}", op),
            PlannedOp::Lp(op) => write!(f, "{}", op),
        }
    }
}

/// Per-operation retry state.
#[derive(Debug, Clone, PartialEq)]
enum OpState {
    Pending,
    /// Attempt number about to run, starting at 2
    Retrying(u32),
    Succeeded(Confirmation),
    Aborted(AbortKind, HedgeError),
}

pub struct Sequencer {
    venue: Arc<dyn PerpVenue>,
    lp_venue: Option<Arc<dyn LpVenue>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: ExecutionConfig,
    cooldown_ms: i64,
    position_id: String,
    stop: watch::Receiver<bool>,
}

impl Sequencer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        venue: Arc<dyn PerpVenue>,
        lp_venue: Option<Arc<dyn LpVenue>>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: ExecutionConfig,
        cooldown_secs: u64,
        position_id: String,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            venue,
            lp_venue,
            notifier,
            clock,
            config,
            cooldown_ms: cooldown_ms(cooldown_secs),
            position_id,
            stop,
        }
    }

    pub(crate) fn reconfigure(&mut self, config: ExecutionConfig, cooldown_secs: u64, position_id: String) {
        self.config = config;
        self.cooldown_ms = cooldown_ms(cooldown_secs);
        self.position_id = position_id;
    }

    /// Applies `action` under `mode` and records the outcome in `state`.
    pub async fn apply(&self, action: &HedgeAction, state: &mut HedgeState, mode: Mode) -> ExecutionOutcome {
        if action.is_no_op() {
            return ExecutionOutcome::Skipped;
        }

        let outcome = match mode {
            Mode::Spectator => {
                info!(
                    kind = ?action.kind,
                    reason = ?action.reason,
                    current = action.assumed_perp_size,
                    target = action.target_perp_size,
                    "spectator: action simulated"
                );
                ExecutionOutcome::Simulated
            }
            Mode::Active => self.execute(action).await,
        };

        let now = self.clock.now_ms();
        let degraded = state.record_outcome(
            action,
            &outcome,
            now,
            self.cooldown_ms,
            self.config.max_consecutive_failures,
        );
        self.notifier.notify(&HedgeEvent::ActionOutcome {
            mode,
            action: action.clone(),
            outcome: outcome.clone(),
            timestamp: now,
        });
        if let Some(reason) = degraded {
            self.notifier.notify(&HedgeEvent::Degraded {
                reason,
                timestamp: now,
            });
        }
        outcome
    }

    async fn execute(&self, action: &HedgeAction) -> ExecutionOutcome {
        let plan = if action.touches_lp() {
            if !self.config.enable_lp_executions {
                return blocked("lp executions disabled");
            }
            if self.lp_venue.is_none() {
                return blocked("no lp venue configured");
            }
            self.lp_plan()
        } else {
            if let Err(outcome) = self.check_live_size(action).await {
                return outcome;
            }
            match self.perp_plan(action) {
                Some(plan) => plan,
                None => {
                    debug!(target = action.target_perp_size, "order quantity rounds to zero");
                    return ExecutionOutcome::Skipped;
                }
            }
        };
        self.run_plan(&plan, action).await
    }

    /// Idempotency guard: the live size must still be the one the action was computed against.
    async fn check_live_size(&self, action: &HedgeAction) -> Result<(), ExecutionOutcome> {
        let live = self
            .live_size()
            .await
            .map_err(|err| aborted(AbortKind::Stale, 0, err.to_string()))?;
        if (live - action.assumed_perp_size).abs() > self.config.stale_epsilon {
            warn!(
                assumed = action.assumed_perp_size,
                live, "perp size moved since decision, dropping action"
            );
            let err = HedgeError::StaleAction {
                assumed: action.assumed_perp_size,
                live,
            };
            return Err(aborted(AbortKind::Stale, 0, err.to_string()));
        }
        Ok(())
    }

    async fn live_size(&self) -> Result<f64, HedgeError> {
        match tokio::time::timeout(self.config.call_timeout(), self.venue.get_position()).await {
            Ok(Ok(position)) => Ok(position.size),
            Ok(Err(err)) => Err(HedgeError::DataUnavailable {
                origin: DataSource::PerpPosition,
                message: format!("{:#}", err),
            }),
            Err(_) => Err(HedgeError::DataUnavailable {
                origin: DataSource::PerpPosition,
                message: "live size read timed out".to_string(),
            }),
        }
    }

    /// Settles a market order whose previous attempt may have filled without an answer.
    ///
    /// `None` means the live size is still the assumed one and the order can be resent.
    async fn reconcile(&self, op: &PlannedOp, action: &HedgeAction) -> Option<OpState> {
        let PlannedOp::Perp(PerpOperation::PlaceMarket { side, quantity, .. }) = op else {
            return None;
        };
        let assumed = action.assumed_perp_size;
        let filled = match side {
            Side::Buy => assumed + quantity,
            Side::Sell => assumed - quantity,
        };
        let live = match self.live_size().await {
            Ok(live) => live,
            Err(err) => return Some(OpState::Aborted(AbortKind::Stale, err)),
        };
        if (live - filled).abs() <= self.config.stale_epsilon {
            info!(op = %op, live, "order filled before the failed answer, not resending");
            return Some(OpState::Succeeded(Confirmation {
                reference: format!("live size {}", live),
            }));
        }
        if (live - assumed).abs() > self.config.stale_epsilon {
            warn!(op = %op, assumed, live, "perp size moved during retries");
            return Some(OpState::Aborted(AbortKind::Stale, HedgeError::StaleAction { assumed, live }));
        }
        None
    }

    fn perp_plan(&self, action: &HedgeAction) -> Option<Vec<PlannedOp>> {
        let change = action.target_perp_size - action.assumed_perp_size;
        let quantity = utils::round_to_step(change.abs(), self.config.quantity_step);
        if quantity <= 0.0 {
            return None;
        }
        let side = if change > 0.0 { Side::Buy } else { Side::Sell };
        let reduce_only = matches!(action.kind, ActionKind::ClosePerp | ActionKind::DecreaseShort);

        let mut plan = Vec::with_capacity(2);
        if self.config.cancel_open_orders {
            plan.push(PlannedOp::Perp(PerpOperation::CancelOpenOrders));
        }
        plan.push(PlannedOp::Perp(PerpOperation::PlaceMarket {
            side,
            quantity,
            reduce_only,
        }));
        Some(plan)
    }

    fn lp_plan(&self) -> Vec<PlannedOp> {
        vec![
            PlannedOp::Lp(LpOperation::DecreaseLiquidity {
                position_id: self.position_id.clone(),
            }),
            PlannedOp::Lp(LpOperation::Collect {
                position_id: self.position_id.clone(),
            }),
        ]
    }

    async fn run_plan(&self, plan: &[PlannedOp], action: &HedgeAction) -> ExecutionOutcome {
        for (completed, op) in plan.iter().enumerate() {
            if *self.stop.borrow() {
                info!(completed, remaining = plan.len() - completed, "stop requested, sequence cancelled");
                return aborted(AbortKind::Cancelled, completed, "stop requested".to_string());
            }
            match self.submit_with_retry(op, action).await {
                OpState::Succeeded(confirmation) => {
                    info!(op = %op, reference = %confirmation.reference, "operation confirmed");
                }
                OpState::Aborted(kind, err) => {
                    warn!(op = %op, ?kind, error = %err, completed, "sequence aborted");
                    return aborted(kind, completed, err.to_string());
                }
                OpState::Pending | OpState::Retrying(_) => {
                    return aborted(AbortKind::Unknown, completed, "operation left unfinished".to_string());
                }
            }
        }
        ExecutionOutcome::Succeeded {
            operations: plan.len(),
        }
    }

    async fn submit_with_retry(&self, op: &PlannedOp, action: &HedgeAction) -> OpState {
        let backoff = self.config.backoff();
        let mut state = OpState::Pending;
        loop {
            let attempt = match state {
                OpState::Pending => 1,
                OpState::Retrying(n) => n,
                OpState::Succeeded(_) | OpState::Aborted(..) => return state,
            };

            let result = match tokio::time::timeout(self.config.call_timeout(), self.submit(op)).await {
                Ok(result) => result,
                Err(_) => Err(SubmitError::transient("call timed out")),
            };

            state = match result {
                Ok(confirmation) => OpState::Succeeded(confirmation),
                Err(err) => match err.kind {
                    SubmitErrorKind::Transient if attempt < backoff.max_attempts => {
                        let delay = backoff.delay_for(attempt);
                        warn!(
                            op = %op,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err.message,
                            "transient failure, retrying"
                        );
                        self.clock.sleep(delay).await;
                        match self.reconcile(op, action).await {
                            Some(settled) => settled,
                            None => OpState::Retrying(attempt + 1),
                        }
                    }
                    SubmitErrorKind::Transient => OpState::Aborted(
                        AbortKind::TransientExhausted,
                        HedgeError::ExecutionTransient(format!("{} attempts: {}", attempt, err.message)),
                    ),
                    SubmitErrorKind::Rejected => {
                        OpState::Aborted(AbortKind::Rejected, HedgeError::ExecutionRejected(err.message))
                    }
                    SubmitErrorKind::InsufficientMargin => OpState::Aborted(
                        AbortKind::InsufficientMargin,
                        HedgeError::ExecutionRejected(err.message),
                    ),
                    SubmitErrorKind::Unknown => {
                        OpState::Aborted(AbortKind::Unknown, HedgeError::ExecutionRejected(err.message))
                    }
                },
            };
        }
    }

    async fn submit(&self, op: &PlannedOp) -> Result<Confirmation, SubmitError> {
        debug!(op = %op, "submitting");
        match op {
            PlannedOp::Perp(op) => self.venue.submit(op).await,
            PlannedOp::Lp(op) => match &self.lp_venue {
                Some(venue) => venue.submit(op).await,
                None => Err(SubmitError::rejected("no lp venue configured")),
            },
        }
    }
}

fn cooldown_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn blocked(reason: &str) -> ExecutionOutcome {
    info!(reason, "lp action blocked");
    ExecutionOutcome::Blocked {
        reason: reason.to_string(),
    }
}

fn aborted(kind: AbortKind, completed: usize, message: String) -> ExecutionOutcome {
    ExecutionOutcome::Aborted {
        kind,
        completed,
        message,
    }
}
