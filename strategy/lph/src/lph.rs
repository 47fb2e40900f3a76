//! LP Hedging strategy: the per-cycle runner.
//!
//! One cycle is snapshot, exposure, decision, execution and state update, in
//! that order. Cycles never overlap (`run_cycle` takes `&mut self`); mode
//! requests and config reloads only land between cycles.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::LPHStrategyConfig;
use crate::error::HedgeError;
use crate::exposure;
use crate::policy;
use crate::provider::{Clock, LpDataProvider, LpVenue, Notifier, PerpVenue, PriceOracle};
use crate::sequencer::Sequencer;
use crate::snapshot::SnapshotBuilder;
use crate::state::HedgeState;
use crate::types::{
    CycleReport, DegradedReason, ExecutionOutcome, HedgeAction, HedgeEvent, Mode,
    MonitoringSnapshot, ReasonCode,
};

/// External collaborators of the strategy.
#[derive(Clone)]
pub struct Collaborators {
    pub lp_data: Arc<dyn LpDataProvider>,
    pub perp: Arc<dyn PerpVenue>,
    pub oracle: Arc<dyn PriceOracle>,
    /// Only needed when LP executions are enabled
    pub lp_venue: Option<Arc<dyn LpVenue>>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// LP Hedging strategy
///
/// Keeps the net delta of an LP position and a perp short inside a dead-band.
pub struct LPHStrategy {
    config: LPHStrategyConfig,
    state: HedgeState,
    snapshots: SnapshotBuilder,
    sequencer: Sequencer,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl LPHStrategy {
    /// Creates a new `LPHStrategy` after validating `config`.
    ///
    /// `stop` is observed by the sequencer between operations.
    pub fn new(
        config: LPHStrategyConfig,
        collaborators: Collaborators,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, HedgeError> {
        config.validate()?;
        let Collaborators {
            lp_data,
            perp,
            oracle,
            lp_venue,
            notifier,
            clock,
        } = collaborators;

        let snapshots = SnapshotBuilder::new(
            lp_data,
            Arc::clone(&perp),
            oracle,
            Arc::clone(&clock),
            config.execution.call_timeout(),
            config.symbol.clone(),
            config.position_id.clone(),
        );
        let sequencer = Sequencer::new(
            perp,
            lp_venue,
            Arc::clone(&notifier),
            Arc::clone(&clock),
            config.execution.clone(),
            config.policy.cooldown_secs,
            config.position_id.clone(),
            stop,
        );
        let state = HedgeState::new(config.mode, &config.tracker);
        info!(mode = %config.mode, symbol = %config.symbol, position = %config.position_id, "strategy ready");

        Ok(Self {
            config,
            state,
            snapshots,
            sequencer,
            notifier,
            clock,
        })
    }

    pub fn config(&self) -> &LPHStrategyConfig {
        &self.config
    }

    pub fn state(&self) -> &HedgeState {
        &self.state
    }

    /// Queues a mode change for the next cycle.
    pub fn request_mode(&mut self, mode: Mode) {
        info!(%mode, "mode change requested");
        self.state.request_mode(mode);
    }

    /// Operator hold: no adjustments until [`LPHStrategy::clear_degraded`].
    pub fn hold(&mut self) {
        let now = self.clock.now_ms();
        if self.state.degrade(DegradedReason::Manual, now) {
            self.notifier.notify(&HedgeEvent::Degraded {
                reason: DegradedReason::Manual,
                timestamp: now,
            });
        }
    }

    /// Operator reset of any degradation.
    pub fn clear_degraded(&mut self) {
        if self.state.clear() {
            self.notifier.notify(&HedgeEvent::Recovered {
                timestamp: self.clock.now_ms(),
            });
        }
    }

    /// Swaps in a new configuration. A changed mode is queued like an operator request.
    pub fn reload(&mut self, config: LPHStrategyConfig) -> Result<(), HedgeError> {
        config.validate()?;
        self.snapshots.reconfigure(
            config.execution.call_timeout(),
            config.symbol.clone(),
            config.position_id.clone(),
        );
        self.sequencer.reconfigure(
            config.execution.clone(),
            config.policy.cooldown_secs,
            config.position_id.clone(),
        );
        self.state.apply_tracker_config(&config.tracker);
        if config.mode != self.config.mode {
            self.state.request_mode(config.mode);
        }
        info!(symbol = %config.symbol, "configuration reloaded");
        self.config = config;
        Ok(())
    }

    /// Reads a fresh snapshot and its exposure without deciding anything.
    pub async fn status(&self) -> Result<MonitoringSnapshot, HedgeError> {
        let snapshot = self.snapshots.build().await?;
        let exposure = exposure::compute(&snapshot);
        Ok(MonitoringSnapshot { snapshot, exposure })
    }

    /// Runs one full decision cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        if let Some((from, to)) = self.state.begin_cycle() {
            self.notifier.notify(&HedgeEvent::ModeChanged {
                from,
                to,
                timestamp: self.clock.now_ms(),
            });
        }
        let mode = self.state.mode();

        let snapshot = match self.snapshots.build().await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.data_failure(mode, err),
        };
        if self
            .state
            .record_fresh_snapshot(snapshot.clone(), self.clock.now_ms())
        {
            self.notifier.notify(&HedgeEvent::Recovered {
                timestamp: self.clock.now_ms(),
            });
        }

        let exposure = exposure::compute(&snapshot);
        let action = policy::decide(&exposure, &self.state, &self.config.policy);
        info!(
            %mode,
            kind = ?action.kind,
            reason = ?action.reason,
            net_delta = exposure.net_delta,
            delta_pct = exposure.delta_pct,
            perp = exposure.perp_size,
            target = action.target_perp_size,
            in_range = exposure.in_range,
            "hedge decision"
        );

        let outcome = self.sequencer.apply(&action, &mut self.state, mode).await;
        CycleReport {
            mode,
            monitoring: Some(MonitoringSnapshot { snapshot, exposure }),
            action,
            outcome,
        }
    }

    fn data_failure(&mut self, mode: Mode, err: HedgeError) -> CycleReport {
        warn!(error = %err, "cycle skipped");
        let now = self.clock.now_ms();
        if let Some(reason) = err.degraded_reason() {
            if self.state.degrade(reason, now) {
                self.notifier.notify(&HedgeEvent::Degraded {
                    reason,
                    timestamp: now,
                });
            }
        }
        let last_perp = self
            .state
            .history()
            .latest()
            .map(|s| s.perp_size)
            .unwrap_or_default();
        CycleReport {
            mode,
            monitoring: None,
            action: HedgeAction::no_op(ReasonCode::DataDegraded, last_perp),
            outcome: ExecutionOutcome::Skipped,
        }
    }
}
