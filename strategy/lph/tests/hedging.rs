mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use lph::provider::{Clock, LpOperation, LpPosition, PerpOperation, Side, SubmitErrorKind};
use lph::{
    AbortKind, ActionKind, DataHealth, DataSource, DegradedReason, ExecutionConfig, ExecutionOutcome,
    HedgeAction, HedgeEvent, HedgeState, Mode, ReasonCode, Sequencer, TrackerConfig,
};
use tokio::sync::watch;

fn degraded_events(events: &[HedgeEvent]) -> Vec<DegradedReason> {
    events
        .iter()
        .filter_map(|e| match e {
            HedgeEvent::Degraded { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

fn sequencer(
    venue: Arc<FakeVenue>,
    lp_venue: Option<Arc<FakeLpVenue>>,
    notifier: Arc<RecordingNotifier>,
    enable_lp: bool,
    stop: watch::Receiver<bool>,
) -> Sequencer {
    let mut execution = config(Mode::Active).execution;
    execution.enable_lp_executions = enable_lp;
    Sequencer::new(
        venue,
        lp_venue.map(|v| v as Arc<dyn lph::provider::LpVenue>),
        notifier,
        Arc::new(FakeClock::new(START_MS)),
        execution,
        300,
        "42".to_string(),
        stop,
    )
}

/// Sequencer that only places the market order, with three attempts per operation.
fn market_sequencer(
    venue: Arc<FakeVenue>,
    clock: Arc<FakeClock>,
    configure: impl FnOnce(&mut ExecutionConfig),
) -> Sequencer {
    let mut execution = config(Mode::Active).execution;
    execution.cancel_open_orders = false;
    execution.max_attempts = 3;
    configure(&mut execution);
    let (_stop, stop_rx) = watch::channel(false);
    Sequencer::new(
        venue,
        None,
        Arc::new(RecordingNotifier::default()),
        clock,
        execution,
        300,
        "42".to_string(),
        stop_rx,
    )
}

fn increase_short(from: f64, to: f64) -> HedgeAction {
    HedgeAction {
        kind: ActionKind::IncreaseShort,
        target_perp_size: to,
        assumed_perp_size: from,
        reason: ReasonCode::DeltaAboveBand,
    }
}

#[tokio::test]
async fn test_hedged_mid_range_is_no_op() {
    let mut h = Harness::new(config(Mode::Active), -0.5);
    let report = h.strategy.run_cycle().await;

    let exposure = &report.monitoring.as_ref().unwrap().exposure;
    assert!(exposure.net_delta.abs() < 1e-9);
    assert_eq!(report.action.kind, ActionKind::NoOp);
    assert_eq!(report.action.reason, ReasonCode::WithinBand);
    assert_eq!(report.outcome, ExecutionOutcome::Skipped);
    assert!(h.venue.submitted().is_empty());
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn test_top_of_range_in_spectator_notifies_without_submitting() {
    let mut h = Harness::new(config(Mode::Spectator), -0.5);
    h.oracle.set(Some(2200.0));
    let report = h.strategy.run_cycle().await;

    let exposure = &report.monitoring.as_ref().unwrap().exposure;
    assert!((exposure.net_delta + 0.5).abs() < 1e-9);
    assert_eq!(report.action.kind, ActionKind::DecreaseShort);
    assert_eq!(report.action.reason, ReasonCode::DeltaBelowBand);
    assert!(report.action.target_perp_size > -0.5 && report.action.target_perp_size < 0.0);
    assert_eq!(report.outcome, ExecutionOutcome::Simulated);

    assert!(h.venue.submitted().is_empty());
    assert_eq!(h.venue.size(), -0.5);
    let events = h.notifier.events();
    assert!(matches!(
        events.as_slice(),
        [HedgeEvent::ActionOutcome { mode: Mode::Spectator, outcome: ExecutionOutcome::Simulated, .. }]
    ));
    // simulated actions leave no cooldown
    assert_eq!(h.strategy.state().cooldown_until(), 0);
    assert!(h.strategy.state().last_action().is_some());
}

#[tokio::test]
async fn test_active_adjustment_then_cooldown() {
    let mut h = Harness::new(config(Mode::Active), -0.5);
    h.oracle.set(Some(2200.0));
    let report = h.strategy.run_cycle().await;

    assert_eq!(report.outcome, ExecutionOutcome::Succeeded { operations: 2 });
    let submitted = h.venue.submitted();
    assert_eq!(submitted[0], PerpOperation::CancelOpenOrders);
    match &submitted[1] {
        PerpOperation::PlaceMarket {
            side,
            quantity,
            reduce_only,
        } => {
            assert_eq!(*side, Side::Buy);
            assert!(*reduce_only);
            assert!((quantity - 0.476).abs() < 1e-9, "quantity {quantity}");
        }
        other => panic!("unexpected operation {other:?}"),
    }
    assert!((h.venue.size() + 0.024).abs() < 1e-9);

    // back to mid range: far out of band, but cooling down
    h.oracle.set(Some(2000.0));
    let report = h.strategy.run_cycle().await;
    assert_eq!(report.action.reason, ReasonCode::Cooldown);
    assert_eq!(h.venue.submitted().len(), 2);
}

#[tokio::test]
async fn test_funding_extreme_blocks_adjustment() {
    let mut h = Harness::new(config(Mode::Active), 0.0);
    h.venue.set_funding(-0.01);
    let report = h.strategy.run_cycle().await;

    assert!(report.monitoring.as_ref().unwrap().exposure.delta_pct > 0.05);
    assert_eq!(report.action.kind, ActionKind::NoOp);
    assert_eq!(report.action.reason, ReasonCode::FundingExtreme);
    assert!(h.venue.submitted().is_empty());
}

#[tokio::test]
async fn test_duplicate_action_is_stale() {
    let venue = Arc::new(FakeVenue::with_size(-0.5));
    let notifier = Arc::new(RecordingNotifier::default());
    let (_stop, stop_rx) = watch::channel(false);
    let seq = sequencer(venue.clone(), None, notifier, false, stop_rx);
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());
    let action = increase_short(-0.5, -1.0);

    let first = seq.apply(&action, &mut state, Mode::Active).await;
    assert_eq!(first, ExecutionOutcome::Succeeded { operations: 2 });
    assert!((venue.size() + 1.0).abs() < 1e-9);

    let second = seq.apply(&action, &mut state, Mode::Active).await;
    assert!(matches!(second, ExecutionOutcome::Aborted { kind: AbortKind::Stale, completed: 0, .. }));
    if let ExecutionOutcome::Aborted { message, .. } = &second {
        assert!(message.starts_with("stale action"), "{message}");
    }
    assert_eq!(venue.submitted().len(), 2);
    assert_eq!(state.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_three_exhausted_sequences_degrade_execution() {
    let mut h = Harness::new(config(Mode::Active), 0.0);
    // two attempts per sequence, three sequences
    h.venue.script_failures([SubmitErrorKind::Transient; 6]);

    for cycle in 1..=3 {
        let report = h.strategy.run_cycle().await;
        assert_eq!(report.action.kind, ActionKind::IncreaseShort);
        assert!(
            matches!(report.outcome, ExecutionOutcome::Aborted { kind: AbortKind::TransientExhausted, .. }),
            "cycle {cycle}: {:?}",
            report.outcome
        );
    }
    assert_eq!(
        h.strategy.state().data_health(),
        DataHealth::Degraded(DegradedReason::ExecutionFailing)
    );
    assert_eq!(degraded_events(&h.notifier.events()), vec![DegradedReason::ExecutionFailing]);
    // one backoff delay of 100ms per sequence
    assert_eq!(h.clock.now_ms(), START_MS + 300);

    let report = h.strategy.run_cycle().await;
    assert_eq!(report.action.kind, ActionKind::NoOp);
    assert_eq!(report.action.reason, ReasonCode::DataDegraded);
    assert!(h.venue.submitted().is_empty());

    h.strategy.clear_degraded();
    assert!(h.strategy.state().is_healthy());
    assert_eq!(h.strategy.run_cycle().await.outcome, ExecutionOutcome::Succeeded { operations: 2 });
}

#[tokio::test]
async fn test_rejection_aborts_without_retry() {
    let mut h = Harness::new(config(Mode::Active), 0.0);
    h.venue.script_failures([SubmitErrorKind::Rejected]);
    let report = h.strategy.run_cycle().await;

    assert!(matches!(report.outcome, ExecutionOutcome::Aborted { kind: AbortKind::Rejected, completed: 0, .. }));
    assert_eq!(h.clock.now_ms(), START_MS);
    assert_eq!(h.strategy.state().consecutive_failures(), 1);
    assert!(h.strategy.state().is_healthy());
}

#[tokio::test]
async fn test_stop_signal_is_honoured_between_operations() {
    let venue = Arc::new(FakeVenue::with_size(-0.5));
    let (stop_tx, stop_rx) = watch::channel(false);
    venue.stop_after_first(stop_tx);
    let seq = sequencer(venue.clone(), None, Arc::new(RecordingNotifier::default()), false, stop_rx);
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());

    let outcome = seq.apply(&increase_short(-0.5, -1.0), &mut state, Mode::Active).await;
    assert!(matches!(outcome, ExecutionOutcome::Aborted { kind: AbortKind::Cancelled, completed: 1, .. }));
    assert_eq!(venue.submitted(), vec![PerpOperation::CancelOpenOrders]);
    assert_eq!(venue.size(), -0.5);
    assert_eq!(state.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_lp_actions_are_gated() {
    let venue = Arc::new(FakeVenue::with_size(0.0));
    let lp_venue = Arc::new(FakeLpVenue::default());
    let action = HedgeAction {
        kind: ActionKind::AdjustLp,
        target_perp_size: 0.0,
        assumed_perp_size: 0.0,
        reason: ReasonCode::RangeExit,
    };

    let (_stop, stop_rx) = watch::channel(false);
    let notifier = Arc::new(RecordingNotifier::default());
    let gated = sequencer(venue.clone(), Some(lp_venue.clone()), notifier.clone(), false, stop_rx.clone());
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());
    let outcome = gated.apply(&action, &mut state, Mode::Active).await;
    assert!(matches!(outcome, ExecutionOutcome::Blocked { .. }));
    assert!(lp_venue.submitted().is_empty());
    assert_eq!(notifier.events().len(), 1);

    let enabled = sequencer(venue.clone(), Some(lp_venue.clone()), notifier, true, stop_rx);
    let outcome = enabled.apply(&action, &mut state, Mode::Active).await;
    assert_eq!(outcome, ExecutionOutcome::Succeeded { operations: 2 });
    assert_eq!(
        lp_venue.submitted(),
        vec![
            LpOperation::DecreaseLiquidity { position_id: "42".to_string() },
            LpOperation::Collect { position_id: "42".to_string() },
        ]
    );
    assert!(venue.submitted().is_empty());
}

#[tokio::test]
async fn test_range_exit_reaches_sequencer_blocked_by_default() {
    let mut cfg = config(Mode::Active);
    cfg.policy.recenter_lp_on_range_exit = true;
    let mut h = Harness::new(cfg, 0.0);
    h.oracle.set(Some(2300.0));
    let report = h.strategy.run_cycle().await;

    assert_eq!(report.action.kind, ActionKind::AdjustLp);
    assert!(matches!(report.outcome, ExecutionOutcome::Blocked { .. }));
    assert!(h.lp_venue.submitted().is_empty());
}

#[tokio::test]
async fn test_data_degradation_recovers_after_quiet_period() {
    let mut h = Harness::new(config(Mode::Active), -0.5);
    h.oracle.set(None);
    let report = h.strategy.run_cycle().await;
    assert!(report.monitoring.is_none());
    assert_eq!(report.action.reason, ReasonCode::DataDegraded);
    let spot_down = DegradedReason::DataUnavailable(DataSource::SpotPrice);
    assert_eq!(h.strategy.state().data_health(), DataHealth::Degraded(spot_down));

    h.oracle.set(Some(2000.0));
    h.clock.advance(10_000);
    let report = h.strategy.run_cycle().await;
    assert!(report.monitoring.is_some());
    assert_eq!(report.action.reason, ReasonCode::DataDegraded);

    h.clock.advance(60_000);
    let report = h.strategy.run_cycle().await;
    assert_eq!(report.action.reason, ReasonCode::WithinBand);
    assert!(h.strategy.state().is_healthy());

    let events = h.notifier.events();
    assert_eq!(degraded_events(&events), vec![spot_down]);
    assert!(matches!(events.last(), Some(HedgeEvent::Recovered { .. })));
}

#[tokio::test]
async fn test_mode_change_applies_at_next_cycle() {
    let mut h = Harness::new(config(Mode::Spectator), -0.5);
    h.strategy.request_mode(Mode::Active);
    assert_eq!(h.strategy.state().mode(), Mode::Spectator);

    let report = h.strategy.run_cycle().await;
    assert_eq!(report.mode, Mode::Active);
    assert!(matches!(
        h.notifier.events().first(),
        Some(HedgeEvent::ModeChanged { from: Mode::Spectator, to: Mode::Active, .. })
    ));
}

#[tokio::test]
async fn test_invalid_snapshot_degrades() {
    let mut h = Harness::new(config(Mode::Active), -0.5);
    h.lp.set(Some(LpPosition {
        lower_price: UPPER,
        upper_price: LOWER,
        liquidity: 100.0,
        base_amount: 0.5,
        quote_amount: 0.0,
    }));
    let report = h.strategy.run_cycle().await;
    assert!(report.monitoring.is_none());
    assert_eq!(
        h.strategy.state().data_health(),
        DataHealth::Degraded(DegradedReason::InvalidSnapshot)
    );
}

#[tokio::test]
async fn test_slow_read_fails_whole_snapshot() {
    let mut cfg = config(Mode::Active);
    cfg.execution.call_timeout_ms = 20;
    let mut h = Harness::new(cfg, 0.0);
    h.lp.set_delay(Some(Duration::from_millis(200)));

    let report = h.strategy.run_cycle().await;
    assert!(report.monitoring.is_none());
    assert_eq!(report.outcome, ExecutionOutcome::Skipped);
    assert_eq!(
        h.strategy.state().data_health(),
        DataHealth::Degraded(DegradedReason::DataUnavailable(DataSource::LpPosition))
    );
    assert!(h.venue.submitted().is_empty());
}

#[tokio::test]
async fn test_status_does_not_touch_state() {
    let h = Harness::new(config(Mode::Active), -0.5);
    let status = h.strategy.status().await.unwrap();
    assert!((status.exposure.lp_base_amount - 0.5).abs() < 1e-9);
    assert!(status.to_message("ETH").contains("in range"));
    assert!(h.strategy.state().history().is_empty());

    h.venue.fail_reads(true);
    assert!(h.strategy.status().await.is_err());
    assert!(h.strategy.state().is_healthy());
}

#[tokio::test]
async fn test_reload_rejects_invalid_config() {
    let mut h = Harness::new(config(Mode::Spectator), -0.5);
    let mut bad = config(Mode::Active);
    bad.policy.dead_band_pct = 0.0;
    assert!(h.strategy.reload(bad).is_err());
    assert_eq!(h.strategy.config().policy.dead_band_pct, 0.05);

    h.strategy.reload(config(Mode::Active)).unwrap();
    assert_eq!(h.strategy.state().pending_mode(), Some(Mode::Active));
}

#[tokio::test]
async fn test_stop_before_first_operation_cancels_sequence() {
    let mut h = Harness::new(config(Mode::Active), 0.0);
    h.stop.send(true).unwrap();
    let report = h.strategy.run_cycle().await;
    assert!(matches!(report.outcome, ExecutionOutcome::Aborted { kind: AbortKind::Cancelled, completed: 0, .. }));
    assert!(h.venue.submitted().is_empty());
}

#[tokio::test]
async fn test_operator_hold_blocks_until_cleared() {
    let mut h = Harness::new(config(Mode::Active), 0.0);
    h.strategy.hold();
    h.clock.advance(3_600_000);
    assert_eq!(h.strategy.run_cycle().await.action.reason, ReasonCode::DataDegraded);
    assert_eq!(
        h.strategy.state().data_health(),
        DataHealth::Degraded(DegradedReason::Manual)
    );

    h.strategy.clear_degraded();
    assert_eq!(h.strategy.run_cycle().await.action.kind, ActionKind::IncreaseShort);
}

#[tokio::test]
async fn test_filled_order_with_lost_answer_is_not_resent() {
    let venue = Arc::new(FakeVenue::with_size(-0.5));
    venue.lose_answers(1);
    let clock = Arc::new(FakeClock::new(START_MS));
    let seq = market_sequencer(venue.clone(), clock.clone(), |_| {});
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());

    let outcome = seq.apply(&increase_short(-0.5, -1.0), &mut state, Mode::Active).await;
    assert_eq!(outcome, ExecutionOutcome::Succeeded { operations: 1 });
    assert!((venue.size() + 1.0).abs() < 1e-9, "size {}", venue.size());
    assert_eq!(venue.submitted().len(), 1);
    assert_eq!(clock.now_ms(), START_MS + 100);
    assert_eq!(state.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_transient_failure_then_success_resets_failures() {
    let venue = Arc::new(FakeVenue::with_size(-0.5));
    let clock = Arc::new(FakeClock::new(START_MS));
    let seq = market_sequencer(venue.clone(), clock.clone(), |_| {});
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());
    let action = increase_short(-0.5, -1.0);

    venue.script_failures([SubmitErrorKind::Rejected]);
    seq.apply(&action, &mut state, Mode::Active).await;
    assert_eq!(state.consecutive_failures(), 1);

    // backoff 100ms then 200ms before the third attempt goes through
    venue.script_failures([SubmitErrorKind::Transient, SubmitErrorKind::Transient]);
    let outcome = seq.apply(&action, &mut state, Mode::Active).await;
    assert_eq!(outcome, ExecutionOutcome::Succeeded { operations: 1 });
    assert_eq!(clock.now_ms(), START_MS + 300);
    match venue.submitted().as_slice() {
        [PerpOperation::PlaceMarket {
            side: Side::Sell,
            quantity,
            reduce_only: false,
        }] => assert!((quantity - 0.5).abs() < 1e-9),
        other => panic!("unexpected submissions {other:?}"),
    }
    assert!((venue.size() + 1.0).abs() < 1e-9);
    assert_eq!(state.consecutive_failures(), 0);
    assert!(state.cooldown_until() > START_MS);
}

#[tokio::test]
async fn test_submit_timeout_is_retried_as_transient() {
    let venue = Arc::new(FakeVenue::with_size(-0.5));
    venue.delay_submissions([Duration::from_millis(200)]);
    let clock = Arc::new(FakeClock::new(START_MS));
    let seq = market_sequencer(venue.clone(), clock.clone(), |e| e.call_timeout_ms = 20);
    let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());

    let outcome = seq.apply(&increase_short(-0.5, -1.0), &mut state, Mode::Active).await;
    assert_eq!(outcome, ExecutionOutcome::Succeeded { operations: 1 });
    assert_eq!(venue.submitted().len(), 1);
    assert!((venue.size() + 1.0).abs() < 1e-9);
    assert_eq!(clock.now_ms(), START_MS + 100);
}

#[tokio::test]
async fn test_margin_and_unknown_failures_abort_without_retry() {
    for kind in [SubmitErrorKind::InsufficientMargin, SubmitErrorKind::Unknown] {
        let venue = Arc::new(FakeVenue::with_size(-0.5));
        venue.script_failures([kind]);
        let clock = Arc::new(FakeClock::new(START_MS));
        let seq = market_sequencer(venue.clone(), clock.clone(), |_| {});
        let mut state = HedgeState::new(Mode::Active, &TrackerConfig::default());

        let outcome = seq.apply(&increase_short(-0.5, -1.0), &mut state, Mode::Active).await;
        let expected = match kind {
            SubmitErrorKind::InsufficientMargin => AbortKind::InsufficientMargin,
            _ => AbortKind::Unknown,
        };
        match &outcome {
            ExecutionOutcome::Aborted {
                kind,
                completed,
                message,
            } => {
                assert_eq!(*kind, expected);
                assert_eq!(*completed, 0);
                assert!(message.starts_with("execution rejected"), "{message}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(clock.now_ms(), START_MS);
        assert!(venue.submitted().is_empty());
        assert_eq!(venue.size(), -0.5);
        assert_eq!(state.consecutive_failures(), 1);
    }
}
