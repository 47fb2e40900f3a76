#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lph::provider::{
    Clock, Confirmation, LpDataProvider, LpOperation, LpPosition, LpVenue, Notifier, PerpOperation,
    PerpPosition, PerpVenue, PriceOracle, Side, SubmitError, SubmitErrorKind,
};
use lph::{
    Collaborators, ExecutionConfig, HedgeEvent, HedgePolicyConfig, LPHStrategy, LPHStrategyConfig,
    Mode, TrackerConfig,
};
use tokio::sync::watch;

pub const LOWER: f64 = 1800.0;
pub const UPPER: f64 = 2200.0;
pub const START_MS: i64 = 1_700_000_000_000;

/// Liquidity holding `base` units at spot 2000 in [1800, 2200].
pub fn liquidity_for_base(base: f64) -> f64 {
    base / (1.0 / 2000_f64.sqrt() - 1.0 / UPPER.sqrt())
}

pub struct FakeClock(AtomicI64);

impl FakeClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as i64);
    }
}

#[derive(Default)]
struct VenueInner {
    size: f64,
    fail_reads: bool,
    funding: f64,
    /// Failures handed out by the next submissions, in order
    script: VecDeque<SubmitErrorKind>,
    /// Market orders that fill but answer with a transient failure
    lost_answers: usize,
    /// Delays before the next submissions are processed, in order
    delays: VecDeque<Duration>,
    submitted: Vec<PerpOperation>,
    stop_after_first: Option<watch::Sender<bool>>,
}

/// Perp venue that fills market orders instantly.
#[derive(Default)]
pub struct FakeVenue(Mutex<VenueInner>);

impl FakeVenue {
    pub fn with_size(size: f64) -> Self {
        let venue = Self::default();
        venue.set_size(size);
        venue
    }

    pub fn set_size(&self, size: f64) {
        self.0.lock().unwrap().size = size;
    }

    pub fn size(&self) -> f64 {
        self.0.lock().unwrap().size
    }

    pub fn set_funding(&self, funding: f64) {
        self.0.lock().unwrap().funding = funding;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.0.lock().unwrap().fail_reads = fail;
    }

    pub fn script_failures(&self, kinds: impl IntoIterator<Item = SubmitErrorKind>) {
        self.0.lock().unwrap().script.extend(kinds);
    }

    pub fn lose_answers(&self, count: usize) {
        self.0.lock().unwrap().lost_answers = count;
    }

    pub fn delay_submissions(&self, delays: impl IntoIterator<Item = Duration>) {
        self.0.lock().unwrap().delays.extend(delays);
    }

    /// Raises the stop signal once the first submission went through.
    pub fn stop_after_first(&self, stop: watch::Sender<bool>) {
        self.0.lock().unwrap().stop_after_first = Some(stop);
    }

    pub fn submitted(&self) -> Vec<PerpOperation> {
        self.0.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl PerpVenue for FakeVenue {
    async fn get_position(&self) -> Result<PerpPosition> {
        let inner = self.0.lock().unwrap();
        if inner.fail_reads {
            return Err(anyhow!("venue unreachable"));
        }
        Ok(PerpPosition {
            size: inner.size,
            entry_price: 2000.0,
        })
    }

    async fn get_funding(&self) -> Result<f64> {
        Ok(self.0.lock().unwrap().funding)
    }

    async fn submit(&self, op: &PerpOperation) -> std::result::Result<Confirmation, SubmitError> {
        let delay = self.0.lock().unwrap().delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.0.lock().unwrap();
        if let Some(kind) = inner.script.pop_front() {
            return Err(SubmitError::new(kind, "scripted failure"));
        }
        if let PerpOperation::PlaceMarket { side, quantity, .. } = op {
            match side {
                Side::Buy => inner.size += quantity,
                Side::Sell => inner.size -= quantity,
            }
            if inner.lost_answers > 0 {
                inner.lost_answers -= 1;
                inner.submitted.push(op.clone());
                return Err(SubmitError::transient("read timed out"));
            }
        }
        inner.submitted.push(op.clone());
        if let Some(stop) = inner.stop_after_first.take() {
            let _ = stop.send(true);
        }
        Ok(Confirmation {
            reference: format!("order-{}", inner.submitted.len()),
        })
    }
}

/// LP data provider returning a configurable position, optionally slowly.
pub struct FakeLp {
    position: Mutex<Option<LpPosition>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeLp {
    pub fn new(position: LpPosition) -> Self {
        Self {
            position: Mutex::new(Some(position)),
            delay: Mutex::new(None),
        }
    }

    pub fn set(&self, position: Option<LpPosition>) {
        *self.position.lock().unwrap() = position;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl LpDataProvider for FakeLp {
    async fn get_position(&self, _position_id: &str) -> Result<LpPosition> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.position
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("position not found"))
    }
}

pub struct FakeOracle(Mutex<Option<f64>>);

impl FakeOracle {
    pub fn new(price: f64) -> Self {
        Self(Mutex::new(Some(price)))
    }

    pub fn set(&self, price: Option<f64>) {
        *self.0.lock().unwrap() = price;
    }
}

#[async_trait]
impl PriceOracle for FakeOracle {
    async fn get_spot_price(&self, _pair: &str) -> Result<f64> {
        self.0.lock().unwrap().ok_or_else(|| anyhow!("price feed down"))
    }
}

#[derive(Default)]
pub struct FakeLpVenue(Mutex<Vec<LpOperation>>);

impl FakeLpVenue {
    pub fn submitted(&self) -> Vec<LpOperation> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl LpVenue for FakeLpVenue {
    async fn submit(&self, op: &LpOperation) -> std::result::Result<Confirmation, SubmitError> {
        self.0.lock().unwrap().push(op.clone());
        Ok(Confirmation {
            reference: "0xtx".to_string(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<HedgeEvent>>);

impl RecordingNotifier {
    pub fn events(&self) -> Vec<HedgeEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &HedgeEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

pub fn lp_position(base: f64) -> LpPosition {
    LpPosition {
        lower_price: LOWER,
        upper_price: UPPER,
        liquidity: liquidity_for_base(base),
        base_amount: base,
        quote_amount: 0.0,
    }
}

pub fn policy() -> HedgePolicyConfig {
    HedgePolicyConfig {
        dead_band_pct: 0.05,
        recenter_fraction: 0.5,
        funding_extreme_threshold: 0.001,
        cooldown_secs: 300,
        min_perp_notional: 5.0,
        max_perp_notional: 100_000.0,
        max_single_adjustment: 2.0,
        size_epsilon: 1e-6,
        recenter_lp_on_range_exit: false,
    }
}

pub fn config(mode: Mode) -> LPHStrategyConfig {
    LPHStrategyConfig {
        mode,
        symbol: "ETHUSDT".to_string(),
        position_id: "42".to_string(),
        policy: policy(),
        execution: ExecutionConfig {
            max_attempts: 2,
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
            call_timeout_ms: 1_000,
            ..ExecutionConfig::default()
        },
        tracker: TrackerConfig {
            recovery_quiet_period_secs: 60,
            history_capacity: 10,
        },
    }
}

pub struct Harness {
    pub strategy: LPHStrategy,
    pub venue: Arc<FakeVenue>,
    pub lp: Arc<FakeLp>,
    pub oracle: Arc<FakeOracle>,
    pub lp_venue: Arc<FakeLpVenue>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FakeClock>,
    pub stop: watch::Sender<bool>,
}

impl Harness {
    /// LP holding 0.5 base at spot 2000 in [1800, 2200], hedged by `perp_size`.
    pub fn new(config: LPHStrategyConfig, perp_size: f64) -> Self {
        let venue = Arc::new(FakeVenue::with_size(perp_size));
        let lp = Arc::new(FakeLp::new(lp_position(0.5)));
        let oracle = Arc::new(FakeOracle::new(2000.0));
        let lp_venue = Arc::new(FakeLpVenue::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(FakeClock::new(START_MS));
        let (stop, stop_rx) = watch::channel(false);

        let collaborators = Collaborators {
            lp_data: lp.clone(),
            perp: venue.clone(),
            oracle: oracle.clone(),
            lp_venue: Some(lp_venue.clone()),
            notifier: notifier.clone(),
            clock: clock.clone(),
        };
        let strategy = LPHStrategy::new(config, collaborators, stop_rx).unwrap();
        Self {
            strategy,
            venue,
            lp,
            oracle,
            lp_venue,
            notifier,
            clock,
            stop,
        }
    }
}
