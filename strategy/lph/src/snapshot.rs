//! Position Snapshot Builder.
//!
//! The four reads are independent and run concurrently. The snapshot is
//! all-or-invalid: one failed or timed out read fails the whole build, and
//! nothing is ever defaulted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::HedgeError;
use crate::provider::{Clock, LpDataProvider, PerpVenue, PriceOracle};
use crate::types::{DataSource, PositionSnapshot};

pub struct SnapshotBuilder {
    lp: Arc<dyn LpDataProvider>,
    venue: Arc<dyn PerpVenue>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    symbol: String,
    position_id: String,
}

impl SnapshotBuilder {
    pub fn new(
        lp: Arc<dyn LpDataProvider>,
        venue: Arc<dyn PerpVenue>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
        symbol: String,
        position_id: String,
    ) -> Self {
        Self {
            lp,
            venue,
            oracle,
            clock,
            call_timeout,
            symbol,
            position_id,
        }
    }

    pub(crate) fn reconfigure(&mut self, call_timeout: Duration, symbol: String, position_id: String) {
        self.call_timeout = call_timeout;
        self.symbol = symbol;
        self.position_id = position_id;
    }

    /// Reads everything and returns a validated snapshot stamped with the cycle start time.
    pub async fn build(&self) -> Result<PositionSnapshot, HedgeError> {
        let timestamp = self.clock.now_ms();
        let (lp, perp, funding, spot) = tokio::join!(
            read(DataSource::LpPosition, self.call_timeout, self.lp.get_position(&self.position_id)),
            read(DataSource::PerpPosition, self.call_timeout, self.venue.get_position()),
            read(DataSource::Funding, self.call_timeout, self.venue.get_funding()),
            read(DataSource::SpotPrice, self.call_timeout, self.oracle.get_spot_price(&self.symbol)),
        );
        let (lp, perp, funding, spot) = (lp?, perp?, funding?, spot?);

        let snapshot = PositionSnapshot {
            timestamp,
            lp_lower_price: lp.lower_price,
            lp_upper_price: lp.upper_price,
            lp_liquidity: lp.liquidity,
            lp_token_a_amount: lp.base_amount,
            lp_token_b_amount: lp.quote_amount,
            perp_size: perp.size,
            perp_entry_price: perp.entry_price,
            spot_price: spot,
            funding_rate: funding,
        };
        if let Err(err) = snapshot.validate() {
            warn!(error = %err, ?snapshot, "snapshot rejected");
            return Err(err);
        }
        debug!(
            spot = snapshot.spot_price,
            perp = snapshot.perp_size,
            funding = snapshot.funding_rate,
            "snapshot built"
        );
        Ok(snapshot)
    }
}

async fn read<T, F>(origin: DataSource, limit: Duration, fut: F) -> Result<T, HedgeError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(source = %origin, error = %format!("{:#}", err), "read failed");
            Err(HedgeError::DataUnavailable {
                origin,
                message: format!("{:#}", err),
            })
        }
        Err(_) => {
            warn!(source = %origin, timeout_ms = limit.as_millis() as u64, "read timed out");
            Err(HedgeError::DataUnavailable {
                origin,
                message: format!("timed out after {:?}", limit),
            })
        }
    }
}
