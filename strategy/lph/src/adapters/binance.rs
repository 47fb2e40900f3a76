use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clients_binance::{BinanceError, BinancePerpsClient, OrderSide};

use crate::provider::{
    Confirmation, PerpOperation, PerpPosition, PerpVenue, PriceOracle, Side, SubmitError,
    SubmitErrorKind,
};

/// Binance USD-M futures as the perp venue and price oracle for one symbol.
pub struct BinancePerpVenue {
    client: Arc<BinancePerpsClient>,
    symbol: String,
    quantity_step: f64,
}

impl BinancePerpVenue {
    pub fn new(client: Arc<BinancePerpsClient>, symbol: String, quantity_step: f64) -> Self {
        Self {
            client,
            symbol,
            quantity_step,
        }
    }
}

#[async_trait]
impl PerpVenue for BinancePerpVenue {
    async fn get_position(&self) -> Result<PerpPosition> {
        let positions = self.client.get_position(&self.symbol).await?;
        // one-way mode: at most one entry; no entry means flat
        let Some(position) = positions.iter().find(|p| p.symbol == self.symbol) else {
            return Ok(PerpPosition {
                size: 0.0,
                entry_price: 0.0,
            });
        };
        Ok(PerpPosition {
            size: position
                .position_amt
                .parse()
                .context("Failed to parse position_amt")?,
            entry_price: position
                .entry_price
                .parse()
                .context("Failed to parse entry_price")?,
        })
    }

    async fn get_funding(&self) -> Result<f64> {
        let index = self.client.get_premium_index(&self.symbol).await?;
        index
            .last_funding_rate
            .parse()
            .context("Failed to parse last_funding_rate")
    }

    async fn submit(&self, op: &PerpOperation) -> std::result::Result<Confirmation, SubmitError> {
        match op {
            PerpOperation::CancelOpenOrders => {
                self.client
                    .cancel_all_open_orders(&self.symbol)
                    .await
                    .map_err(classify)?;
                Ok(Confirmation {
                    reference: format!("cancel-all:{}", self.symbol),
                })
            }
            PerpOperation::PlaceMarket {
                side,
                quantity,
                reduce_only,
            } => {
                let side = match side {
                    Side::Buy => OrderSide::Buy,
                    Side::Sell => OrderSide::Sell,
                };
                let quantity = utils::format_quantity(*quantity, self.quantity_step);
                let order = self
                    .client
                    .place_market_order(&self.symbol, side, &quantity, *reduce_only)
                    .await
                    .map_err(classify)?;
                Ok(Confirmation {
                    reference: order.order_id.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl PriceOracle for BinancePerpVenue {
    /// Mark price of `pair` on the venue.
    async fn get_spot_price(&self, pair: &str) -> Result<f64> {
        let index = self.client.get_premium_index(pair).await?;
        index.mark_price.parse().context("Failed to parse mark_price")
    }
}

/// Maps a client error onto the retry classes of the sequencer.
pub(crate) fn classify(err: BinanceError) -> SubmitError {
    let kind = if err.is_insufficient_margin() {
        SubmitErrorKind::InsufficientMargin
    } else if err.is_transient() {
        SubmitErrorKind::Transient
    } else if matches!(err, BinanceError::Decode(_)) {
        // accepted but unreadable: the order may exist
        SubmitErrorKind::Unknown
    } else {
        SubmitErrorKind::Rejected
    };
    SubmitError::new(kind, err.to_string())
}
