use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clients_uniswapv3::math::{human_liquidity, liquidity_to_amounts, tick_to_price, tick_to_sqrt_price};
use clients_uniswapv3::{PositionData, SubgraphClient, SubgraphPosition, UniswapV3PositionManager};
use tracing::debug;
use utils::{retry_with_backoff, u256_to_f64, Backoff};

use crate::provider::{
    Clock, Confirmation, LpDataProvider, LpOperation, LpPosition, LpVenue, SubmitError,
};

/// 2^96, the fixed-point scale of `sqrtPriceX96`.
const Q96: f64 = 79_228_162_514_264_337_593_543_950_336.0;

/// Range and amounts oriented so that prices are quote per base.
fn orient(
    base_is_token0: bool,
    tick_lower: i32,
    tick_upper: i32,
    decimals: (u8, u8),
    amounts: (f64, f64),
    liquidity: f64,
) -> LpPosition {
    let (d0, d1) = decimals;
    let lower0 = tick_to_price(tick_lower, d0, d1);
    let upper0 = tick_to_price(tick_upper, d0, d1);
    if base_is_token0 {
        LpPosition {
            lower_price: lower0,
            upper_price: upper0,
            liquidity,
            base_amount: amounts.0,
            quote_amount: amounts.1,
        }
    } else {
        LpPosition {
            lower_price: 1.0 / upper0,
            upper_price: 1.0 / lower0,
            liquidity,
            base_amount: amounts.1,
            quote_amount: amounts.0,
        }
    }
}

fn parse_token_id(position_id: &str) -> Result<U256> {
    U256::from_str(position_id.trim()).map_err(|e| anyhow!("invalid position id {}: {}", position_id, e))
}

/// LP data read on-chain from the NonfungiblePositionManager.
pub struct UniswapLpProvider {
    manager: Arc<UniswapV3PositionManager>,
    owner: Address,
    base_token: Address,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
}

impl UniswapLpProvider {
    pub fn new(
        manager: Arc<UniswapV3PositionManager>,
        owner: Address,
        base_token: Address,
        clock: Arc<dyn Clock>,
        backoff: Backoff,
    ) -> Self {
        Self {
            manager,
            owner,
            base_token,
            clock,
            backoff,
        }
    }

    fn to_lp_position(&self, data: &PositionData) -> Result<LpPosition> {
        let base_is_token0 = if data.token0 == self.base_token {
            true
        } else if data.token1 == self.base_token {
            false
        } else {
            bail!(
                "position {} does not hold base token {}",
                data.token_id,
                self.base_token
            );
        };
        let amounts = (
            u256_to_f64(data.withdrawable_amount0, data.decimals0 as u32),
            u256_to_f64(data.withdrawable_amount1, data.decimals1 as u32),
        );
        Ok(orient(
            base_is_token0,
            data.tick_lower,
            data.tick_upper,
            (data.decimals0, data.decimals1),
            amounts,
            human_liquidity(data.liquidity, data.decimals0, data.decimals1),
        ))
    }
}

#[async_trait]
impl LpDataProvider for UniswapLpProvider {
    async fn get_position(&self, position_id: &str) -> Result<LpPosition> {
        let token_id = parse_token_id(position_id)?;
        let data = retry_with_backoff(
            self.clock.as_ref(),
            self.backoff,
            "uniswap position",
            |_: &anyhow::Error| true,
            || self.manager.get_position(token_id, self.owner),
        )
        .await?;
        debug!(%token_id, liquidity = data.liquidity, "read lp position");
        self.to_lp_position(&data)
    }
}

/// LP data read from the Uniswap V3 subgraph; amounts are derived from liquidity and pool price.
pub struct SubgraphLpProvider {
    client: SubgraphClient,
    base_symbol: String,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
}

impl SubgraphLpProvider {
    pub fn new(client: SubgraphClient, base_symbol: String, clock: Arc<dyn Clock>, backoff: Backoff) -> Self {
        Self {
            client,
            base_symbol,
            clock,
            backoff,
        }
    }
}

/// Converts an indexed position into base/quote terms, `base_symbol` naming the base token.
pub(crate) fn subgraph_to_lp_position(pos: &SubgraphPosition, base_symbol: &str) -> Result<LpPosition> {
    let base_is_token0 = if pos.token0.symbol.eq_ignore_ascii_case(base_symbol) {
        true
    } else if pos.token1.symbol.eq_ignore_ascii_case(base_symbol) {
        false
    } else {
        bail!(
            "position {} pairs {}/{}, not {}",
            pos.id,
            pos.token0.symbol,
            pos.token1.symbol,
            base_symbol
        );
    };
    let (d0, d1) = (pos.token0.decimals, pos.token1.decimals);
    let (raw0, raw1) = liquidity_to_amounts(
        pos.liquidity as f64,
        pos.sqrt_price_x96 / Q96,
        tick_to_sqrt_price(pos.tick_lower),
        tick_to_sqrt_price(pos.tick_upper),
    );
    let amounts = (raw0 / 10_f64.powi(d0 as i32), raw1 / 10_f64.powi(d1 as i32));
    Ok(orient(
        base_is_token0,
        pos.tick_lower,
        pos.tick_upper,
        (d0, d1),
        amounts,
        human_liquidity(pos.liquidity, d0, d1),
    ))
}

#[async_trait]
impl LpDataProvider for SubgraphLpProvider {
    async fn get_position(&self, position_id: &str) -> Result<LpPosition> {
        let pos = retry_with_backoff(
            self.clock.as_ref(),
            self.backoff,
            "subgraph position",
            |_: &anyhow::Error| true,
            || self.client.get_position(position_id),
        )
        .await
        .context("subgraph position unavailable")?;
        subgraph_to_lp_position(&pos, &self.base_symbol)
    }
}

/// Withdraws an LP position through the NonfungiblePositionManager. Needs a signing provider.
pub struct UniswapLpVenue {
    manager: Arc<UniswapV3PositionManager>,
    owner: Address,
}

impl UniswapLpVenue {
    pub fn new(manager: Arc<UniswapV3PositionManager>, owner: Address) -> Self {
        Self { manager, owner }
    }
}

#[async_trait]
impl LpVenue for UniswapLpVenue {
    async fn submit(&self, op: &LpOperation) -> std::result::Result<Confirmation, SubmitError> {
        let tx = match op {
            LpOperation::DecreaseLiquidity { position_id } => {
                let token_id = parse_token_id(position_id).map_err(|e| SubmitError::rejected(e.to_string()))?;
                let data = self
                    .manager
                    .get_position(token_id, self.owner)
                    .await
                    .map_err(|e| SubmitError::transient(format!("{:#}", e)))?;
                if data.liquidity == 0 {
                    return Err(SubmitError::rejected("position has no liquidity"));
                }
                self.manager
                    .decrease_liquidity(token_id, data.liquidity)
                    .await
                    .map_err(classify)?
            }
            LpOperation::Collect { position_id } => {
                let token_id = parse_token_id(position_id).map_err(|e| SubmitError::rejected(e.to_string()))?;
                self.manager.collect(token_id, self.owner).await.map_err(classify)?
            }
        };
        Ok(Confirmation {
            reference: tx.to_string(),
        })
    }
}

/// A mined revert is final; anything else may succeed when sent again.
fn classify(err: anyhow::Error) -> SubmitError {
    let message = format!("{:#}", err);
    if message.contains("reverted") {
        SubmitError::rejected(message)
    } else {
        SubmitError::transient(message)
    }
}
