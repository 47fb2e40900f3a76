//! Uniswap V3 PositionManager client and position data types.

use alloy::eips::BlockId;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider};
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::config::UniswapV3PositionManagerConfig;
use crate::contracts::{CollectParams, DecreaseLiquidityParams, IERC20Metadata, IPositionManager};

/// Seconds a submitted LP transaction stays valid.
const TX_DEADLINE_SECS: u64 = 300;

/// Position data structure containing all relevant information for a position
#[derive(Debug, Clone)]
pub struct PositionData {
    /// The position NFT token ID
    pub token_id: U256,
    /// Address of token0 in the pair
    pub token0: Address,
    /// Address of token1 in the pair
    pub token1: Address,
    /// ERC20 decimals of token0
    pub decimals0: u8,
    /// ERC20 decimals of token1
    pub decimals1: u8,
    /// Lower tick of the position range
    pub tick_lower: i32,
    /// Upper tick of the position range
    pub tick_upper: i32,
    /// Current liquidity amount in the position
    pub liquidity: u128,
    /// Amount of token0 that would be withdrawn if all liquidity is removed
    pub withdrawable_amount0: U256,
    /// Amount of token1 that would be withdrawn if all liquidity is removed
    pub withdrawable_amount1: U256,
    /// Amount of token0 fees/rewards that can be collected
    pub collectable_amount0: U256,
    /// Amount of token1 fees/rewards that can be collected
    pub collectable_amount1: U256,
}

impl PositionData {
    /// True when the position pairs exactly these two tokens, in either order.
    pub fn pairs(&self, a: Address, b: Address) -> bool {
        (self.token0 == a && self.token1 == b) || (self.token0 == b && self.token1 == a)
    }
}

/// UniswapV3PositionManager provides functionality to interact with Uniswap V3 PositionManager contracts
pub struct UniswapV3PositionManager {
    /// PositionManager contract instance for making RPC calls
    position_manager: IPositionManager::IPositionManagerInstance<Arc<DynProvider>>,
    /// Internal cache of position data keyed by token ID
    positions: BTreeMap<U256, PositionData>,
}

impl UniswapV3PositionManager {
    /// Creates a new `UniswapV3PositionManager` bound to the contract at `config.address`.
    pub fn new(config: UniswapV3PositionManagerConfig, provider: Arc<DynProvider>) -> Self {
        let position_manager = IPositionManager::new(config.address, provider);
        Self {
            position_manager,
            positions: BTreeMap::new(),
        }
    }

    /// Returns a reference to the cached position data keyed by token ID.
    pub fn positions(&self) -> &BTreeMap<U256, PositionData> {
        &self.positions
    }

    /// Gets the current block number from the blockchain provider
    pub async fn get_block_number(&self) -> Result<u64> {
        let block = self
            .position_manager
            .provider()
            .get_block(BlockId::latest())
            .await?
            .ok_or_else(|| anyhow!("failed to get latest block"))?;
        Ok(block.number())
    }

    /// Reads a single position at the latest block.
    pub async fn get_position(&self, token_id: U256, owner: Address) -> Result<PositionData> {
        let block_id = BlockId::number(self.get_block_number().await?);
        self.read_position(token_id, owner, block_id).await
    }

    /// Synchronizes the internal `BTreeMap` with the current on-chain state of all positions owned by `owner`.
    ///
    /// All reads are pinned to one block so the cache is a consistent view.
    pub async fn sync_lp(&mut self, owner: Address) -> Result<()> {
        let block_id = BlockId::number(self.get_block_number().await?);

        let balance = self
            .position_manager
            .balanceOf(owner)
            .block(block_id)
            .call()
            .await?;

        for index in 0..balance.to::<u64>() {
            let token_id = self
                .position_manager
                .tokenOfOwnerByIndex(owner, U256::from(index))
                .block(block_id)
                .call()
                .await?;

            let position_data = self.read_position(token_id, owner, block_id).await?;
            self.positions.insert(token_id, position_data);
        }

        debug!(%owner, count = self.positions.len(), "synced lp positions");
        Ok(())
    }

    async fn read_position(
        &self,
        token_id: U256,
        owner: Address,
        block_id: BlockId,
    ) -> Result<PositionData> {
        let position_info = self
            .position_manager
            .positions(token_id)
            .block(block_id)
            .call()
            .await?;

        let token0 = position_info.token0;
        let token1 = position_info.token1;
        let liquidity = position_info.liquidity;
        let provider = self.position_manager.provider().clone();
        let decimals0 = IERC20Metadata::new(token0, provider.clone())
            .decimals()
            .call()
            .await?;
        let decimals1 = IERC20Metadata::new(token1, provider)
            .decimals()
            .call()
            .await?;

        // Simulate a full withdrawal to get the amounts at the current pool price.
        let mut withdrawable_amount0 = U256::ZERO;
        let mut withdrawable_amount1 = U256::ZERO;
        if liquidity > 0 {
            let decrease_params = DecreaseLiquidityParams {
                tokenId: token_id,
                liquidity,
                amount0Min: U256::ZERO,
                amount1Min: U256::ZERO,
                deadline: U256::from(u64::MAX),
            };
            let result = self
                .position_manager
                .decreaseLiquidity(decrease_params)
                .from(owner)
                .block(block_id)
                .call()
                .await?;
            withdrawable_amount0 = result.amount0;
            withdrawable_amount1 = result.amount1;
        }

        // Fees are informational; a failed simulation leaves them at zero.
        let collect_params = CollectParams {
            tokenId: token_id,
            recipient: owner,
            amount0Max: u128::MAX,
            amount1Max: u128::MAX,
        };
        let (collectable_amount0, collectable_amount1) = match self
            .position_manager
            .collect(collect_params)
            .from(owner)
            .block(block_id)
            .call()
            .await
        {
            Ok(result) => (result.amount0, result.amount1),
            Err(_) => (U256::ZERO, U256::ZERO),
        };

        Ok(PositionData {
            token_id,
            token0,
            token1,
            decimals0,
            decimals1,
            tick_lower: position_info.tickLower.as_i32(),
            tick_upper: position_info.tickUpper.as_i32(),
            liquidity,
            withdrawable_amount0,
            withdrawable_amount1,
            collectable_amount0,
            collectable_amount1,
        })
    }

    /// Removes `liquidity` from the position. Requires a provider with a signing wallet.
    pub async fn decrease_liquidity(&self, token_id: U256, liquidity: u128) -> Result<TxHash> {
        let params = DecreaseLiquidityParams {
            tokenId: token_id,
            liquidity,
            amount0Min: U256::ZERO,
            amount1Min: U256::ZERO,
            deadline: U256::from(deadline_secs()),
        };
        let receipt = self
            .position_manager
            .decreaseLiquidity(params)
            .send()
            .await?
            .get_receipt()
            .await?;
        if !receipt.status() {
            bail!("decreaseLiquidity reverted: {}", receipt.transaction_hash);
        }
        info!(%token_id, liquidity, tx = %receipt.transaction_hash, "decreased liquidity");
        Ok(receipt.transaction_hash)
    }

    /// Collects every owed token of the position to `recipient`.
    pub async fn collect(&self, token_id: U256, recipient: Address) -> Result<TxHash> {
        let params = CollectParams {
            tokenId: token_id,
            recipient,
            amount0Max: u128::MAX,
            amount1Max: u128::MAX,
        };
        let receipt = self
            .position_manager
            .collect(params)
            .send()
            .await?
            .get_receipt()
            .await?;
        if !receipt.status() {
            bail!("collect reverted: {}", receipt.transaction_hash);
        }
        info!(%token_id, tx = %receipt.transaction_hash, "collected position tokens");
        Ok(receipt.transaction_hash)
    }
}

fn deadline_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        + TX_DEADLINE_SECS
}
