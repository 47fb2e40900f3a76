//! Configuration types for Uniswap V3 clients.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Configuration for UniswapV3PositionManager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniswapV3PositionManagerConfig {
    /// The contract address of the Uniswap V3 PositionManager contract
    pub address: Address,
}

/// Configuration for SubgraphClient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphConfig {
    /// GraphQL endpoint of the Uniswap V3 subgraph
    pub url: String,
    /// The Graph gateway key, sent as the `apikey` header when present
    #[serde(default)]
    pub api_key: Option<String>,
}
