mod config;
mod contracts;
pub mod math;
mod position_manager;
mod subgraph;

pub use config::{SubgraphConfig, UniswapV3PositionManagerConfig};
pub use position_manager::{PositionData, UniswapV3PositionManager};
pub use subgraph::{SubgraphClient, SubgraphPosition, SubgraphToken};
