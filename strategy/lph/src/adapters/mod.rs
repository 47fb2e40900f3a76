//! Implementations of the collaborator traits on top of the client crates.

mod binance;
mod notify;
mod uniswap;

pub use binance::BinancePerpVenue;
pub use notify::{FanoutNotifier, LogNotifier, TelegramNotifier};
pub use uniswap::{SubgraphLpProvider, UniswapLpProvider, UniswapLpVenue};
