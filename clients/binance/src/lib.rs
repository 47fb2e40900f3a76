mod error;
mod perps;
mod types;
mod utils;

pub use error::{BinanceError, Result, CODE_INSUFFICIENT_MARGIN};
pub use perps::{BinancePerpsClient, BinancePerpsClientConfig};
pub use types::{OrderResponse, OrderSide, Position, PremiumIndex};
pub use utils::fapi_signed_request;
