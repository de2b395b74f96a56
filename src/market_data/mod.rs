pub mod candle_buffer;
pub mod provider;

pub use candle_buffer::{Candle, CandleBuffer, CandleKey};
pub use provider::{HttpMarketDataProvider, InMemoryMarketDataProvider, MarketDataProvider, Snapshot};
