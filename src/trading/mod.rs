pub mod auto_trade;
pub mod engine;
pub mod indicator;
pub mod martingale;
pub mod model;
pub mod risk;
pub mod services;
pub mod store;
pub mod strategy;

pub use engine::{AutoTradeEngine, EngineStats};
