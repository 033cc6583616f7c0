pub mod candle_feed;
pub mod dispatcher;
pub mod signal_bus;
pub mod signal_scheduler;

pub use candle_feed::CandleFeed;
pub use dispatcher::{AutoTradeDispatcher, DispatchOutcome, SkipReason};
pub use signal_bus::SignalBus;
pub use signal_scheduler::SignalScheduler;
