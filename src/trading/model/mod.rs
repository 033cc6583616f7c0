pub mod auto_trade;
pub mod balance;
pub mod break_warning;
pub mod candle;
pub mod goal;
pub mod martingale;
pub mod order;
pub mod signal;

pub use auto_trade::AssetAutoTradeConfig;
pub use balance::{Balance, BalanceType, DailyBalanceSnapshot};
pub use break_warning::{
    BreakWarningEvent, BreakWarningPolicy, BreakWarningSettings, TradingLimitsSettings,
};
pub use candle::Candle;
pub use goal::{GoalFulfillment, GoalType, TradingGoalsSettings};
pub use martingale::{
    round_stake, CancelReason, ChainStatus, LinkStatus, MartingaleChain, MartingaleOrderLink,
    MartingaleSettings, DEFAULT_MULTIPLIER, MAX_MARTINGALE_LEVELS, MIN_MARTINGALE_LEVELS,
};
pub use order::{
    ClosedTrade, OrderOutcome, OrderRequest, PlacedOrder, Position, PositionStatus, TrackedOrder,
};
pub use signal::{Direction, SignalDirection, SignalEvent};
