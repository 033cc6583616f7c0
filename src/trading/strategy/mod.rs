pub mod signal_function;
pub mod zone_reversal_strategy;

pub use signal_function::SignalFunction;
pub use zone_reversal_strategy::{ZoneReversalConfig, ZoneReversalSignal};
