pub mod bollinger;
pub mod candle_color;
pub mod donchian;
pub mod stochastic;
pub mod support_resistance;
