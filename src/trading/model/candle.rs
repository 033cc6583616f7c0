//! K线实体

use serde::{Deserialize, Serialize};

/// 一根K线，时间戳均为毫秒
///
/// 窗口中最后一根通常是尚未收盘的K线，`close_time` 即下一次收盘时刻
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// K线开始时间戳 (毫秒)
    pub open_time: i64,
    /// K线收盘时间戳 (毫秒)
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(open_time: i64, close_time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
        }
    }

    /// 判断是否为阳线
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 判断是否为阴线
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// 在 `now` 时刻是否已收盘
    pub fn is_closed_at(&self, now: i64) -> bool {
        self.close_time <= now
    }
}
