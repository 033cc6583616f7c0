//! 交易信号

use serde::{Deserialize, Serialize};

/// 下单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// 看涨
    Call,
    /// 看跌
    Put,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Call => "call",
            Direction::Put => "put",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 信号函数的输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Call,
    Put,
    Hold,
}

impl SignalDirection {
    /// HOLD 没有对应的下单方向
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            SignalDirection::Call => Some(Direction::Call),
            SignalDirection::Put => Some(Direction::Put),
            SignalDirection::Hold => None,
        }
    }
}

/// 总线上广播的信号事件，只在内存中流转
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub asset_id: i64,
    pub direction: Direction,
    /// 周期 (秒)
    pub period: i64,
    /// 产生时刻 (毫秒)
    pub produced_at: i64,
    /// 触发本次计算的K线收盘时刻 (毫秒)
    pub candle_close_time: i64,
}
