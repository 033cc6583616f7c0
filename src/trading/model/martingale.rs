//! 马丁格尔加仓链

use serde::{Deserialize, Serialize};

use super::signal::Direction;

pub const MIN_MARTINGALE_LEVELS: usize = 1;
pub const MAX_MARTINGALE_LEVELS: usize = 4;
pub const DEFAULT_MULTIPLIER: f64 = 2.5;

/// 单个资产的马丁格尔配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartingaleSettings {
    pub enabled: bool,
    /// 最大加仓层数
    pub number_of_martingales: usize,
    /// 第 i 个元素为从第 i 层升到第 i+1 层时的倍数
    pub multipliers: Vec<f64>,
}

impl Default for MartingaleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            number_of_martingales: MAX_MARTINGALE_LEVELS,
            multipliers: vec![DEFAULT_MULTIPLIER; MAX_MARTINGALE_LEVELS],
        }
    }
}

impl MartingaleSettings {
    pub fn new(enabled: bool, number_of_martingales: usize, multipliers: Vec<f64>) -> Self {
        Self {
            enabled,
            number_of_martingales,
            multipliers,
        }
        .normalized()
    }

    /// 层数限制在 1..=4，倍数不小于 1，倍数长度与层数对齐(不足时重复最后一个)
    pub fn normalized(mut self) -> Self {
        self.number_of_martingales = self
            .number_of_martingales
            .clamp(MIN_MARTINGALE_LEVELS, MAX_MARTINGALE_LEVELS);

        let mut multipliers: Vec<f64> = self
            .multipliers
            .iter()
            .map(|m| if m.is_finite() { m.max(1.0) } else { 1.0 })
            .collect();
        let filler = multipliers.last().copied().unwrap_or(DEFAULT_MULTIPLIER);
        multipliers.resize(self.number_of_martingales, filler);
        self.multipliers = multipliers;
        self
    }

    /// 取从 `level` 升级时的倍数
    pub fn multiplier_at(&self, level: usize) -> Option<f64> {
        self.multipliers.get(level).copied()
    }
}

/// 链取消原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    User,
    System,
    DailyLimit,
    Timeout,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::User => "USER",
            CancelReason::System => "SYSTEM",
            CancelReason::DailyLimit => "DAILY_LIMIT",
            CancelReason::Timeout => "TIMEOUT",
        }
    }
}

/// 链状态，离开 Active 后不可再变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    Active,
    CompletedWin,
    CompletedLoss,
    Cancelled(CancelReason),
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChainStatus::Active)
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStatus::Active => f.write_str("ACTIVE"),
            ChainStatus::CompletedWin => f.write_str("COMPLETED_WIN"),
            ChainStatus::CompletedLoss => f.write_str("COMPLETED_LOSS"),
            ChainStatus::Cancelled(reason) => write!(f, "CANCELLED({})", reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartingaleChain {
    pub chain_id: String,
    pub balance_id: i64,
    pub asset_id: i64,
    pub direction: Direction,
    pub period: i64,
    pub original_order_id: i64,
    pub current_level: usize,
    pub max_level: usize,
    pub multipliers: Vec<f64>,
    pub status: ChainStatus,
    /// 已投入的本金合计
    pub total_invested: f64,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
}

impl MartingaleChain {
    pub fn is_active(&self) -> bool {
        self.status == ChainStatus::Active
    }

    pub fn can_escalate(&self) -> bool {
        self.is_active() && self.current_level < self.max_level
    }
}

/// 链内单笔订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

/// 订单 -> 链/层级 的映射
///
/// `chain_id` 为空表示尚未亏损的 0 层首单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartingaleOrderLink {
    pub order_id: i64,
    pub chain_id: Option<String>,
    pub balance_id: i64,
    pub asset_id: i64,
    pub level: usize,
    pub multiplier: f64,
    pub stake_amount: f64,
    pub direction: Direction,
    pub period: i64,
    pub status: LinkStatus,
    pub created_at: i64,
}

/// 金额按小数位四舍五入(远离零)
pub fn round_stake(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
