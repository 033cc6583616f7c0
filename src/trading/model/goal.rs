//! 每日盈亏目标

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalType {
    Profit,
    Loss,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Profit => "profit",
            GoalType::Loss => "loss",
        }
    }
}

/// 当日目标达成记录，每个 账户+日期+类型 至多一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFulfillment {
    pub id: String,
    pub balance_id: i64,
    pub goal_type: GoalType,
    /// 亏损目标记为负数
    pub target_value: f64,
    pub actual_value: f64,
    pub date: NaiveDate,
    pub acknowledged: bool,
    pub created_at: i64,
}

/// 以日初余额百分比表示的目标，0 表示关闭该侧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingGoalsSettings {
    pub profit_target_percentage: f64,
    pub loss_limit_percentage: f64,
}

impl Default for TradingGoalsSettings {
    fn default() -> Self {
        Self {
            profit_target_percentage: 0.0,
            loss_limit_percentage: 0.0,
        }
    }
}

impl TradingGoalsSettings {
    /// 当日盈利目标金额
    pub fn profit_target(&self, starting_amount: f64) -> Option<f64> {
        (self.profit_target_percentage > 0.0)
            .then(|| starting_amount * self.profit_target_percentage / 100.0)
    }

    /// 当日亏损限额(正数)
    pub fn loss_limit(&self, starting_amount: f64) -> Option<f64> {
        (self.loss_limit_percentage > 0.0)
            .then(|| starting_amount * self.loss_limit_percentage / 100.0)
    }
}
