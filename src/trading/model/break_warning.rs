//! 连亏休息提醒

use serde::{Deserialize, Serialize};

/// 触发判定方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BreakWarningPolicy {
    /// 窗口内亏损笔数 >= loss_threshold
    LossCount,
    /// 窗口内亏损占比 >= ratio
    LossRatio { ratio: f64 },
    /// 窗口内最近连续亏损笔数 >= loss_threshold
    ConsecutiveLosses,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakWarningSettings {
    pub enabled: bool,
    /// 统计窗口 (分钟)，15 或 30
    pub time_window_minutes: i64,
    pub min_orders_required: usize,
    pub loss_threshold: usize,
    pub pause_auto_trade: bool,
    /// 暂停时长 (分钟)，15 / 30 / 60
    pub pause_duration_minutes: i64,
    pub policy: BreakWarningPolicy,
}

impl Default for BreakWarningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_minutes: 15,
            min_orders_required: 7,
            loss_threshold: 3,
            pause_auto_trade: true,
            pause_duration_minutes: 15,
            policy: BreakWarningPolicy::LossCount,
        }
    }
}

impl BreakWarningSettings {
    pub fn window_ms(&self) -> i64 {
        self.time_window_minutes * 60 * 1000
    }

    pub fn pause_ms(&self) -> i64 {
        self.pause_duration_minutes * 60 * 1000
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingLimitsSettings {
    pub break_warning: BreakWarningSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakWarningEvent {
    pub id: String,
    pub balance_id: i64,
    pub window_minutes: i64,
    pub total_orders: usize,
    pub loss_count: usize,
    pub trigger_time: i64,
    pub expires_at: i64,
    pub pause_auto_trade: bool,
    pub acknowledged_at: Option<i64>,
}

impl BreakWarningEvent {
    /// 到期自动失效，无需清理
    pub fn is_active_at(&self, now: i64) -> bool {
        now >= self.trigger_time && now < self.expires_at
    }
}
