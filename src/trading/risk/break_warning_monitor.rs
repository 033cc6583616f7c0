//! 连亏休息提醒
//!
//! 按账户维护滑动时间窗口内的平仓记录，满足策略条件时发出提醒，
//! 配置了暂停时撤销该账户下全部资产的武装。提醒到期自动失效。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::trading::model::{
    BreakWarningEvent, BreakWarningPolicy, BreakWarningSettings, ClosedTrade, Position,
};
use crate::trading::services::notification::Notifier;
use crate::trading::store::{AssetConfigStore, BreakWarningStore};

/// 窗口内统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub total_orders: usize,
    pub loss_count: usize,
    /// 末尾连续亏损笔数
    pub trailing_losses: usize,
}

impl WindowStats {
    fn from_trades<'a>(trades: impl Iterator<Item = &'a ClosedTrade>) -> Self {
        let mut stats = WindowStats {
            total_orders: 0,
            loss_count: 0,
            trailing_losses: 0,
        };
        for t in trades {
            stats.total_orders += 1;
            if t.pnl < 0.0 {
                stats.loss_count += 1;
                stats.trailing_losses += 1;
            } else {
                stats.trailing_losses = 0;
            }
        }
        stats
    }

    /// 是否满足触发条件
    pub fn triggers(&self, settings: &BreakWarningSettings) -> bool {
        if self.total_orders == 0 || self.total_orders < settings.min_orders_required {
            return false;
        }
        match settings.policy {
            BreakWarningPolicy::LossCount => self.loss_count >= settings.loss_threshold,
            BreakWarningPolicy::LossRatio { ratio } => {
                self.loss_count as f64 / self.total_orders as f64 >= ratio
            }
            BreakWarningPolicy::ConsecutiveLosses => {
                self.trailing_losses >= settings.loss_threshold
            }
        }
    }
}

pub struct BreakWarningMonitor {
    settings: RwLock<BreakWarningSettings>,
    history: Mutex<HashMap<i64, VecDeque<ClosedTrade>>>,
    warnings: Arc<BreakWarningStore>,
    asset_configs: Arc<AssetConfigStore>,
    notifier: Notifier,
}

impl BreakWarningMonitor {
    pub fn new(
        settings: BreakWarningSettings,
        warnings: Arc<BreakWarningStore>,
        asset_configs: Arc<AssetConfigStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            history: Mutex::new(HashMap::new()),
            warnings,
            asset_configs,
            notifier,
        }
    }

    pub async fn settings(&self) -> BreakWarningSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, settings: BreakWarningSettings) {
        info!("更新休息提醒配置: {:?}", settings);
        *self.settings.write().await = settings;
    }

    /// 当前窗口统计
    pub async fn window_stats(&self, balance_id: i64, now: i64) -> WindowStats {
        let window_ms = self.settings.read().await.window_ms();
        let history = self.history.lock().await;
        let trades = history.get(&balance_id);
        WindowStats::from_trades(
            trades
                .into_iter()
                .flatten()
                .filter(|t| t.closed_at >= now - window_ms),
        )
    }

    /// 处理一条平仓结果，触发时返回新提醒
    pub async fn on_closed_position(&self, position: &Position, now: i64) -> Option<BreakWarningEvent> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            return None;
        }
        let window_start = now - settings.window_ms();
        let trade = ClosedTrade::from(position);
        if trade.closed_at < window_start {
            debug!("平仓时间早于统计窗口，忽略: order_id={}", trade.order_id);
            return None;
        }
        let balance_id = trade.balance_id;

        let stats = {
            let mut history = self.history.lock().await;
            let trades = history.entry(balance_id).or_default();
            if trades.iter().any(|t| t.order_id == trade.order_id) {
                return None;
            }
            let at = trades.partition_point(|t| t.closed_at <= trade.closed_at);
            trades.insert(at, trade);
            while trades.front().is_some_and(|t| t.closed_at < window_start) {
                trades.pop_front();
            }
            WindowStats::from_trades(trades.iter())
        };

        if self.warnings.active(balance_id, now).is_some() {
            return None;
        }
        if !stats.triggers(&settings) {
            return None;
        }

        let event = BreakWarningEvent {
            id: uuid::Uuid::new_v4().to_string(),
            balance_id,
            window_minutes: settings.time_window_minutes,
            total_orders: stats.total_orders,
            loss_count: stats.loss_count,
            trigger_time: now,
            expires_at: now + settings.pause_ms(),
            pause_auto_trade: settings.pause_auto_trade,
            acknowledged_at: None,
        };
        self.warnings.record(event.clone());

        let disarmed = if settings.pause_auto_trade {
            self.asset_configs.disarm_balance(balance_id)
        } else {
            Vec::new()
        };
        info!(
            "触发休息提醒: balance_id={}, 窗口={}分钟, 订单={}, 亏损={}, 撤销武装={:?}",
            balance_id, settings.time_window_minutes, stats.total_orders, stats.loss_count, disarmed
        );
        self.notifier.warning(
            "建议休息",
            format!(
                "最近 {} 分钟 {} 笔订单中亏损 {} 笔，建议暂停 {} 分钟",
                settings.time_window_minutes,
                stats.total_orders,
                stats.loss_count,
                settings.pause_duration_minutes
            ),
        );
        Some(event)
    }

    pub fn active_warning(&self, balance_id: i64, now: i64) -> Option<BreakWarningEvent> {
        self.warnings.active(balance_id, now)
    }

    pub fn acknowledge(&self, balance_id: i64, warning_id: &str, now: i64) -> bool {
        self.warnings.acknowledge(balance_id, warning_id, now)
    }
}
