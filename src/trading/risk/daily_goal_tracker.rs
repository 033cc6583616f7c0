//! 每日盈亏目标
//!
//! 每个账户每个自然日记录一次日初余额，按当日已平仓订单的盈亏合计与目标比较，
//! 首次达到盈利目标或亏损限额时生成唯一的达成记录，并撤销该账户下的武装。
//! 达成记录按日期生效，确认后当日依旧禁止建立新的马丁链。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::time_util;
use crate::trading::model::{
    DailyBalanceSnapshot, GoalFulfillment, GoalType, Position, TradingGoalsSettings,
};
use crate::trading::services::notification::Notifier;
use crate::trading::services::platform_client::TradingPlatformClient;
use crate::trading::store::{AssetConfigStore, DailyBalanceStore, GoalFulfillmentStore};

/// 单账户当日已平仓盈亏，按订单号去重
#[derive(Debug, Clone)]
struct DayPnl {
    date: NaiveDate,
    by_order: HashMap<i64, f64>,
}

impl DayPnl {
    fn total(&self) -> f64 {
        self.by_order.values().sum()
    }
}

pub struct DailyGoalTracker {
    client: Arc<dyn TradingPlatformClient>,
    daily_balances: Arc<DailyBalanceStore>,
    fulfillments: Arc<GoalFulfillmentStore>,
    asset_configs: Arc<AssetConfigStore>,
    notifier: Notifier,
    settings: RwLock<TradingGoalsSettings>,
    offset: FixedOffset,
    pnl: Mutex<HashMap<i64, DayPnl>>,
}

impl DailyGoalTracker {
    pub fn new(
        client: Arc<dyn TradingPlatformClient>,
        daily_balances: Arc<DailyBalanceStore>,
        fulfillments: Arc<GoalFulfillmentStore>,
        asset_configs: Arc<AssetConfigStore>,
        notifier: Notifier,
        settings: TradingGoalsSettings,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            daily_balances,
            fulfillments,
            asset_configs,
            notifier,
            settings: RwLock::new(settings),
            offset,
            pnl: Mutex::new(HashMap::new()),
        }
    }

    pub fn today(&self, now: i64) -> NaiveDate {
        time_util::trading_day(now, self.offset)
    }

    pub async fn settings(&self) -> TradingGoalsSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, settings: TradingGoalsSettings) {
        info!("更新每日目标配置: {:?}", settings);
        *self.settings.write().await = settings;
    }

    /// 为全部账户补齐当日快照(启动、跨零点时调用)，返回新建数量
    pub async fn capture_snapshots(&self, now: i64) -> AppResult<usize> {
        let today = self.today(now);
        let balances = self.client.get_balances().await?;
        let mut created = 0;
        for balance in &balances {
            if self.daily_balances.capture_if_absent(balance, today, now) {
                info!(
                    "记录日初余额: balance_id={}, amount={}, date={}",
                    balance.id,
                    balance.amount,
                    time_util::format_date(today)
                );
                created += 1;
            }
        }
        Ok(created)
    }

    /// 取当日快照，缺失时按当前余额补建
    pub async fn ensure_snapshot(&self, balance_id: i64, now: i64) -> Option<DailyBalanceSnapshot> {
        let today = self.today(now);
        if let Some(s) = self.daily_balances.get(balance_id, today) {
            return Some(s);
        }
        match self.client.get_balances().await {
            Ok(balances) => {
                let balance = balances.into_iter().find(|b| b.id == balance_id)?;
                self.daily_balances.capture_if_absent(&balance, today, now);
                self.daily_balances.get(balance_id, today)
            }
            Err(e) => {
                warn!("补建日初余额失败: balance_id={}, err={}", balance_id, e);
                None
            }
        }
    }

    /// 当日已平仓盈亏合计
    pub async fn today_pnl(&self, balance_id: i64, now: i64) -> f64 {
        let today = self.today(now);
        self.pnl
            .lock()
            .await
            .get(&balance_id)
            .filter(|d| d.date == today)
            .map(|d| d.total())
            .unwrap_or(0.0)
    }

    /// 以平台当日平仓记录为准刷新本地累计，平台不可用时保留本地结果
    async fn refresh_from_platform(&self, balance_id: i64, now: i64) {
        let from = time_util::start_of_day_ms(now, self.offset);
        match self.client.get_closed_positions(balance_id, from, now).await {
            Ok(positions) => {
                let today = self.today(now);
                let mut pnl = self.pnl.lock().await;
                let day = pnl.entry(balance_id).or_insert_with(|| DayPnl {
                    date: today,
                    by_order: HashMap::new(),
                });
                if day.date != today {
                    day.date = today;
                    day.by_order.clear();
                }
                for p in positions {
                    if self.today(p.closed_at()) == today {
                        day.by_order.insert(p.order_id, p.pnl);
                    }
                }
            }
            Err(e) => warn!("查询当日平仓记录失败: balance_id={}, err={}", balance_id, e),
        }
    }

    /// 处理一条平仓结果，返回本次新生成的达成记录
    pub async fn on_closed_position(&self, position: &Position, now: i64) -> Vec<GoalFulfillment> {
        let today = self.today(now);
        let balance_id = position.balance_id;
        if self.today(position.closed_at()) != today {
            debug!("非当日平仓，不计入目标: order_id={}", position.order_id);
            return Vec::new();
        }

        {
            let mut pnl = self.pnl.lock().await;
            let day = pnl.entry(balance_id).or_insert_with(|| DayPnl {
                date: today,
                by_order: HashMap::new(),
            });
            if day.date != today {
                day.date = today;
                day.by_order.clear();
            }
            day.by_order.insert(position.order_id, position.pnl);
        }
        self.refresh_from_platform(balance_id, now).await;

        let settings = self.settings().await;
        if settings.profit_target_percentage <= 0.0 && settings.loss_limit_percentage <= 0.0 {
            return Vec::new();
        }
        let Some(snapshot) = self.ensure_snapshot(balance_id, now).await else {
            warn!("缺少日初余额，无法判断目标: balance_id={}", balance_id);
            return Vec::new();
        };
        let actual = self.today_pnl(balance_id, now).await;

        let mut created = Vec::new();
        if let Some(target) = settings.profit_target(snapshot.amount) {
            if actual >= target {
                created.extend(self.fulfill(balance_id, GoalType::Profit, target, actual, today, now));
            }
        }
        if let Some(limit) = settings.loss_limit(snapshot.amount) {
            if actual <= -limit {
                created.extend(self.fulfill(balance_id, GoalType::Loss, -limit, actual, today, now));
            }
        }
        created
    }

    fn fulfill(
        &self,
        balance_id: i64,
        goal_type: GoalType,
        target_value: f64,
        actual_value: f64,
        date: NaiveDate,
        now: i64,
    ) -> Option<GoalFulfillment> {
        let fulfillment = GoalFulfillment {
            id: uuid::Uuid::new_v4().to_string(),
            balance_id,
            goal_type,
            target_value,
            actual_value,
            date,
            acknowledged: false,
            created_at: now,
        };
        if !self.fulfillments.record_if_absent(fulfillment.clone()) {
            return None;
        }

        let disarmed = self.asset_configs.disarm_balance(balance_id);
        info!(
            "每日目标达成: balance_id={}, type={}, target={:.2}, actual={:.2}, 撤销武装={:?}",
            balance_id,
            goal_type.as_str(),
            target_value,
            actual_value,
            disarmed
        );
        let body = format!(
            "账户 {} 当日盈亏 {:.2}，目标 {:.2}，今日自动交易已停止",
            balance_id, actual_value, target_value
        );
        match goal_type {
            GoalType::Profit => self.notifier.info("达成每日盈利目标", body),
            GoalType::Loss => self.notifier.warning("触及每日亏损限额", body),
        }
        Some(fulfillment)
    }

    /// 当日达成记录，最新在前
    pub fn fulfillments_today(&self, now: i64) -> Vec<GoalFulfillment> {
        self.fulfillments.for_day(self.today(now))
    }

    pub fn acknowledge(&self, fulfillment_id: &str) -> bool {
        self.fulfillments.acknowledge(fulfillment_id)
    }
}
