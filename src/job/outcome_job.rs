//! 平仓结果处理
//!
//! 轮询各账户的平仓记录(或由上层直接推送)，每条结果只处理一次，
//! 依次交给每日目标、休息提醒和马丁链。先更新目标，使本笔亏损触发的限额能拦截加仓。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::FixedOffset;
use dashmap::DashMap;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::time_util;
use crate::trading::martingale::{ChainTransition, MartingaleChainManager};
use crate::trading::model::{BreakWarningEvent, GoalFulfillment, Position, PositionStatus};
use crate::trading::risk::{BreakWarningMonitor, DailyGoalTracker};
use crate::trading::services::platform_client::TradingPlatformClient;
use crate::trading::store::SessionStores;

/// 单条平仓结果的处理结果
#[derive(Debug, Clone, Default)]
pub struct OutcomeReport {
    pub order_id: i64,
    pub transition: Option<ChainTransition>,
    pub fulfillments: Vec<GoalFulfillment>,
    pub warning: Option<BreakWarningEvent>,
}

pub struct OutcomeProcessor {
    client: Arc<dyn TradingPlatformClient>,
    stores: SessionStores,
    chain_manager: Arc<MartingaleChainManager>,
    goal_tracker: Arc<DailyGoalTracker>,
    break_monitor: Arc<BreakWarningMonitor>,
    offset: FixedOffset,
    /// 已处理的订单 -> 平仓时间
    processed: DashMap<i64, i64>,
}

impl OutcomeProcessor {
    pub fn new(
        client: Arc<dyn TradingPlatformClient>,
        stores: SessionStores,
        chain_manager: Arc<MartingaleChainManager>,
        goal_tracker: Arc<DailyGoalTracker>,
        break_monitor: Arc<BreakWarningMonitor>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            stores,
            chain_manager,
            goal_tracker,
            break_monitor,
            offset,
            processed: DashMap::new(),
        }
    }

    /// 处理一条平仓结果，重复投递返回 None
    pub async fn process(&self, position: &Position) -> Option<OutcomeReport> {
        if position.status != PositionStatus::Closed {
            return None;
        }
        if self
            .processed
            .insert(position.order_id, position.closed_at())
            .is_some()
        {
            debug!("平仓结果已处理过: order_id={}", position.order_id);
            return None;
        }
        let now = self.client.current_time();

        let fulfillments = self.goal_tracker.on_closed_position(position, now).await;
        let warning = self.break_monitor.on_closed_position(position, now).await;
        let transition = match self.chain_manager.handle_position_closed(position).await {
            Ok(t) => Some(t),
            Err(e) => {
                error!("马丁链处理失败: order_id={}, err={}", position.order_id, e);
                None
            }
        };

        Some(OutcomeReport {
            order_id: position.order_id,
            transition,
            fulfillments,
            warning,
        })
    }

    /// 需要关注的账户：已配置资产的账户与跟踪订单的账户
    fn watched_balances(&self) -> BTreeSet<i64> {
        let mut balances: BTreeSet<i64> = self
            .stores
            .asset_configs
            .all()
            .into_iter()
            .filter_map(|c| c.balance_id)
            .collect();
        balances.extend(self.stores.tracked_orders.balances());
        balances
    }

    /// 拉取一次平仓记录并处理新结果
    ///
    /// 按资产分组并发处理，组内按平仓时间顺序；一个资产的慢下单不拖累其它资产
    pub async fn poll_once(self: &Arc<Self>) -> Vec<OutcomeReport> {
        let now = self.client.current_time();
        let mut from = time_util::start_of_day_ms(now, self.offset);
        if let Some(oldest) = self.stores.tracked_orders.oldest_created_at() {
            from = from.min(oldest);
        }

        let mut by_asset: BTreeMap<i64, Vec<Position>> = BTreeMap::new();
        for balance_id in self.watched_balances() {
            let positions = match self.client.get_closed_positions(balance_id, from, now).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("拉取平仓记录失败: balance_id={}, err={}", balance_id, e);
                    continue;
                }
            };
            for position in positions {
                if !self.processed.contains_key(&position.order_id) {
                    by_asset.entry(position.asset_id).or_default().push(position);
                }
            }
        }

        let mut tasks = JoinSet::new();
        for (asset_id, mut positions) in by_asset {
            positions.sort_by_key(|p| p.closed_at());
            let this = Arc::clone(self);
            tasks.spawn(async move {
                let mut reports = Vec::with_capacity(positions.len());
                for position in &positions {
                    if let Some(report) = this.process(position).await {
                        reports.push(report);
                    }
                }
                debug!("平仓结果处理完成: asset_id={}, count={}", asset_id, reports.len());
                reports
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(r) => reports.extend(r),
                Err(e) => error!("平仓结果处理任务异常: {}", e),
            }
        }
        reports
    }

    /// 清理 `cutoff` 之前平仓的去重记录
    pub fn forget_before(&self, cutoff: i64) -> usize {
        let before = self.processed.len();
        self.processed.retain(|_, closed_at| *closed_at >= cutoff);
        before - self.processed.len()
    }
}
