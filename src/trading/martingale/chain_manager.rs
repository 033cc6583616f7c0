//! 马丁格尔链状态机
//!
//! 状态: ACTIVE -> COMPLETED_WIN | COMPLETED_LOSS | CANCELLED(reason)，终态不可再变。
//! 首单亏损建链(0 -> 1 层)，链内亏损按倍数加仓，盈利结束；加仓前检查超时与日内目标。
//! 跟踪订单先从待处理集合移除再做状态转换，同一订单的结果只会被处理一次。

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::app_config::MartingaleRuntimeConfig;
use crate::error::{AppError, AppResult};
use crate::time_util;
use crate::trading::model::{
    round_stake, CancelReason, ChainStatus, LinkStatus, MartingaleChain, MartingaleOrderLink,
    OrderOutcome, OrderRequest, PlacedOrder, Position, TrackedOrder,
};
use crate::trading::services::notification::Notifier;
use crate::trading::services::platform_client::TradingPlatformClient;
use crate::trading::store::{
    AssetConfigStore, GoalFulfillmentStore, MartingaleStore, TrackedOrderStore,
};

/// 一次平仓结果引起的链变化
#[derive(Debug, Clone, PartialEq)]
pub enum ChainTransition {
    /// 不是系统跟踪的订单，或已处理过
    NotTracked,
    /// 跟踪订单，但不涉及链
    Untouched,
    /// 已下出下一层订单
    Escalated {
        chain_id: String,
        level: usize,
        stake: f64,
        order_id: i64,
    },
    /// 链进入终态
    Closed { chain_id: String, status: ChainStatus },
    /// 首单亏损但被拦截，未建链
    CreationVetoed(CancelReason),
}

pub struct MartingaleChainManager {
    client: Arc<dyn TradingPlatformClient>,
    store: Arc<MartingaleStore>,
    tracked_orders: Arc<TrackedOrderStore>,
    asset_configs: Arc<AssetConfigStore>,
    fulfillments: Arc<GoalFulfillmentStore>,
    notifier: Notifier,
    config: MartingaleRuntimeConfig,
    offset: FixedOffset,
    /// 同一资产的链转换串行执行，不同资产互不阻塞
    asset_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl MartingaleChainManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn TradingPlatformClient>,
        store: Arc<MartingaleStore>,
        tracked_orders: Arc<TrackedOrderStore>,
        asset_configs: Arc<AssetConfigStore>,
        fulfillments: Arc<GoalFulfillmentStore>,
        notifier: Notifier,
        config: MartingaleRuntimeConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            store,
            tracked_orders,
            asset_configs,
            fulfillments,
            notifier,
            config,
            offset,
            asset_locks: DashMap::new(),
        }
    }

    fn asset_lock(&self, asset_id: i64) -> Arc<Mutex<()>> {
        self.asset_locks.entry(asset_id).or_default().clone()
    }

    fn today(&self, now: i64) -> NaiveDate {
        time_util::trading_day(now, self.offset)
    }

    /// 自动交易首单成交后登记 0 层映射，之后的亏损才会被识别为可建链
    pub async fn bootstrap(&self, order: &PlacedOrder) {
        let link = MartingaleOrderLink {
            order_id: order.id,
            chain_id: None,
            balance_id: order.balance_id,
            asset_id: order.asset_id,
            level: 0,
            multiplier: 1.0,
            stake_amount: order.amount,
            direction: order.direction,
            period: order.period,
            status: LinkStatus::Pending,
            created_at: self.client.current_time(),
        };
        self.store.insert_link(link).await;
        debug!("登记 0 层订单: order_id={}, asset_id={}", order.id, order.asset_id);
    }

    /// 处理一条平仓结果
    pub async fn handle_position_closed(&self, position: &Position) -> AppResult<ChainTransition> {
        let Some(order) = self.tracked_orders.take(position.order_id) else {
            return Ok(ChainTransition::NotTracked);
        };
        // 以结果到达时刻判断超时，等待同资产的锁不计入延迟
        let now = self.client.current_time();
        let lock = self.asset_lock(order.asset_id);
        let _guard = lock.lock().await;
        let outcome = position.outcome();
        let link = self.store.link(order.order_id).await;

        debug!(
            "处理平仓结果: order_id={}, pnl={}, outcome={:?}, chain_id={:?}",
            order.order_id,
            position.pnl,
            outcome,
            link.as_ref().and_then(|l| l.chain_id.as_deref())
        );

        match outcome {
            OrderOutcome::Win => {
                let Some(link) = link else {
                    return Ok(ChainTransition::Untouched);
                };
                self.store.set_link_status(link.order_id, LinkStatus::Won).await;
                match link.chain_id {
                    Some(chain_id) => Ok(self.finish(&chain_id, ChainStatus::CompletedWin, now).await),
                    None => Ok(ChainTransition::Untouched),
                }
            }
            OrderOutcome::Loss => {
                if let Some(l) = &link {
                    self.store.set_link_status(l.order_id, LinkStatus::Lost).await;
                }
                match link.as_ref().and_then(|l| l.chain_id.clone()) {
                    Some(chain_id) => {
                        let link = link.ok_or_else(|| {
                            AppError::InvariantViolation(format!("订单映射丢失: {}", order.order_id))
                        })?;
                        self.escalate(&chain_id, &link, position, now).await
                    }
                    None => self.create_chain(&order, link, position, now).await,
                }
            }
        }
    }

    async fn create_chain(
        &self,
        order: &TrackedOrder,
        link: Option<MartingaleOrderLink>,
        position: &Position,
        now: i64,
    ) -> AppResult<ChainTransition> {
        let Some(settings) = self
            .asset_configs
            .get(order.asset_id)
            .map(|c| c.martingale)
            .filter(|m| m.enabled)
        else {
            return Ok(ChainTransition::Untouched);
        };

        if now - position.expiration_time > self.config.chain_timeout_ms {
            info!(
                "平仓结果过期，不建立马丁链: order_id={}, 延迟={}ms",
                order.order_id,
                now - position.expiration_time
            );
            return Ok(ChainTransition::CreationVetoed(CancelReason::Timeout));
        }
        if self.fulfillments.has_any(order.balance_id, self.today(now)) {
            info!(
                "当日目标已达成，不建立马丁链: balance_id={}, order_id={}",
                order.balance_id, order.order_id
            );
            return Ok(ChainTransition::CreationVetoed(CancelReason::DailyLimit));
        }
        if let Some(existing) = self.store.chain_for_original_order(order.order_id).await {
            error!(
                "同一订单重复建链: order_id={}, 已有 chain_id={}",
                order.order_id, existing.chain_id
            );
            return Err(AppError::InvariantViolation(format!(
                "订单 {} 已存在马丁链 {}",
                order.order_id, existing.chain_id
            )));
        }

        let settings = settings.normalized();
        let chain = MartingaleChain {
            chain_id: uuid::Uuid::new_v4().to_string(),
            balance_id: order.balance_id,
            asset_id: order.asset_id,
            direction: order.direction,
            period: order.period,
            original_order_id: order.order_id,
            current_level: 0,
            max_level: settings.number_of_martingales,
            multipliers: settings.multipliers.clone(),
            status: ChainStatus::Active,
            total_invested: order.amount,
            created_at: now,
            completed_at: None,
            cancelled_at: None,
        };
        let chain_id = chain.chain_id.clone();
        self.store.insert_chain(chain).await;

        let root = match link {
            Some(_) => self
                .store
                .update_link(order.order_id, |l| l.chain_id = Some(chain_id.clone()))
                .await
                .ok_or_else(|| {
                    AppError::InvariantViolation(format!("订单映射丢失: {}", order.order_id))
                })?,
            None => {
                let root = MartingaleOrderLink {
                    order_id: order.order_id,
                    chain_id: Some(chain_id.clone()),
                    balance_id: order.balance_id,
                    asset_id: order.asset_id,
                    level: 0,
                    multiplier: 1.0,
                    stake_amount: order.amount,
                    direction: order.direction,
                    period: order.period,
                    status: LinkStatus::Lost,
                    created_at: order.created_at,
                };
                self.store.insert_link(root.clone()).await;
                root
            }
        };
        info!(
            "马丁链已建立: chain_id={}, asset_id={}, 首单={}, 最大层数={}",
            chain_id, order.asset_id, order.order_id, settings.number_of_martingales
        );

        self.escalate(&chain_id, &root, position, now).await
    }

    async fn escalate(
        &self,
        chain_id: &str,
        link: &MartingaleOrderLink,
        position: &Position,
        now: i64,
    ) -> AppResult<ChainTransition> {
        let chain = self
            .store
            .get_chain(chain_id)
            .await
            .ok_or_else(|| AppError::InvariantViolation(format!("马丁链不存在: {}", chain_id)))?;
        if !chain.is_active() {
            debug!("链已结束，忽略结果: chain_id={}, status={}", chain_id, chain.status);
            return Ok(ChainTransition::Untouched);
        }
        if link.level != chain.current_level {
            error!(
                "链层级不一致: chain_id={}, link_level={}, chain_level={}",
                chain_id, link.level, chain.current_level
            );
            return Err(AppError::InvariantViolation(format!(
                "链 {} 当前层级 {}，收到第 {} 层结果",
                chain_id, chain.current_level, link.level
            )));
        }

        if !chain.can_escalate() {
            return Ok(self.finish(chain_id, ChainStatus::CompletedLoss, now).await);
        }
        if now - position.expiration_time > self.config.chain_timeout_ms {
            return Ok(self
                .finish(chain_id, ChainStatus::Cancelled(CancelReason::Timeout), now)
                .await);
        }
        if self.fulfillments.has_any(chain.balance_id, self.today(now)) {
            return Ok(self
                .finish(chain_id, ChainStatus::Cancelled(CancelReason::DailyLimit), now)
                .await);
        }

        let multiplier = chain
            .multipliers
            .get(chain.current_level)
            .copied()
            .ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "链 {} 缺少第 {} 层倍数",
                    chain_id, chain.current_level
                ))
            })?;
        let stake = round_stake(link.stake_amount * multiplier, self.config.stake_precision);
        let request = OrderRequest {
            balance_id: chain.balance_id,
            asset_id: chain.asset_id,
            amount: stake,
            direction: chain.direction,
            period: chain.period,
            is_system_trade: true,
        };

        let placed = match self.client.place_order(&request).await {
            Ok(placed) => placed,
            Err(e) => {
                let err = AppError::order_placement(chain.asset_id, &e);
                warn!("马丁加仓下单失败: chain_id={}, stake={}, err={}", chain_id, stake, err);
                self.notifier.error(
                    "马丁加仓失败",
                    format!("资产 {} 第 {} 层下单失败: {}", chain.asset_id, chain.current_level + 1, err),
                );
                return Ok(self
                    .finish(chain_id, ChainStatus::Cancelled(CancelReason::System), now)
                    .await);
            }
        };

        let level = chain.current_level + 1;
        self.store
            .update_chain(chain_id, |c| {
                c.current_level = level;
                c.total_invested += placed.amount;
            })
            .await;
        self.store
            .insert_link(MartingaleOrderLink {
                order_id: placed.id,
                chain_id: Some(chain_id.to_string()),
                balance_id: placed.balance_id,
                asset_id: placed.asset_id,
                level,
                multiplier,
                stake_amount: placed.amount,
                direction: placed.direction,
                period: placed.period,
                status: LinkStatus::Pending,
                created_at: now,
            })
            .await;
        self.tracked_orders
            .insert(TrackedOrder::from_placed(&placed, Some(chain_id.to_string()), now));

        info!(
            "马丁加仓: chain_id={}, level={}/{}, stake={}, order_id={}",
            chain_id, level, chain.max_level, placed.amount, placed.id
        );
        Ok(ChainTransition::Escalated {
            chain_id: chain_id.to_string(),
            level,
            stake: placed.amount,
            order_id: placed.id,
        })
    }

    /// 链进入终态；已是终态时保持不变
    async fn finish(&self, chain_id: &str, status: ChainStatus, now: i64) -> ChainTransition {
        let updated = self
            .store
            .update_chain(chain_id, |c| {
                if c.is_active() {
                    c.status = status;
                    match status {
                        ChainStatus::Cancelled(_) => c.cancelled_at = Some(now),
                        _ => c.completed_at = Some(now),
                    }
                }
            })
            .await;
        let final_status = updated.map(|c| c.status).unwrap_or(status);
        if let ChainStatus::Cancelled(_) = final_status {
            for link in self.store.links_for_chain(chain_id).await {
                if link.status == LinkStatus::Pending {
                    self.store.set_link_status(link.order_id, LinkStatus::Cancelled).await;
                }
            }
        }
        info!("马丁链结束: chain_id={}, status={}", chain_id, final_status);
        ChainTransition::Closed {
            chain_id: chain_id.to_string(),
            status: final_status,
        }
    }

    pub async fn can_user_cancel_chain(&self, chain_id: &str) -> bool {
        self.store
            .get_chain(chain_id)
            .await
            .map(|c| c.is_active())
            .unwrap_or(false)
    }

    /// 用户手动取消，仅对 ACTIVE 链生效
    pub async fn cancel_chain_by_user(&self, chain_id: &str) -> bool {
        let Some(chain) = self.store.get_chain(chain_id).await else {
            return false;
        };
        let lock = self.asset_lock(chain.asset_id);
        let _guard = lock.lock().await;
        if !self.can_user_cancel_chain(chain_id).await {
            return false;
        }
        let now = self.client.current_time();
        self.finish(chain_id, ChainStatus::Cancelled(CancelReason::User), now)
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::{AssetAutoTradeConfig, Direction, MartingaleSettings, PositionStatus};
    use crate::trading::services::PaperTradingClient;
    use crate::trading::store::SessionStores;
    use crate::trading::model::{GoalFulfillment, GoalType};

    const BASE: i64 = 1_700_000_010_000;

    struct Fixture {
        client: Arc<PaperTradingClient>,
        stores: SessionStores,
        manager: MartingaleChainManager,
    }

    async fn fixture(levels: usize, multipliers: Vec<f64>) -> Fixture {
        let client = Arc::new(PaperTradingClient::new(BASE));
        client.add_balance(1, 1000.0, "USD").await;
        let stores = SessionStores::new();
        stores.asset_configs.upsert(
            AssetAutoTradeConfig::new(7, 1, 10.0, 60)
                .with_martingale(MartingaleSettings::new(true, levels, multipliers)),
        );
        let manager = MartingaleChainManager::new(
            client.clone(),
            stores.martingale.clone(),
            stores.tracked_orders.clone(),
            stores.asset_configs.clone(),
            stores.fulfillments.clone(),
            Notifier::default(),
            MartingaleRuntimeConfig::default(),
            time_util::fixed_offset(0),
        );
        Fixture {
            client,
            stores,
            manager,
        }
    }

    impl Fixture {
        async fn first_order(&self) -> i64 {
            let placed = self
                .client
                .place_order(&OrderRequest {
                    balance_id: 1,
                    asset_id: 7,
                    amount: 10.0,
                    direction: Direction::Call,
                    period: 60,
                    is_system_trade: true,
                })
                .await
                .unwrap();
            self.manager.bootstrap(&placed).await;
            self.stores
                .tracked_orders
                .insert(TrackedOrder::from_placed(&placed, None, self.client.current_time()));
            placed.id
        }

        /// 构造一条刚到期 `age_ms` 的平仓结果
        fn closed(&self, order_id: i64, pnl: f64, age_ms: i64) -> Position {
            let expiration_time = self.client.current_time() - age_ms;
            Position {
                order_id,
                balance_id: 1,
                asset_id: 7,
                direction: Direction::Call,
                amount: 10.0,
                pnl,
                open_time: expiration_time - 60_000,
                expiration_time,
                close_time: Some(expiration_time),
                status: PositionStatus::Closed,
            }
        }
    }

    fn escalated(t: ChainTransition) -> (String, usize, f64, i64) {
        match t {
            ChainTransition::Escalated {
                chain_id,
                level,
                stake,
                order_id,
            } => (chain_id, level, stake, order_id),
            other => panic!("expected escalation, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_loss_win_completes_with_doubling_stakes() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;

        let (chain_id, level, stake, second) =
            escalated(f.manager.handle_position_closed(&f.closed(first, -10.0, 1000)).await.unwrap());
        assert_eq!((level, stake), (1, 20.0));

        let (_, level, stake, third) =
            escalated(f.manager.handle_position_closed(&f.closed(second, -20.0, 1000)).await.unwrap());
        assert_eq!((level, stake), (2, 40.0));

        let t = f.manager.handle_position_closed(&f.closed(third, 34.0, 1000)).await.unwrap();
        assert_eq!(
            t,
            ChainTransition::Closed {
                chain_id: chain_id.clone(),
                status: ChainStatus::CompletedWin
            }
        );

        let stakes: Vec<f64> = f.client.placed_orders().await.iter().map(|o| o.amount).collect();
        assert_eq!(stakes, vec![10.0, 20.0, 40.0]);
        let levels: Vec<usize> = f
            .stores
            .martingale
            .links_for_chain(&chain_id)
            .await
            .iter()
            .map(|l| l.level)
            .collect();
        assert_eq!(levels, vec![0, 1, 2]);
        let chain = f.stores.martingale.get_chain(&chain_id).await.unwrap();
        assert_eq!(chain.total_invested, 70.0);
        assert!(chain.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_level_loss_completes_chain() {
        let f = fixture(1, vec![2.0]).await;
        let first = f.first_order().await;
        let (chain_id, _, _, second) =
            escalated(f.manager.handle_position_closed(&f.closed(first, -10.0, 0)).await.unwrap());
        let t = f.manager.handle_position_closed(&f.closed(second, -20.0, 0)).await.unwrap();
        assert_eq!(
            t,
            ChainTransition::Closed {
                chain_id,
                status: ChainStatus::CompletedLoss
            }
        );
        assert_eq!(f.client.placed_orders().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_cancels_with_timeout() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        let (chain_id, _, _, second) =
            escalated(f.manager.handle_position_closed(&f.closed(first, -10.0, 1000)).await.unwrap());

        let t = f.manager.handle_position_closed(&f.closed(second, -20.0, 90_000)).await.unwrap();
        assert_eq!(
            t,
            ChainTransition::Closed {
                chain_id: chain_id.clone(),
                status: ChainStatus::Cancelled(CancelReason::Timeout)
            }
        );
        let stakes: Vec<f64> = f.client.placed_orders().await.iter().map(|o| o.amount).collect();
        assert_eq!(stakes, vec![10.0, 20.0]);
        let chain = f.stores.martingale.get_chain(&chain_id).await.unwrap();
        assert!(chain.cancelled_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_delivery_is_noop() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        let position = f.closed(first, -10.0, 0);
        escalated(f.manager.handle_position_closed(&position).await.unwrap());
        let again = f.manager.handle_position_closed(&position).await.unwrap();
        assert_eq!(again, ChainTransition::NotTracked);
        assert_eq!(f.client.placed_orders().await.len(), 2);
        assert_eq!(f.stores.martingale.stats().await.total_chains, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fulfillment_vetoes_creation() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        let now = f.client.current_time();
        f.stores.fulfillments.record_if_absent(GoalFulfillment {
            id: "g1".to_string(),
            balance_id: 1,
            goal_type: GoalType::Profit,
            target_value: 10.0,
            actual_value: 12.0,
            date: time_util::trading_day(now, time_util::fixed_offset(0)),
            acknowledged: true,
            created_at: now,
        });
        let t = f.manager.handle_position_closed(&f.closed(first, -10.0, 0)).await.unwrap();
        assert_eq!(t, ChainTransition::CreationVetoed(CancelReason::DailyLimit));
        assert_eq!(f.stores.martingale.stats().await.total_chains, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_escalation_cancels_with_system() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        f.client.reject_next_orders(1).await;
        let t = f.manager.handle_position_closed(&f.closed(first, -10.0, 0)).await.unwrap();
        assert!(matches!(
            t,
            ChainTransition::Closed {
                status: ChainStatus::Cancelled(CancelReason::System),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_cancel_only_active_chain() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        let (chain_id, ..) =
            escalated(f.manager.handle_position_closed(&f.closed(first, -10.0, 0)).await.unwrap());
        assert!(f.manager.can_user_cancel_chain(&chain_id).await);
        assert!(f.manager.cancel_chain_by_user(&chain_id).await);
        assert!(!f.manager.cancel_chain_by_user(&chain_id).await);
        let chain = f.stores.martingale.get_chain(&chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::Cancelled(CancelReason::User));
        let pending = f
            .stores
            .martingale
            .links_for_chain(&chain_id)
            .await
            .into_iter()
            .filter(|l| l.status == LinkStatus::Pending)
            .count();
        assert_eq!(pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_win_without_chain_is_untouched() {
        let f = fixture(2, vec![2.0, 2.0]).await;
        let first = f.first_order().await;
        let t = f.manager.handle_position_closed(&f.closed(first, 8.5, 0)).await.unwrap();
        assert_eq!(t, ChainTransition::Untouched);
        assert_eq!(f.stores.martingale.link(first).await.unwrap().status, LinkStatus::Won);
    }
}
