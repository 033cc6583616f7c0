//! 自动交易分发
//!
//! 订阅信号总线，按顺序检查前置条件，任一不满足即放弃(只记 debug 日志)；
//! 全部通过后原子地消费一次武装再下单，一次武装只会触发一笔订单。

use std::sync::Arc;

use chrono::FixedOffset;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::time_util;
use crate::trading::martingale::MartingaleChainManager;
use crate::trading::model::{OrderRequest, PlacedOrder, SignalEvent, TrackedOrder};
use crate::trading::services::notification::Notifier;
use crate::trading::services::platform_client::TradingPlatformClient;
use crate::trading::store::SessionStores;

/// 放弃下单的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotArmed,
    GoalReached,
    BalanceUnavailable,
    BreakWarningActive,
    InsufficientBalance,
    ChainActive,
    DuplicatePosition,
    /// 并发信号已抢先消费了本次武装
    ArmAlreadyConsumed,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Placed(PlacedOrder),
    Skipped(SkipReason),
    Failed(AppError),
}

impl DispatchOutcome {
    pub fn placed(&self) -> Option<&PlacedOrder> {
        match self {
            DispatchOutcome::Placed(order) => Some(order),
            _ => None,
        }
    }
}

pub struct AutoTradeDispatcher {
    client: Arc<dyn TradingPlatformClient>,
    stores: SessionStores,
    chain_manager: Arc<MartingaleChainManager>,
    notifier: Notifier,
    offset: FixedOffset,
}

impl AutoTradeDispatcher {
    pub fn new(
        client: Arc<dyn TradingPlatformClient>,
        stores: SessionStores,
        chain_manager: Arc<MartingaleChainManager>,
        notifier: Notifier,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            stores,
            chain_manager,
            notifier,
            offset,
        }
    }

    fn skip(event: &SignalEvent, reason: SkipReason) -> DispatchOutcome {
        debug!(
            "信号未下单: asset_id={}, direction={}, reason={:?}",
            event.asset_id, event.direction, reason
        );
        DispatchOutcome::Skipped(reason)
    }

    pub async fn on_signal(&self, event: &SignalEvent) -> DispatchOutcome {
        let Some(config) = self
            .stores
            .asset_configs
            .get(event.asset_id)
            .filter(|c| c.is_ready())
        else {
            return Self::skip(event, SkipReason::NotArmed);
        };
        let Some(balance_id) = config.balance_id else {
            return Self::skip(event, SkipReason::BalanceUnavailable);
        };

        let now = self.client.current_time();
        let today = time_util::trading_day(now, self.offset);
        if self.stores.fulfillments.has_unacknowledged(balance_id, today) {
            return Self::skip(event, SkipReason::GoalReached);
        }

        let balance = match self.client.get_balances().await {
            Ok(balances) => balances.into_iter().find(|b| b.id == balance_id),
            Err(e) => {
                warn!("查询余额失败: balance_id={}, err={}", balance_id, e);
                None
            }
        };
        let Some(balance) = balance else {
            return Self::skip(event, SkipReason::BalanceUnavailable);
        };

        if self
            .stores
            .break_warnings
            .active(balance_id, now)
            .is_some_and(|w| w.pause_auto_trade)
        {
            return Self::skip(event, SkipReason::BreakWarningActive);
        }
        if balance.amount < config.stake_amount {
            return Self::skip(event, SkipReason::InsufficientBalance);
        }
        if self
            .stores
            .martingale
            .active_chain_for_asset(event.asset_id)
            .await
            .is_some()
        {
            return Self::skip(event, SkipReason::ChainActive);
        }
        match self.client.get_open_positions(balance_id).await {
            Ok(open) => {
                if open
                    .iter()
                    .any(|p| p.asset_id == event.asset_id && p.direction == event.direction)
                {
                    return Self::skip(event, SkipReason::DuplicatePosition);
                }
            }
            Err(e) => warn!("查询持仓失败，跳过重复检查: balance_id={}, err={}", balance_id, e),
        }

        let Some(config) = self.stores.asset_configs.try_consume_arm(event.asset_id) else {
            return Self::skip(event, SkipReason::ArmAlreadyConsumed);
        };

        let request = OrderRequest {
            balance_id,
            asset_id: event.asset_id,
            amount: config.stake_amount,
            direction: event.direction,
            period: event.period,
            is_system_trade: true,
        };
        let placed = match self.client.place_order(&request).await {
            Ok(placed) => placed,
            Err(e) => {
                let err = AppError::order_placement(event.asset_id, &e);
                warn!("自动交易下单失败: {}", err);
                self.notifier.error(
                    "自动交易下单失败",
                    format!("资产 {} {} {}: {}", event.asset_id, event.direction, config.stake_amount, err),
                );
                return DispatchOutcome::Failed(err);
            }
        };

        self.stores
            .tracked_orders
            .insert(TrackedOrder::from_placed(&placed, None, now));
        if config.martingale.enabled {
            self.chain_manager.bootstrap(&placed).await;
        }
        info!(
            "自动交易下单: order_id={}, asset_id={}, direction={}, amount={}, 信号收盘={}",
            placed.id, placed.asset_id, placed.direction, placed.amount, event.candle_close_time
        );
        DispatchOutcome::Placed(placed)
    }

    /// 消费信号直到总线关闭或收到停止信号
    ///
    /// 每个信号单独起任务处理，慢下单只占住自己的资产；退出前等待在途下单完成
    pub async fn run(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<SignalEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("自动交易分发已停止");
                    break;
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        error!("信号处理任务异常: {}", e);
                    }
                }
                msg = rx.recv() => match msg {
                    Ok(event) => {
                        let this = Arc::clone(&self);
                        inflight.spawn(async move {
                            this.on_signal(&event).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("信号消费滞后，丢弃 {} 条", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                error!("信号处理任务异常: {}", e);
            }
        }
    }
}
