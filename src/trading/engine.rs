//! 自动交易引擎
//!
//! 持有全部会话存储与组件，负责组装、启动后台任务、对外提供武装/撤销/确认等操作。
//! 数据流: K线 -> 信号调度 -> 信号总线 -> 自动交易分发 -> 下单 -> 平仓结果 -> 马丁链 / 风控。

use std::sync::Arc;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app_config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::job::{self, OutcomeProcessor, OutcomeReport, TaskScheduler};
use crate::time_util;
use crate::trading::auto_trade::{AutoTradeDispatcher, CandleFeed, SignalBus, SignalScheduler};
use crate::trading::martingale::MartingaleChainManager;
use crate::trading::model::{
    AssetAutoTradeConfig, BreakWarningEvent, BreakWarningSettings, GoalFulfillment,
    MartingaleChain, MartingaleSettings, Position, TradingGoalsSettings,
};
use crate::trading::risk::{BreakWarningMonitor, DailyGoalTracker};
use crate::trading::services::notification::Notifier;
use crate::trading::services::platform_client::TradingPlatformClient;
use crate::trading::store::{JsonSnapshotStore, MartingaleStats, SessionStores};
use crate::trading::strategy::SignalFunction;

/// 引擎运行统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub martingale: MartingaleStats,
    pub pending_orders: usize,
    pub armed_assets: Vec<i64>,
    pub running_schedulers: Vec<i64>,
}

pub struct AutoTradeEngine {
    config: EngineConfig,
    offset: FixedOffset,
    client: Arc<dyn TradingPlatformClient>,
    stores: SessionStores,
    bus: SignalBus,
    scheduler: SignalScheduler,
    dispatcher: Arc<AutoTradeDispatcher>,
    chain_manager: Arc<MartingaleChainManager>,
    goal_tracker: Arc<DailyGoalTracker>,
    break_monitor: Arc<BreakWarningMonitor>,
    outcomes: Arc<OutcomeProcessor>,
    snapshot_store: Option<Arc<JsonSnapshotStore>>,
    jobs: Mutex<Option<TaskScheduler>>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoTradeEngine {
    /// 组装引擎；配置了快照文件时先恢复上次的会话状态
    pub async fn new(
        config: EngineConfig,
        client: Arc<dyn TradingPlatformClient>,
        signal: Arc<dyn SignalFunction>,
        notifier: Notifier,
    ) -> AppResult<Self> {
        config.validate()?;
        let offset = time_util::fixed_offset(config.utc_offset_minutes);
        let stores = SessionStores::new();

        let snapshot_store = config
            .snapshot_path
            .as_ref()
            .map(|p| Arc::new(JsonSnapshotStore::new(p.clone())));
        if let Some(store) = &snapshot_store {
            if let Some(snapshot) = store.load().await? {
                info!(
                    "恢复会话快照: path={}, saved_at={}, chains={}, tracked_orders={}",
                    store.path().display(),
                    snapshot.saved_at,
                    snapshot.chains.len(),
                    snapshot.tracked_orders.len()
                );
                stores.restore(snapshot).await;
            }
        }

        let bus = SignalBus::new(config.signal_bus_capacity);
        let scheduler = SignalScheduler::new(
            CandleFeed::new(client.clone()),
            signal,
            bus.clone(),
            stores.asset_configs.clone(),
            notifier.clone(),
            config.scheduler.clone(),
        );
        let chain_manager = Arc::new(MartingaleChainManager::new(
            client.clone(),
            stores.martingale.clone(),
            stores.tracked_orders.clone(),
            stores.asset_configs.clone(),
            stores.fulfillments.clone(),
            notifier.clone(),
            config.martingale.clone(),
            offset,
        ));
        let dispatcher = Arc::new(AutoTradeDispatcher::new(
            client.clone(),
            stores.clone(),
            chain_manager.clone(),
            notifier.clone(),
            offset,
        ));
        let goal_tracker = Arc::new(DailyGoalTracker::new(
            client.clone(),
            stores.daily_balances.clone(),
            stores.fulfillments.clone(),
            stores.asset_configs.clone(),
            notifier.clone(),
            config.trading_goals.clone(),
            offset,
        ));
        let break_monitor = Arc::new(BreakWarningMonitor::new(
            config.trading_limits.break_warning.clone(),
            stores.break_warnings.clone(),
            stores.asset_configs.clone(),
            notifier.clone(),
        ));
        let outcomes = Arc::new(OutcomeProcessor::new(
            client.clone(),
            stores.clone(),
            chain_manager.clone(),
            goal_tracker.clone(),
            break_monitor.clone(),
            offset,
        ));

        Ok(Self {
            config,
            offset,
            client,
            stores,
            bus,
            scheduler,
            dispatcher,
            chain_manager,
            goal_tracker,
            break_monitor,
            outcomes,
            snapshot_store,
            jobs: Mutex::new(None),
            dispatcher_handle: Mutex::new(None),
        })
    }

    /// 启动分发循环与后台任务，并恢复已武装资产的信号调度
    pub async fn start(&self) -> AppResult<()> {
        let mut jobs_guard = self.jobs.lock().await;
        if jobs_guard.is_some() {
            warn!("引擎已在运行");
            return Ok(());
        }
        let mut jobs = TaskScheduler::new();

        let handle = tokio::spawn(
            self.dispatcher
                .clone()
                .run(self.bus.subscribe(), jobs.shutdown_receiver()),
        );
        *self.dispatcher_handle.lock().await = Some(handle);

        let now = self.client.current_time();
        if let Err(e) = self.goal_tracker.capture_snapshots(now).await {
            warn!("启动时记录日初余额失败: {}", e);
        }

        let outcomes = self.outcomes.clone();
        jobs.add_periodic_task("outcome_poll", self.config.outcome_poll_interval_ms, move || {
            let outcomes = outcomes.clone();
            async move {
                outcomes.poll_once().await;
            }
        })?;

        let stores = self.stores.clone();
        let outcomes = self.outcomes.clone();
        let client = self.client.clone();
        let chain_retention_ms = self.config.martingale.chain_retention_ms;
        let order_retention_ms = self.config.order_retention_ms;
        let offset = self.offset;
        jobs.add_periodic_task("cleanup", self.config.cleanup_interval_ms, move || {
            let stores = stores.clone();
            let outcomes = outcomes.clone();
            let client = client.clone();
            async move {
                let now = client.current_time();
                job::run_cleanup(&stores, now, chain_retention_ms, order_retention_ms, offset).await;
                outcomes.forget_before(now - order_retention_ms.max(time_util::DAY_MS));
            }
        })?;

        if let Some(snapshot_store) = self.snapshot_store.clone() {
            let stores = self.stores.clone();
            let client = self.client.clone();
            jobs.add_periodic_task("persist", self.config.persist_interval_ms, move || {
                let stores = stores.clone();
                let snapshot_store = snapshot_store.clone();
                let client = client.clone();
                async move {
                    if let Err(e) = job::persist(&stores, &snapshot_store, client.current_time()).await {
                        warn!(
                            "定时保存快照失败: path={}, err={}",
                            snapshot_store.path().display(),
                            e
                        );
                    }
                }
            })?;
        }

        let tracker = self.goal_tracker.clone();
        let client = self.client.clone();
        let now_client = self.client.clone();
        jobs.add_daily_task(
            "daily_snapshot",
            self.offset,
            move || now_client.current_time(),
            move || {
                let tracker = tracker.clone();
                let client = client.clone();
                async move {
                    if let Err(e) = tracker.capture_snapshots(client.current_time()).await {
                        warn!("零点记录日初余额失败: {}", e);
                    }
                }
            },
        );

        for config in self.stores.asset_configs.armed_assets() {
            self.scheduler.start(config.asset_id, config.period);
        }
        info!("自动交易引擎已启动: 任务={:?}", jobs.task_names());
        *jobs_guard = Some(jobs);
        Ok(())
    }

    /// 新增或覆盖资产配置，已武装时同步启动调度
    pub fn configure_asset(&self, config: AssetAutoTradeConfig) {
        let config = AssetAutoTradeConfig {
            martingale: config.martingale.normalized(),
            ..config
        };
        let (asset_id, period, armed) = (config.asset_id, config.period, config.armed);
        self.stores.asset_configs.upsert(config);
        if armed {
            self.scheduler.start(asset_id, period);
        }
    }

    /// 武装资产：下一个非 HOLD 信号将触发一次下单
    pub fn arm(&self, asset_id: i64) -> AppResult<AssetAutoTradeConfig> {
        let config = self
            .stores
            .asset_configs
            .get(asset_id)
            .ok_or(AppError::AssetNotConfigured(asset_id))?;
        if config.stake_amount <= 0.0 {
            return Err(AppError::Config(format!(
                "资产 {} 下单金额无效: {}",
                asset_id, config.stake_amount
            )));
        }
        if self.config.exclusive_arming {
            let others = self.stores.asset_configs.disarm_all_except(asset_id);
            if !others.is_empty() {
                info!("独占武装，撤销其他资产: {:?}", others);
            }
        }
        let config = self.stores.asset_configs.arm(asset_id)?;
        self.scheduler.start(asset_id, config.period);
        info!(
            "资产已武装: asset_id={}, stake={}, period={}s, martingale={}",
            asset_id, config.stake_amount, config.period, config.martingale.enabled
        );
        Ok(config)
    }

    /// 撤销武装，调度在下一轮开始时退出
    pub fn disarm(&self, asset_id: i64) -> bool {
        let was_armed = self.stores.asset_configs.disarm(asset_id);
        if was_armed {
            info!("资产已撤销武装: asset_id={}", asset_id);
        }
        was_armed
    }

    pub fn set_stake(&self, asset_id: i64, stake_amount: f64) -> AppResult<AssetAutoTradeConfig> {
        if !stake_amount.is_finite() || stake_amount < 0.0 {
            return Err(AppError::Config(format!("非法下单金额: {}", stake_amount)));
        }
        self.stores.asset_configs.set_stake(asset_id, stake_amount)
    }

    pub fn set_balance(&self, asset_id: i64, balance_id: i64) -> AppResult<AssetAutoTradeConfig> {
        self.stores.asset_configs.set_balance(asset_id, Some(balance_id))
    }

    /// 修改只影响之后建立的链，已存在的链使用建链时的快照
    pub fn update_martingale(
        &self,
        asset_id: i64,
        settings: MartingaleSettings,
    ) -> AppResult<AssetAutoTradeConfig> {
        self.stores.asset_configs.set_martingale(asset_id, settings)
    }

    pub async fn update_break_warning_settings(&self, settings: BreakWarningSettings) {
        self.break_monitor.update_settings(settings).await;
    }

    pub async fn update_goal_settings(&self, settings: TradingGoalsSettings) {
        self.goal_tracker.update_settings(settings).await;
    }

    /// 外部推送的平仓结果，与轮询共用去重
    pub async fn process_closed_position(&self, position: &Position) -> Option<OutcomeReport> {
        self.outcomes.process(position).await
    }

    pub async fn poll_outcomes(&self) -> Vec<OutcomeReport> {
        self.outcomes.poll_once().await
    }

    pub fn acknowledge_fulfillment(&self, fulfillment_id: &str) -> bool {
        self.goal_tracker.acknowledge(fulfillment_id)
    }

    pub fn acknowledge_break_warning(&self, balance_id: i64, warning_id: &str) -> bool {
        self.break_monitor
            .acknowledge(balance_id, warning_id, self.client.current_time())
    }

    pub async fn cancel_chain(&self, chain_id: &str) -> bool {
        self.chain_manager.cancel_chain_by_user(chain_id).await
    }

    pub fn fulfillments_today(&self) -> Vec<GoalFulfillment> {
        self.goal_tracker.fulfillments_today(self.client.current_time())
    }

    pub fn active_break_warnings(&self) -> Vec<BreakWarningEvent> {
        self.stores
            .break_warnings
            .active_warnings(self.client.current_time())
    }

    pub async fn active_chains(&self) -> Vec<MartingaleChain> {
        self.stores.martingale.active_chains().await
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            martingale: self.stores.martingale.stats().await,
            pending_orders: self.stores.tracked_orders.len(),
            armed_assets: self
                .stores
                .asset_configs
                .armed_assets()
                .into_iter()
                .map(|c| c.asset_id)
                .collect(),
            running_schedulers: self.scheduler.running_assets(),
        }
    }

    pub fn stores(&self) -> &SessionStores {
        &self.stores
    }

    pub fn scheduler(&self) -> &SignalScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn dispatcher(&self) -> &Arc<AutoTradeDispatcher> {
        &self.dispatcher
    }

    pub fn chain_manager(&self) -> &Arc<MartingaleChainManager> {
        &self.chain_manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 立即写入快照；未配置快照文件时不做任何事
    pub async fn persist_now(&self) -> AppResult<()> {
        match &self.snapshot_store {
            Some(store) => job::persist(&self.stores, store, self.client.current_time()).await,
            None => Ok(()),
        }
    }

    /// 停止调度与后台任务，最后保存一次快照
    pub async fn shutdown(&self) -> AppResult<()> {
        self.scheduler.stop_all();
        if let Some(jobs) = self.jobs.lock().await.take() {
            jobs.shutdown().await;
        }
        if let Some(handle) = self.dispatcher_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("分发任务异常退出: {}", e);
            }
        }
        self.persist_now().await?;
        info!("自动交易引擎已停止");
        Ok(())
    }
}
