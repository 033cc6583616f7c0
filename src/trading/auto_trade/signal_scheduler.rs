//! 信号调度器
//!
//! 每个武装资产一个 tokio 任务：对齐到K线收盘时刻唤醒，计算信号并把非 HOLD 结果发布到总线。
//! 同一资产的计算严格串行，每个收盘时刻至多计算一次；不同资产互不影响。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_config::SchedulerConfig;
use crate::error::AppResult;
use crate::trading::auto_trade::candle_feed::CandleFeed;
use crate::trading::auto_trade::signal_bus::SignalBus;
use crate::trading::model::{SignalDirection, SignalEvent};
use crate::trading::services::notification::Notifier;
use crate::trading::store::AssetConfigStore;
use crate::trading::strategy::SignalFunction;

/// 单次循环的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Evaluated(SignalDirection),
    /// 该收盘时刻已计算过
    AlreadyEvaluated,
    /// 行情过期，收盘时间已过
    Stale,
}

struct SchedulerInner {
    feed: CandleFeed,
    signal: Arc<dyn SignalFunction>,
    bus: SignalBus,
    asset_configs: Arc<AssetConfigStore>,
    notifier: Notifier,
    config: SchedulerConfig,
    suspended: DashMap<i64, u32>,
    evaluations: AtomicU64,
}

pub struct SignalScheduler {
    inner: Arc<SchedulerInner>,
    tasks: DashMap<i64, JoinHandle<()>>,
}

impl SignalScheduler {
    pub fn new(
        feed: CandleFeed,
        signal: Arc<dyn SignalFunction>,
        bus: SignalBus,
        asset_configs: Arc<AssetConfigStore>,
        notifier: Notifier,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                feed,
                signal,
                bus,
                asset_configs,
                notifier,
                config,
                suspended: DashMap::new(),
                evaluations: AtomicU64::new(0),
            }),
            tasks: DashMap::new(),
        }
    }

    /// 启动(或重启)某资产的调度，同时解除暂停
    pub fn start(&self, asset_id: i64, period: i64) {
        if let Some((_, old)) = self.tasks.remove(&asset_id) {
            old.abort();
        }
        self.inner.suspended.remove(&asset_id);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.run_asset(asset_id, period).await;
        });
        self.tasks.insert(asset_id, handle);
        info!("信号调度已启动: asset_id={}, period={}s", asset_id, period);
    }

    pub fn stop(&self, asset_id: i64) -> bool {
        match self.tasks.remove(&asset_id) {
            Some((_, task)) => {
                task.abort();
                info!("信号调度已停止: asset_id={}", asset_id);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let ids: Vec<i64> = self.tasks.iter().map(|t| *t.key()).collect();
        for id in ids {
            self.stop(id);
        }
    }

    pub fn is_running(&self, asset_id: i64) -> bool {
        self.tasks
            .get(&asset_id)
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    pub fn running_assets(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .tasks
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| *t.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 连续失败后被暂停，需重新武装
    pub fn is_suspended(&self, asset_id: i64) -> bool {
        self.inner.suspended.contains_key(&asset_id)
    }

    /// 累计信号计算次数
    pub fn evaluation_count(&self) -> u64 {
        self.inner.evaluations.load(Ordering::Relaxed)
    }
}

impl Drop for SignalScheduler {
    fn drop(&mut self) {
        for task in self.tasks.iter() {
            task.abort();
        }
    }
}

impl SchedulerInner {
    async fn run_asset(&self, asset_id: i64, period: i64) {
        let cfg = &self.config;
        let mut failures: u32 = 0;
        let mut last_boundary: Option<i64> = None;

        loop {
            let armed = self
                .asset_configs
                .get(asset_id)
                .map(|c| c.armed)
                .unwrap_or(false);
            if !armed {
                info!("资产未武装，信号调度退出: asset_id={}", asset_id);
                break;
            }

            let delay_ms = match self.cycle(asset_id, period, &mut last_boundary).await {
                Ok(CycleOutcome::Evaluated(_)) | Ok(CycleOutcome::AlreadyEvaluated) => {
                    failures = 0;
                    cfg.settle_delay_ms
                }
                Ok(CycleOutcome::Stale) => {
                    failures = 0;
                    cfg.stale_backoff_ms
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "信号调度周期失败: asset_id={}, 连续失败={}, err={}",
                        asset_id, failures, e
                    );
                    if failures >= cfg.max_consecutive_failures {
                        self.suspended.insert(asset_id, failures);
                        warn!("连续失败 {} 次，暂停该资产调度: asset_id={}", failures, asset_id);
                        self.notifier.warning(
                            "自动交易已暂停",
                            format!("资产 {} 行情连续 {} 次获取失败，请重新开启自动交易", asset_id, failures),
                        );
                        break;
                    }
                    cfg.retry_delay_ms
                }
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn cycle(
        &self,
        asset_id: i64,
        period: i64,
        last_boundary: &mut Option<i64>,
    ) -> AppResult<CycleOutcome> {
        let n = self.config.candle_window;

        let mut window = self.feed.window(asset_id, period, n).await?;
        let mut ttc = CandleFeed::time_to_next_close(&window, self.feed.now());
        if ttc.map_or(true, |t| t <= 0) {
            debug!("行情过期，重新获取一次: asset_id={}", asset_id);
            window = self.feed.window(asset_id, period, n).await?;
            ttc = CandleFeed::time_to_next_close(&window, self.feed.now());
        }
        let (Some(ttc), Some(forming)) = (ttc, window.last()) else {
            return Ok(CycleOutcome::Stale);
        };
        if ttc <= 0 {
            warn!("行情仍然过期，退避后重试: asset_id={}, ttc={}ms", asset_id, ttc);
            return Ok(CycleOutcome::Stale);
        }

        let boundary = forming.close_time;
        if *last_boundary == Some(boundary) {
            return Ok(CycleOutcome::AlreadyEvaluated);
        }

        tokio::time::sleep(Duration::from_millis(ttc as u64)).await;

        let closed = self.feed.closed_window(asset_id, period, n, boundary).await?;
        *last_boundary = Some(boundary);
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let direction = self.signal.evaluate(&closed);
        debug!(
            "信号计算完成: asset_id={}, boundary={}, candles={}, signal={:?}",
            asset_id,
            boundary,
            closed.len(),
            direction
        );

        if let Some(d) = direction.to_direction() {
            let receivers = self.bus.publish(SignalEvent {
                asset_id,
                direction: d,
                period,
                produced_at: self.feed.now(),
                candle_close_time: boundary,
            });
            info!(
                "发布信号: asset_id={}, direction={}, 订阅者={}",
                asset_id, d, receivers
            );
        }
        Ok(CycleOutcome::Evaluated(direction))
    }
}
