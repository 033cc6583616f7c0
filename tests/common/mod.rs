#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rust_quant_autotrade::app_config::EngineConfig;
use rust_quant_autotrade::trading::model::{
    AssetAutoTradeConfig, Balance, Candle, Direction, MartingaleSettings, OrderRequest,
    PlacedOrder, Position, PositionStatus, SignalDirection,
};
use rust_quant_autotrade::trading::services::{
    MemoryNotificationSink, NotificationSink, Notifier, PaperTradingClient, TradingPlatformClient,
};
use rust_quant_autotrade::trading::AutoTradeEngine;

/// 2023-11-14 22:13:30 UTC，距离整分钟 30 秒
pub const BASE: i64 = 1_700_000_010_000;
pub const BALANCE: i64 = 1;

pub struct TestEngine {
    pub engine: AutoTradeEngine,
    pub client: Arc<PaperTradingClient>,
    pub memory: Arc<MemoryNotificationSink>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        utc_offset_minutes: 0,
        ..Default::default()
    }
}

/// 固定信号的引擎，模拟盘账户 1 初始 1000
pub async fn build_engine(signal: SignalDirection, config: EngineConfig) -> TestEngine {
    let client = Arc::new(PaperTradingClient::new(BASE));
    client.add_balance(BALANCE, 1000.0, "USD").await;
    build_engine_with_client(client, signal, config).await
}

pub async fn build_engine_with_client(
    client: Arc<PaperTradingClient>,
    signal: SignalDirection,
    config: EngineConfig,
) -> TestEngine {
    let (engine, memory) = build_engine_on(client.clone(), signal, config).await;
    TestEngine {
        engine,
        client,
        memory,
    }
}

/// 任意平台实现上的引擎
pub async fn build_engine_on(
    platform: Arc<dyn TradingPlatformClient>,
    signal: SignalDirection,
    config: EngineConfig,
) -> (AutoTradeEngine, Arc<MemoryNotificationSink>) {
    let memory = Arc::new(MemoryNotificationSink::new());
    let notifier = Notifier::new(vec![memory.clone() as Arc<dyn NotificationSink>]);
    let engine = AutoTradeEngine::new(
        config,
        platform,
        Arc::new(move |_: &[Candle]| signal),
        notifier,
    )
    .await
    .expect("engine");
    (engine, memory)
}

/// 模拟盘包装：开启后某个资产的下单要等待 `delay`
pub struct SlowPlacementClient {
    pub inner: Arc<PaperTradingClient>,
    slow_asset: i64,
    delay: Duration,
    enabled: AtomicBool,
}

impl SlowPlacementClient {
    pub fn new(inner: Arc<PaperTradingClient>, slow_asset: i64, delay: Duration) -> Self {
        Self {
            inner,
            slow_asset,
            delay,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TradingPlatformClient for SlowPlacementClient {
    fn name(&self) -> &'static str {
        "slow-paper"
    }

    async fn get_candles(&self, asset_id: i64, period: i64, from: i64) -> anyhow::Result<Vec<Candle>> {
        self.inner.get_candles(asset_id, period, from).await
    }

    async fn stream_candles(&self, asset_id: i64, period: i64) -> anyhow::Result<mpsc::Receiver<Candle>> {
        self.inner.stream_candles(asset_id, period).await
    }

    async fn place_order(&self, request: &OrderRequest) -> anyhow::Result<PlacedOrder> {
        if self.enabled.load(Ordering::SeqCst) && request.asset_id == self.slow_asset {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.place_order(request).await
    }

    async fn get_balances(&self) -> anyhow::Result<Vec<Balance>> {
        self.inner.get_balances().await
    }

    async fn get_closed_positions(
        &self,
        balance_id: i64,
        from: i64,
        to: i64,
    ) -> anyhow::Result<Vec<Position>> {
        self.inner.get_closed_positions(balance_id, from, to).await
    }

    async fn get_open_positions(&self, balance_id: i64) -> anyhow::Result<Vec<Position>> {
        self.inner.get_open_positions(balance_id).await
    }

    fn current_time(&self) -> i64 {
        self.inner.current_time()
    }
}

pub fn asset(asset_id: i64, balance_id: i64, stake: f64, martingale: Option<(usize, Vec<f64>)>) -> AssetAutoTradeConfig {
    let config = AssetAutoTradeConfig::new(asset_id, balance_id, stake, 60);
    match martingale {
        Some((levels, multipliers)) => {
            config.with_martingale(MartingaleSettings::new(true, levels, multipliers))
        }
        None => config,
    }
}

/// 构造一条已平仓结果
pub fn closed_position(order_id: i64, balance_id: i64, asset_id: i64, pnl: f64, expiration_time: i64) -> Position {
    Position {
        order_id,
        balance_id,
        asset_id,
        direction: Direction::Put,
        amount: pnl.abs(),
        pnl,
        open_time: expiration_time - 60_000,
        expiration_time,
        close_time: Some(expiration_time),
        status: PositionStatus::Closed,
    }
}
