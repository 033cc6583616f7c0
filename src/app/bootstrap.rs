use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::app_config::env::{env_f64, env_i64, env_is_true, env_list, env_u64};
use crate::app_config::EngineConfig;
use crate::trading::model::{AssetAutoTradeConfig, MartingaleSettings, MAX_MARTINGALE_LEVELS};
use crate::trading::services::{
    NotificationSink, Notifier, PaperTradingClient, TelegramNotificationSink, TracingNotificationSink,
};
use crate::trading::strategy::{ZoneReversalConfig, ZoneReversalSignal};
use crate::trading::AutoTradeEngine;

/// 通知通道：日志始终开启，配置了 Telegram 时同时推送
fn build_notifier() -> Notifier {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(TracingNotificationSink)];
    if env_is_true("AUTOTRADE_TELEGRAM_ENABLED", false) {
        match TelegramNotificationSink::from_env() {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!("Telegram 通知未启用: {}", e),
        }
    }
    Notifier::new(sinks)
}

/// 从环境变量读取单资产的马丁设置
fn martingale_from_env() -> MartingaleSettings {
    let multipliers: Vec<f64> = env_list("AUTOTRADE_MARTINGALE_MULTIPLIERS")
        .iter()
        .filter_map(|m| m.parse::<f64>().ok())
        .collect();
    MartingaleSettings::new(
        env_is_true("AUTOTRADE_MARTINGALE_ENABLED", false),
        env_u64("AUTOTRADE_MARTINGALE_LEVELS", MAX_MARTINGALE_LEVELS as u64) as usize,
        multipliers,
    )
}

/// 应用入口：组装模拟盘与引擎，武装 AUTOTRADE_ASSETS 中的资产，Ctrl-C 后优雅退出
pub async fn run() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;

    let balance_id = env_i64("AUTOTRADE_BALANCE_ID", 1);
    let client = Arc::new(PaperTradingClient::new(chrono::Utc::now().timestamp_millis()));
    client
        .add_balance(balance_id, env_f64("AUTOTRADE_PAPER_BALANCE", 1000.0), "USD")
        .await;

    let signal = Arc::new(ZoneReversalSignal::new(ZoneReversalConfig::default()));
    let engine = AutoTradeEngine::new(config, client, signal, build_notifier()).await?;

    let stake = env_f64("AUTOTRADE_STAKE", 1.0);
    let period = env_i64("AUTOTRADE_PERIOD", 60);
    let martingale = martingale_from_env();
    for asset in env_list("AUTOTRADE_ASSETS") {
        let asset_id: i64 = match asset.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!("忽略非法资产ID: {}", asset);
                continue;
            }
        };
        if engine.stores().asset_configs.get(asset_id).is_none() {
            engine.configure_asset(
                AssetAutoTradeConfig::new(asset_id, balance_id, stake, period)
                    .with_martingale(martingale.clone()),
            );
        }
        if let Err(e) = engine.arm(asset_id) {
            error!("武装资产失败: asset_id={}, err={}", asset_id, e);
        }
    }

    engine.start().await?;
    info!("运行中，按 Ctrl-C 退出: {:?}", engine.stats().await);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("监听退出信号失败: {}", e))?;
    info!("收到退出信号，开始关闭");
    engine.shutdown().await?;
    Ok(())
}
