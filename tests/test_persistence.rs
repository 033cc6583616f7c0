mod common;

use common::*;
use rust_quant_autotrade::trading::martingale::ChainTransition;
use rust_quant_autotrade::trading::model::{ChainStatus, Direction, SignalDirection, SignalEvent};
use rust_quant_autotrade::trading::services::TradingPlatformClient;

#[tokio::test]
async fn test_snapshot_restores_chain_and_tracked_orders() {
    let path = std::env::temp_dir().join(format!("autotrade-{}.json", uuid::Uuid::new_v4()));
    let mut config = test_config();
    config.snapshot_path = Some(path.clone());

    let first = build_engine(SignalDirection::Hold, config.clone()).await;
    first
        .engine
        .configure_asset(asset(7, BALANCE, 10.0, Some((2, vec![2.0, 2.0]))));
    first.engine.arm(7).unwrap();
    let now = first.client.current_time();
    let order = first
        .engine
        .dispatcher()
        .on_signal(&SignalEvent {
            asset_id: 7,
            direction: Direction::Put,
            period: 60,
            produced_at: now,
            candle_close_time: now,
        })
        .await
        .placed()
        .cloned()
        .unwrap();
    first
        .engine
        .process_closed_position(&closed_position(order.id, BALANCE, 7, -10.0, now))
        .await
        .unwrap();
    first.engine.persist_now().await.unwrap();
    first.engine.scheduler().stop_all();

    let client = first.client.clone();
    drop(first);
    let second = build_engine_with_client(client.clone(), SignalDirection::Hold, config).await;
    let chains = second.engine.active_chains().await;
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].current_level, 1);
    assert_eq!(second.engine.stats().await.pending_orders, 1);
    assert!(second.engine.stores().asset_configs.get(7).is_some());

    let level_one = client.placed_orders().await[1].clone();
    let report = second
        .engine
        .process_closed_position(&closed_position(level_one.id, BALANCE, 7, 17.0, now))
        .await
        .unwrap();
    assert_eq!(
        report.transition,
        Some(ChainTransition::Closed {
            chain_id: chains[0].chain_id.clone(),
            status: ChainStatus::CompletedWin,
        })
    );

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_missing_snapshot_starts_empty() {
    let path = std::env::temp_dir().join(format!("autotrade-{}.json", uuid::Uuid::new_v4()));
    let mut config = test_config();
    config.snapshot_path = Some(path);
    let t = build_engine(SignalDirection::Hold, config).await;
    let stats = t.engine.stats().await;
    assert_eq!(stats.martingale.total_chains, 0);
    assert_eq!(stats.pending_orders, 0);
}

#[tokio::test]
async fn test_failed_periodic_save_keeps_engine_running() {
    // 临时文件位置被目录占用，快照无法写入
    let path = std::env::temp_dir().join(format!("autotrade-{}.json", uuid::Uuid::new_v4()));
    let blocker = path.with_file_name(format!(
        "{}.tmp",
        path.file_name().unwrap().to_string_lossy()
    ));
    std::fs::create_dir(&blocker).unwrap();
    let mut config = test_config();
    config.snapshot_path = Some(path);
    config.persist_interval_ms = 100;

    let t = build_engine(SignalDirection::Hold, config).await;
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.engine.start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(350)).await;

    assert!(t.engine.persist_now().await.is_err());
    t.engine.arm(7).unwrap();
    assert_eq!(t.engine.stats().await.armed_assets, vec![7]);
    assert!(t.engine.shutdown().await.is_err());

    let _ = std::fs::remove_dir(&blocker);
}
