mod common;

use std::time::Duration;

use common::*;
use rust_quant_autotrade::trading::model::{
    BreakWarningSettings, Direction, OrderOutcome, SignalDirection, SignalEvent,
};
use rust_quant_autotrade::trading::services::{Severity, TradingPlatformClient};

#[tokio::test(start_paused = true)]
async fn test_armed_asset_places_exactly_one_order() {
    let t = build_engine(SignalDirection::Put, test_config()).await;
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.engine.arm(7).unwrap();
    t.client.script_outcomes([OrderOutcome::Win]).await;
    t.engine.start().await.unwrap();

    // 第一个收盘点在 30s 后
    tokio::time::sleep(Duration::from_secs(31)).await;
    let orders = t.client.placed_orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].direction, Direction::Put);
    assert_eq!(orders[0].amount, 10.0);
    assert!(!t.engine.stores().asset_configs.get(7).unwrap().armed);

    // 后续收盘点不再下单，调度在下一轮退出
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(t.client.placed_orders().await.len(), 1);
    assert!(!t.engine.scheduler().is_running(7));

    // 结果已被处理，跟踪集合清空
    let stats = t.engine.stats().await;
    assert_eq!(stats.pending_orders, 0);
    assert!(stats.armed_assets.is_empty());
    t.engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_hold_signal_never_trades() {
    let t = build_engine(SignalDirection::Hold, test_config()).await;
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.engine.arm(7).unwrap();
    t.engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(t.client.placed_orders().await.is_empty());
    assert!(t.engine.stores().asset_configs.get(7).unwrap().armed);
    assert!(t.engine.scheduler().is_running(7));
    assert!(t.engine.scheduler().evaluation_count() >= 3);
    t.engine.shutdown().await.unwrap();
    assert!(!t.engine.scheduler().is_running(7));
}

#[tokio::test(start_paused = true)]
async fn test_feed_failures_suspend_and_notify() {
    let t = build_engine(SignalDirection::Put, test_config()).await;
    t.engine.start().await.unwrap();
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.client.fail_next_candle_fetches(3).await;
    t.engine.arm(7).unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(t.engine.scheduler().is_suspended(7));
    let warnings: Vec<_> = t
        .memory
        .received()
        .await
        .into_iter()
        .filter(|n| n.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);

    // 重新武装后恢复调度
    t.engine.arm(7).unwrap();
    assert!(!t.engine.scheduler().is_suspended(7));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(t.client.placed_orders().await.len(), 1);
    t.engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exclusive_arming_disarms_others() {
    let mut config = test_config();
    config.exclusive_arming = true;
    let t = build_engine(SignalDirection::Hold, config).await;
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.engine.configure_asset(asset(8, BALANCE, 10.0, None));
    t.engine.arm(7).unwrap();
    t.engine.arm(8).unwrap();
    assert!(!t.engine.stores().asset_configs.get(7).unwrap().armed);
    assert!(t.engine.stores().asset_configs.get(8).unwrap().armed);
}

#[tokio::test(start_paused = true)]
async fn test_arm_rejects_unknown_or_zero_stake() {
    let t = build_engine(SignalDirection::Hold, test_config()).await;
    assert!(t.engine.arm(42).is_err());
    t.engine.configure_asset(asset(7, BALANCE, 0.0, None));
    assert!(t.engine.arm(7).is_err());
    assert!(t.engine.set_stake(7, -1.0).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_three_losses_raise_break_warning_and_disarm_balance() {
    let mut config = test_config();
    config.trading_limits.break_warning = BreakWarningSettings {
        time_window_minutes: 15,
        loss_threshold: 3,
        min_orders_required: 3,
        pause_auto_trade: true,
        ..Default::default()
    };
    let t = build_engine(SignalDirection::Hold, config).await;
    t.client.add_balance(2, 1000.0, "USD").await;
    t.engine.configure_asset(asset(7, BALANCE, 10.0, None));
    t.engine.configure_asset(asset(8, BALANCE, 10.0, None));
    t.engine.configure_asset(asset(9, 2, 10.0, None));
    for id in [7, 8, 9] {
        t.engine.arm(id).unwrap();
    }

    let now = t.client.current_time();
    let mut warning = None;
    for (i, order_id) in [101, 102, 103].into_iter().enumerate() {
        let expiry = now - (3 - i as i64) * 60_000;
        let report = t
            .engine
            .process_closed_position(&closed_position(order_id, BALANCE, 7, -10.0, expiry))
            .await
            .unwrap();
        if i < 2 {
            assert!(report.warning.is_none());
        }
        warning = report.warning;
    }

    let warning = warning.expect("warning raised");
    assert_eq!(warning.balance_id, BALANCE);
    assert_eq!(warning.loss_count, 3);
    assert!(warning.pause_auto_trade);
    let configs = &t.engine.stores().asset_configs;
    assert!(!configs.get(7).unwrap().armed);
    assert!(!configs.get(8).unwrap().armed);
    assert!(configs.get(9).unwrap().armed);
    assert_eq!(t.engine.active_break_warnings().len(), 1);
    assert!(t.engine.acknowledge_break_warning(BALANCE, &warning.id));

    // 提醒期间重新武装也不会下单
    t.engine.arm(7).unwrap();
    let signal = SignalEvent {
        asset_id: 7,
        direction: Direction::Call,
        period: 60,
        produced_at: now,
        candle_close_time: now,
    };
    let outcome = t.engine.dispatcher().on_signal(&signal).await;
    assert!(outcome.placed().is_none());

    // 到期自动失效
    tokio::time::sleep(Duration::from_secs(15 * 60)).await;
    assert!(t.engine.active_break_warnings().is_empty());
    assert!(t.engine.dispatcher().on_signal(&signal).await.placed().is_some());
}
