//! 过期数据清理与持久化

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppResult;
use crate::time_util;
use crate::trading::store::{JsonSnapshotStore, SessionStores};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed_chains: usize,
    pub removed_links: usize,
    pub removed_orders: usize,
    pub purged_fulfillments: usize,
}

/// 删除已结束的旧链、迟迟没有结果的跟踪订单，以及前一天之前的目标记录
pub async fn run_cleanup(
    stores: &SessionStores,
    now: i64,
    chain_retention_ms: i64,
    order_retention_ms: i64,
    offset: FixedOffset,
) -> CleanupReport {
    let (removed_chains, removed_links) = stores.martingale.cleanup(now - chain_retention_ms).await;
    let removed_orders = stores
        .tracked_orders
        .cleanup_older_than(now - order_retention_ms);
    let yesterday = time_util::trading_day(now, offset) - Duration::days(1);
    let purged_fulfillments = stores.fulfillments.purge_before(yesterday);

    let report = CleanupReport {
        removed_chains,
        removed_links,
        removed_orders,
        purged_fulfillments,
    };
    if report != CleanupReport::default() {
        info!("清理过期数据: {:?}", report);
    }
    report
}

pub async fn persist(stores: &SessionStores, snapshot_store: &JsonSnapshotStore, now: i64) -> AppResult<()> {
    let snapshot = stores.capture(now).await;
    snapshot_store.save(&snapshot).await
}
