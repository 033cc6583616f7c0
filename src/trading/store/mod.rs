pub mod asset_config_store;
pub mod break_warning_store;
pub mod daily_balance_store;
pub mod goal_fulfillment_store;
pub mod martingale_store;
pub mod persistence;
pub mod tracked_order_store;

use std::sync::Arc;

pub use asset_config_store::AssetConfigStore;
pub use break_warning_store::BreakWarningStore;
pub use daily_balance_store::DailyBalanceStore;
pub use goal_fulfillment_store::GoalFulfillmentStore;
pub use martingale_store::{MartingaleStats, MartingaleStore};
pub use persistence::{EngineSnapshot, JsonSnapshotStore, SNAPSHOT_VERSION};
pub use tracked_order_store::TrackedOrderStore;

/// 会话内全部存储，各组件只拿自己需要的句柄
#[derive(Debug, Clone, Default)]
pub struct SessionStores {
    pub asset_configs: Arc<AssetConfigStore>,
    pub tracked_orders: Arc<TrackedOrderStore>,
    pub martingale: Arc<MartingaleStore>,
    pub fulfillments: Arc<GoalFulfillmentStore>,
    pub daily_balances: Arc<DailyBalanceStore>,
    pub break_warnings: Arc<BreakWarningStore>,
}

impl SessionStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn capture(&self, saved_at: i64) -> EngineSnapshot {
        let (chains, links) = self.martingale.snapshot().await;
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            asset_configs: self.asset_configs.snapshot(),
            tracked_orders: self.tracked_orders.snapshot(),
            chains,
            links,
            fulfillments: self.fulfillments.snapshot(),
            daily_balances: self.daily_balances.snapshot(),
            break_warnings: self.break_warnings.snapshot(),
        }
    }

    pub async fn restore(&self, snapshot: EngineSnapshot) {
        self.asset_configs.restore(snapshot.asset_configs);
        self.tracked_orders.restore(snapshot.tracked_orders);
        self.martingale.restore(snapshot.chains, snapshot.links).await;
        self.fulfillments.restore(snapshot.fulfillments);
        self.daily_balances.restore(snapshot.daily_balances);
        self.break_warnings.restore(snapshot.break_warnings);
    }
}
