//! 待结算的系统订单
//!
//! `take` 先移除再返回，同一订单只会被处理一次

use dashmap::DashMap;

use crate::trading::model::TrackedOrder;

#[derive(Debug, Default)]
pub struct TrackedOrderStore {
    orders: DashMap<i64, TrackedOrder>,
}

impl TrackedOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: TrackedOrder) {
        self.orders.insert(order.order_id, order);
    }

    pub fn take(&self, order_id: i64) -> Option<TrackedOrder> {
        self.orders.remove(&order_id).map(|(_, o)| o)
    }

    pub fn get(&self, order_id: i64) -> Option<TrackedOrder> {
        self.orders.get(&order_id).map(|o| o.clone())
    }

    pub fn contains(&self, order_id: i64) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// 最早的跟踪订单创建时间
    pub fn oldest_created_at(&self) -> Option<i64> {
        self.orders.iter().map(|o| o.created_at).min()
    }

    pub fn balances(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.orders.iter().map(|o| o.balance_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// 删除创建时间早于 `cutoff` 的订单
    pub fn cleanup_older_than(&self, cutoff: i64) -> usize {
        let before = self.orders.len();
        self.orders.retain(|_, o| o.created_at >= cutoff);
        before - self.orders.len()
    }

    pub fn snapshot(&self) -> Vec<TrackedOrder> {
        let mut all: Vec<_> = self.orders.iter().map(|o| o.value().clone()).collect();
        all.sort_by_key(|o| o.order_id);
        all
    }

    pub fn restore(&self, orders: Vec<TrackedOrder>) {
        self.orders.clear();
        for o in orders {
            self.insert(o);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::Direction;

    fn order(order_id: i64, created_at: i64) -> TrackedOrder {
        TrackedOrder {
            order_id,
            chain_id: None,
            balance_id: 1,
            asset_id: 1,
            amount: 1.0,
            direction: Direction::Call,
            period: 60,
            created_at,
            is_system_trade: true,
        }
    }

    #[test]
    fn test_take_is_idempotent() {
        let store = TrackedOrderStore::new();
        store.insert(order(1, 0));
        assert!(store.take(1).is_some());
        assert!(store.take(1).is_none());
    }

    #[test]
    fn test_cleanup() {
        let store = TrackedOrderStore::new();
        store.insert(order(1, 100));
        store.insert(order(2, 500));
        assert_eq!(store.oldest_created_at(), Some(100));
        assert_eq!(store.cleanup_older_than(200), 1);
        assert!(store.contains(2));
    }
}
