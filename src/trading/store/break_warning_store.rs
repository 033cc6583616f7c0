//! 休息提醒存储，每个账户只保留最近一条

use dashmap::DashMap;

use crate::trading::model::BreakWarningEvent;

#[derive(Debug, Default)]
pub struct BreakWarningStore {
    warnings: DashMap<i64, BreakWarningEvent>,
}

impl BreakWarningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: BreakWarningEvent) {
        self.warnings.insert(event.balance_id, event);
    }

    pub fn active(&self, balance_id: i64, now: i64) -> Option<BreakWarningEvent> {
        self.warnings
            .get(&balance_id)
            .filter(|w| w.is_active_at(now))
            .map(|w| w.clone())
    }

    pub fn active_warnings(&self, now: i64) -> Vec<BreakWarningEvent> {
        let mut list: Vec<_> = self
            .warnings
            .iter()
            .filter(|w| w.is_active_at(now))
            .map(|w| w.value().clone())
            .collect();
        list.sort_by_key(|w| w.balance_id);
        list
    }

    pub fn unacknowledged_active(&self, now: i64) -> Vec<BreakWarningEvent> {
        self.active_warnings(now)
            .into_iter()
            .filter(|w| w.acknowledged_at.is_none())
            .collect()
    }

    pub fn acknowledge(&self, balance_id: i64, warning_id: &str, now: i64) -> bool {
        match self.warnings.get_mut(&balance_id) {
            Some(mut w) if w.id == warning_id => {
                w.acknowledged_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, balance_id: i64) -> Option<BreakWarningEvent> {
        self.warnings.remove(&balance_id).map(|(_, w)| w)
    }

    pub fn snapshot(&self) -> Vec<BreakWarningEvent> {
        let mut all: Vec<_> = self.warnings.iter().map(|w| w.value().clone()).collect();
        all.sort_by_key(|w| w.balance_id);
        all
    }

    pub fn restore(&self, warnings: Vec<BreakWarningEvent>) {
        self.warnings.clear();
        for w in warnings {
            self.record(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning(balance_id: i64, trigger_time: i64, expires_at: i64) -> BreakWarningEvent {
        BreakWarningEvent {
            id: format!("w{}", balance_id),
            balance_id,
            window_minutes: 15,
            total_orders: 3,
            loss_count: 3,
            trigger_time,
            expires_at,
            pause_auto_trade: true,
            acknowledged_at: None,
        }
    }

    #[test]
    fn test_warning_self_expires() {
        let store = BreakWarningStore::new();
        store.record(warning(1, 100, 200));
        assert!(store.active(1, 99).is_none());
        assert!(store.active(1, 100).is_some());
        assert!(store.active(1, 200).is_none());
    }

    #[test]
    fn test_acknowledge() {
        let store = BreakWarningStore::new();
        store.record(warning(1, 100, 200));
        store.record(warning(2, 100, 200));
        assert!(!store.acknowledge(1, "w2", 150));
        assert!(store.acknowledge(1, "w1", 150));
        let pending = store.unacknowledged_active(150);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].balance_id, 2);
        assert_eq!(store.active_warnings(150).len(), 2);
    }
}
