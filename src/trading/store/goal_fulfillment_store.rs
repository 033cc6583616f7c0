//! 每日目标达成记录

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::trading::model::{GoalFulfillment, GoalType};

/// 账户+日期+类型 唯一
fn fulfillment_key(balance_id: i64, date: NaiveDate, goal_type: GoalType) -> String {
    format!("{}_{}_{}", balance_id, date.format("%Y-%m-%d"), goal_type.as_str())
}

#[derive(Debug, Default)]
pub struct GoalFulfillmentStore {
    fulfillments: DashMap<String, GoalFulfillment>,
}

impl GoalFulfillmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不存在时写入并返回 true，存在则不覆盖
    pub fn record_if_absent(&self, fulfillment: GoalFulfillment) -> bool {
        let key = fulfillment_key(fulfillment.balance_id, fulfillment.date, fulfillment.goal_type);
        match self.fulfillments.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(fulfillment);
                true
            }
        }
    }

    pub fn get(&self, balance_id: i64, date: NaiveDate, goal_type: GoalType) -> Option<GoalFulfillment> {
        self.fulfillments
            .get(&fulfillment_key(balance_id, date, goal_type))
            .map(|f| f.clone())
    }

    /// 当日任一目标已达成
    pub fn has_any(&self, balance_id: i64, date: NaiveDate) -> bool {
        self.fulfillments
            .iter()
            .any(|f| f.balance_id == balance_id && f.date == date)
    }

    pub fn has_unacknowledged(&self, balance_id: i64, date: NaiveDate) -> bool {
        self.fulfillments
            .iter()
            .any(|f| f.balance_id == balance_id && f.date == date && !f.acknowledged)
    }

    pub fn acknowledge(&self, id: &str) -> bool {
        for mut f in self.fulfillments.iter_mut() {
            if f.id == id {
                f.acknowledged = true;
                return true;
            }
        }
        false
    }

    /// 当日全部达成记录，最新在前
    pub fn for_day(&self, date: NaiveDate) -> Vec<GoalFulfillment> {
        let mut list: Vec<_> = self
            .fulfillments
            .iter()
            .filter(|f| f.date == date)
            .map(|f| f.value().clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn purge_before(&self, date: NaiveDate) -> usize {
        let before = self.fulfillments.len();
        self.fulfillments.retain(|_, f| f.date >= date);
        before - self.fulfillments.len()
    }

    pub fn snapshot(&self) -> Vec<GoalFulfillment> {
        let mut all: Vec<_> = self.fulfillments.iter().map(|f| f.value().clone()).collect();
        all.sort_by_key(|f| f.created_at);
        all
    }

    pub fn restore(&self, fulfillments: Vec<GoalFulfillment>) {
        self.fulfillments.clear();
        for f in fulfillments {
            self.record_if_absent(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fulfillment(id: &str, goal_type: GoalType, created_at: i64) -> GoalFulfillment {
        GoalFulfillment {
            id: id.to_string(),
            balance_id: 1,
            goal_type,
            target_value: 10.0,
            actual_value: 12.0,
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            acknowledged: false,
            created_at,
        }
    }

    #[test]
    fn test_record_once_per_type() {
        let store = GoalFulfillmentStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(store.record_if_absent(fulfillment("a", GoalType::Profit, 1)));
        assert!(!store.record_if_absent(fulfillment("b", GoalType::Profit, 2)));
        assert!(store.record_if_absent(fulfillment("c", GoalType::Loss, 3)));

        let today = store.for_day(day);
        assert_eq!(today.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn test_acknowledge_keeps_date_scope() {
        let store = GoalFulfillmentStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        store.record_if_absent(fulfillment("a", GoalType::Profit, 1));
        assert!(store.has_unacknowledged(1, day));
        assert!(store.acknowledge("a"));
        assert!(!store.has_unacknowledged(1, day));
        assert!(store.has_any(1, day));
        assert!(!store.has_any(2, day));
        assert!(!store.acknowledge("missing"));
    }
}
