//! 日初余额快照，每个账户只保留最近一天

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::trading::model::{Balance, DailyBalanceSnapshot};

#[derive(Debug, Default)]
pub struct DailyBalanceStore {
    snapshots: DashMap<i64, DailyBalanceSnapshot>,
}

impl DailyBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当日尚无快照时以当前余额建立，返回是否新建
    pub fn capture_if_absent(&self, balance: &Balance, date: NaiveDate, now: i64) -> bool {
        let snapshot = DailyBalanceSnapshot {
            balance_id: balance.id,
            amount: balance.amount,
            currency: balance.currency.clone(),
            date,
            captured_at: now,
        };
        match self.snapshots.entry(balance.id) {
            Entry::Occupied(mut o) => {
                if o.get().date >= date {
                    return false;
                }
                o.insert(snapshot);
                true
            }
            Entry::Vacant(v) => {
                v.insert(snapshot);
                true
            }
        }
    }

    pub fn get(&self, balance_id: i64, date: NaiveDate) -> Option<DailyBalanceSnapshot> {
        self.snapshots
            .get(&balance_id)
            .filter(|s| s.date == date)
            .map(|s| s.clone())
    }

    pub fn snapshot(&self) -> Vec<DailyBalanceSnapshot> {
        let mut all: Vec<_> = self.snapshots.iter().map(|s| s.value().clone()).collect();
        all.sort_by_key(|s| s.balance_id);
        all
    }

    pub fn restore(&self, snapshots: Vec<DailyBalanceSnapshot>) {
        self.snapshots.clear();
        for s in snapshots {
            self.snapshots.insert(s.balance_id, s);
        }
    }
}
