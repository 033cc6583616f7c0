//! 账户余额与日初快照

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceType {
    Real,
    Practice,
}

/// 可交易资金账户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub id: i64,
    pub balance_type: BalanceType,
    pub amount: f64,
    pub currency: String,
}

/// 每个账户每个自然日一份的日初余额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBalanceSnapshot {
    pub balance_id: i64,
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    /// 采集时刻 (毫秒)
    pub captured_at: i64,
}
