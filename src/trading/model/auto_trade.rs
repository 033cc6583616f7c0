//! 资产自动交易配置

use serde::{Deserialize, Serialize};

use super::martingale::MartingaleSettings;

/// 每个已打开资产一份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAutoTradeConfig {
    pub asset_id: i64,
    pub armed: bool,
    pub stake_amount: f64,
    pub balance_id: Option<i64>,
    /// K线周期 (秒)
    pub period: i64,
    pub martingale: MartingaleSettings,
}

impl AssetAutoTradeConfig {
    pub fn new(asset_id: i64, balance_id: i64, stake_amount: f64, period: i64) -> Self {
        Self {
            asset_id,
            armed: false,
            stake_amount,
            balance_id: Some(balance_id),
            period,
            martingale: MartingaleSettings::default(),
        }
    }

    pub fn with_martingale(mut self, martingale: MartingaleSettings) -> Self {
        self.martingale = martingale.normalized();
        self
    }

    /// 已武装且金额有效
    pub fn is_ready(&self) -> bool {
        self.armed && self.stake_amount > 0.0
    }
}
