//! 资产自动交易配置存储

use dashmap::DashMap;

use crate::error::{AppError, AppResult};
use crate::trading::model::{AssetAutoTradeConfig, MartingaleSettings};

#[derive(Debug, Default)]
pub struct AssetConfigStore {
    configs: DashMap<i64, AssetAutoTradeConfig>,
}

impl AssetConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, config: AssetAutoTradeConfig) {
        self.configs.insert(config.asset_id, config);
    }

    pub fn get(&self, asset_id: i64) -> Option<AssetAutoTradeConfig> {
        self.configs.get(&asset_id).map(|c| c.clone())
    }

    pub fn remove(&self, asset_id: i64) -> Option<AssetAutoTradeConfig> {
        self.configs.remove(&asset_id).map(|(_, c)| c)
    }

    pub fn all(&self) -> Vec<AssetAutoTradeConfig> {
        let mut all: Vec<_> = self.configs.iter().map(|c| c.value().clone()).collect();
        all.sort_by_key(|c| c.asset_id);
        all
    }

    pub fn armed_assets(&self) -> Vec<AssetAutoTradeConfig> {
        self.all().into_iter().filter(|c| c.armed).collect()
    }

    fn update<F>(&self, asset_id: i64, f: F) -> AppResult<AssetAutoTradeConfig>
    where
        F: FnOnce(&mut AssetAutoTradeConfig),
    {
        let mut entry = self
            .configs
            .get_mut(&asset_id)
            .ok_or(AppError::AssetNotConfigured(asset_id))?;
        f(entry.value_mut());
        Ok(entry.clone())
    }

    pub fn arm(&self, asset_id: i64) -> AppResult<AssetAutoTradeConfig> {
        self.update(asset_id, |c| c.armed = true)
    }

    /// 返回此前是否处于武装状态
    pub fn disarm(&self, asset_id: i64) -> bool {
        self.configs
            .get_mut(&asset_id)
            .map(|mut c| std::mem::replace(&mut c.armed, false))
            .unwrap_or(false)
    }

    pub fn set_stake(&self, asset_id: i64, stake_amount: f64) -> AppResult<AssetAutoTradeConfig> {
        self.update(asset_id, |c| c.stake_amount = stake_amount)
    }

    pub fn set_balance(&self, asset_id: i64, balance_id: Option<i64>) -> AppResult<AssetAutoTradeConfig> {
        self.update(asset_id, |c| c.balance_id = balance_id)
    }

    pub fn set_martingale(
        &self,
        asset_id: i64,
        settings: MartingaleSettings,
    ) -> AppResult<AssetAutoTradeConfig> {
        self.update(asset_id, |c| c.martingale = settings.normalized())
    }

    /// 原子地消费一次武装：仅当已武装且金额有效时翻转为未武装并返回配置
    pub fn try_consume_arm(&self, asset_id: i64) -> Option<AssetAutoTradeConfig> {
        let mut entry = self.configs.get_mut(&asset_id)?;
        if !entry.is_ready() {
            return None;
        }
        entry.armed = false;
        Some(entry.clone())
    }

    /// 撤销某账户下全部资产的武装，返回受影响的资产
    pub fn disarm_balance(&self, balance_id: i64) -> Vec<i64> {
        self.disarm_where(|c| c.balance_id == Some(balance_id))
    }

    pub fn disarm_all(&self) -> Vec<i64> {
        self.disarm_where(|_| true)
    }

    pub fn disarm_all_except(&self, asset_id: i64) -> Vec<i64> {
        self.disarm_where(|c| c.asset_id != asset_id)
    }

    fn disarm_where<P>(&self, predicate: P) -> Vec<i64>
    where
        P: Fn(&AssetAutoTradeConfig) -> bool,
    {
        let mut affected = Vec::new();
        for mut entry in self.configs.iter_mut() {
            if entry.armed && predicate(entry.value()) {
                entry.armed = false;
                affected.push(entry.asset_id);
            }
        }
        affected.sort_unstable();
        affected
    }

    pub fn snapshot(&self) -> Vec<AssetAutoTradeConfig> {
        self.all()
    }

    pub fn restore(&self, configs: Vec<AssetAutoTradeConfig>) {
        self.configs.clear();
        for c in configs {
            self.upsert(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AssetConfigStore {
        let store = AssetConfigStore::new();
        store.upsert(AssetAutoTradeConfig::new(1, 10, 5.0, 60));
        store.upsert(AssetAutoTradeConfig::new(2, 10, 5.0, 60));
        store.upsert(AssetAutoTradeConfig::new(3, 20, 5.0, 60));
        store
    }

    #[test]
    fn test_try_consume_arm_is_single_shot() {
        let store = store();
        assert!(store.try_consume_arm(1).is_none());
        store.arm(1).unwrap();
        assert!(store.try_consume_arm(1).is_some());
        assert!(store.try_consume_arm(1).is_none());
        assert!(!store.get(1).unwrap().armed);
    }

    #[test]
    fn test_zero_stake_is_not_ready() {
        let store = store();
        store.set_stake(1, 0.0).unwrap();
        store.arm(1).unwrap();
        assert!(store.try_consume_arm(1).is_none());
        assert!(store.get(1).unwrap().armed);
    }

    #[test]
    fn test_disarm_balance_only_touches_that_balance() {
        let store = store();
        for id in 1..=3 {
            store.arm(id).unwrap();
        }
        assert_eq!(store.disarm_balance(10), vec![1, 2]);
        assert!(store.get(3).unwrap().armed);
        assert_eq!(store.disarm_all_except(3), Vec::<i64>::new());
        assert_eq!(store.disarm_all(), vec![3]);
    }

    #[test]
    fn test_unknown_asset() {
        let store = store();
        assert!(matches!(store.arm(99), Err(AppError::AssetNotConfigured(99))));
        assert!(!store.disarm(99));
    }
}
