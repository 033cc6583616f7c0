//! 马丁链与订单映射存储

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::trading::model::{LinkStatus, MartingaleChain, MartingaleOrderLink};

#[derive(Debug, Default)]
struct MartingaleState {
    chains: HashMap<String, MartingaleChain>,
    links: HashMap<i64, MartingaleOrderLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MartingaleStats {
    pub total_chains: usize,
    pub active_chains: usize,
    pub total_links: usize,
}

#[derive(Debug, Default)]
pub struct MartingaleStore {
    state: RwLock<MartingaleState>,
}

impl MartingaleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_chain(&self, chain: MartingaleChain) {
        self.state
            .write()
            .await
            .chains
            .insert(chain.chain_id.clone(), chain);
    }

    pub async fn get_chain(&self, chain_id: &str) -> Option<MartingaleChain> {
        self.state.read().await.chains.get(chain_id).cloned()
    }

    /// 在写锁内修改链，返回修改后的副本
    pub async fn update_chain<F>(&self, chain_id: &str, f: F) -> Option<MartingaleChain>
    where
        F: FnOnce(&mut MartingaleChain),
    {
        let mut state = self.state.write().await;
        let chain = state.chains.get_mut(chain_id)?;
        f(chain);
        Some(chain.clone())
    }

    pub async fn chain_for_original_order(&self, order_id: i64) -> Option<MartingaleChain> {
        self.state
            .read()
            .await
            .chains
            .values()
            .find(|c| c.original_order_id == order_id)
            .cloned()
    }

    pub async fn active_chain_for_asset(&self, asset_id: i64) -> Option<MartingaleChain> {
        self.state
            .read()
            .await
            .chains
            .values()
            .find(|c| c.asset_id == asset_id && c.is_active())
            .cloned()
    }

    pub async fn active_chains(&self) -> Vec<MartingaleChain> {
        let mut chains: Vec<_> = self
            .state
            .read()
            .await
            .chains
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        chains.sort_by_key(|c| c.created_at);
        chains
    }

    pub async fn insert_link(&self, link: MartingaleOrderLink) {
        self.state.write().await.links.insert(link.order_id, link);
    }

    pub async fn link(&self, order_id: i64) -> Option<MartingaleOrderLink> {
        self.state.read().await.links.get(&order_id).cloned()
    }

    pub async fn update_link<F>(&self, order_id: i64, f: F) -> Option<MartingaleOrderLink>
    where
        F: FnOnce(&mut MartingaleOrderLink),
    {
        let mut state = self.state.write().await;
        let link = state.links.get_mut(&order_id)?;
        f(link);
        Some(link.clone())
    }

    pub async fn set_link_status(&self, order_id: i64, status: LinkStatus) {
        self.update_link(order_id, |l| l.status = status).await;
    }

    /// 链内全部订单，按层级升序
    pub async fn links_for_chain(&self, chain_id: &str) -> Vec<MartingaleOrderLink> {
        let mut links: Vec<_> = self
            .state
            .read()
            .await
            .links
            .values()
            .filter(|l| l.chain_id.as_deref() == Some(chain_id))
            .cloned()
            .collect();
        links.sort_by_key(|l| l.level);
        links
    }

    /// 删除 `cutoff` 之前结束的链及其订单映射，以及未成链的过期 0 层映射
    pub async fn cleanup(&self, cutoff: i64) -> (usize, usize) {
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .chains
            .values()
            .filter(|c| {
                let ended_at = c.completed_at.or(c.cancelled_at);
                match ended_at {
                    Some(t) => t < cutoff,
                    None => false,
                }
            })
            .map(|c| c.chain_id.clone())
            .collect();
        for id in &expired {
            state.chains.remove(id);
        }

        let links_before = state.links.len();
        state.links.retain(|_, l| match &l.chain_id {
            Some(chain_id) => !expired.contains(chain_id),
            None => l.created_at >= cutoff,
        });
        (expired.len(), links_before - state.links.len())
    }

    pub async fn stats(&self) -> MartingaleStats {
        let state = self.state.read().await;
        MartingaleStats {
            total_chains: state.chains.len(),
            active_chains: state.chains.values().filter(|c| c.is_active()).count(),
            total_links: state.links.len(),
        }
    }

    pub async fn snapshot(&self) -> (Vec<MartingaleChain>, Vec<MartingaleOrderLink>) {
        let state = self.state.read().await;
        let mut chains: Vec<_> = state.chains.values().cloned().collect();
        chains.sort_by_key(|c| c.created_at);
        let mut links: Vec<_> = state.links.values().cloned().collect();
        links.sort_by_key(|l| l.order_id);
        (chains, links)
    }

    pub async fn restore(&self, chains: Vec<MartingaleChain>, links: Vec<MartingaleOrderLink>) {
        let mut state = self.state.write().await;
        state.chains = chains
            .into_iter()
            .map(|c| (c.chain_id.clone(), c))
            .collect();
        state.links = links.into_iter().map(|l| (l.order_id, l)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::{CancelReason, ChainStatus, Direction};

    fn chain(id: &str, asset_id: i64, status: ChainStatus, ended_at: Option<i64>) -> MartingaleChain {
        MartingaleChain {
            chain_id: id.to_string(),
            balance_id: 1,
            asset_id,
            direction: Direction::Put,
            period: 60,
            original_order_id: 100,
            current_level: 0,
            max_level: 2,
            multipliers: vec![2.0, 2.0],
            status,
            total_invested: 10.0,
            created_at: 0,
            completed_at: ended_at,
            cancelled_at: None,
        }
    }

    fn link(order_id: i64, chain_id: Option<&str>, level: usize, created_at: i64) -> MartingaleOrderLink {
        MartingaleOrderLink {
            order_id,
            chain_id: chain_id.map(|s| s.to_string()),
            balance_id: 1,
            asset_id: 1,
            level,
            multiplier: 1.0,
            stake_amount: 10.0,
            direction: Direction::Put,
            period: 60,
            status: LinkStatus::Pending,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_active_chain_lookup_and_stats() {
        let store = MartingaleStore::new();
        store.insert_chain(chain("a", 1, ChainStatus::Active, None)).await;
        store
            .insert_chain(chain("b", 2, ChainStatus::Cancelled(CancelReason::User), Some(5)))
            .await;
        assert_eq!(store.active_chain_for_asset(1).await.unwrap().chain_id, "a");
        assert!(store.active_chain_for_asset(2).await.is_none());
        let stats = store.stats().await;
        assert_eq!((stats.total_chains, stats.active_chains), (2, 1));
    }

    #[tokio::test]
    async fn test_cleanup_removes_ended_chains_and_their_links() {
        let store = MartingaleStore::new();
        store.insert_chain(chain("old", 1, ChainStatus::CompletedWin, Some(10))).await;
        store.insert_chain(chain("live", 2, ChainStatus::Active, None)).await;
        store.insert_link(link(1, Some("old"), 0, 0)).await;
        store.insert_link(link(2, Some("old"), 1, 0)).await;
        store.insert_link(link(3, Some("live"), 0, 0)).await;
        store.insert_link(link(4, None, 0, 0)).await;
        store.insert_link(link(5, None, 0, 5_000)).await;

        assert_eq!(store.cleanup(1_000).await, (1, 3));
        assert!(store.get_chain("live").await.is_some());
        assert!(store.link(3).await.is_some());
        assert!(store.link(5).await.is_some());
        assert_eq!(store.links_for_chain("old").await.len(), 0);
    }
}
