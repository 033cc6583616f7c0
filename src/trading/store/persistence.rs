//! 会话状态的 JSON 快照
//!
//! 先写临时文件再 rename，保证文件要么是旧版本要么是完整的新版本

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::trading::model::{
    AssetAutoTradeConfig, BreakWarningEvent, DailyBalanceSnapshot, GoalFulfillment,
    MartingaleChain, MartingaleOrderLink, TrackedOrder,
};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub saved_at: i64,
    pub asset_configs: Vec<AssetAutoTradeConfig>,
    pub tracked_orders: Vec<TrackedOrder>,
    pub chains: Vec<MartingaleChain>,
    pub links: Vec<MartingaleOrderLink>,
    pub fulfillments: Vec<GoalFulfillment>,
    pub daily_balances: Vec<DailyBalanceSnapshot>,
    pub break_warnings: Vec<BreakWarningEvent>,
}

#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// 文件不存在时返回 None
    pub async fn load(&self) -> AppResult<Option<EngineSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: EngineSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AppError::Persistence(format!(
                "快照版本不兼容: {} != {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        info!(
            "加载会话快照: path={}, chains={}, tracked_orders={}",
            self.path.display(),
            snapshot.chains.len(),
            snapshot.tracked_orders.len()
        );
        Ok(Some(snapshot))
    }

    pub async fn save(&self, snapshot: &EngineSnapshot) -> AppResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("会话快照已保存: path={}, bytes={}", self.path.display(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("autotrade_{}_{}.json", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let store = JsonSnapshotStore::new(temp_path("missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = temp_path("save");
        let store = JsonSnapshotStore::new(&path);
        let snapshot = EngineSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: 42,
            ..Default::default()
        };
        store.save(&snapshot).await.unwrap();
        assert!(!store.tmp_path().exists());
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let path = temp_path("version");
        let store = JsonSnapshotStore::new(&path);
        store.save(&EngineSnapshot::default()).await.unwrap();
        assert!(matches!(store.load().await, Err(AppError::Persistence(_))));
        let _ = std::fs::remove_file(path);
    }
}
