//! K线窗口适配

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::trading::model::Candle;
use crate::trading::services::platform_client::TradingPlatformClient;

#[derive(Clone)]
pub struct CandleFeed {
    client: Arc<dyn TradingPlatformClient>,
}

impl CandleFeed {
    pub fn new(client: Arc<dyn TradingPlatformClient>) -> Self {
        Self { client }
    }

    pub fn now(&self) -> i64 {
        self.client.current_time()
    }

    /// 最近 `count` 根K线(含正在形成的一根)，按开盘时间升序去重
    pub async fn window(&self, asset_id: i64, period: i64, count: usize) -> AppResult<Vec<Candle>> {
        let period_ms = period * 1000;
        let from = self.now() - period_ms * (count as i64 + 1);
        let mut candles = self
            .client
            .get_candles(asset_id, period, from)
            .await
            .map_err(|e| AppError::feed(asset_id, &e))?;
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(candles)
    }

    /// 截止 `boundary` 已收盘的最近 `count` 根K线
    pub async fn closed_window(
        &self,
        asset_id: i64,
        period: i64,
        count: usize,
        boundary: i64,
    ) -> AppResult<Vec<Candle>> {
        let mut candles = self.window(asset_id, period, count + 1).await?;
        candles.retain(|c| c.close_time <= boundary);
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(candles)
    }

    /// 距离窗口最后一根K线收盘的毫秒数，窗口为空时返回 None
    pub fn time_to_next_close(window: &[Candle], now: i64) -> Option<i64> {
        window.last().map(|c| c.close_time - now)
    }
}
