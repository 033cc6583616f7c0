//! 交易平台客户端接口
//!
//! 行情、下单、余额与持仓查询均由外部平台提供，核心只依赖该接口

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::trading::model::{Balance, Candle, OrderRequest, PlacedOrder, Position};

#[async_trait]
pub trait TradingPlatformClient: Send + Sync {
    /// 平台名称
    fn name(&self) -> &'static str;

    /// 获取从 `from` (毫秒) 起的K线，升序，最后一根可能尚未收盘
    ///
    /// # Arguments
    /// * `asset_id` - 资产
    /// * `period` - 周期 (秒)
    /// * `from` - 开始时间戳 (毫秒)
    async fn get_candles(&self, asset_id: i64, period: i64, from: i64) -> Result<Vec<Candle>>;

    /// 订阅K线更新
    async fn stream_candles(&self, asset_id: i64, period: i64) -> Result<mpsc::Receiver<Candle>> {
        Err(anyhow::anyhow!(
            "{} 不支持K线推送: asset_id={}, period={}",
            self.name(),
            asset_id,
            period
        ))
    }

    /// 下单
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder>;

    /// 查询全部余额账户
    async fn get_balances(&self) -> Result<Vec<Balance>>;

    /// 查询 [from, to] 区间内平仓的持仓
    async fn get_closed_positions(&self, balance_id: i64, from: i64, to: i64)
        -> Result<Vec<Position>>;

    /// 查询未平仓持仓
    async fn get_open_positions(&self, balance_id: i64) -> Result<Vec<Position>>;

    /// 平台时间 (毫秒)
    fn current_time(&self) -> i64;
}
