//! 内存模拟盘
//!
//! 按周期对齐生成确定性价格路径，支持预设输赢、结算延迟与故障注入；
//! 时钟基于 tokio::time::Instant，测试中可暂停/快进

use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::trading::model::{
    Balance, BalanceType, Candle, Direction, OrderOutcome, OrderRequest, PlacedOrder, Position,
    PositionStatus,
};
use crate::trading::services::platform_client::TradingPlatformClient;

pub const DEFAULT_PAYOUT: f64 = 0.85;

#[derive(Debug, Clone)]
struct PaperPosition {
    position: Position,
    scripted: Option<OrderOutcome>,
}

#[derive(Debug, Default)]
struct PaperState {
    balances: HashMap<i64, Balance>,
    positions: Vec<PaperPosition>,
    placed: Vec<PlacedOrder>,
    next_order_id: i64,
    scripted_outcomes: VecDeque<OrderOutcome>,
    fail_candle_fetches: u32,
    reject_orders: u32,
    stale_feed: bool,
    candle_fetches: u64,
    settlement_delay_ms: i64,
}

pub struct PaperTradingClient {
    base_ms: i64,
    started: Instant,
    payout: f64,
    state: Mutex<PaperState>,
}

impl PaperTradingClient {
    /// `base_ms` 为时钟起点 (毫秒)
    pub fn new(base_ms: i64) -> Self {
        Self {
            base_ms,
            started: Instant::now(),
            payout: DEFAULT_PAYOUT,
            state: Mutex::new(PaperState {
                next_order_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn with_payout(mut self, payout: f64) -> Self {
        self.payout = payout;
        self
    }

    pub async fn add_balance(&self, id: i64, amount: f64, currency: &str) {
        let mut state = self.state.lock().await;
        state.balances.insert(
            id,
            Balance {
                id,
                balance_type: BalanceType::Practice,
                amount,
                currency: currency.to_string(),
            },
        );
    }

    /// 依次决定后续订单的输赢，用完后按价格路径判定
    pub async fn script_outcomes(&self, outcomes: impl IntoIterator<Item = OrderOutcome>) {
        self.state.lock().await.scripted_outcomes.extend(outcomes);
    }

    pub async fn fail_next_candle_fetches(&self, n: u32) {
        self.state.lock().await.fail_candle_fetches = n;
    }

    pub async fn reject_next_orders(&self, n: u32) {
        self.state.lock().await.reject_orders = n;
    }

    /// 开启后不再返回正在形成的K线
    pub async fn set_stale_feed(&self, stale: bool) {
        self.state.lock().await.stale_feed = stale;
    }

    /// 到期后延迟多久才能查询到平仓结果
    pub async fn set_settlement_delay_ms(&self, delay_ms: i64) {
        self.state.lock().await.settlement_delay_ms = delay_ms;
    }

    pub async fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.state.lock().await.placed.clone()
    }

    pub async fn candle_fetch_count(&self) -> u64 {
        self.state.lock().await.candle_fetches
    }

    pub async fn balance(&self, id: i64) -> Option<Balance> {
        self.state.lock().await.balances.get(&id).cloned()
    }

    fn price_at(asset_id: i64, t: i64) -> f64 {
        let x = t as f64 / 1000.0;
        let phase = asset_id as f64 * 0.7;
        100.0 + 2.0 * (x / 420.0 + phase).sin() + 0.5 * (x / 53.0 + phase * 2.0).sin()
    }

    fn candle_at(asset_id: i64, open_time: i64, period_ms: i64, now: i64) -> Candle {
        let close_time = open_time + period_ms;
        let last = close_time.min(now);
        let open = Self::price_at(asset_id, open_time);
        let close = Self::price_at(asset_id, last);
        let mid = Self::price_at(asset_id, open_time + (last - open_time) / 2);
        let high = open.max(close).max(mid);
        let low = open.min(close).min(mid);
        Candle::new(open_time, close_time, open, high, low, close)
    }

    fn settle(&self, state: &mut PaperState, now: i64) {
        let payout = self.payout;
        let delay = state.settlement_delay_ms;
        let mut credits: Vec<(i64, f64)> = Vec::new();
        for p in state.positions.iter_mut() {
            if p.position.status != PositionStatus::Open || p.position.expiration_time + delay > now
            {
                continue;
            }
            let expiry = p.position.expiration_time;
            let outcome = p.scripted.unwrap_or_else(|| {
                let open_price = Self::price_at(p.position.asset_id, p.position.open_time);
                let close_price = Self::price_at(p.position.asset_id, expiry);
                let won = match p.position.direction {
                    Direction::Call => close_price > open_price,
                    Direction::Put => close_price < open_price,
                };
                if won {
                    OrderOutcome::Win
                } else {
                    OrderOutcome::Loss
                }
            });
            p.position.pnl = match outcome {
                OrderOutcome::Win => p.position.amount * payout,
                OrderOutcome::Loss => -p.position.amount,
            };
            p.position.status = PositionStatus::Closed;
            p.position.close_time = Some(expiry);
            if outcome == OrderOutcome::Win {
                credits.push((p.position.balance_id, p.position.amount + p.position.pnl));
            }
        }
        for (balance_id, credit) in credits {
            if let Some(b) = state.balances.get_mut(&balance_id) {
                b.amount += credit;
            }
        }
    }
}

#[async_trait]
impl TradingPlatformClient for PaperTradingClient {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn get_candles(&self, asset_id: i64, period: i64, from: i64) -> Result<Vec<Candle>> {
        if period <= 0 {
            return Err(anyhow!("非法周期: {}", period));
        }
        let now = self.current_time();
        let mut state = self.state.lock().await;
        state.candle_fetches += 1;
        if state.fail_candle_fetches > 0 {
            state.fail_candle_fetches -= 1;
            return Err(anyhow!("模拟行情故障: asset_id={}", asset_id));
        }

        let period_ms = period * 1000;
        let forming_open = now.div_euclid(period_ms) * period_ms;
        let last_open = if state.stale_feed {
            forming_open - period_ms
        } else {
            forming_open
        };
        let mut open_time = from.div_euclid(period_ms) * period_ms;
        let mut candles = Vec::new();
        while open_time <= last_open {
            candles.push(Self::candle_at(asset_id, open_time, period_ms, now));
            open_time += period_ms;
        }
        Ok(candles)
    }

    async fn stream_candles(&self, asset_id: i64, period: i64) -> Result<mpsc::Receiver<Candle>> {
        if period <= 0 {
            return Err(anyhow!("非法周期: {}", period));
        }
        let (tx, rx) = mpsc::channel(16);
        let base_ms = self.base_ms;
        let started = self.started;
        tokio::spawn(async move {
            let period_ms = period * 1000;
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let now = base_ms + started.elapsed().as_millis() as i64;
                let open_time = now.div_euclid(period_ms) * period_ms;
                let candle = Self::candle_at(asset_id, open_time, period_ms, now);
                if tx.send(candle).await.is_err() {
                    debug!("K线订阅已关闭: asset_id={}", asset_id);
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        let now = self.current_time();
        let mut state = self.state.lock().await;
        if state.reject_orders > 0 {
            state.reject_orders -= 1;
            return Err(anyhow!("模拟平台拒单: asset_id={}", request.asset_id));
        }
        if request.period <= 0 || request.amount <= 0.0 {
            return Err(anyhow!(
                "非法下单参数: amount={}, period={}",
                request.amount,
                request.period
            ));
        }
        let balance = state
            .balances
            .get_mut(&request.balance_id)
            .ok_or_else(|| anyhow!("余额账户不存在: {}", request.balance_id))?;
        if balance.amount < request.amount {
            return Err(anyhow!(
                "余额不足: balance_id={}, amount={}, available={}",
                request.balance_id,
                request.amount,
                balance.amount
            ));
        }
        balance.amount -= request.amount;

        let period_ms = request.period * 1000;
        let expiration_time = (now.div_euclid(period_ms) + 1) * period_ms;
        let order = PlacedOrder {
            id: state.next_order_id,
            balance_id: request.balance_id,
            asset_id: request.asset_id,
            amount: request.amount,
            direction: request.direction,
            period: request.period,
            open_time: now,
            expiration_time,
        };
        state.next_order_id += 1;

        let scripted = state.scripted_outcomes.pop_front();
        state.positions.push(PaperPosition {
            position: Position {
                order_id: order.id,
                balance_id: order.balance_id,
                asset_id: order.asset_id,
                direction: order.direction,
                amount: order.amount,
                pnl: 0.0,
                open_time: now,
                expiration_time,
                close_time: None,
                status: PositionStatus::Open,
            },
            scripted,
        });
        state.placed.push(order.clone());
        debug!(
            "模拟下单成功: order_id={}, asset_id={}, amount={}, direction={}",
            order.id, order.asset_id, order.amount, order.direction
        );
        Ok(order)
    }

    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let now = self.current_time();
        let mut state = self.state.lock().await;
        self.settle(&mut state, now);
        let mut balances: Vec<Balance> = state.balances.values().cloned().collect();
        balances.sort_by_key(|b| b.id);
        Ok(balances)
    }

    async fn get_closed_positions(
        &self,
        balance_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<Position>> {
        let now = self.current_time();
        let mut state = self.state.lock().await;
        self.settle(&mut state, now);
        if !state.balances.contains_key(&balance_id) {
            warn!("查询平仓记录的账户不存在: {}", balance_id);
        }
        Ok(state
            .positions
            .iter()
            .map(|p| &p.position)
            .filter(|p| p.balance_id == balance_id && p.status == PositionStatus::Closed)
            .filter(|p| {
                let closed_at = p.closed_at();
                closed_at >= from && closed_at <= to
            })
            .cloned()
            .collect())
    }

    async fn get_open_positions(&self, balance_id: i64) -> Result<Vec<Position>> {
        let now = self.current_time();
        let mut state = self.state.lock().await;
        self.settle(&mut state, now);
        Ok(state
            .positions
            .iter()
            .map(|p| &p.position)
            .filter(|p| p.balance_id == balance_id && p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    fn current_time(&self) -> i64 {
        self.base_ms + self.started.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const BASE: i64 = 1_700_000_000_000;

    fn request(amount: f64) -> OrderRequest {
        OrderRequest {
            balance_id: 1,
            asset_id: 7,
            amount,
            direction: Direction::Call,
            period: 60,
            is_system_trade: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_candles_are_aligned_and_last_is_forming() {
        let client = PaperTradingClient::new(BASE + 10_000);
        let now = client.current_time();
        let candles = client.get_candles(7, 60, now - 10 * 60_000).await.unwrap();
        let last = candles.last().unwrap();
        assert!(last.close_time > now);
        assert!(candles.iter().all(|c| c.open_time % 60_000 == 0));
        assert!(candles.windows(2).all(|w| w[1].open_time - w[0].open_time == 60_000));

        client.set_stale_feed(true).await;
        let stale = client.get_candles(7, 60, now - 10 * 60_000).await.unwrap();
        assert!(stale.last().unwrap().close_time <= now);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_outcomes_settle_at_expiry() {
        let client = PaperTradingClient::new(BASE);
        client.add_balance(1, 100.0, "USD").await;
        client
            .script_outcomes([OrderOutcome::Loss, OrderOutcome::Win])
            .await;

        let first = client.place_order(&request(10.0)).await.unwrap();
        let second = client.place_order(&request(10.0)).await.unwrap();
        assert_eq!(first.expiration_time, BASE + 60_000 - BASE % 60_000);
        assert_eq!(client.balance(1).await.unwrap().amount, 80.0);

        tokio::time::advance(Duration::from_secs(61)).await;
        let now = client.current_time();
        let closed = client.get_closed_positions(1, 0, now).await.unwrap();
        assert_eq!(closed.len(), 2);
        let pnl: HashMap<i64, f64> = closed.iter().map(|p| (p.order_id, p.pnl)).collect();
        assert_eq!(pnl[&first.id], -10.0);
        assert!((pnl[&second.id] - 8.5).abs() < 1e-9);
        assert!((client.balance(1).await.unwrap().amount - 98.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_injection() {
        let client = PaperTradingClient::new(BASE);
        client.add_balance(1, 5.0, "USD").await;
        client.fail_next_candle_fetches(1).await;
        assert!(client.get_candles(7, 60, BASE - 60_000).await.is_err());
        assert!(client.get_candles(7, 60, BASE - 60_000).await.is_ok());
        assert_eq!(client.candle_fetch_count().await, 2);

        assert!(client.place_order(&request(10.0)).await.is_err());
        client.reject_next_orders(1).await;
        assert!(client.place_order(&request(1.0)).await.is_err());
        assert!(client.place_order(&request(1.0)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_candles_emits_forming_candle() {
        let client = PaperTradingClient::new(BASE);
        let mut rx = client.stream_candles(7, 60).await.unwrap();
        let candle = rx.recv().await.unwrap();
        assert!(candle.close_time > client.current_time());
    }
}
