//! 订单、持仓与跟踪订单

use serde::{Deserialize, Serialize};

use super::signal::Direction;

/// 下单请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub balance_id: i64,
    pub asset_id: i64,
    pub amount: f64,
    pub direction: Direction,
    /// 周期 (秒)
    pub period: i64,
    pub is_system_trade: bool,
}

/// 平台受理后的订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub id: i64,
    pub balance_id: i64,
    pub asset_id: i64,
    pub amount: f64,
    pub direction: Direction,
    pub period: i64,
    pub open_time: i64,
    pub expiration_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// 持仓，`order_id` 对应下单时返回的订单号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub order_id: i64,
    pub balance_id: i64,
    pub asset_id: i64,
    pub direction: Direction,
    pub amount: f64,
    pub pnl: f64,
    pub open_time: i64,
    pub expiration_time: i64,
    pub close_time: Option<i64>,
    pub status: PositionStatus,
}

impl Position {
    pub fn outcome(&self) -> OrderOutcome {
        OrderOutcome::from_pnl(self.pnl)
    }

    /// 平仓时刻，缺失时以到期时间代替
    pub fn closed_at(&self) -> i64 {
        self.close_time.unwrap_or(self.expiration_time)
    }
}

/// 订单结果：pnl >= 0 视为盈利
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Win,
    Loss,
}

impl OrderOutcome {
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl >= 0.0 {
            OrderOutcome::Win
        } else {
            OrderOutcome::Loss
        }
    }
}

/// 等待结果的系统订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub order_id: i64,
    pub chain_id: Option<String>,
    pub balance_id: i64,
    pub asset_id: i64,
    pub amount: f64,
    pub direction: Direction,
    pub period: i64,
    pub created_at: i64,
    pub is_system_trade: bool,
}

impl TrackedOrder {
    pub fn from_placed(order: &PlacedOrder, chain_id: Option<String>, created_at: i64) -> Self {
        Self {
            order_id: order.id,
            chain_id,
            balance_id: order.balance_id,
            asset_id: order.asset_id,
            amount: order.amount,
            direction: order.direction,
            period: order.period,
            created_at,
            is_system_trade: true,
        }
    }
}

/// 已平仓订单的精简记录，供风控监控使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub order_id: i64,
    pub balance_id: i64,
    pub asset_id: i64,
    pub pnl: f64,
    pub closed_at: i64,
}

impl From<&Position> for ClosedTrade {
    fn from(p: &Position) -> Self {
        Self {
            order_id: p.order_id,
            balance_id: p.balance_id,
            asset_id: p.asset_id,
            pnl: p.pnl,
            closed_at: p.closed_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_pnl_counts_as_win() {
        assert_eq!(OrderOutcome::from_pnl(0.0), OrderOutcome::Win);
        assert_eq!(OrderOutcome::from_pnl(-0.01), OrderOutcome::Loss);
    }
}
