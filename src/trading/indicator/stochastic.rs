use anyhow::anyhow;
use ta::indicators::{Maximum, Minimum, SimpleMovingAverage};
use ta::Next;

use crate::trading::model::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

/// 慢速随机指标 (k_period, smooth, d_period)
///
/// 区间高低相等时原始 %K 取 50
#[derive(Debug, Clone)]
pub struct SlowStochastic {
    highest: Maximum,
    lowest: Minimum,
    k_smooth: SimpleMovingAverage,
    d_smooth: SimpleMovingAverage,
    k_period: usize,
    smooth_period: usize,
    d_period: usize,
    count: usize,
}

impl SlowStochastic {
    pub fn new(k_period: usize, smooth_period: usize, d_period: usize) -> anyhow::Result<Self> {
        let err = |e| anyhow!("随机指标参数非法: {:?}", e);
        Ok(Self {
            highest: Maximum::new(k_period).map_err(err)?,
            lowest: Minimum::new(k_period).map_err(err)?,
            k_smooth: SimpleMovingAverage::new(smooth_period).map_err(err)?,
            d_smooth: SimpleMovingAverage::new(d_period).map_err(err)?,
            k_period,
            smooth_period,
            d_period,
            count: 0,
        })
    }

    pub fn next(&mut self, candle: &Candle) -> Option<StochasticValue> {
        let highest = self.highest.next(candle.high);
        let lowest = self.lowest.next(candle.low);
        self.count += 1;
        if self.count < self.k_period {
            return None;
        }

        let range = highest - lowest;
        let raw_k = if range > 0.0 {
            100.0 * (candle.close - lowest) / range
        } else {
            50.0
        };
        let k = self.k_smooth.next(raw_k);
        let k_ready = self.count + 1 >= self.k_period + self.smooth_period;
        if !k_ready {
            return None;
        }
        let d = self.d_smooth.next(k);
        let d_ready = self.count + 2 >= self.k_period + self.smooth_period + self.d_period;
        d_ready.then_some(StochasticValue { k, d })
    }
}
