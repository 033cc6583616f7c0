use anyhow::anyhow;
use ta::indicators::{Maximum, Minimum};
use ta::Next;

use crate::trading::model::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonchianValue {
    pub upper: f64,
    pub lower: f64,
}

impl DonchianValue {
    pub fn middle(&self) -> f64 {
        (self.upper + self.lower) / 2.0
    }
}

/// 唐奇安通道：最近 `period` 根的最高价/最低价
#[derive(Debug, Clone)]
pub struct DonchianChannel {
    highest: Maximum,
    lowest: Minimum,
    period: usize,
    count: usize,
}

impl DonchianChannel {
    pub fn new(period: usize) -> anyhow::Result<Self> {
        let highest = Maximum::new(period).map_err(|e| anyhow!("唐奇安参数非法: {:?}", e))?;
        let lowest = Minimum::new(period).map_err(|e| anyhow!("唐奇安参数非法: {:?}", e))?;
        Ok(Self {
            highest,
            lowest,
            period,
            count: 0,
        })
    }

    pub fn next(&mut self, candle: &Candle) -> Option<DonchianValue> {
        let upper = self.highest.next(candle.high);
        let lower = self.lowest.next(candle.low);
        self.count += 1;
        (self.count >= self.period).then_some(DonchianValue { upper, lower })
    }
}
