use anyhow::anyhow;
use ta::indicators::{Maximum, Minimum};
use ta::Next;

use crate::trading::model::Candle;

/// 箱体支撑/阻力
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportResistanceValue {
    pub resistance: f64,
    pub support: f64,
}

impl SupportResistanceValue {
    pub fn mid(&self) -> f64 {
        (self.resistance + self.support) / 2.0
    }

    /// 最高价进入阻力半区的程度，阻力区高度为 0 时返回 None
    pub fn upper_zone_position(&self, high: f64) -> Option<f64> {
        let height = self.resistance - self.mid();
        (height > 0.0).then(|| (high - self.mid()) / height)
    }

    /// 最低价进入支撑半区的程度
    pub fn lower_zone_position(&self, low: f64) -> Option<f64> {
        let height = self.mid() - self.support;
        (height > 0.0).then(|| (self.mid() - low) / height)
    }
}

/// 当根最高价触及 `box_period` 最高点时刷新阻力，支撑同理，其余时间沿用上一个值
#[derive(Debug, Clone)]
pub struct SupportResistance {
    highest: Maximum,
    lowest: Minimum,
    box_period: usize,
    count: usize,
    resistance: Option<f64>,
    support: Option<f64>,
}

impl SupportResistance {
    pub fn new(box_period: usize) -> anyhow::Result<Self> {
        Ok(Self {
            highest: Maximum::new(box_period).map_err(|e| anyhow!("箱体参数非法: {:?}", e))?,
            lowest: Minimum::new(box_period).map_err(|e| anyhow!("箱体参数非法: {:?}", e))?,
            box_period,
            count: 0,
            resistance: None,
            support: None,
        })
    }

    pub fn next(&mut self, candle: &Candle) -> Option<SupportResistanceValue> {
        let highest = self.highest.next(candle.high);
        let lowest = self.lowest.next(candle.low);
        self.count += 1;
        if self.count >= self.box_period {
            if candle.high >= highest {
                self.resistance = Some(candle.high);
            }
            if candle.low <= lowest {
                self.support = Some(candle.low);
            }
        }
        match (self.resistance, self.support) {
            (Some(resistance), Some(support)) => Some(SupportResistanceValue {
                resistance,
                support,
            }),
            _ => None,
        }
    }
}
