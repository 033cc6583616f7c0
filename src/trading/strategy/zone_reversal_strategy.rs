//! 区间反转策略
//!
//! 最新K线刺穿箱体阻力区、唐奇安上轨与布林上轨，且随机指标超买、连续阳线时看跌(PUT)；
//! 镜像条件看涨(CALL)；其余 HOLD。

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::trading::indicator::bollinger::{BollingerIndicator, BollingerValue};
use crate::trading::indicator::candle_color::consecutive_colors;
use crate::trading::indicator::donchian::{DonchianChannel, DonchianValue};
use crate::trading::indicator::stochastic::{SlowStochastic, StochasticValue};
use crate::trading::indicator::support_resistance::{SupportResistance, SupportResistanceValue};
use crate::trading::model::{Candle, SignalDirection};
use crate::trading::strategy::signal_function::SignalFunction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReversalConfig {
    pub box_period: usize,
    pub donchian_period: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub stoch_k_period: usize,
    pub stoch_smooth: usize,
    pub stoch_d_period: usize,
    /// 进入阻力/支撑半区的最小比例
    pub zone_ratio: f64,
    pub overbought: f64,
    pub oversold: f64,
    pub min_consecutive: i32,
    /// 少于该数量的K线直接 HOLD
    pub min_candles: usize,
}

impl Default for ZoneReversalConfig {
    fn default() -> Self {
        Self {
            box_period: 25,
            donchian_period: 20,
            bb_period: 14,
            bb_multiplier: 2.0,
            stoch_k_period: 13,
            stoch_smooth: 3,
            stoch_d_period: 3,
            zone_ratio: 0.9,
            overbought: 80.0,
            oversold: 20.0,
            min_consecutive: 3,
            min_candles: 20,
        }
    }
}

/// 最后一根K线上的指标快照
#[derive(Debug, Clone, Copy)]
struct LastValues {
    sr: SupportResistanceValue,
    prev_dc: DonchianValue,
    bb: BollingerValue,
    stoch: StochasticValue,
    colors: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneReversalSignal {
    config: ZoneReversalConfig,
}

impl ZoneReversalSignal {
    pub fn new(config: ZoneReversalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ZoneReversalConfig {
        &self.config
    }

    fn compute(&self, candles: &[Candle]) -> anyhow::Result<Option<LastValues>> {
        let c = &self.config;
        let mut sr = SupportResistance::new(c.box_period)?;
        let mut dc = DonchianChannel::new(c.donchian_period)?;
        let mut bb = BollingerIndicator::new(c.bb_period, c.bb_multiplier)?;
        let mut stoch = SlowStochastic::new(c.stoch_k_period, c.stoch_smooth, c.stoch_d_period)?;

        let mut prev_dc = None;
        let mut last_dc = None;
        let mut last_sr = None;
        let mut last_bb = None;
        let mut last_stoch = None;
        for candle in candles {
            prev_dc = last_dc;
            last_dc = dc.next(candle);
            last_sr = sr.next(candle);
            last_bb = bb.next(candle.close);
            last_stoch = stoch.next(candle);
        }
        let colors = consecutive_colors(candles).last().copied().unwrap_or(0);

        Ok(match (last_sr, prev_dc, last_bb, last_stoch) {
            (Some(sr), Some(prev_dc), Some(bb), Some(stoch)) => Some(LastValues {
                sr,
                prev_dc,
                bb,
                stoch,
                colors,
            }),
            _ => None,
        })
    }
}

impl SignalFunction for ZoneReversalSignal {
    fn name(&self) -> &str {
        "zone_reversal"
    }

    fn evaluate(&self, candles: &[Candle]) -> SignalDirection {
        let c = &self.config;
        let Some(last) = candles.last() else {
            return SignalDirection::Hold;
        };
        if candles.len() < c.min_candles {
            return SignalDirection::Hold;
        }

        let values = match self.compute(candles) {
            Ok(Some(v)) => v,
            Ok(None) => return SignalDirection::Hold,
            Err(e) => {
                warn!("区间反转指标计算失败: {}", e);
                return SignalDirection::Hold;
            }
        };

        let near_resistance = values
            .sr
            .upper_zone_position(last.high)
            .is_some_and(|p| p >= c.zone_ratio);
        let put = near_resistance
            && last.high > values.prev_dc.upper
            && last.high > values.bb.upper
            && values.stoch.k > c.overbought
            && values.colors >= c.min_consecutive;
        if put {
            return SignalDirection::Put;
        }

        let near_support = values
            .sr
            .lower_zone_position(last.low)
            .is_some_and(|p| p >= c.zone_ratio);
        let call = near_support
            && last.low < values.prev_dc.lower
            && last.low < values.bb.lower
            && values.stoch.k < c.oversold
            && values.colors <= -c.min_consecutive;
        if call {
            return SignalDirection::Call;
        }

        SignalDirection::Hold
    }
}
