//! 信号函数接口

use crate::trading::model::{Candle, SignalDirection};

/// 纯函数：K线窗口 -> CALL / PUT / HOLD，不持有状态
pub trait SignalFunction: Send + Sync {
    /// 策略名称
    fn name(&self) -> &str {
        "custom"
    }

    /// 窗口按时间升序，最后一根为最新收盘的K线
    fn evaluate(&self, candles: &[Candle]) -> SignalDirection;
}

impl<F> SignalFunction for F
where
    F: Fn(&[Candle]) -> SignalDirection + Send + Sync,
{
    fn evaluate(&self, candles: &[Candle]) -> SignalDirection {
        self(candles)
    }
}
