use anyhow::anyhow;
use ta::indicators::BollingerBands;
use ta::Next;

/// 布林带输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// 基于 ta::BollingerBands 的流式布林带，样本不足 `period` 时返回 None
#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    inner: BollingerBands,
    period: usize,
    count: usize,
}

impl BollingerIndicator {
    pub fn new(period: usize, multiplier: f64) -> anyhow::Result<Self> {
        let inner = BollingerBands::new(period, multiplier)
            .map_err(|e| anyhow!("布林带参数非法: period={}, {:?}", period, e))?;
        Ok(Self {
            inner,
            period,
            count: 0,
        })
    }

    pub fn next(&mut self, close: f64) -> Option<BollingerValue> {
        let out = self.inner.next(close);
        self.count += 1;
        (self.count >= self.period).then_some(BollingerValue {
            upper: out.upper,
            middle: out.average,
            lower: out.lower,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bollinger_flat_series() {
        let mut bb = BollingerIndicator::new(3, 2.0).unwrap();
        assert!(bb.next(1.0).is_none());
        assert!(bb.next(1.0).is_none());
        let v = bb.next(1.0).unwrap();
        assert_relative_eq!(v.middle, 1.0);
        assert_relative_eq!(v.upper, 1.0);
        assert_relative_eq!(v.lower, 1.0);
    }

    #[test]
    fn test_bollinger_rejects_zero_period() {
        assert!(BollingerIndicator::new(0, 2.0).is_err());
    }
}
