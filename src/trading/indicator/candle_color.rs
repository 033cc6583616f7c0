use crate::trading::model::Candle;

/// 连续同色K线计数：阳线为正、阴线为负，十字星归零
pub fn consecutive_colors(candles: &[Candle]) -> Vec<i32> {
    let mut counts = Vec::with_capacity(candles.len());
    let mut current: i32 = 0;
    for candle in candles {
        current = if candle.is_bullish() {
            if current > 0 {
                current + 1
            } else {
                1
            }
        } else if candle.is_bearish() {
            if current < 0 {
                current - 1
            } else {
                -1
            }
        } else {
            0
        };
        counts.push(current);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_colors() {
        let c = |o: f64, cl: f64| Candle::new(0, 0, o, o.max(cl), o.min(cl), cl);
        let candles = vec![c(1.0, 2.0), c(2.0, 3.0), c(3.0, 3.0), c(3.0, 2.0), c(2.0, 1.0), c(1.0, 2.0)];
        assert_eq!(consecutive_colors(&candles), vec![1, 2, 0, -1, -2, 1]);
    }
}
