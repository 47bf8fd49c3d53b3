//! Indicator math shared by the analysis layers
//!
//! All functions are pure and tolerate short inputs by returning `None` or a
//! neutral value instead of panicking.

use super::bars::PriceBar;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median, `None` for an empty slice
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn bar_vwap_price(bar: &PriceBar) -> f64 {
    bar.vwap.unwrap_or_else(|| bar.typical_price())
}

/// Session VWAP over the given bars
pub fn session_vwap(bars: &[PriceBar]) -> Option<f64> {
    let volume: f64 = bars.iter().map(|b| b.volume).sum();
    if volume <= 0.0 {
        return None;
    }
    let notional: f64 = bars.iter().map(|b| bar_vwap_price(b) * b.volume).sum();
    Some(notional / volume)
}

/// VWAP as of each bar (cumulative)
pub fn running_vwap(bars: &[PriceBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut volume = 0.0;
    let mut notional = 0.0;
    for bar in bars {
        volume += bar.volume;
        notional += bar_vwap_price(bar) * bar.volume;
        let vwap = if volume > 0.0 { notional / volume } else { bar.close };
        out.push(vwap);
    }
    out
}

/// Failed VWAP reclaim attempts since price last closed above VWAP.
///
/// An attempt is a bar that trades up through VWAP but closes back below it.
/// Consecutive attempt bars count once. A close at or above VWAP resets the count.
pub fn count_failed_reclaims(bars: &[PriceBar]) -> usize {
    let vwaps = running_vwap(bars);
    let mut attempts = 0;
    let mut has_been_below = false;
    let mut previous_was_attempt = false;

    for (bar, vwap) in bars.iter().zip(vwaps.iter()) {
        if bar.close >= *vwap {
            attempts = 0;
            has_been_below = false;
            previous_was_attempt = false;
            continue;
        }

        let is_attempt = bar.high >= *vwap;
        if is_attempt && has_been_below && !previous_was_attempt {
            attempts += 1;
        }
        previous_was_attempt = is_attempt;
        has_been_below = true;
    }
    attempts
}

/// Exponential moving average series (seeded with the first value)
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// Latest EMA value, requiring at least `period` observations
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period || period == 0 {
        return None;
    }
    ema_series(values, period).last().copied()
}

/// Wilder RSI for every index (`None` until `period` changes are available)
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut gain = 0.0;
    let mut loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gain += change;
        } else {
            loss -= change;
        }
    }
    let mut avg_gain = gain / period as f64;
    let mut avg_loss = loss / period as f64;
    out[period] = Some(rsi_from(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (g, l) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + g) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + l) / period as f64;
        out[i] = Some(rsi_from(avg_gain, avg_loss));
    }
    out
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Latest RSI
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied().flatten()
}

/// Average true range over the last `period` bars
pub fn atr(bars: &[PriceBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let start = bars.len() - period;
    let ranges: Vec<f64> = (start..bars.len())
        .map(|i| {
            let bar = &bars[i];
            let prev_close = bars[i - 1].close;
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect();
    mean(&ranges)
}

/// Indices and values of swing highs (strictly above both neighbours)
pub fn swing_highs(values: &[f64]) -> Vec<(usize, f64)> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] > values[i + 1])
        .map(|i| (i, values[i]))
        .collect()
}

/// The last two swing highs are descending
pub fn has_lower_high(values: &[f64]) -> bool {
    let highs = swing_highs(values);
    match highs.as_slice() {
        [.., (_, first), (_, second)] => second < first,
        _ => false,
    }
}

/// Last bar's volume relative to the mean of up to `lookback` prior bars
pub fn relative_volume(bars: &[PriceBar], lookback: usize) -> Option<f64> {
    let (last, prior) = bars.split_last()?;
    let start = prior.len().saturating_sub(lookback);
    let volumes: Vec<f64> = prior[start..].iter().map(|b| b.volume).collect();
    let avg = mean(&volumes)?;
    if avg <= 0.0 {
        return None;
    }
    Some(last.volume / avg)
}

/// Annualised realised volatility of log returns over the last `window` closes
pub fn realized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let avg = mean(&returns)?;
    let variance =
        returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt() * 252f64.sqrt())
}

/// Percent change between two prices
pub fn pct_change(from: f64, to: f64) -> f64 {
    if from <= 0.0 {
        return 0.0;
    }
    (to - from) / from * 100.0
}

#[cfg(test)]
pub(crate) mod test_bars {
    use super::PriceBar;
    use chrono::{Duration, TimeZone, Utc};

    /// Minute bars from (high, low, close, volume) tuples; open = previous close
    pub fn minute_bars(rows: &[(f64, f64, f64, f64)]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 12, 14, 30, 0).unwrap();
        let mut prev_close = rows.first().map(|r| r.2).unwrap_or(0.0);
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close, volume))| {
                let bar = PriceBar::new(
                    start + Duration::minutes(i as i64),
                    prev_close,
                    high,
                    low,
                    close,
                    volume,
                );
                prev_close = close;
                bar
            })
            .collect()
    }

    /// Daily bars from closes with a fixed range and volume
    pub fn daily_from_closes(closes: &[f64], volume: f64) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 21, 0, 0).unwrap();
        let mut prev = closes.first().copied().unwrap_or(0.0);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = prev;
                prev = close;
                PriceBar::new(
                    start + Duration::days(i as i64),
                    open,
                    open.max(close) * 1.005,
                    open.min(close) * 0.995,
                    close,
                    volume,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_bars::*;
    use super::*;

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_session_vwap_weights_by_volume() {
        let bars = minute_bars(&[(10.0, 10.0, 10.0, 100.0), (20.0, 20.0, 20.0, 300.0)]);
        assert!((session_vwap(&bars).unwrap() - 17.5).abs() < 1e-9);
    }

    #[test]
    fn test_failed_reclaims_counted_and_reset() {
        // Heavy volume at 100 anchors VWAP near 100, then price fades below it
        let mut rows = vec![(100.0, 100.0, 100.0, 10_000.0)];
        rows.push((99.5, 98.0, 98.5, 100.0)); // below
        rows.push((100.2, 98.4, 98.6, 100.0)); // attempt 1
        rows.push((99.0, 98.0, 98.2, 100.0)); // below
        rows.push((100.3, 98.1, 98.4, 100.0)); // attempt 2
        rows.push((100.4, 98.2, 98.5, 100.0)); // same attempt continues
        let bars = minute_bars(&rows);
        assert_eq!(count_failed_reclaims(&bars), 2);

        let mut reclaimed = rows.clone();
        reclaimed.push((101.0, 99.0, 100.8, 5_000.0));
        assert_eq!(count_failed_reclaims(&minute_bars(&reclaimed)), 0);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));
        let flat = vec![50.0; 30];
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..10], 14), None);
    }

    #[test]
    fn test_ema_converges_toward_recent_values() {
        let mut values = vec![10.0; 20];
        values.extend(vec![20.0; 20]);
        let value = ema(&values, 10).unwrap();
        assert!(value > 19.0 && value < 20.0);
        assert_eq!(ema(&values[..5], 10), None);
    }

    #[test]
    fn test_atr_constant_range() {
        let bars = daily_from_closes(&vec![100.0; 20], 1_000.0);
        let value = atr(&bars, 14).unwrap();
        // high/low are 0.5% either side of a flat close
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_lower_high_detection() {
        assert!(has_lower_high(&[1.0, 5.0, 2.0, 4.0, 1.0]));
        assert!(!has_lower_high(&[1.0, 4.0, 2.0, 5.0, 1.0]));
        assert!(!has_lower_high(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_relative_volume() {
        let mut bars = daily_from_closes(&vec![50.0; 21], 1_000.0);
        if let Some(last) = bars.last_mut() {
            last.volume = 2_500.0;
        }
        assert!((relative_volume(&bars, 20).unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_realized_volatility_flat_is_zero() {
        let closes = vec![100.0; 30];
        assert_eq!(realized_volatility(&closes, 20), Some(0.0));
        assert_eq!(realized_volatility(&closes[..5], 20), None);
    }
}
