//! Technical indicators over close/volume slices.
//!
//! Every function returns one value per input element; `None` marks the
//! warmup period or an undefined value.

/// Simple moving average. Warmup: first `period - 1` values.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        out.push((i + 1 >= period).then(|| sum / period as f64));
    }
    out
}

/// Exponential moving average, k = 2/(n+1), seeded with the first SMA.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = 0.0;
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if i + 1 < period {
            sum += v;
            out.push(None);
        } else if i + 1 == period {
            sum += v;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema = v * k + ema * (1.0 - k);
            out.push(Some(ema));
        }
    }
    out
}

/// EMA over a series with its own leading warmup gap.
fn ema_of_optional(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let offset = values.iter().position(Option::is_some).unwrap_or(values.len());
    let dense: Vec<f64> = values[offset..].iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut out = vec![None; offset];
    out.extend(ema(&dense, period));
    out
}

/// RSI with Wilder smoothing. The first value appears once `period` price
/// changes are available; a zero average loss gives 100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let change = |i: usize| closes[i] - closes[i - 1];
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let c = change(i);
        avg_gain += c.max(0.0);
        avg_loss += (-c).max(0.0);
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let rsi_value = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    out[period] = Some(rsi_value(avg_gain, avg_loss));
    for i in (period + 1)..closes.len() {
        let c = change(i);
        avg_gain = (avg_gain * (period - 1) as f64 + c.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + (-c).max(0.0)) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// MACD line = EMA(fast) - EMA(slow); signal = EMA(line, signal_period).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_of_optional(&line, signal_period);
    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| Some((*l)? - (*s)?))
        .collect();
    Macd {
        line,
        signal,
        histogram,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bollinger {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bands at SMA ± `mult` × population standard deviation.
pub fn bollinger(closes: &[f64], period: usize, mult: f64) -> Bollinger {
    let middle = sma(closes, period);
    let mut upper = Vec::with_capacity(closes.len());
    let mut lower = Vec::with_capacity(closes.len());
    for (i, m) in middle.iter().enumerate() {
        match m {
            Some(mean) => {
                let window = &closes[i + 1 - period..=i];
                let var = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
                let sd = var.sqrt();
                upper.push(Some(mean + mult * sd));
                lower.push(Some(mean - mult * sd));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }
    Bollinger {
        upper,
        middle,
        lower,
    }
}

/// Position of the close within the bands: 0 at the lower band, 1 at the upper.
/// Undefined when the bands collapse.
pub fn bollinger_pct_b(closes: &[f64], period: usize, mult: f64) -> Vec<Option<f64>> {
    let bands = bollinger(closes, period, mult);
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let (u, l) = (bands.upper[i]?, bands.lower[i]?);
            (u > l).then(|| (c - l) / (u - l))
        })
        .collect()
}

/// Rate of change as a fraction: close / close[n ago] - 1.
pub fn roc(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if period == 0 || i < period {
                return None;
            }
            let base = closes[i - period];
            (base != 0.0).then(|| c / base - 1.0)
        })
        .collect()
}

/// Sample standard deviation of one-bar returns over a trailing window.
/// The window ending at bar i uses the returns of bars i-period+1..=i.
pub fn rolling_return_std(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let returns: Vec<Option<f64>> = roc(closes, 1);
    (0..closes.len())
        .map(|i| {
            if period < 2 || i < period {
                return None;
            }
            let window: Option<Vec<f64>> = returns[i + 1 - period..=i].iter().copied().collect();
            let window = window?;
            let mean = window.iter().sum::<f64>() / period as f64;
            let var = window.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

/// Value divided by its trailing `period` average.
pub fn ratio_to_sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    sma(values, period)
        .into_iter()
        .zip(values)
        .map(|(avg, &v)| {
            let avg = avg?;
            (avg != 0.0).then(|| v / avg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 2.0);
        assert_relative_eq!(out[3].unwrap(), 3.0);
    }

    #[test]
    fn ema_seeded_with_sma() {
        let out = ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 20.0);
        // k = 0.5
        assert_relative_eq!(out[3].unwrap(), 30.0);
        assert_relative_eq!(out[4].unwrap(), 40.0);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert_eq!(out[13], None);
        assert_relative_eq!(out[14].unwrap(), 100.0);
        assert_relative_eq!(out[19].unwrap(), 100.0);
    }

    #[test]
    fn rsi_balanced_moves_near_50() {
        let closes: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let out = rsi(&closes, 14);
        let last = out[29].unwrap();
        assert!(last > 40.0 && last < 60.0);
    }

    #[test]
    fn rsi_short_input_is_all_none() {
        assert!(rsi(&[1.0, 2.0], 14).iter().all(Option::is_none));
    }

    #[test]
    fn macd_histogram_warmup() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let m = macd(&closes, 12, 26, 9);
        // Line from index 25, signal needs 9 more line values.
        assert!(m.line[24].is_none());
        assert!(m.line[25].is_some());
        assert!(m.histogram[32].is_none());
        assert!(m.histogram[33].is_some());
        let h = m.histogram[40].unwrap();
        assert_relative_eq!(h, m.line[40].unwrap() - m.signal[40].unwrap());
    }

    #[test]
    fn bollinger_constant_series_collapses() {
        let closes = vec![50.0; 25];
        let bands = bollinger(&closes, 20, 2.0);
        assert_relative_eq!(bands.upper[24].unwrap(), 50.0);
        assert_relative_eq!(bands.lower[24].unwrap(), 50.0);
        assert_eq!(bollinger_pct_b(&closes, 20, 2.0)[24], None);
    }

    #[test]
    fn pct_b_in_range_for_mid_close() {
        let closes = vec![1.0, 2.0, 3.0, 2.0, 1.0, 2.0];
        let pct = bollinger_pct_b(&closes, 5, 2.0);
        let v = pct[5].unwrap();
        assert!(v > 0.0 && v < 1.0);
    }

    #[test]
    fn roc_and_rolling_std() {
        let closes = [100.0, 110.0, 121.0, 133.1];
        let r = roc(&closes, 1);
        assert_eq!(r[0], None);
        assert_relative_eq!(r[1].unwrap(), 0.1, epsilon = 1e-12);
        let sd = rolling_return_std(&closes, 3);
        assert_eq!(sd[2], None);
        assert_relative_eq!(sd[3].unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn ratio_to_sma_volume() {
        let r = ratio_to_sma(&[100.0, 100.0, 400.0], 3);
        assert_relative_eq!(r[2].unwrap(), 2.0);
    }
}
