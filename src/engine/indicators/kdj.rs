//! KDJ: stochastic oscillator with the J line.
//!
//! RSV = (close - LL(n)) / (HH(n) - LL(n)) * 100 over the lookback window,
//! K = SMA(RSV, 3), D = SMA(K, 3), J = 3K - 2D. A flat window (HH == LL)
//! yields the neutral value 50.

use super::ma::sma;

pub const DEFAULT_PERIOD: usize = 9;
const SMOOTH_K: usize = 3;
const SMOOTH_D: usize = 3;

/// Returns (k, d, j), each aligned with input. Requires high/low/close
/// slices of equal length.
pub fn kdj(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = close.len();
    debug_assert!(high.len() == n && low.len() == n);
    if period == 0 || n < period {
        return (vec![f64::NAN; n], vec![f64::NAN; n], vec![f64::NAN; n]);
    }

    let mut rsv = vec![f64::NAN; n];
    for i in (period - 1)..n {
        let window = i + 1 - period..=i;
        let hh = high[window.clone()].iter().cloned().fold(f64::MIN, f64::max);
        let ll = low[window].iter().cloned().fold(f64::MAX, f64::min);
        rsv[i] = if hh == ll {
            50.0
        } else {
            (close[i] - ll) / (hh - ll) * 100.0
        };
    }

    let k = sma_skip_warmup(&rsv, SMOOTH_K, period - 1);
    let d = sma_skip_warmup(&k, SMOOTH_D, period - 1 + SMOOTH_K - 1);

    let j: Vec<f64> = k
        .iter()
        .zip(d.iter())
        .map(|(k, d)| 3.0 * k - 2.0 * d)
        .collect();

    (k, d, j)
}

/// SMA over the valid suffix of a series whose first `warmup` slots are NaN.
fn sma_skip_warmup(values: &[f64], period: usize, warmup: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.len() > warmup {
        let tail = sma(&values[warmup..], period);
        out[warmup..].copy_from_slice(&tail);
    }
    out
}
