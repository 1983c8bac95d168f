//! Bollinger Bands: SMA middle band with population-stddev envelopes.

use super::ma::sma;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STDDEV: f64 = 2.0;

/// Returns (upper, middle, lower), each aligned with input; first
/// (period-1) slots are NaN. StdDev is the population form (divides by N).
pub fn bollinger(values: &[f64], period: usize, stddev_mult: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = values.len();
    let middle = sma(values, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period == 0 || n < period {
        return (upper, middle, lower);
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        let mean = middle[i];
        let variance =
            window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        let stddev = variance.sqrt();
        upper[i] = mean + stddev_mult * stddev;
        lower[i] = mean - stddev_mult * stddev;
    }

    (upper, middle, lower)
}
