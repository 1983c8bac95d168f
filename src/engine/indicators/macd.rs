//! MACD: EMA(fast) - EMA(slow), signal EMA over the MACD line, histogram.
//!
//! Warm-up: the MACD line is valid from slot (slow-1); the signal line from
//! slot (slow-1 + signal-1).

use super::ma::ema;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

/// Returns (macd_line, signal_line, histogram), each aligned with input.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = values.len();
    if fast == 0 || slow == 0 || signal == 0 || n < slow {
        return (vec![f64::NAN; n], vec![f64::NAN; n], vec![f64::NAN; n]);
    }

    let ema_fast = ema(values, fast);
    let ema_slow = ema(values, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    // Signal line: EMA of the MACD line, seeded with the SMA of the first
    // `signal` valid MACD values.
    let mut signal_line = vec![f64::NAN; n];
    let macd_start = slow - 1;
    let seed_end = macd_start + signal;
    if seed_end <= n {
        let k = 2.0 / (signal as f64 + 1.0);
        let seed: f64 = macd_line[macd_start..seed_end].iter().sum::<f64>() / signal as f64;
        signal_line[seed_end - 1] = seed;

        let mut prev = seed;
        for i in seed_end..n {
            prev = macd_line[i] * k + prev * (1.0 - k);
            signal_line[i] = prev;
        }
    }

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    // The MACD line itself is only meaningful once the slow EMA exists.
    let mut macd_out = vec![f64::NAN; n];
    macd_out[macd_start..n].copy_from_slice(&macd_line[macd_start..n]);

    (macd_out, signal_line, histogram)
}
