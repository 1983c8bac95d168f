//! Simple and exponential moving averages.
//!
//! EMA: k = 2/(n+1), seeded with the first SMA, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k). Warm-up: first (n-1) slots.

/// Simple moving average. Output aligned with input; first (period-1)
/// slots are NaN. A NaN inside a window propagates into its output.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// Exponential moving average, SMA-seeded.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;

    let mut prev = seed;
    for i in period..values.len() {
        prev = values[i] * k + prev * (1.0 - k);
        out[i] = prev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_exact_period_returns_one_value() {
        let values: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let out = sma(&values, 20);
        assert_eq!(out.len(), 20);
        for v in &out[..19] {
            assert!(v.is_nan());
        }
        assert_eq!(out[19], 10.5);
    }

    #[test]
    fn test_sma_rolling() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&values, 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn test_sma_insufficient_data_all_nan() {
        let out = sma(&[1.0, 2.0], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_eq!(out[2], 2.0); // seed = SMA(1,2,3)
        // k = 0.5: ema[3] = 4*0.5 + 2*0.5 = 3
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn test_ema_constant_series_is_constant() {
        let values = [7.0; 10];
        let out = ema(&values, 4);
        for v in &out[3..] {
            assert_eq!(*v, 7.0);
        }
    }
}
