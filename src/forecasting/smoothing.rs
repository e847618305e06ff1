//! Triple exponential smoothing (Holt-Winters).
//!
//! Additive level + trend + weekly-seasonal smoothing with fixed constants,
//! falling back to damped trend-only (Holt) smoothing when the series does
//! not cover two full seasonal periods. A small positive offset is added
//! before fitting and removed afterwards so all-zero stretches do not
//! degenerate the multiplicative-free update equations.

use super::{mean, std_dev};

const ALPHA: f64 = 0.3;
const BETA: f64 = 0.1;
const GAMMA: f64 = 0.1;
/// Damping applied to the trend in the non-seasonal fallback.
const PHI: f64 = 0.98;
/// Offset applied to dodge degenerate behavior at zero.
const OFFSET: f64 = 0.1;

/// A fitted smoothing forecast: point predictions plus the in-sample
/// residual standard deviation for interval construction.
#[derive(Debug, Clone)]
pub struct SmoothingForecast {
    pub predictions: Vec<f64>,
    pub residual_std: f64,
    pub seasonal: bool,
}

/// Fits and forecasts in one step. Returns `Err` on degenerate input so the
/// caller can cascade; never panics.
pub fn fit_forecast(values: &[f64], horizon: usize) -> Result<SmoothingForecast, String> {
    if values.len() < 7 {
        return Err(format!("need at least 7 observations, got {}", values.len()));
    }
    if std_dev(values) == 0.0 {
        return Err("zero variance".to_string());
    }

    let offset_values: Vec<f64> = values.iter().map(|v| v + OFFSET).collect();
    let period = (values.len() / 2).min(7);

    let fit = if period >= 2 && offset_values.len() >= 2 * period {
        let seasonal = holt_winters_additive(&offset_values, period, horizon);
        if seasonal.predictions.iter().all(|p| p.is_finite()) {
            seasonal
        } else {
            // Degenerate seasonal fit; retry without the seasonal component.
            holt_damped(&offset_values, horizon)
        }
    } else {
        holt_damped(&offset_values, horizon)
    };

    let predictions: Vec<f64> = fit
        .predictions
        .iter()
        .map(|p| (p - OFFSET).max(0.0))
        .collect();

    Ok(SmoothingForecast {
        predictions,
        residual_std: fit.residual_std,
        seasonal: fit.seasonal,
    })
}

struct RawFit {
    predictions: Vec<f64>,
    residual_std: f64,
    seasonal: bool,
}

/// Additive Holt-Winters. Level from the first season's mean, trend from
/// the season-over-season difference, seasonal indices normalized to sum
/// to zero.
fn holt_winters_additive(values: &[f64], period: usize, horizon: usize) -> RawFit {
    let n = values.len();

    let mut level = mean(&values[..period]);
    let mut trend = if n >= 2 * period {
        (0..period)
            .map(|i| (values[period + i] - values[i]) / period as f64)
            .sum::<f64>()
            / period as f64
    } else {
        0.0
    };

    let mut seasonals: Vec<f64> = values[..period].iter().map(|v| v - level).collect();
    let adjustment = seasonals.iter().sum::<f64>() / period as f64;
    for s in seasonals.iter_mut() {
        *s -= adjustment;
    }

    let mut residuals = Vec::with_capacity(n.saturating_sub(period));
    for (t, &y) in values.iter().enumerate().skip(period) {
        let season_idx = t % period;
        let s = seasonals[season_idx];

        let one_step = level + trend + s;
        residuals.push(y - one_step);

        let level_prev = level;
        level = ALPHA * (y - s) + (1.0 - ALPHA) * (level_prev + trend);
        trend = BETA * (level - level_prev) + (1.0 - BETA) * trend;
        seasonals[season_idx] = GAMMA * (y - level) + (1.0 - GAMMA) * s;
    }

    let predictions = (1..=horizon)
        .map(|h| {
            let season_idx = (n + h - 1) % period;
            level + h as f64 * trend + seasonals[season_idx]
        })
        .collect();

    RawFit {
        predictions,
        residual_std: std_dev(&residuals),
        seasonal: true,
    }
}

/// Damped trend-only (Holt) smoothing for series shorter than two full
/// seasonal periods.
fn holt_damped(values: &[f64], horizon: usize) -> RawFit {
    let mut level = values[0];
    let mut trend = values[1] - values[0];

    let mut residuals = Vec::with_capacity(values.len().saturating_sub(1));
    for &y in &values[1..] {
        let one_step = level + PHI * trend;
        residuals.push(y - one_step);

        let level_prev = level;
        level = ALPHA * y + (1.0 - ALPHA) * (level_prev + PHI * trend);
        trend = BETA * (level - level_prev) + (1.0 - BETA) * PHI * trend;
    }

    // Damped forecast: level + (phi + phi^2 + ... + phi^h) * trend
    let mut predictions = Vec::with_capacity(horizon);
    let mut damp_sum = 0.0;
    let mut damp = PHI;
    for _ in 0..horizon {
        damp_sum += damp;
        damp *= PHI;
        predictions.push(level + damp_sum * trend);
    }

    RawFit {
        predictions,
        residual_std: std_dev(&residuals),
        seasonal: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_pattern(weeks: usize) -> Vec<f64> {
        // Weekday 2/day, weekend 8/day, mild upward drift.
        (0..weeks * 7)
            .map(|i| {
                let base = if i % 7 >= 5 { 8.0 } else { 2.0 };
                base + i as f64 * 0.02
            })
            .collect()
    }

    #[test]
    fn rejects_short_series() {
        assert!(fit_forecast(&[1.0, 2.0, 3.0], 7).is_err());
    }

    #[test]
    fn rejects_zero_variance() {
        let flat = vec![4.0; 20];
        let err = fit_forecast(&flat, 7).unwrap_err();
        assert!(err.contains("variance"));
    }

    #[test]
    fn seasonal_fit_used_with_two_full_periods() {
        let values = weekly_pattern(4);
        let fit = fit_forecast(&values, 7).unwrap();
        assert!(fit.seasonal);
        assert_eq!(fit.predictions.len(), 7);
        assert!(fit.predictions.iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn seasonal_fit_tracks_weekend_peaks() {
        let values = weekly_pattern(6);
        let fit = fit_forecast(&values, 7).unwrap();
        // The history starts on a "Monday"; forecast day 6 and 7 are the
        // weekend and should sit well above midweek days.
        let weekend = (fit.predictions[5] + fit.predictions[6]) / 2.0;
        let midweek = (fit.predictions[1] + fit.predictions[2]) / 2.0;
        assert!(
            weekend > midweek,
            "weekend {} should exceed midweek {}",
            weekend,
            midweek
        );
    }

    #[test]
    fn trend_only_fallback_projects_the_trend() {
        let values = vec![1.1, 2.1, 3.1, 4.1, 5.1, 6.1, 7.1];
        let fit = holt_damped(&values, 5);
        assert!(!fit.seasonal);
        // Upward trend should carry forward.
        assert!(fit.predictions[0] > 6.1);
        assert!(fit.predictions[4] > fit.predictions[0]);
    }

    #[test]
    fn minimum_length_series_uses_period_three() {
        // len 7 -> period min(7, 3) = 3, two full periods covered.
        let values = vec![1.0, 5.0, 2.0, 1.5, 5.5, 2.5, 1.0];
        let fit = fit_forecast(&values, 6).unwrap();
        assert!(fit.seasonal);
        assert_eq!(fit.predictions.len(), 6);
    }

    #[test]
    fn all_outputs_non_negative_on_declining_series() {
        let values: Vec<f64> = (0..14).map(|i| (10.0 - i as f64).max(0.0)).collect();
        let fit = fit_forecast(&values, 14).unwrap();
        assert!(fit.predictions.iter().all(|p| *p >= 0.0));
    }
}
