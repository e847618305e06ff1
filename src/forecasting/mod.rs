//! Demand forecasting.
//!
//! Two layers produce the same [`ForecastResult`] contract: the statistical
//! layer ([`statistical::DemandForecaster`]) always returns a usable
//! forecast by cascading through progressively simpler methods, and the
//! tree-ensemble layer ([`tree::AdvancedForecaster`]) returns `None` when
//! it cannot contribute. Model failures inside a layer are values
//! ([`ModelOutcome`]), not errors.

pub mod smoothing;
pub mod statistical;
pub mod tree;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::models::TrendDirection;

/// Number of daily observations before the decomposition family is chosen.
pub const MIN_DATA_FOR_DECOMPOSITION: usize = 30;
/// Number of daily observations before exponential smoothing is chosen.
pub const MIN_DATA_FOR_SMOOTHING: usize = 14;
/// Number of daily observations before the linear trend is chosen.
pub const MIN_DATA_FOR_LINEAR: usize = 7;

/// z value for a 95% interval.
pub(crate) const Z_95: f64 = 1.96;

/// Requested forecasting method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastMethod {
    /// Pick the richest method the data volume and capability set allow.
    Auto,
    Decomposition,
    Autoregressive,
    Smoothing,
    Linear,
    Ensemble,
}

/// Identifier of the model that actually produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastModel {
    SeasonalDecomposition,
    Autoregressive,
    ExponentialSmoothing,
    LinearTrend,
    NaiveAverage,
    Ensemble,
    GradientBoostedA,
    GradientBoostedB,
    AdvancedEnsemble,
    ColdStartBaseline,
}

/// The common contract returned by every forecasting method.
///
/// Invariants: every prediction and the lower bound are ≥ 0, and
/// `confidence_lower ≤ total_demand ≤ confidence_upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Predicted units per day over the horizon.
    pub predictions: Vec<f64>,
    /// Sum of the daily predictions.
    pub total_demand: f64,
    /// 95%-equivalent lower bound on total demand.
    pub confidence_lower: f64,
    /// 95%-equivalent upper bound on total demand.
    pub confidence_upper: f64,
    pub daily_avg: f64,
    pub model: ForecastModel,
    /// Advisory accuracy estimate in [0, 100]; not a statistical guarantee.
    pub accuracy_score: u8,
    pub trend: TrendDirection,
    pub seasonality_detected: bool,
    /// Combined seasonal factor already multiplied in, if any.
    pub seasonal_adjustment_applied: Option<f64>,
    /// Price-elasticity multiplier already multiplied in, if any.
    pub price_adjustment_applied: Option<f64>,
    /// Free-form model metadata (feature names, weights, coefficients).
    pub details: Value,
}

impl ForecastResult {
    /// Assembles a result from per-day predictions and a symmetric band
    /// half-width, clamping everything to the non-negativity invariant.
    pub(crate) fn from_band(
        predictions: Vec<f64>,
        band: f64,
        model: ForecastModel,
        accuracy_score: u8,
        details: Value,
    ) -> Self {
        let predictions: Vec<f64> = predictions.iter().map(|p| p.max(0.0)).collect();
        let lower: f64 = predictions.iter().map(|p| (p - band).max(0.0)).sum();
        let upper: f64 = predictions.iter().map(|p| p + band).sum();
        Self::from_bounds(predictions, lower, upper, model, accuracy_score, details)
    }

    /// Assembles a result from already-summed bounds.
    pub(crate) fn from_bounds(
        predictions: Vec<f64>,
        confidence_lower: f64,
        confidence_upper: f64,
        model: ForecastModel,
        accuracy_score: u8,
        details: Value,
    ) -> Self {
        let predictions: Vec<f64> = predictions.iter().map(|p| p.max(0.0)).collect();
        let total_demand: f64 = predictions.iter().sum();
        let daily_avg = if predictions.is_empty() {
            0.0
        } else {
            round2(total_demand / predictions.len() as f64)
        };
        Self {
            predictions,
            total_demand,
            confidence_lower: confidence_lower.max(0.0).min(total_demand),
            confidence_upper: confidence_upper.max(total_demand),
            daily_avg,
            model,
            accuracy_score,
            trend: TrendDirection::Stable,
            seasonality_detected: false,
            seasonal_adjustment_applied: None,
            price_adjustment_applied: None,
            details,
        }
    }

    /// A copy with every quantity multiplied by `factor`. Identity factors
    /// short-circuit so repeated composition stays proportionate.
    pub fn scaled(&self, factor: f64) -> Self {
        if (factor - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let mut scaled = self.clone();
        scaled.predictions = self.predictions.iter().map(|p| p * factor).collect();
        scaled.total_demand = self.total_demand * factor;
        scaled.confidence_lower = self.confidence_lower * factor;
        scaled.confidence_upper = self.confidence_upper * factor;
        scaled.daily_avg = round2(self.daily_avg * factor);
        scaled.seasonal_adjustment_applied = Some(factor);
        scaled
    }

    /// Like [`Self::scaled`], but records the factor as a price adjustment.
    pub fn price_scaled(&self, factor: f64) -> Self {
        if (factor - 1.0).abs() < f64::EPSILON {
            return self.clone();
        }
        let seasonal = self.seasonal_adjustment_applied;
        let mut scaled = self.scaled(factor);
        scaled.seasonal_adjustment_applied = seasonal;
        scaled.price_adjustment_applied = Some(factor);
        scaled
    }
}

/// Outcome of one concrete model attempt. The cascade logic pattern-matches
/// on this instead of catching errors.
#[derive(Debug, Clone)]
pub enum ModelOutcome {
    Fitted(ForecastResult),
    /// The model family is absent from this runtime.
    Unavailable,
    /// The fit degenerated (zero variance, divergence, too little data).
    FitFailed(String),
}

impl ModelOutcome {
    pub fn fitted(self) -> Option<ForecastResult> {
        match self {
            ModelOutcome::Fitted(result) => Some(result),
            _ => None,
        }
    }
}

/// Advisory accuracy heuristic: base score per method, nudged by data
/// volume and coefficient of variation, clamped to [40, 95].
pub(crate) fn accuracy_score(base: i32, values: &[f64]) -> u8 {
    let mut score = base;

    if values.len() > 60 {
        score += 5;
    }
    if values.len() > 90 {
        score += 3;
    }

    let sigma = std_dev(values);
    if sigma > 0.0 {
        let cv = sigma / (mean(values) + 0.01);
        if cv < 0.5 {
            score += 5;
        } else if cv > 1.5 {
            score -= 10;
        }
    }

    score.clamp(40, 95) as u8
}

/// Compares the mean of the first and second halves of the series with a
/// ±10% relative-change threshold.
pub(crate) fn detect_trend(values: &[f64]) -> TrendDirection {
    if values.len() < 7 {
        return TrendDirection::Stable;
    }

    let mid = values.len() / 2;
    let first = mean(&values[..mid]);
    let second = mean(&values[mid..]);

    if first == 0.0 {
        return if second > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Stable
        };
    }

    let change = (second - first) / first;
    if change > 0.1 {
        TrendDirection::Increasing
    } else if change < -0.1 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

/// Weekly seasonality check: lag-7 autocorrelation above 0.3.
pub(crate) fn detect_seasonality(values: &[f64]) -> bool {
    if values.len() < 14 {
        return false;
    }
    let lagged = &values[..values.len() - 7];
    let current = &values[7..];
    pearson(lagged, current).map(|corr| corr > 0.3).unwrap_or(false)
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub(crate) fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean over days of the per-day standard deviation across member
/// prediction vectors. Estimates ensemble spread for interval widths.
pub(crate) fn per_day_spread(member_predictions: &[Vec<f64>]) -> f64 {
    let horizon = member_predictions.first().map(Vec::len).unwrap_or(0);
    if horizon == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for day in 0..horizon {
        let day_values: Vec<f64> = member_predictions
            .iter()
            .filter_map(|preds| preds.get(day).copied())
            .collect();
        total += std_dev(&day_values);
    }
    total / horizon as f64
}
