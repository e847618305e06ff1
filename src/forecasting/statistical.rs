//! Statistical forecasting layer.
//!
//! `DemandForecaster` owns the method cascade: seasonal decomposition →
//! exponential smoothing → linear trend → naive average. Whatever happens
//! internally, `forecast` returns a usable [`ForecastResult`] — a missing
//! model family or a degenerate fit moves down the cascade instead of
//! surfacing an error.

use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster, Transformer},
    mstl::MSTLModel,
};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    accuracy_score, detect_seasonality, detect_trend, mean, per_day_spread, smoothing,
    std_dev, ForecastMethod, ForecastModel, ForecastResult, ModelOutcome,
    MIN_DATA_FOR_DECOMPOSITION, MIN_DATA_FOR_LINEAR, MIN_DATA_FOR_SMOOTHING, Z_95,
};
use crate::capabilities::ModelCapabilities;
use crate::models::SalesSeries;

/// Ensemble weights, renormalized over the members that actually fitted.
const WEIGHT_DECOMPOSITION: f64 = 0.40;
const WEIGHT_SMOOTHING: f64 = 0.35;
const WEIGHT_LINEAR: f64 = 0.25;
/// Band fraction used when the ensemble has a single member.
const SINGLE_MEMBER_STD_FRACTION: f64 = 0.3;

/// Statistical demand forecasting engine.
#[derive(Debug, Clone)]
pub struct DemandForecaster {
    capabilities: ModelCapabilities,
}

impl DemandForecaster {
    pub fn new(capabilities: ModelCapabilities) -> Self {
        Self { capabilities }
    }

    /// Forecasts `horizon` days ahead. Always returns a usable forecast;
    /// the requested method is honored when possible and silently cascades
    /// otherwise.
    pub fn forecast(
        &self,
        series: &SalesSeries,
        horizon: usize,
        method: ForecastMethod,
    ) -> ForecastResult {
        let values = series.units();

        if values.len() < 3 {
            debug!(len = values.len(), "insufficient history; using naive average");
            return self.finalize(naive_average(&values, horizon), &values);
        }

        let resolved = match method {
            ForecastMethod::Auto => self.select_method(values.len()),
            other => Some(other),
        };

        let result = match resolved {
            Some(method) => self.run(method, &values, horizon),
            None => naive_average(&values, horizon),
        };

        self.finalize(result, &values)
    }

    /// Auto selection by data volume and capability set. `None` means even
    /// the linear trend has too little data and the naive average is used.
    fn select_method(&self, data_points: usize) -> Option<ForecastMethod> {
        if data_points >= MIN_DATA_FOR_DECOMPOSITION && self.capabilities.seasonal_decomposition
        {
            Some(ForecastMethod::Decomposition)
        } else if data_points >= MIN_DATA_FOR_SMOOTHING
            && self.capabilities.exponential_smoothing
        {
            Some(ForecastMethod::Smoothing)
        } else if data_points >= MIN_DATA_FOR_LINEAR {
            Some(ForecastMethod::Linear)
        } else {
            None
        }
    }

    /// Dispatches one method, cascading to the next simpler one whenever
    /// the attempt reports `Unavailable` or `FitFailed`.
    fn run(&self, method: ForecastMethod, values: &[f64], horizon: usize) -> ForecastResult {
        match method {
            ForecastMethod::Auto => unreachable!("auto is resolved before dispatch"),
            ForecastMethod::Decomposition => match self.decomposition(values, horizon) {
                ModelOutcome::Fitted(result) => result,
                outcome => {
                    log_cascade(ForecastModel::SeasonalDecomposition, &outcome);
                    self.run(ForecastMethod::Smoothing, values, horizon)
                }
            },
            ForecastMethod::Autoregressive => match self.autoregressive(values, horizon) {
                ModelOutcome::Fitted(result) => result,
                outcome => {
                    log_cascade(ForecastModel::Autoregressive, &outcome);
                    self.run(ForecastMethod::Linear, values, horizon)
                }
            },
            ForecastMethod::Smoothing => match self.smoothing(values, horizon) {
                ModelOutcome::Fitted(result) => result,
                outcome => {
                    log_cascade(ForecastModel::ExponentialSmoothing, &outcome);
                    self.run(ForecastMethod::Linear, values, horizon)
                }
            },
            ForecastMethod::Linear => match linear_trend(values, horizon) {
                ModelOutcome::Fitted(result) => result,
                outcome => {
                    log_cascade(ForecastModel::LinearTrend, &outcome);
                    naive_average(values, horizon)
                }
            },
            ForecastMethod::Ensemble => self.ensemble(values, horizon),
        }
    }

    /// MSTL seasonal-trend decomposition with an ETS trend model. Weekly
    /// seasonality always; yearly only with a full year of history.
    fn decomposition(&self, values: &[f64], horizon: usize) -> ModelOutcome {
        if !self.capabilities.seasonal_decomposition {
            return ModelOutcome::Unavailable;
        }
        if values.len() < MIN_DATA_FOR_LINEAR {
            return ModelOutcome::FitFailed(format!(
                "need at least {} observations, got {}",
                MIN_DATA_FOR_LINEAR,
                values.len()
            ));
        }
        if std_dev(values) == 0.0 {
            return ModelOutcome::FitFailed("zero variance".to_string());
        }

        let mut periods = vec![7];
        if values.len() >= 365 {
            periods.push(365);
        }

        let ets = AutoETS::non_seasonal().into_trend_model();
        let mstl = MSTLModel::new(periods.clone(), ets);
        let transformers: Vec<Box<dyn Transformer>> =
            vec![Box::new(LinearInterpolator::default())];
        let mut forecaster = Forecaster::new(mstl).with_transformers(transformers);

        if let Err(e) = forecaster.fit(values) {
            return ModelOutcome::FitFailed(format!("decomposition fit: {e}"));
        }
        let forecast = match forecaster.predict(horizon, 0.95) {
            Ok(forecast) => forecast,
            Err(e) => return ModelOutcome::FitFailed(format!("decomposition predict: {e}")),
        };

        if forecast.point.iter().any(|p| !p.is_finite()) {
            return ModelOutcome::FitFailed("non-finite decomposition output".to_string());
        }

        let predictions: Vec<f64> = forecast.point.iter().map(|p| p.max(0.0)).collect();
        let (lower, upper) = match &forecast.intervals {
            Some(intervals) => (
                intervals.lower.iter().map(|v| v.max(0.0)).sum(),
                intervals.upper.iter().map(|v| v.max(0.0)).sum(),
            ),
            None => {
                let band = Z_95 * std_dev(values);
                (
                    predictions.iter().map(|p| (p - band).max(0.0)).sum(),
                    predictions.iter().map(|p| p + band).sum(),
                )
            }
        };

        let details = json!({
            "name": "Seasonal Decomposition",
            "type": "MSTL with ETS trend",
            "features": ["Weekly Seasonality", "Trend Detection", "Prediction Intervals"],
            "periods": periods,
        });

        ModelOutcome::Fitted(ForecastResult::from_bounds(
            predictions,
            lower,
            upper,
            ForecastModel::SeasonalDecomposition,
            accuracy_score(85, values),
            details,
        ))
    }

    /// AR(1) with drift on the first-differenced series.
    fn autoregressive(&self, values: &[f64], horizon: usize) -> ModelOutcome {
        if !self.capabilities.exponential_smoothing {
            // Shares the smoothing family's availability flag.
            return ModelOutcome::Unavailable;
        }
        if values.len() < MIN_DATA_FOR_LINEAR {
            return ModelOutcome::FitFailed("too few observations".to_string());
        }
        if std_dev(values) == 0.0 {
            return ModelOutcome::FitFailed("zero variance".to_string());
        }

        let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let mu = mean(&diffs);

        let mut num = 0.0;
        let mut den = 0.0;
        for pair in diffs.windows(2) {
            num += (pair[0] - mu) * (pair[1] - mu);
            den += (pair[0] - mu).powi(2);
        }
        if den == 0.0 {
            return ModelOutcome::FitFailed("constant differences".to_string());
        }
        let phi = (num / den).clamp(-0.99, 0.99);

        // In-sample one-step residuals on the differences.
        let residuals: Vec<f64> = diffs
            .windows(2)
            .map(|pair| pair[1] - (mu + phi * (pair[0] - mu)))
            .collect();
        let band = Z_95 * std_dev(&residuals);

        let mut predictions = Vec::with_capacity(horizon);
        let mut level = *values.last().unwrap_or(&0.0);
        let mut prev_diff = *diffs.last().unwrap_or(&0.0);
        for _ in 0..horizon {
            let next_diff = mu + phi * (prev_diff - mu);
            level += next_diff;
            predictions.push(level.max(0.0));
            prev_diff = next_diff;
        }

        let details = json!({
            "name": "AR(1) with drift",
            "type": "Autoregressive on first differences",
            "features": ["Trend Analysis", "Autocorrelation"],
            "phi": phi,
            "drift": mu,
        });

        ModelOutcome::Fitted(ForecastResult::from_band(
            predictions,
            band,
            ForecastModel::Autoregressive,
            accuracy_score(78, values),
            details,
        ))
    }

    /// Triple exponential smoothing.
    fn smoothing(&self, values: &[f64], horizon: usize) -> ModelOutcome {
        if !self.capabilities.exponential_smoothing {
            return ModelOutcome::Unavailable;
        }

        match smoothing::fit_forecast(values, horizon) {
            Ok(fit) => {
                let band = Z_95 * fit.residual_std;
                let details = json!({
                    "name": "Holt-Winters Exponential Smoothing",
                    "type": "Triple Exponential Smoothing",
                    "features": ["Level", "Trend", "Seasonality"],
                    "seasonal": fit.seasonal,
                });
                ModelOutcome::Fitted(ForecastResult::from_band(
                    fit.predictions,
                    band,
                    ForecastModel::ExponentialSmoothing,
                    accuracy_score(80, values),
                    details,
                ))
            }
            Err(reason) => ModelOutcome::FitFailed(reason),
        }
    }

    /// Weighted combination of decomposition, smoothing, and linear trend
    /// over whichever members fitted.
    fn ensemble(&self, values: &[f64], horizon: usize) -> ForecastResult {
        let mut members: Vec<(&'static str, f64, ForecastResult)> = Vec::new();

        if values.len() >= MIN_DATA_FOR_DECOMPOSITION {
            if let Some(result) = self.decomposition(values, horizon).fitted() {
                members.push(("decomposition", WEIGHT_DECOMPOSITION, result));
            }
        }
        if values.len() >= MIN_DATA_FOR_LINEAR {
            if let Some(result) = self.smoothing(values, horizon).fitted() {
                members.push(("smoothing", WEIGHT_SMOOTHING, result));
            }
        }
        if let Some(result) = linear_trend(values, horizon).fitted() {
            members.push(("linear", WEIGHT_LINEAR, result));
        }

        if members.is_empty() {
            warn!("no ensemble member fitted; using naive average");
            return naive_average(values, horizon);
        }

        let total_weight: f64 = members.iter().map(|(_, w, _)| *w).sum();
        let mut predictions = vec![0.0; horizon];
        for (_, weight, result) in &members {
            for (day, value) in result.predictions.iter().enumerate() {
                predictions[day] += value * (weight / total_weight);
            }
        }

        let sigma = if members.len() > 1 {
            per_day_spread(&members.iter().map(|(_, _, r)| r.predictions.clone()).collect::<Vec<_>>())
        } else {
            SINGLE_MEMBER_STD_FRACTION * std_dev(&members[0].2.predictions)
        };
        let band = Z_95 * sigma;

        let weights: serde_json::Map<String, serde_json::Value> = members
            .iter()
            .map(|(name, weight, _)| {
                ((*name).to_string(), json!(weight / total_weight))
            })
            .collect();
        let details = json!({
            "name": "Weighted Ensemble",
            "type": "Multi-Model Combination",
            "features": members.iter().map(|(name, _, _)| *name).collect::<Vec<_>>(),
            "weights": weights,
        });

        ForecastResult::from_band(predictions, band, ForecastModel::Ensemble, 82, details)
    }

    fn finalize(&self, mut result: ForecastResult, values: &[f64]) -> ForecastResult {
        result.trend = detect_trend(values);
        result.seasonality_detected = detect_seasonality(values);
        result
    }
}

/// Ordinary least squares on the day index. Always available; the terminal
/// fallback before the naive average.
pub(crate) fn linear_trend(values: &[f64], horizon: usize) -> ModelOutcome {
    if values.is_empty() {
        return ModelOutcome::FitFailed("empty series".to_string());
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }
    let slope = if var == 0.0 { 0.0 } else { cov / var };
    let intercept = y_mean - slope * x_mean;

    let residuals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, y)| y - (intercept + slope * i as f64))
        .collect();
    let band = Z_95 * std_dev(&residuals);

    let predictions: Vec<f64> = (0..horizon)
        .map(|h| (intercept + slope * (values.len() + h) as f64).max(0.0))
        .collect();

    let details = json!({
        "name": "Linear Regression",
        "type": "Ordinary Least Squares",
        "features": ["Trend Projection"],
        "slope": slope,
        "intercept": intercept,
    });

    ModelOutcome::Fitted(ForecastResult::from_band(
        predictions,
        band,
        ForecastModel::LinearTrend,
        70,
        details,
    ))
}

/// Flat historical-average forecast with a fixed ±30% band. The terminal
/// method: succeeds on any input, including an empty series.
pub(crate) fn naive_average(values: &[f64], horizon: usize) -> ForecastResult {
    let avg = mean(values).max(0.0);
    let predictions = vec![avg; horizon];
    let total: f64 = avg * horizon as f64;

    let details = json!({
        "name": "Simple Moving Average",
        "type": "Naive Forecast",
        "features": ["Historical Average"],
        "note": "Using basic average due to insufficient data",
    });

    ForecastResult::from_bounds(
        predictions,
        total * 0.7,
        total * 1.3,
        ForecastModel::NaiveAverage,
        50,
        details,
    )
}

fn log_cascade(model: ForecastModel, outcome: &ModelOutcome) {
    match outcome {
        ModelOutcome::Unavailable => {
            warn!(%model, "model family unavailable; cascading to simpler method");
        }
        ModelOutcome::FitFailed(reason) => {
            warn!(%model, %reason, "model fit failed; cascading to simpler method");
        }
        ModelOutcome::Fitted(_) => {}
    }
}
