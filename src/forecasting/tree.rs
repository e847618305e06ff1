//! Tree-ensemble forecasting layer.
//!
//! Gradient-boosted regression trees over engineered calendar, lag, and
//! rolling-window features. Unlike the statistical layer, absence is a
//! valid outcome here: every entry point returns `Option` and the caller
//! decides whether to blend or fall back.
//!
//! The horizon is generated iteratively from a running buffer seeded with
//! the tail of actual history, so each predicted day can feed the lag and
//! rolling features of the days after it.

use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde_json::json;
use tracing::debug;

use super::{
    detect_seasonality, detect_trend, mean, per_day_spread, std_dev, ForecastModel,
    ForecastResult, Z_95,
};
use crate::capabilities::ModelCapabilities;
use crate::models::SalesSeries;

/// Minimum history before any tree model is attempted.
const MIN_DATA_FOR_TREES: usize = 14;
/// Minimum feature rows surviving the lag dropout.
const MIN_CLEAN_ROWS: usize = 7;
/// Fixed seed so repeated fits over identical data are identical.
const SEED: u64 = 42;
/// Advanced-ensemble weights: tree variants, then per-base-forecast cap.
const WEIGHT_VARIANT_A: f64 = 0.35;
const WEIGHT_VARIANT_B: f64 = 0.30;
const BASE_FORECAST_WEIGHT_CAP: f64 = 0.35;
const SINGLE_MEMBER_STD_FRACTION: f64 = 0.3;

/// Which gradient-boosted configuration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeVariant {
    /// Deeper trees, larger steps, lags {1, 7, 14}, rolling mean + std.
    GradientBoostedA,
    /// Shallower steps, lags {1, 7}, rolling mean only.
    GradientBoostedB,
}

impl TreeVariant {
    fn params(self) -> BoostParams {
        match self {
            TreeVariant::GradientBoostedA => BoostParams {
                n_trees: 100,
                max_depth: 4,
                learning_rate: 0.1,
                row_subsample: 0.8,
                col_subsample: 0.8,
            },
            TreeVariant::GradientBoostedB => BoostParams {
                n_trees: 100,
                max_depth: 5,
                learning_rate: 0.05,
                row_subsample: 0.8,
                col_subsample: 0.9,
            },
        }
    }

    fn lags(self) -> &'static [usize] {
        match self {
            TreeVariant::GradientBoostedA => &[1, 7, 14],
            TreeVariant::GradientBoostedB => &[1, 7],
        }
    }

    fn uses_rolling_std(self) -> bool {
        matches!(self, TreeVariant::GradientBoostedA)
    }

    fn model(self) -> ForecastModel {
        match self {
            TreeVariant::GradientBoostedA => ForecastModel::GradientBoostedA,
            TreeVariant::GradientBoostedB => ForecastModel::GradientBoostedB,
        }
    }

    fn accuracy(self) -> u8 {
        match self {
            TreeVariant::GradientBoostedA => 88,
            TreeVariant::GradientBoostedB => 87,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            TreeVariant::GradientBoostedA => "Gradient Boosting A",
            TreeVariant::GradientBoostedB => "Gradient Boosting B",
        }
    }

    fn feature_names(self) -> Vec<String> {
        let mut names = vec![
            "day_of_week".to_string(),
            "day_of_month".to_string(),
            "week_of_year".to_string(),
            "month".to_string(),
            "is_weekend".to_string(),
        ];
        for lag in self.lags() {
            names.push(format!("lag_{}", lag));
        }
        names.push("rolling_mean_7".to_string());
        if self.uses_rolling_std() {
            names.push("rolling_std_7".to_string());
        }
        names
    }
}

#[derive(Debug, Clone, Copy)]
struct BoostParams {
    n_trees: usize,
    max_depth: usize,
    learning_rate: f64,
    row_subsample: f64,
    col_subsample: f64,
}

/// Tree-ensemble forecaster.
#[derive(Debug, Clone)]
pub struct AdvancedForecaster {
    capabilities: ModelCapabilities,
}

impl AdvancedForecaster {
    pub fn new(capabilities: ModelCapabilities) -> Self {
        Self { capabilities }
    }

    /// Trains one gradient-boosted variant and forecasts the horizon.
    /// `None` when the family is unavailable or the data cannot support a
    /// fit — never an error to the caller.
    pub fn forecast_tree_model(
        &self,
        series: &SalesSeries,
        horizon: usize,
        variant: TreeVariant,
    ) -> Option<ForecastResult> {
        if !self.capabilities.tree_ensemble {
            debug!(variant = variant.display_name(), "tree family unavailable");
            return None;
        }
        if series.len() < MIN_DATA_FOR_TREES || horizon == 0 {
            return None;
        }

        let values = series.units();
        let end_date = series.end_date()?;
        let dates: Vec<NaiveDate> = series.observations().iter().map(|o| o.date).collect();

        let (x, y) = build_training_rows(&dates, &values, variant);
        if x.len() < MIN_CLEAN_ROWS {
            debug!(
                variant = variant.display_name(),
                clean_rows = x.len(),
                "not enough clean rows after lag features"
            );
            return None;
        }

        let feature_count = x[0].len();
        let mut rng = StdRng::seed_from_u64(SEED);
        let model = GradientBoostedTrees::fit(&x, &y, variant.params(), feature_count, &mut rng);

        // In-sample residuals drive the interval width.
        let residuals: Vec<f64> = x
            .iter()
            .zip(&y)
            .map(|(row, target)| target - model.predict(row))
            .collect();
        let residual_std = std_dev(&residuals);

        // Iterative horizon generation: lag and rolling features come from
        // a running buffer that absorbs each new prediction.
        let mut buffer: Vec<f64> = values.clone();
        let mut predictions = Vec::with_capacity(horizon);
        for day in 1..=horizon {
            let date = end_date + Duration::days(day as i64);
            let row = future_row(date, &buffer, variant);
            let predicted = model.predict(&row).max(0.0);
            predictions.push(predicted);
            buffer.push(predicted);
        }

        let names = variant.feature_names();
        let mut ranked: Vec<(String, f64)> = names
            .iter()
            .cloned()
            .zip(model.importance.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top_features: Vec<_> = ranked
            .iter()
            .take(3)
            .map(|(name, importance)| json!({ "name": name, "importance": importance }))
            .collect();

        let details = json!({
            "name": variant.display_name(),
            "type": "Gradient Boosted Regression Trees",
            "features": ["Time Features", "Lag Features", "Rolling Statistics"],
            "n_trees": variant.params().n_trees,
            "top_features": top_features,
        });

        let mut result = ForecastResult::from_band(
            predictions,
            Z_95 * residual_std,
            variant.model(),
            variant.accuracy(),
            details,
        );
        result.trend = detect_trend(&values);
        result.seasonality_detected = detect_seasonality(&values);
        Some(result)
    }

    /// Blends the tree variants with caller-supplied base forecasts,
    /// weighting bases by their own advisory accuracy. `None` only when no
    /// member at all is available.
    pub fn forecast_advanced_ensemble(
        &self,
        series: &SalesSeries,
        horizon: usize,
        base_forecasts: &[ForecastResult],
    ) -> Option<ForecastResult> {
        let mut members: Vec<(String, f64, Vec<f64>)> = Vec::new();

        if let Some(result) =
            self.forecast_tree_model(series, horizon, TreeVariant::GradientBoostedA)
        {
            members.push(("gradient_boosted_a".to_string(), WEIGHT_VARIANT_A, result.predictions));
        }
        if let Some(result) =
            self.forecast_tree_model(series, horizon, TreeVariant::GradientBoostedB)
        {
            members.push(("gradient_boosted_b".to_string(), WEIGHT_VARIANT_B, result.predictions));
        }
        for base in base_forecasts {
            if base.predictions.len() == horizon {
                let weight =
                    f64::from(base.accuracy_score) / 100.0 * BASE_FORECAST_WEIGHT_CAP;
                members.push((base.model.to_string(), weight, base.predictions.clone()));
            }
        }

        if members.is_empty() {
            return None;
        }

        let total_weight: f64 = members.iter().map(|(_, w, _)| *w).sum();
        let mut predictions = vec![0.0; horizon];
        for (_, weight, preds) in &members {
            for (day, value) in preds.iter().enumerate() {
                predictions[day] += value * (weight / total_weight);
            }
        }
        for p in predictions.iter_mut() {
            *p = p.max(0.0);
        }

        let sigma = if members.len() > 1 {
            per_day_spread(
                &members.iter().map(|(_, _, preds)| preds.clone()).collect::<Vec<_>>(),
            )
        } else {
            SINGLE_MEMBER_STD_FRACTION * std_dev(&predictions)
        };

        let weights: serde_json::Map<String, serde_json::Value> = members
            .iter()
            .map(|(name, weight, _)| (name.clone(), json!(weight / total_weight)))
            .collect();
        let details = json!({
            "name": "Advanced Ensemble",
            "type": "Multi-Algorithm Ensemble",
            "features": ["Tree Models", "Weighted Combination", "Prediction Intervals"],
            "models": members.iter().map(|(name, _, _)| name.clone()).collect::<Vec<_>>(),
            "weights": weights,
        });

        let values = series.units();
        let mut result = ForecastResult::from_band(
            predictions,
            Z_95 * sigma,
            ForecastModel::AdvancedEnsemble,
            90,
            details,
        );
        result.trend = detect_trend(&values);
        result.seasonality_detected = detect_seasonality(&values);
        Some(result)
    }
}

/// Feature rows for the observed history. Rows whose largest lag reaches
/// before the start of the series are dropped.
fn build_training_rows(
    dates: &[NaiveDate],
    values: &[f64],
    variant: TreeVariant,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let max_lag = variant.lags().iter().copied().max().unwrap_or(0);
    let mut x = Vec::new();
    let mut y = Vec::new();

    for i in max_lag..values.len() {
        let mut row = calendar_features(dates[i]);
        for &lag in variant.lags() {
            row.push(values[i - lag]);
        }
        let window_start = i.saturating_sub(6);
        let window = &values[window_start..=i];
        row.push(mean(window));
        if variant.uses_rolling_std() {
            row.push(std_dev(window));
        }
        x.push(row);
        y.push(values[i]);
    }

    (x, y)
}

/// Feature row for a future date, with lags and rolling statistics read
/// from the running buffer.
fn future_row(date: NaiveDate, buffer: &[f64], variant: TreeVariant) -> Vec<f64> {
    let mut row = calendar_features(date);
    for &lag in variant.lags() {
        let value = if buffer.len() >= lag {
            buffer[buffer.len() - lag]
        } else {
            *buffer.last().unwrap_or(&0.0)
        };
        row.push(value);
    }
    let window_start = buffer.len().saturating_sub(7);
    let window = &buffer[window_start..];
    row.push(mean(window));
    if variant.uses_rolling_std() {
        row.push(std_dev(window));
    }
    row
}

fn calendar_features(date: NaiveDate) -> Vec<f64> {
    let day_of_week = f64::from(date.weekday().num_days_from_monday());
    vec![
        day_of_week,
        f64::from(date.day()),
        f64::from(date.iso_week().week()),
        f64::from(date.month()),
        if day_of_week >= 5.0 { 1.0 } else { 0.0 },
    ]
}

/// Squared-error gradient boosting: each tree fits the running residuals
/// and contributes `learning_rate` of its prediction.
struct GradientBoostedTrees {
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    /// Cumulative SSE reduction attributed to each feature.
    importance: Vec<f64>,
}

impl GradientBoostedTrees {
    fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        params: BoostParams,
        feature_count: usize,
        rng: &mut StdRng,
    ) -> Self {
        let base = mean(y);
        let mut residuals: Vec<f64> = y.iter().map(|v| v - base).collect();
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importance = vec![0.0; feature_count];

        let row_count = ((x.len() as f64 * params.row_subsample).round() as usize)
            .clamp(1, x.len());
        let col_count = ((feature_count as f64 * params.col_subsample).round() as usize)
            .clamp(1, feature_count);

        for _ in 0..params.n_trees {
            let rows: Vec<usize> = sample(rng, x.len(), row_count).into_vec();
            let cols: Vec<usize> = sample(rng, feature_count, col_count).into_vec();

            let tree =
                RegressionTree::fit(x, &residuals, &rows, &cols, params.max_depth, &mut importance);
            for (i, residual) in residuals.iter_mut().enumerate() {
                *residual -= params.learning_rate * tree.predict(&x[i]);
            }
            trees.push(tree);
        }

        Self {
            base,
            learning_rate: params.learning_rate,
            trees,
            importance,
        }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        self.base
            + self.learning_rate
                * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }
}

enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A CART regression tree: splits minimize the summed squared error of the
/// two children.
struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn fit(
        x: &[Vec<f64>],
        targets: &[f64],
        rows: &[usize],
        features: &[usize],
        max_depth: usize,
        importance: &mut [f64],
    ) -> Self {
        let root = grow(x, targets, rows, features, max_depth, importance);
        Self { root }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn grow(
    x: &[Vec<f64>],
    targets: &[f64],
    rows: &[usize],
    features: &[usize],
    depth: usize,
    importance: &mut [f64],
) -> Node {
    let node_mean = mean(&rows.iter().map(|&i| targets[i]).collect::<Vec<_>>());
    if depth == 0 || rows.len() < 2 {
        return Node::Leaf(node_mean);
    }

    let Some(split) = best_split(x, targets, rows, features) else {
        return Node::Leaf(node_mean);
    };

    importance[split.feature] += split.gain;

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&i| x[i][split.feature] <= split.threshold);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(grow(x, targets, &left_rows, features, depth - 1, importance)),
        right: Box::new(grow(x, targets, &right_rows, features, depth - 1, importance)),
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn best_split(
    x: &[Vec<f64>],
    targets: &[f64],
    rows: &[usize],
    features: &[usize],
) -> Option<SplitChoice> {
    let total_sum: f64 = rows.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| targets[i] * targets[i]).sum();
    let n = rows.len() as f64;
    let parent_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<SplitChoice> = None;

    for &feature in features {
        let mut ordered: Vec<(f64, f64)> =
            rows.iter().map(|&i| (x[i][feature], targets[i])).collect();
        ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..ordered.len() {
            left_sum += ordered[k - 1].1;
            left_sq += ordered[k - 1].1 * ordered[k - 1].1;

            // Only split between distinct feature values.
            if ordered[k - 1].0 == ordered[k].0 {
                continue;
            }

            let left_n = k as f64;
            let right_n = n - left_n;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;

            let left_sse = left_sq - left_sum * left_sum / left_n;
            let right_sse = right_sq - right_sum * right_sum / right_n;
            let gain = parent_sse - left_sse - right_sse;

            if gain > 1e-12 && best.as_ref().map(|b| gain > b.gain).unwrap_or(true) {
                best = Some(SplitChoice {
                    feature,
                    threshold: (ordered[k - 1].0 + ordered[k].0) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SalesObservation;
    use rust_decimal::Decimal;

    fn series_with(units: &[u32]) -> SalesSeries {
        let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let records = units.iter().enumerate().map(|(i, &u)| SalesObservation {
            date: start + Duration::days(i as i64),
            units_sold: u,
            revenue: Decimal::ZERO,
            returns_count: 0,
        });
        SalesSeries::build(start, start + Duration::days(units.len() as i64 - 1), records)
    }

    fn weekly_series(weeks: usize) -> SalesSeries {
        let units: Vec<u32> = (0..weeks * 7)
            .map(|i| if i % 7 >= 5 { 9 } else { 3 })
            .collect();
        series_with(&units)
    }

    fn forecaster() -> AdvancedForecaster {
        AdvancedForecaster::new(ModelCapabilities::all())
    }

    #[test]
    fn requires_two_weeks_of_history() {
        let series = series_with(&[5; 10]);
        let result =
            forecaster().forecast_tree_model(&series, 14, TreeVariant::GradientBoostedA);
        assert!(result.is_none());
    }

    #[test]
    fn unavailable_family_returns_none() {
        let series = weekly_series(6);
        let off = AdvancedForecaster::new(ModelCapabilities {
            tree_ensemble: false,
            ..ModelCapabilities::all()
        });
        assert!(off
            .forecast_tree_model(&series, 14, TreeVariant::GradientBoostedA)
            .is_none());
    }

    #[test]
    fn fits_weekly_pattern() {
        let series = weekly_series(8);
        let result = forecaster()
            .forecast_tree_model(&series, 14, TreeVariant::GradientBoostedA)
            .unwrap();

        assert_eq!(result.predictions.len(), 14);
        assert!(result.predictions.iter().all(|p| *p >= 0.0));
        assert_eq!(result.model, ForecastModel::GradientBoostedA);
        assert!(result.confidence_lower <= result.total_demand);
        assert!(result.confidence_upper >= result.total_demand);

        // History starts on a Monday; day 6/7 of the forecast are the
        // weekend and should be predicted above midweek days.
        let weekend = result.predictions[5].max(result.predictions[6]);
        let midweek = result.predictions[1].min(result.predictions[2]);
        assert!(
            weekend > midweek,
            "weekend {} should exceed midweek {}",
            weekend,
            midweek
        );
    }

    #[test]
    fn repeated_fits_are_identical() {
        let series = weekly_series(6);
        let a = forecaster()
            .forecast_tree_model(&series, 10, TreeVariant::GradientBoostedB)
            .unwrap();
        let b = forecaster()
            .forecast_tree_model(&series, 10, TreeVariant::GradientBoostedB)
            .unwrap();
        assert_eq!(a.predictions, b.predictions);
        assert_eq!(a.confidence_upper, b.confidence_upper);
    }

    #[test]
    fn reports_top_feature_importances() {
        let series = weekly_series(8);
        let result = forecaster()
            .forecast_tree_model(&series, 7, TreeVariant::GradientBoostedA)
            .unwrap();
        let top = result.details["top_features"].as_array().unwrap();
        assert_eq!(top.len(), 3);
        assert!(top[0]["importance"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn advanced_ensemble_blends_bases() {
        let series = weekly_series(6);
        let base = crate::forecasting::statistical::naive_average(&series.units(), 14);
        let result = forecaster()
            .forecast_advanced_ensemble(&series, 14, &[base])
            .unwrap();

        assert_eq!(result.model, ForecastModel::AdvancedEnsemble);
        assert_eq!(result.accuracy_score, 90);
        let models = result.details["models"].as_array().unwrap();
        assert_eq!(models.len(), 3);
    }

    #[test]
    fn advanced_ensemble_without_any_member_is_none() {
        let series = series_with(&[2; 10]);
        let off = AdvancedForecaster::new(ModelCapabilities {
            tree_ensemble: false,
            ..ModelCapabilities::all()
        });
        assert!(off.forecast_advanced_ensemble(&series, 14, &[]).is_none());
    }

    #[test]
    fn advanced_ensemble_survives_missing_tree_family() {
        // Only the base forecast is available; ensemble still forms.
        let series = weekly_series(6);
        let off = AdvancedForecaster::new(ModelCapabilities {
            tree_ensemble: false,
            ..ModelCapabilities::all()
        });
        let base = crate::forecasting::statistical::naive_average(&series.units(), 14);
        let result = off.forecast_advanced_ensemble(&series, 14, &[base]).unwrap();
        assert_eq!(result.details["models"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn regression_tree_splits_on_informative_feature() {
        // Feature 0 perfectly separates targets; feature 1 is noise.
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![if i < 10 { 0.0 } else { 1.0 }, (i % 3) as f64])
            .collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { 2.0 } else { 8.0 }).collect();
        let rows: Vec<usize> = (0..20).collect();
        let mut importance = vec![0.0; 2];

        let tree = RegressionTree::fit(&x, &targets, &rows, &[0, 1], 3, &mut importance);
        assert!((tree.predict(&[0.0, 1.0]) - 2.0).abs() < 1e-9);
        assert!((tree.predict(&[1.0, 1.0]) - 8.0).abs() < 1e-9);
        assert!(importance[0] > importance[1]);
    }
}
