//! Inventory analysis orchestrator.
//!
//! Pulls the sales series and product snapshot from the repository, runs
//! velocity, seasonal, forecasting, and anomaly analysis, then derives a
//! stockout prediction, a restock recommendation, and human-readable
//! insights. A missing product is the only hard failure; every downstream
//! stage degrades to a conservative default instead of failing the
//! analysis.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::anomaly::{AnomalyDetector, AnomalyReport};
use crate::capabilities::ModelCapabilities;
use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::forecasting::statistical::DemandForecaster;
use crate::forecasting::tree::AdvancedForecaster;
use crate::forecasting::{ForecastMethod, ForecastModel, ForecastResult};
use crate::models::{
    PredictionSource, PricePoint, ProductSnapshot, SalesSeries, TrendDirection, UrgencyTier,
};
use crate::repository::InventoryRepository;
use crate::seasonal::{SeasonalAdjustment, SeasonalAnalyzer};

/// Spoilage safety margin on the shelf-life quantity cap.
const SHELF_LIFE_MARGIN: f64 = 0.8;
/// Accuracy score attached to cold-start flat-rate forecasts.
const COLD_START_ACCURACY: u8 = 65;
/// Conservative share of a category average assigned to one product.
const CATEGORY_SHARE: f64 = 0.7;
/// Price move (percent) that triggers the elasticity heuristic.
const PRICE_CHANGE_TRIGGER_PCT: f64 = 5.0;
/// Assumed retail price elasticity of demand.
const PRICE_ELASTICITY: f64 = -1.5;

/// Sales velocity over the trailing windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityMetrics {
    pub daily_avg_7d: f64,
    pub daily_avg_30d: f64,
    pub daily_avg_90d: f64,
    pub weekly_total: i64,
    pub monthly_total: i64,
    pub trend: TrendDirection,
    pub trend_percentage: f64,
    pub return_rate: f64,
    pub source: PredictionSource,
}

/// When stock runs out and how urgent that is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockoutPrediction {
    pub will_stockout: bool,
    /// `None` when demand is zero (never runs out at current rate).
    pub days_until_stockout: Option<f64>,
    pub stockout_date: Option<NaiveDate>,
    pub urgency: UrgencyTier,
    pub urgency_score: u8,
    pub confidence: u8,
    pub based_on_daily_demand: f64,
    pub message: Option<String>,
}

/// Restock sizing and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestockRecommendation {
    pub suggested_quantity: i64,
    pub urgency: UrgencyTier,
    /// 1 = order now, 5 = no action needed.
    pub priority: u8,
    pub safety_stock: i64,
    pub lead_time_demand: i64,
    pub ideal_stock_level: i64,
    pub reorder_point: i64,
    pub current_vs_ideal_pct: f64,
    pub message: String,
    pub shelf_life_warning: Option<String>,
    pub perishable: bool,
}

/// One structured advisory message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub message: String,
}

/// Provenance of the forecast behind an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub algorithm: String,
    pub confidence: u8,
    pub data_points: usize,
}

/// Price-change impact estimate (optional extension, off by default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceImpact {
    pub has_recent_change: bool,
    pub price_change_pct: f64,
    pub impact_multiplier: f64,
    pub message: Option<String>,
}

impl PriceImpact {
    fn none() -> Self {
        Self {
            has_recent_change: false,
            price_change_pct: 0.0,
            impact_multiplier: 1.0,
            message: None,
        }
    }
}

/// Complete successful analysis for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAnalysis {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub status: String,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
    pub sales_velocity: VelocityMetrics,
    pub demand_forecast: ForecastResult,
    pub stockout_prediction: StockoutPrediction,
    pub restock_recommendation: RestockRecommendation,
    pub seasonal_analysis: SeasonalAdjustment,
    pub anomaly_report: AnomalyReport,
    pub insights: Vec<Insight>,
    pub analyzed_at: DateTime<Utc>,
    pub model_info: ModelInfo,
}

/// Hard failure for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub product_id: Uuid,
    pub product_name: Option<String>,
    pub error: String,
}

/// The analysis contract: a structured result, never an exception. Callers
/// branch on the variant instead of catching faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    Completed(Box<ProductAnalysis>),
    Failed(AnalysisFailure),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    pub fn analysis(&self) -> Option<&ProductAnalysis> {
        match self {
            AnalysisOutcome::Completed(analysis) => Some(analysis),
            AnalysisOutcome::Failed(_) => None,
        }
    }

    /// Stockout urgency score; failures sort last.
    pub fn urgency_score(&self) -> u8 {
        self.analysis()
            .map(|a| a.stockout_prediction.urgency_score)
            .unwrap_or(0)
    }

    fn failed(product_id: Uuid, error: impl Into<String>) -> Self {
        AnalysisOutcome::Failed(AnalysisFailure {
            product_id,
            product_name: None,
            error: error.into(),
        })
    }
}

/// Batch analysis over the active product set.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub total_analyzed: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub results: Vec<AnalysisOutcome>,
}

/// Products needing urgent restocking.
#[derive(Debug, Serialize, Deserialize)]
pub struct CriticalItems {
    pub count: usize,
    pub items: Vec<ProductAnalysis>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestockReportSummary {
    pub total_products_analyzed: usize,
    pub critical_items: usize,
    pub high_priority_items: usize,
    pub medium_priority_items: usize,
    pub low_priority_items: usize,
    pub total_restock_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecommendation {
    pub priority: String,
    pub message: String,
    pub action: String,
}

/// Comprehensive restock report across the catalog.
#[derive(Debug, Serialize, Deserialize)]
pub struct RestockReport {
    pub report_date: DateTime<Utc>,
    pub summary: RestockReportSummary,
    pub critical_items: Vec<ProductAnalysis>,
    pub high_priority_items: Vec<ProductAnalysis>,
    pub medium_priority_items: Vec<ProductAnalysis>,
    pub seasonal_context: SeasonalAdjustment,
    pub recommendations: Vec<ReportRecommendation>,
}

/// Main inventory prediction engine.
#[derive(Clone)]
pub struct InventoryPredictor {
    repository: Arc<dyn InventoryRepository>,
    config: EngineConfig,
    forecaster: DemandForecaster,
    advanced: AdvancedForecaster,
    seasonal: SeasonalAnalyzer,
    anomaly: AnomalyDetector,
    analysis_date: Option<NaiveDate>,
}

impl InventoryPredictor {
    pub fn new(
        repository: Arc<dyn InventoryRepository>,
        config: EngineConfig,
        capabilities: ModelCapabilities,
    ) -> Self {
        Self {
            repository,
            config,
            forecaster: DemandForecaster::new(capabilities),
            advanced: AdvancedForecaster::new(capabilities),
            seasonal: SeasonalAnalyzer::new(),
            anomaly: AnomalyDetector::new(capabilities),
            analysis_date: None,
        }
    }

    /// Pins the calendar date used for seasonal lookups and stockout
    /// dates. Defaults to today; tests pin it for determinism.
    pub fn with_analysis_date(mut self, date: NaiveDate) -> Self {
        self.analysis_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.analysis_date.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Complete analysis for one product. Returns `Failed` only when the
    /// product does not exist or the repository is unreachable.
    #[instrument(skip(self))]
    pub async fn analyze_product(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        lead_time_days: Option<u32>,
        persist: bool,
    ) -> AnalysisOutcome {
        let lead_time = lead_time_days.unwrap_or(self.config.lead_time_days);

        let snapshot = match self
            .repository
            .get_product_snapshot(product_id, variant_id)
            .await
        {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return AnalysisOutcome::failed(product_id, "Product not found");
            }
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed");
                return AnalysisOutcome::failed(product_id, e.to_string());
            }
        };

        let series = match self
            .repository
            .get_sales_series(product_id, variant_id, self.config.history_days)
            .await
        {
            Ok(series) => series,
            Err(e) => {
                warn!(error = %e, "sales series fetch failed");
                return AnalysisOutcome::failed(product_id, e.to_string());
            }
        };

        let today = self.today();
        let horizon = self.config.forecast_days as usize;

        let velocity = self.compute_velocity(&series, &snapshot).await;

        let pet_type = snapshot.primary_pet_type().unwrap_or("all").to_string();
        let category = snapshot.category.clone().unwrap_or_default();
        let seasonal = self.seasonal.adjustment_factors(
            Some(&series),
            &pet_type,
            if category.is_empty() { "regular" } else { &category },
            today,
        );

        let forecast = self.select_forecast(&series, horizon, &velocity);
        let mut adjusted = forecast.scaled(seasonal.combined_adjustment_factor);

        if self.config.price_elasticity_enabled {
            let impact = self.price_impact(product_id, variant_id).await;
            if impact.has_recent_change {
                adjusted = adjusted.price_scaled(impact.impact_multiplier);
            }
        }

        let anomaly_report = self.anomaly.detect(&series);

        let available = snapshot.available_stock();
        let stockout = predict_stockout(available, &velocity, &adjusted, today);
        let restock = size_restock(
            available,
            &velocity,
            &adjusted,
            lead_time,
            self.config.safety_stock_days,
            &snapshot,
        );
        let insights = build_insights(&velocity, &adjusted, &stockout, &restock, &seasonal);

        let analysis = ProductAnalysis {
            product_id,
            variant_id,
            product_name: snapshot.name.clone(),
            status: snapshot.status.clone(),
            current_stock: snapshot.current_stock,
            reserved_stock: snapshot.reserved_stock,
            available_stock: available,
            sales_velocity: velocity,
            model_info: ModelInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                algorithm: adjusted.model.to_string(),
                confidence: adjusted.accuracy_score,
                data_points: series.len(),
            },
            demand_forecast: adjusted,
            stockout_prediction: stockout,
            restock_recommendation: restock,
            seasonal_analysis: seasonal,
            anomaly_report,
            insights,
            analyzed_at: Utc::now(),
        };

        if persist {
            self.persist(product_id, &analysis).await;
        }

        info!(
            urgency = %analysis.restock_recommendation.urgency,
            suggested_quantity = analysis.restock_recommendation.suggested_quantity,
            "analysis complete"
        );
        AnalysisOutcome::Completed(Box::new(analysis))
    }

    /// Analyzes every active product. Individual failures are recorded and
    /// the batch continues; results are sorted by stockout urgency.
    #[instrument(skip(self))]
    pub async fn analyze_all(
        &self,
        store_id: Option<Uuid>,
        persist: bool,
    ) -> Result<BatchAnalysis, ServiceError> {
        let products = self
            .repository
            .list_active_products(store_id, self.config.batch.page_size)
            .await?;
        info!(count = products.len(), "starting batch analysis");

        let timeout = self.config.batch.timeout_secs;
        let mut results: Vec<AnalysisOutcome> = stream::iter(products)
            .map(|product| {
                let engine = self.clone();
                async move {
                    let product_id = product.product_id;
                    let analysis = engine.analyze_product(
                        product_id,
                        product.variant_id,
                        None,
                        persist,
                    );
                    match timeout {
                        Some(secs) => {
                            let duration = std::time::Duration::from_secs(secs);
                            match tokio::time::timeout(duration, analysis).await {
                                Ok(outcome) => outcome,
                                Err(_) => AnalysisOutcome::failed(
                                    product_id,
                                    "analysis timed out",
                                ),
                            }
                        }
                        None => analysis.await,
                    }
                }
            })
            .buffer_unordered(self.config.batch.concurrency.max(1))
            .collect()
            .await;

        // Completion order is nondeterministic under the worker pool;
        // consumers expect most-urgent-first.
        results.sort_by(|a, b| b.urgency_score().cmp(&a.urgency_score()));

        let (critical_count, high_count) =
            results.iter().filter_map(|r| r.analysis()).fold(
                (0, 0),
                |(critical, high), analysis| match analysis.restock_recommendation.urgency {
                    UrgencyTier::Critical => (critical + 1, high),
                    UrgencyTier::High => (critical, high + 1),
                    _ => (critical, high),
                },
            );

        Ok(BatchAnalysis {
            total_analyzed: results.len(),
            critical_count,
            high_count,
            results,
        })
    }

    /// Products needing urgent restocking, most urgent first.
    pub async fn get_critical_items(
        &self,
        store_id: Option<Uuid>,
        limit: usize,
    ) -> Result<CriticalItems, ServiceError> {
        let batch = self.analyze_all(store_id, false).await?;
        let items: Vec<ProductAnalysis> = batch
            .results
            .iter()
            .filter_map(|r| r.analysis())
            .filter(|a| {
                matches!(
                    a.restock_recommendation.urgency,
                    UrgencyTier::Critical | UrgencyTier::High
                )
            })
            .take(limit)
            .cloned()
            .collect();

        Ok(CriticalItems {
            count: items.len(),
            items,
        })
    }

    /// Comprehensive restock report across the catalog.
    pub async fn get_restock_report(
        &self,
        store_id: Option<Uuid>,
    ) -> Result<RestockReport, ServiceError> {
        let batch = self.analyze_all(store_id, false).await?;

        let mut critical = Vec::new();
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low_count = 0usize;
        let mut total_quantity = 0i64;

        for analysis in batch.results.iter().filter_map(|r| r.analysis()) {
            total_quantity += analysis.restock_recommendation.suggested_quantity;
            match analysis.restock_recommendation.urgency {
                UrgencyTier::Critical => critical.push(analysis.clone()),
                UrgencyTier::High => high.push(analysis.clone()),
                UrgencyTier::Medium => medium.push(analysis.clone()),
                _ => low_count += 1,
            }
        }

        let recommendations = report_recommendations(critical.len(), high.len());
        let summary = RestockReportSummary {
            total_products_analyzed: batch.total_analyzed,
            critical_items: critical.len(),
            high_priority_items: high.len(),
            medium_priority_items: medium.len(),
            low_priority_items: low_count,
            total_restock_quantity: total_quantity,
        };

        Ok(RestockReport {
            report_date: Utc::now(),
            summary,
            critical_items: critical,
            high_priority_items: high,
            medium_priority_items: medium,
            seasonal_context: self.seasonal.adjustment_factors(
                None,
                "all",
                "regular",
                self.today(),
            ),
            recommendations,
        })
    }

    /// Velocity from real sales, or a category-based cold-start estimate
    /// when the product has never sold.
    async fn compute_velocity(
        &self,
        series: &SalesSeries,
        snapshot: &ProductSnapshot,
    ) -> VelocityMetrics {
        if series.total_units() > 0 {
            return velocity_from_series(series);
        }
        self.cold_start_velocity(snapshot).await
    }

    /// Cold start: borrow the category average (scaled down per product)
    /// with a conservative floor, tagged with its provenance.
    async fn cold_start_velocity(&self, snapshot: &ProductSnapshot) -> VelocityMetrics {
        let floor = self.config.cold_start_floor;
        let (daily, source) = match &snapshot.category {
            Some(category) => {
                match self
                    .repository
                    .get_category_average_sales(category, snapshot.primary_pet_type(), 30)
                    .await
                {
                    Ok(velocity) if velocity.daily_average_per_product > 0.0 => (
                        (velocity.daily_average_per_product * CATEGORY_SHARE).max(floor),
                        PredictionSource::CategoryAi,
                    ),
                    Ok(_) => (floor, PredictionSource::Baseline),
                    Err(e) => {
                        warn!(error = %e, "category average lookup failed");
                        (floor, PredictionSource::Baseline)
                    }
                }
            }
            None => (floor, PredictionSource::Baseline),
        };

        let daily = round2(daily);
        VelocityMetrics {
            daily_avg_7d: daily,
            daily_avg_30d: daily,
            daily_avg_90d: daily,
            weekly_total: (daily * 7.0).round() as i64,
            monthly_total: (daily * 30.0).round() as i64,
            trend: TrendDirection::NoData,
            trend_percentage: 0.0,
            return_rate: 0.0,
            source,
        }
    }

    /// Base forecast selection. A product with no sales at all skips the
    /// model stack: fitting on an all-zero series produces degenerate
    /// output, so a flat rate from the cold-start velocity is used instead.
    fn select_forecast(
        &self,
        series: &SalesSeries,
        horizon: usize,
        velocity: &VelocityMetrics,
    ) -> ForecastResult {
        if series.total_units() == 0 {
            return cold_start_forecast(velocity, horizon);
        }

        let base = self
            .forecaster
            .forecast(series, horizon, ForecastMethod::Ensemble);

        match self.advanced.forecast_advanced_ensemble(
            series,
            horizon,
            std::slice::from_ref(&base),
        ) {
            Some(advanced) if has_tree_member(&advanced) => advanced,
            _ => base,
        }
    }

    async fn price_impact(&self, product_id: Uuid, variant_id: Option<Uuid>) -> PriceImpact {
        match self
            .repository
            .get_price_history(product_id, variant_id, self.config.history_days)
            .await
        {
            Ok(history) => analyze_price_impact(&history),
            Err(e) => {
                warn!(error = %e, "price history fetch failed");
                PriceImpact::none()
            }
        }
    }

    /// Fire-and-forget persistence; failure never affects the result.
    async fn persist(&self, product_id: Uuid, analysis: &ProductAnalysis) {
        let payload = match serde_json::to_value(analysis) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "analysis serialization failed; skipping persist");
                return;
            }
        };
        if let Err(e) = self.repository.persist_analysis(product_id, &payload).await {
            warn!(error = %e, "failed to persist analysis result");
        }
    }
}

/// Velocity windows divide by the covered span, so a short series is not
/// diluted by days that were never observed.
fn velocity_from_series(series: &SalesSeries) -> VelocityMetrics {
    let len = series.len();
    let window7 = len.min(7).max(1);
    let window30 = len.min(30).max(1);

    let last_7 = series.tail_net_sum(7);
    let last_30 = series.tail_net_sum(30);
    let total = series.total_net_units();

    let (trend, trend_pct) = if len >= 14 {
        let recent_week = series.tail_net_sum(7);
        let previous_week = series.window_net_sum(7, 7);
        if previous_week > 0 {
            let pct = (recent_week - previous_week) as f64 / previous_week as f64 * 100.0;
            let trend = if pct > 10.0 {
                TrendDirection::Increasing
            } else if pct < -10.0 {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            };
            (trend, (pct * 10.0).round() / 10.0)
        } else if recent_week > 0 {
            (TrendDirection::Increasing, 100.0)
        } else {
            (TrendDirection::Stable, 0.0)
        }
    } else {
        (TrendDirection::InsufficientData, 0.0)
    };

    let total_units = series.total_units();
    let return_rate = if total_units > 0 {
        round2(series.total_returns() as f64 / total_units as f64 * 100.0)
    } else {
        0.0
    };

    VelocityMetrics {
        daily_avg_7d: round2(last_7 as f64 / window7 as f64),
        daily_avg_30d: round2(last_30 as f64 / window30 as f64),
        daily_avg_90d: round2(total as f64 / len.max(1) as f64),
        weekly_total: last_7,
        monthly_total: last_30,
        trend,
        trend_percentage: trend_pct,
        return_rate,
        source: PredictionSource::ActualSales,
    }
}

/// Flat-rate forecast for products with no sales history.
fn cold_start_forecast(velocity: &VelocityMetrics, horizon: usize) -> ForecastResult {
    let daily = velocity.daily_avg_30d.max(0.0);
    let total = daily * horizon as f64;
    let details = serde_json::json!({
        "name": "Cold Start Baseline",
        "type": "Category-Informed Flat Rate",
        "features": ["Category Average"],
        "note": "No sales history; demand estimated from similar products",
        "source": velocity.source,
    });
    ForecastResult::from_bounds(
        vec![daily; horizon],
        total * 0.7,
        total * 1.3,
        ForecastModel::ColdStartBaseline,
        COLD_START_ACCURACY,
        details,
    )
}

fn has_tree_member(forecast: &ForecastResult) -> bool {
    forecast.details["models"]
        .as_array()
        .map(|models| {
            models.iter().any(|m| {
                m.as_str()
                    .map(|name| name.starts_with("gradient_boosted"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Urgency from days of supply remaining.
fn urgency_from_days(days_remaining: f64) -> UrgencyTier {
    if days_remaining <= 3.0 {
        UrgencyTier::Critical
    } else if days_remaining <= 7.0 {
        UrgencyTier::High
    } else if days_remaining <= 14.0 {
        UrgencyTier::Medium
    } else if days_remaining <= 30.0 {
        UrgencyTier::Low
    } else {
        UrgencyTier::None
    }
}

/// Urgency from the absolute unit count. A slow mover with a handful of
/// units left is still dangerously low.
fn urgency_from_stock(available: i64) -> UrgencyTier {
    if available < 10 {
        UrgencyTier::Critical
    } else if available < 20 {
        UrgencyTier::High
    } else if available < 40 {
        UrgencyTier::Medium
    } else {
        UrgencyTier::None
    }
}

fn urgency_score(tier: UrgencyTier, has_demand: bool) -> u8 {
    match tier {
        UrgencyTier::Critical => 100,
        UrgencyTier::High => 80,
        UrgencyTier::Medium => 50,
        UrgencyTier::Low => 25,
        UrgencyTier::None => {
            if has_demand {
                10
            } else {
                0
            }
        }
    }
}

fn predict_stockout(
    available: i64,
    velocity: &VelocityMetrics,
    forecast: &ForecastResult,
    today: NaiveDate,
) -> StockoutPrediction {
    let daily_demand = velocity.daily_avg_30d;

    if daily_demand <= 0.0 {
        return StockoutPrediction {
            will_stockout: false,
            days_until_stockout: None,
            stockout_date: None,
            urgency: UrgencyTier::None,
            urgency_score: urgency_score(UrgencyTier::None, false),
            confidence: forecast.accuracy_score,
            based_on_daily_demand: daily_demand,
            message: Some("No recent sales - unable to predict".to_string()),
        };
    }

    let days_remaining = available as f64 / daily_demand;
    let urgency = urgency_from_days(days_remaining).max(urgency_from_stock(available));

    StockoutPrediction {
        will_stockout: days_remaining < 30.0,
        days_until_stockout: Some((days_remaining * 10.0).round() / 10.0),
        stockout_date: Some(today + Duration::days(days_remaining.floor() as i64)),
        urgency,
        urgency_score: urgency_score(urgency, true),
        confidence: forecast.accuracy_score,
        based_on_daily_demand: daily_demand,
        message: None,
    }
}

fn size_restock(
    available: i64,
    velocity: &VelocityMetrics,
    forecast: &ForecastResult,
    lead_time_days: u32,
    safety_stock_days: u32,
    snapshot: &ProductSnapshot,
) -> RestockRecommendation {
    let daily_demand = velocity.daily_avg_30d;
    let low_threshold = snapshot.low_stock_threshold;

    if daily_demand <= 0.0 {
        return RestockRecommendation {
            suggested_quantity: 0,
            urgency: UrgencyTier::None,
            priority: 5,
            safety_stock: low_threshold,
            lead_time_demand: 0,
            ideal_stock_level: low_threshold,
            reorder_point: low_threshold,
            current_vs_ideal_pct: 100.0,
            message: "No recent demand - monitor for activity".to_string(),
            shelf_life_warning: None,
            perishable: snapshot.is_perishable,
        };
    }

    let safety_stock = daily_demand * f64::from(safety_stock_days);
    let lead_time_demand = daily_demand * f64::from(lead_time_days);
    let ideal_stock = forecast.total_demand + safety_stock + lead_time_demand;
    let mut quantity = (ideal_stock - available as f64).max(0.0);

    // Perishable products cannot be stocked past what will sell within
    // the shelf life, with a 20% margin against spoilage.
    let mut shelf_life_warning = None;
    if snapshot.is_perishable {
        if let Some(shelf_life) = snapshot.shelf_life {
            let max_quantity =
                f64::from(shelf_life.days) * daily_demand * SHELF_LIFE_MARGIN;
            if quantity > max_quantity {
                shelf_life_warning = Some(format!(
                    "Reduced from {} to {} units due to {}-day shelf life. Excess would expire before selling.",
                    quantity.round() as i64,
                    max_quantity.round() as i64,
                    shelf_life.days
                ));
                quantity = max_quantity;
            }
        }
    }

    let reorder_point = safety_stock + lead_time_demand;
    let days_remaining = available as f64 / daily_demand;
    let urgency = urgency_from_days(days_remaining).max(urgency_from_stock(available));

    let (priority, message) = match urgency {
        UrgencyTier::Critical => (1, "CRITICAL: Order immediately to prevent stockout"),
        UrgencyTier::High => (2, "HIGH: Place order within 2 days"),
        UrgencyTier::Medium => (3, "MEDIUM: Schedule restock this week"),
        UrgencyTier::Low => (4, "LOW: Stock runway under a month - plan restock"),
        UrgencyTier::None => (5, "Stock levels adequate"),
    };

    RestockRecommendation {
        suggested_quantity: quantity.round() as i64,
        urgency,
        priority,
        safety_stock: safety_stock.round() as i64,
        lead_time_demand: lead_time_demand.round() as i64,
        ideal_stock_level: ideal_stock.round() as i64,
        reorder_point: reorder_point.round() as i64,
        current_vs_ideal_pct: round1(available as f64 / ideal_stock.max(1.0) * 100.0),
        message: message.to_string(),
        shelf_life_warning,
        perishable: snapshot.is_perishable,
    }
}

/// Deterministic, ordered advisory list. Absent inputs simply omit the
/// corresponding insight; generation never fails the analysis.
fn build_insights(
    velocity: &VelocityMetrics,
    forecast: &ForecastResult,
    stockout: &StockoutPrediction,
    restock: &RestockRecommendation,
    seasonal: &SeasonalAdjustment,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    match stockout.urgency {
        UrgencyTier::Critical => insights.push(Insight {
            kind: "stockout_warning".to_string(),
            severity: "critical".to_string(),
            title: "Critical Stock Alert".to_string(),
            message: format!(
                "Stock will run out in {:.0} days. Order {} units immediately.",
                stockout.days_until_stockout.unwrap_or(0.0),
                restock.suggested_quantity
            ),
        }),
        UrgencyTier::High => insights.push(Insight {
            kind: "stockout_warning".to_string(),
            severity: "high".to_string(),
            title: "Low Stock Warning".to_string(),
            message: format!(
                "Only {:.0} days of stock remaining at current sales rate.",
                stockout.days_until_stockout.unwrap_or(0.0)
            ),
        }),
        _ => {}
    }

    match velocity.trend {
        TrendDirection::Increasing => insights.push(Insight {
            kind: "trend".to_string(),
            severity: "info".to_string(),
            title: "Sales Trending Up".to_string(),
            message: format!(
                "Sales increased by {:.0}% compared to previous week. Consider increasing restock quantity.",
                velocity.trend_percentage
            ),
        }),
        TrendDirection::Decreasing => insights.push(Insight {
            kind: "trend".to_string(),
            severity: "warning".to_string(),
            title: "Sales Declining".to_string(),
            message: format!(
                "Sales decreased by {:.0}% compared to previous week. Review pricing and promotions.",
                velocity.trend_percentage.abs()
            ),
        }),
        _ => {}
    }

    if seasonal.event_impact.has_event {
        insights.push(Insight {
            kind: "seasonal".to_string(),
            severity: "info".to_string(),
            title: seasonal
                .event_impact
                .event_name
                .clone()
                .unwrap_or_else(|| "Upcoming Event".to_string()),
            message: seasonal
                .event_impact
                .recommendation
                .clone()
                .unwrap_or_else(|| "Consider adjusting stock levels".to_string()),
        });
    }

    insights.push(Insight {
        kind: "model_info".to_string(),
        severity: "info".to_string(),
        title: "Forecast Model".to_string(),
        message: format!(
            "Using {} model with {}% confidence",
            forecast.model, forecast.accuracy_score
        ),
    });

    if matches!(restock.urgency, UrgencyTier::Critical | UrgencyTier::High) {
        insights.push(Insight {
            kind: "action".to_string(),
            severity: restock.urgency.to_string(),
            title: "Recommended Action".to_string(),
            message: format!(
                "Order {} units to maintain optimal stock levels",
                restock.suggested_quantity
            ),
        });
    }

    insights
}

/// Price-change impact heuristic. A >5% move in the last week of observed
/// prices maps to a demand multiplier through a fixed elasticity.
fn analyze_price_impact(history: &[PricePoint]) -> PriceImpact {
    let skip = history.len().saturating_sub(7);
    let recent = &history[skip..];
    if recent.len() < 2 {
        return PriceImpact::none();
    }

    let first = recent
        .first()
        .and_then(|p| p.avg_price.to_f64())
        .unwrap_or(0.0);
    let last = recent
        .last()
        .and_then(|p| p.avg_price.to_f64())
        .unwrap_or(0.0);

    let mut max_change_pct = 0.0f64;
    for pair in recent.windows(2) {
        let (prev, next) = (
            pair[0].avg_price.to_f64().unwrap_or(0.0),
            pair[1].avg_price.to_f64().unwrap_or(0.0),
        );
        if prev > 0.0 {
            max_change_pct = max_change_pct.max(((next - prev) / prev * 100.0).abs());
        }
    }

    if max_change_pct <= PRICE_CHANGE_TRIGGER_PCT {
        return PriceImpact::none();
    }

    let direction = if last < first { -1.0 } else { 1.0 };
    let multiplier =
        1.0 + (max_change_pct / 100.0 * PRICE_ELASTICITY.abs() * -direction);
    let movement = if direction < 0.0 { "decreased" } else { "increased" };
    let effect = if multiplier > 1.0 { "higher" } else { "lower" };

    PriceImpact {
        has_recent_change: true,
        price_change_pct: max_change_pct * direction,
        impact_multiplier: multiplier,
        message: Some(format!(
            "Price {} by {:.1}%, expect {:.0}% {} demand",
            movement,
            max_change_pct,
            ((multiplier - 1.0) * 100.0).abs(),
            effect
        )),
    }
}

fn report_recommendations(critical: usize, high: usize) -> Vec<ReportRecommendation> {
    let mut recommendations = Vec::new();

    if critical > 0 {
        recommendations.push(ReportRecommendation {
            priority: "urgent".to_string(),
            message: format!(
                "{} products need immediate restocking to prevent stockouts",
                critical
            ),
            action: "Place emergency orders today".to_string(),
        });
    }
    if high > 0 {
        recommendations.push(ReportRecommendation {
            priority: "high".to_string(),
            message: format!("{} products need restocking within the week", high),
            action: "Schedule orders for these items".to_string(),
        });
    }
    recommendations.push(ReportRecommendation {
        priority: "routine".to_string(),
        message: "Run inventory analysis weekly to stay ahead of stockouts".to_string(),
        action: "Enable automated weekly analysis".to_string(),
    });

    recommendations
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
