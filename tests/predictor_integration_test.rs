//! End-to-end orchestrator tests against the in-memory repository.
//!
//! The analysis date is pinned to a quiet winter day (no active or
//! upcoming calendar event, regular-season factor 1.0 for dogs) so
//! forecast totals are not perturbed by seasonal multipliers.

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use stockcast::models::{
    PredictionSource, ProductSnapshot, SalesObservation, ShelfLife, UrgencyTier,
};
use stockcast::predictor::{AnalysisOutcome, InventoryPredictor};
use stockcast::repository::InMemoryRepository;
use stockcast::{EngineConfig, ModelCapabilities};

/// Winter weekday with no event in range: combined seasonal factor 1.0.
fn quiet_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
}

fn snapshot(stock: i64, category: Option<&str>) -> ProductSnapshot {
    ProductSnapshot {
        product_id: Uuid::new_v4(),
        variant_id: None,
        name: "Dog Biscuits".to_string(),
        current_stock: stock,
        reserved_stock: 0,
        low_stock_threshold: 10,
        status: "active".to_string(),
        store_id: None,
        category: category.map(str::to_string),
        pet_types: vec!["dog".to_string()],
        is_perishable: false,
        shelf_life: None,
    }
}

fn constant_sales(
    today: NaiveDate,
    days: i64,
    units: u32,
) -> impl Iterator<Item = SalesObservation> {
    (0..days).map(move |i| SalesObservation {
        date: today - Duration::days(days - 1 - i),
        units_sold: units,
        revenue: Decimal::from(units * 10),
        returns_count: 0,
    })
}

fn predictor(repo: Arc<InMemoryRepository>, history_days: u32) -> InventoryPredictor {
    let config = EngineConfig {
        history_days,
        ..EngineConfig::default()
    };
    InventoryPredictor::new(repo, config, ModelCapabilities::all())
        .with_analysis_date(quiet_day())
}

#[tokio::test]
async fn end_to_end_reference_scenario() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(10, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    repo.record_sales(product_id, None, constant_sales(today, 14, 2)).await;

    let engine = predictor(repo, 14);
    let outcome = engine.analyze_product(product_id, None, Some(7), false).await;
    let analysis = outcome.analysis().expect("analysis should succeed");

    assert_eq!(analysis.sales_velocity.daily_avg_30d, 2.0);
    assert_eq!(analysis.stockout_prediction.days_until_stockout, Some(5.0));
    assert_eq!(analysis.stockout_prediction.urgency, UrgencyTier::High);

    let restock = &analysis.restock_recommendation;
    assert_eq!(restock.safety_stock, 14);
    assert_eq!(restock.lead_time_demand, 14);
    // 30-day forecast of a constant 2/day series totals ~60.
    assert!((analysis.demand_forecast.total_demand - 60.0).abs() < 3.0);
    assert!((restock.ideal_stock_level - 88).abs() <= 3);
    assert!((restock.suggested_quantity - 78).abs() <= 3);
}

#[tokio::test]
async fn missing_product_fails_without_raising() {
    let repo = Arc::new(InMemoryRepository::new(quiet_day()));
    let engine = predictor(repo, 90);

    let outcome = engine.analyze_product(Uuid::new_v4(), None, None, false).await;
    assert_matches!(outcome, AnalysisOutcome::Failed(ref failure) if failure.error == "Product not found");
}

#[tokio::test]
async fn dual_threshold_flags_low_absolute_stock() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(8, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    // One unit every 10 days: daily demand 0.1, ~80 days of supply.
    let sales = (0..90).filter(|i| i % 10 == 0).map(|i| SalesObservation {
        date: today - Duration::days(i),
        units_sold: 1,
        revenue: Decimal::from(10),
        returns_count: 0,
    });
    repo.record_sales(product_id, None, sales).await;

    let engine = predictor(repo, 90);
    let outcome = engine.analyze_product(product_id, None, None, false).await;
    let analysis = outcome.analysis().unwrap();

    assert!(analysis.stockout_prediction.days_until_stockout.unwrap() > 30.0);
    assert_eq!(analysis.stockout_prediction.urgency, UrgencyTier::Critical);
    assert_eq!(analysis.stockout_prediction.urgency_score, 100);
}

#[tokio::test]
async fn shelf_life_caps_restock_quantity() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let mut product = snapshot(0, Some("treats"));
    product.is_perishable = true;
    product.shelf_life = Some(ShelfLife { days: 30 });
    let product_id = product.product_id;
    repo.add_product(product).await;
    repo.record_sales(product_id, None, constant_sales(today, 30, 2)).await;

    let engine = predictor(repo, 30);
    let outcome = engine.analyze_product(product_id, None, None, false).await;
    let analysis = outcome.analysis().unwrap();
    let restock = &analysis.restock_recommendation;

    // Cap: 30 days x 2/day x 0.8 = 48, well under the ~88 unconstrained.
    assert_eq!(restock.suggested_quantity, 48);
    assert!(restock.shelf_life_warning.as_deref().unwrap().contains("shelf life"));
}

#[tokio::test]
async fn cold_start_uses_category_average() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));

    // An established product gives the category its average.
    let established = snapshot(50, Some("treats"));
    let established_id = established.product_id;
    repo.add_product(established).await;
    repo.record_sales(established_id, None, constant_sales(today, 30, 3)).await;

    // The new product has no sales at all.
    let newcomer = snapshot(0, Some("treats"));
    let newcomer_id = newcomer.product_id;
    repo.add_product(newcomer).await;

    let engine = predictor(repo, 90);
    let outcome = engine.analyze_product(newcomer_id, None, None, false).await;
    let analysis = outcome.analysis().unwrap();

    assert_eq!(analysis.sales_velocity.source, PredictionSource::CategoryAi);
    assert!(analysis.sales_velocity.daily_avg_30d > 0.0);
    assert!(analysis.restock_recommendation.suggested_quantity > 0);
    assert!(analysis.demand_forecast.total_demand > 0.0);
}

#[tokio::test]
async fn cold_start_without_category_uses_baseline_floor() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(0, None);
    let product_id = product.product_id;
    repo.add_product(product).await;

    let engine = predictor(repo, 90);
    let outcome = engine.analyze_product(product_id, None, None, false).await;
    let analysis = outcome.analysis().unwrap();

    assert_eq!(analysis.sales_velocity.source, PredictionSource::Baseline);
    assert_eq!(analysis.sales_velocity.daily_avg_30d, 0.5);
    assert!(analysis.restock_recommendation.suggested_quantity > 0);
}

#[tokio::test]
async fn repeated_analysis_is_idempotent() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(25, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    let sales = (0..60).map(|i| SalesObservation {
        date: today - Duration::days(59 - i),
        units_sold: 2 + (i % 4) as u32,
        revenue: Decimal::from(20),
        returns_count: 0,
    });
    repo.record_sales(product_id, None, sales).await;

    let engine = predictor(repo, 60);
    let first = engine.analyze_product(product_id, None, None, false).await;
    let second = engine.analyze_product(product_id, None, None, false).await;

    let a = first.analysis().unwrap();
    let b = second.analysis().unwrap();
    assert_eq!(a.demand_forecast, b.demand_forecast);
    assert_eq!(a.restock_recommendation, b.restock_recommendation);
    assert_eq!(a.stockout_prediction.urgency, b.stockout_prediction.urgency);
}

#[tokio::test]
async fn persist_failure_never_corrupts_the_result() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(10, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    repo.record_sales(product_id, None, constant_sales(today, 14, 2)).await;
    repo.set_fail_persist(true);

    let engine = predictor(repo.clone(), 14);
    let outcome = engine.analyze_product(product_id, None, None, true).await;

    assert!(outcome.is_success());
    assert_eq!(repo.persisted_count().await, 0);
}

#[tokio::test]
async fn persisted_analysis_round_trips() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(10, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    repo.record_sales(product_id, None, constant_sales(today, 14, 2)).await;

    let engine = predictor(repo.clone(), 14);
    let outcome = engine.analyze_product(product_id, None, None, true).await;
    assert!(outcome.is_success());

    let stored = repo.persisted_analysis(product_id).await.unwrap();
    assert!(stored["restock_recommendation"]["suggested_quantity"].is_number());
}

#[tokio::test]
async fn batch_sorts_by_urgency_and_counts_tiers() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));

    // Critically low fast mover.
    let critical = snapshot(4, Some("treats"));
    let critical_id = critical.product_id;
    repo.add_product(critical).await;
    repo.record_sales(critical_id, None, constant_sales(today, 30, 3)).await;

    // Healthy product with deep stock.
    let healthy = snapshot(500, Some("treats"));
    let healthy_id = healthy.product_id;
    repo.add_product(healthy).await;
    repo.record_sales(healthy_id, None, constant_sales(today, 30, 1)).await;

    let engine = predictor(repo, 30);
    let batch = engine.analyze_all(None, false).await.unwrap();

    assert_eq!(batch.total_analyzed, 2);
    assert_eq!(batch.critical_count, 1);
    assert!(batch.results[0].urgency_score() >= batch.results[1].urgency_score());
    assert_eq!(
        batch.results[0].analysis().unwrap().product_id,
        critical_id
    );
}

#[tokio::test]
async fn critical_items_and_report_agree_with_batch() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));

    let critical = snapshot(2, Some("treats"));
    let critical_id = critical.product_id;
    repo.add_product(critical).await;
    repo.record_sales(critical_id, None, constant_sales(today, 30, 4)).await;

    let engine = predictor(repo, 30);

    let items = engine.get_critical_items(None, 10).await.unwrap();
    assert_eq!(items.count, 1);
    assert_eq!(items.items[0].product_id, critical_id);

    let report = engine.get_restock_report(None).await.unwrap();
    assert_eq!(report.summary.critical_items, 1);
    assert!(report.summary.total_restock_quantity > 0);
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.priority == "urgent"));
}

#[tokio::test]
async fn engine_degrades_gracefully_without_model_families() {
    let today = quiet_day();
    let repo = Arc::new(InMemoryRepository::new(today));
    let product = snapshot(20, Some("treats"));
    let product_id = product.product_id;
    repo.add_product(product).await;
    let sales = (0..45).map(|i| SalesObservation {
        date: today - Duration::days(44 - i),
        units_sold: 1 + (i % 3) as u32,
        revenue: Decimal::from(10),
        returns_count: 0,
    });
    repo.record_sales(product_id, None, sales).await;

    let config = EngineConfig {
        history_days: 45,
        ..EngineConfig::default()
    };
    let engine = InventoryPredictor::new(repo, config, ModelCapabilities::none())
        .with_analysis_date(quiet_day());

    let outcome = engine.analyze_product(product_id, None, None, false).await;
    let analysis = outcome.analysis().unwrap();

    // Only linear trend and the naive average are left.
    assert!(analysis.demand_forecast.total_demand >= 0.0);
    assert!(analysis.demand_forecast.confidence_lower <= analysis.demand_forecast.total_demand);
    assert_eq!(analysis.anomaly_report.isolation, None);
}
