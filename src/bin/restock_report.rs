//! Demo binary: seeds an in-memory repository with sample products and
//! prints a restock report.

use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use stockcast::models::{ProductSnapshot, SalesObservation, ShelfLife};
use stockcast::predictor::InventoryPredictor;
use stockcast::repository::InMemoryRepository;
use stockcast::{EngineConfig, ModelCapabilities};

#[derive(Parser, Debug)]
#[command(name = "restock-report", about = "Run a demo inventory analysis")]
struct Args {
    /// Days of sales history to generate
    #[arg(long, default_value_t = 90)]
    history_days: u32,

    /// Restock lead time in days
    #[arg(long, default_value_t = 7)]
    lead_time_days: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let today = Utc::now().date_naive();

    let repo = Arc::new(InMemoryRepository::new(today));
    seed(&repo, today, args.history_days).await;

    let mut config = EngineConfig {
        lead_time_days: args.lead_time_days,
        history_days: args.history_days,
        ..EngineConfig::default()
    };
    config.batch.concurrency = 2;

    let predictor = InventoryPredictor::new(repo, config, ModelCapabilities::detect());
    let report = predictor.get_restock_report(None).await?;

    println!("Restock report ({})", report.report_date.format("%Y-%m-%d"));
    println!(
        "  analyzed: {}  critical: {}  high: {}  medium: {}  total suggested units: {}",
        report.summary.total_products_analyzed,
        report.summary.critical_items,
        report.summary.high_priority_items,
        report.summary.medium_priority_items,
        report.summary.total_restock_quantity,
    );
    println!(
        "  season: {} (factor {:.2})",
        report.seasonal_context.current_season,
        report.seasonal_context.combined_adjustment_factor,
    );

    for analysis in report
        .critical_items
        .iter()
        .chain(&report.high_priority_items)
        .chain(&report.medium_priority_items)
    {
        let restock = &analysis.restock_recommendation;
        println!(
            "  [{}] {} - order {} units ({}), {} days left",
            restock.urgency,
            analysis.product_name,
            restock.suggested_quantity,
            analysis.model_info.algorithm,
            analysis
                .stockout_prediction
                .days_until_stockout
                .map(|d| format!("{:.1}", d))
                .unwrap_or_else(|| "inf".to_string()),
        );
        if let Some(warning) = &restock.shelf_life_warning {
            println!("      {}", warning);
        }
    }

    for recommendation in &report.recommendations {
        println!("  ({}) {}", recommendation.priority, recommendation.message);
    }

    Ok(())
}

async fn seed(repo: &InMemoryRepository, today: NaiveDate, history_days: u32) {
    let start = today - Duration::days(i64::from(history_days) - 1);

    // Steady weekly seller running low.
    let steady = product("Adult Dog Food 10kg", 18, "food", "dog", false, None);
    let steady_id = steady.product_id;
    repo.add_product(steady).await;
    repo.record_sales(
        steady_id,
        None,
        (0..history_days).map(|i| {
            let date = start + Duration::days(i64::from(i));
            let units = if i % 7 >= 5 { 5 } else { 2 };
            observation(date, units)
        }),
    )
    .await;

    // Perishable product with growing demand.
    let treats = product(
        "Fresh Chicken Treats",
        12,
        "treats",
        "dog",
        true,
        Some(ShelfLife { days: 21 }),
    );
    let treats_id = treats.product_id;
    repo.add_product(treats).await;
    repo.record_sales(
        treats_id,
        None,
        (0..history_days).map(|i| {
            let date = start + Duration::days(i64::from(i));
            observation(date, 1 + i / 30)
        }),
    )
    .await;

    // New product with no sales yet; borrows the treats category average.
    repo.add_product(product("Puppy Training Treats", 6, "treats", "dog", false, None))
        .await;

    // Slow mover with plenty of cover.
    let slow = product("Cat Scratching Post", 60, "furniture", "cat", false, None);
    let slow_id = slow.product_id;
    repo.add_product(slow).await;
    repo.record_sales(
        slow_id,
        None,
        (0..history_days).filter(|i| i % 10 == 0).map(|i| {
            let date = start + Duration::days(i64::from(i));
            observation(date, 1)
        }),
    )
    .await;
}

fn product(
    name: &str,
    stock: i64,
    category: &str,
    pet: &str,
    perishable: bool,
    shelf_life: Option<ShelfLife>,
) -> ProductSnapshot {
    ProductSnapshot {
        product_id: Uuid::new_v4(),
        variant_id: None,
        name: name.to_string(),
        current_stock: stock,
        reserved_stock: 0,
        low_stock_threshold: 10,
        status: "active".to_string(),
        store_id: None,
        category: Some(category.to_string()),
        pet_types: vec![pet.to_string()],
        is_perishable: perishable,
        shelf_life,
    }
}

fn observation(date: NaiveDate, units: u32) -> SalesObservation {
    SalesObservation {
        date,
        units_sold: units,
        revenue: Decimal::from(units) * Decimal::from(30),
        returns_count: 0,
    }
}
