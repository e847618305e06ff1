//! Repository adapter boundary.
//!
//! The engine never talks to a datastore directly; it consumes this trait.
//! Production deployments implement it over their own storage. The
//! [`InMemoryRepository`] implementation backs the test suite and the demo
//! binary.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    CategoryVelocity, PricePoint, ProductSnapshot, SalesObservation, SalesSeries,
};

/// Read-side and persistence operations the engine needs from storage.
///
/// `get_sales_series` must return a gap-free, zero-filled window; building
/// the series through [`SalesSeries::build`] guarantees that.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Daily sales for the trailing `days` calendar days, ending today.
    async fn get_sales_series(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        days: u32,
    ) -> Result<SalesSeries, ServiceError>;

    async fn get_product_snapshot(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<ProductSnapshot>, ServiceError>;

    /// Average daily sales per product across a category, optionally
    /// narrowed to one pet type. Used for cold-start estimation.
    async fn get_category_average_sales(
        &self,
        category: &str,
        pet_type: Option<&str>,
        days: u32,
    ) -> Result<CategoryVelocity, ServiceError>;

    /// Active products eligible for batch analysis, bounded by `limit`.
    async fn list_active_products(
        &self,
        store_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>, ServiceError>;

    /// Observed selling prices over the trailing window. Adapters without
    /// price history may keep the default empty implementation.
    async fn get_price_history(
        &self,
        _product_id: Uuid,
        _variant_id: Option<Uuid>,
        _days: u32,
    ) -> Result<Vec<PricePoint>, ServiceError> {
        Ok(Vec::new())
    }

    /// Fire-and-forget persistence of a finished analysis. A failure here
    /// must never corrupt the in-memory result already computed; callers
    /// log and move on.
    async fn persist_analysis(
        &self,
        product_id: Uuid,
        analysis: &Value,
    ) -> Result<(), ServiceError>;
}

type SalesKey = (Uuid, Option<Uuid>);

/// In-memory repository used by tests and the demo binary.
pub struct InMemoryRepository {
    today: NaiveDate,
    products: RwLock<Vec<ProductSnapshot>>,
    sales: RwLock<HashMap<SalesKey, Vec<SalesObservation>>>,
    prices: RwLock<HashMap<SalesKey, Vec<PricePoint>>>,
    persisted: RwLock<HashMap<Uuid, Value>>,
    fail_persist: AtomicBool,
}

impl InMemoryRepository {
    /// `today` anchors every trailing window so tests are deterministic.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            products: RwLock::new(Vec::new()),
            sales: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            persisted: RwLock::new(HashMap::new()),
            fail_persist: AtomicBool::new(false),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub async fn add_product(&self, snapshot: ProductSnapshot) {
        self.products.write().await.push(snapshot);
    }

    pub async fn record_sales(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        observations: impl IntoIterator<Item = SalesObservation>,
    ) {
        let mut sales = self.sales.write().await;
        sales
            .entry((product_id, variant_id))
            .or_default()
            .extend(observations);
    }

    pub async fn record_prices(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        points: impl IntoIterator<Item = PricePoint>,
    ) {
        let mut prices = self.prices.write().await;
        prices
            .entry((product_id, variant_id))
            .or_default()
            .extend(points);
    }

    /// Make `persist_analysis` fail, for exercising the fire-and-forget
    /// contract.
    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub async fn persisted_analysis(&self, product_id: Uuid) -> Option<Value> {
        self.persisted.read().await.get(&product_id).cloned()
    }

    pub async fn persisted_count(&self) -> usize {
        self.persisted.read().await.len()
    }

    fn window_start(&self, days: u32) -> NaiveDate {
        self.today - Duration::days(i64::from(days) - 1)
    }
}

#[async_trait]
impl InventoryRepository for InMemoryRepository {
    async fn get_sales_series(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        days: u32,
    ) -> Result<SalesSeries, ServiceError> {
        let start = self.window_start(days);
        let sales = self.sales.read().await;
        let records = sales
            .get(&(product_id, variant_id))
            .map(|recs| {
                recs.iter()
                    .filter(|o| o.date >= start && o.date <= self.today)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(SalesSeries::build(start, self.today, records))
    }

    async fn get_product_snapshot(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<ProductSnapshot>, ServiceError> {
        let products = self.products.read().await;
        Ok(products
            .iter()
            .find(|p| p.product_id == product_id && p.variant_id == variant_id)
            .cloned())
    }

    async fn get_category_average_sales(
        &self,
        category: &str,
        pet_type: Option<&str>,
        days: u32,
    ) -> Result<CategoryVelocity, ServiceError> {
        let start = self.window_start(days);
        let products = self.products.read().await;
        let members: Vec<&ProductSnapshot> = products
            .iter()
            .filter(|p| p.category.as_deref() == Some(category))
            .filter(|p| match pet_type {
                Some(pet) => p.pet_types.iter().any(|t| t == pet),
                None => true,
            })
            .collect();

        if members.is_empty() {
            return Ok(CategoryVelocity::none());
        }

        let sales = self.sales.read().await;
        let mut total_units: u64 = 0;
        let mut data_points = 0usize;
        for member in &members {
            if let Some(recs) = sales.get(&(member.product_id, member.variant_id)) {
                for obs in recs.iter().filter(|o| o.date >= start && o.date <= self.today) {
                    total_units += u64::from(obs.units_sold);
                    data_points += 1;
                }
            }
        }

        let daily_total = total_units as f64 / f64::from(days.max(1));
        Ok(CategoryVelocity {
            daily_average_per_product: daily_total / members.len() as f64,
            data_points,
        })
    }

    async fn list_active_products(
        &self,
        store_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>, ServiceError> {
        let products = self.products.read().await;
        Ok(products
            .iter()
            .filter(|p| matches!(p.status.as_str(), "active" | "out_of_stock"))
            .filter(|p| match store_id {
                Some(store) => p.store_id == Some(store),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_price_history(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        days: u32,
    ) -> Result<Vec<PricePoint>, ServiceError> {
        let start = self.window_start(days);
        let prices = self.prices.read().await;
        Ok(prices
            .get(&(product_id, variant_id))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start && p.date <= self.today)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn persist_analysis(
        &self,
        product_id: Uuid,
        analysis: &Value,
    ) -> Result<(), ServiceError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(ServiceError::RepositoryError(
                "persistence unavailable".to_string(),
            ));
        }
        debug!(%product_id, "persisting analysis result");
        self.persisted
            .write()
            .await
            .insert(product_id, analysis.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    fn snapshot(category: Option<&str>, pet: &str) -> ProductSnapshot {
        ProductSnapshot {
            product_id: Uuid::new_v4(),
            variant_id: None,
            name: "Product".to_string(),
            current_stock: 50,
            reserved_stock: 0,
            low_stock_threshold: 10,
            status: "active".to_string(),
            store_id: None,
            category: category.map(str::to_string),
            pet_types: vec![pet.to_string()],
            is_perishable: false,
            shelf_life: None,
        }
    }

    #[tokio::test]
    async fn sales_series_is_gap_free_for_any_window() {
        let repo = repo();
        let product_id = Uuid::new_v4();
        repo.record_sales(
            product_id,
            None,
            vec![SalesObservation {
                date: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
                units_sold: 3,
                revenue: Decimal::ZERO,
                returns_count: 0,
            }],
        )
        .await;

        for days in [7u32, 30, 90] {
            let series = repo.get_sales_series(product_id, None, days).await.unwrap();
            assert_eq!(series.len(), days as usize);
        }
    }

    #[tokio::test]
    async fn unknown_product_yields_empty_but_complete_series() {
        let repo = repo();
        let series = repo
            .get_sales_series(Uuid::new_v4(), None, 30)
            .await
            .unwrap();
        assert_eq!(series.len(), 30);
        assert_eq!(series.total_units(), 0);
    }

    #[tokio::test]
    async fn category_average_is_per_product() {
        let repo = repo();
        let a = snapshot(Some("treats"), "dog");
        let b = snapshot(Some("treats"), "dog");
        let a_id = a.product_id;
        repo.add_product(a).await;
        repo.add_product(b).await;

        // 30 units over 30 days on one of two products: category total
        // 1/day, 0.5/day per product.
        let obs = (0..30).map(|i| SalesObservation {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap() + Duration::days(i),
            units_sold: 1,
            revenue: Decimal::ZERO,
            returns_count: 0,
        });
        repo.record_sales(a_id, None, obs).await;

        let velocity = repo
            .get_category_average_sales("treats", Some("dog"), 30)
            .await
            .unwrap();
        assert!((velocity.daily_average_per_product - 0.5).abs() < 1e-9);
        assert_eq!(velocity.data_points, 30);
    }

    #[tokio::test]
    async fn list_active_products_respects_limit_and_status() {
        let repo = repo();
        for _ in 0..5 {
            repo.add_product(snapshot(None, "cat")).await;
        }
        let mut inactive = snapshot(None, "cat");
        inactive.status = "archived".to_string();
        repo.add_product(inactive).await;

        let listed = repo.list_active_products(None, 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        let all = repo.list_active_products(None, 100).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn persist_failure_is_reported() {
        let repo = repo();
        repo.set_fail_persist(true);
        let result = repo
            .persist_analysis(Uuid::new_v4(), &serde_json::json!({}))
            .await;
        assert!(result.is_err());
    }
}
