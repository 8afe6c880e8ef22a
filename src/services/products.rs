use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, Iterable, Order,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{fetch_page, Page, PageRequest};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::models::{ProductCategory, ProductUnit, UserRole};

pub const SEARCH_LIMIT: u64 = 10;
pub const FEATURED_LIMIT: u64 = 8;

fn validate_price(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || value.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    Name,
    Price,
    #[default]
    CreatedAt,
    AverageRating,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub category: Option<ProductCategory>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub sort_by: Option<ProductSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category: ProductCategory,
    pub brand: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub unit: Option<ProductUnit>,
    pub image_url: Option<String>,
    pub is_featured: Option<bool>,
    /// Only honoured for admins; vendors always own what they create.
    pub vendor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    pub brand: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub unit: Option<ProductUnit>,
    pub image_url: Option<String>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: ProductCategory,
    pub count: u64,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub avg_price: Decimal,
}

fn search_condition(term: &str) -> Condition {
    let pattern = format!("%{}%", term.trim().to_lowercase());
    Condition::any()
        .add(Expr::expr(Func::lower(Expr::col(product::Column::Name))).like(pattern.clone()))
        .add(Expr::expr(Func::lower(Expr::col(product::Column::Description))).like(pattern.clone()))
        .add(Expr::expr(Func::lower(Expr::col(product::Column::Brand))).like(pattern))
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active catalog entries matching `filters`.
    #[instrument(skip(self, filters))]
    pub async fn list(
        &self,
        filters: ProductFilters,
        page: PageRequest,
    ) -> Result<Page<product::Model>, ServiceError> {
        let mut query = ProductEntity::find().filter(product::Column::IsActive.eq(true));
        if let Some(category) = filters.category {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(min) = filters.min_price {
            query = query.filter(product::Column::Price.gte(min));
        }
        if let Some(max) = filters.max_price {
            query = query.filter(product::Column::Price.lte(max));
        }
        if let Some(term) = filters.search.as_deref().filter(|t| !t.trim().is_empty()) {
            query = query.filter(search_condition(term));
        }

        let column = match filters.sort_by.unwrap_or_default() {
            ProductSort::Name => product::Column::Name,
            ProductSort::Price => product::Column::Price,
            ProductSort::CreatedAt => product::Column::CreatedAt,
            ProductSort::AverageRating => product::Column::AverageRating,
        };
        let order = match filters.sort_order.unwrap_or_default() {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        query = query.order_by(column, order).order_by_asc(product::Column::Id);

        fetch_page(&self.db, query, page).await
    }

    pub async fn search(&self, q: &str) -> Result<Vec<product::Model>, ServiceError> {
        if q.trim().chars().count() < 2 {
            return Err(ServiceError::BadRequest(
                "Search query must be at least 2 characters".to_string(),
            ));
        }
        Ok(ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(search_condition(q))
            .order_by_desc(product::Column::AverageRating)
            .limit(SEARCH_LIMIT)
            .all(&*self.db)
            .await?)
    }

    /// Count and price range of active products per category. Empty
    /// categories are left out.
    pub async fn category_stats(&self) -> Result<Vec<CategoryStats>, ServiceError> {
        let products = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;

        Ok(ProductCategory::iter()
            .filter_map(|category| {
                let prices: Vec<Decimal> = products
                    .iter()
                    .filter(|p| p.category == category)
                    .map(|p| p.price)
                    .collect();
                let min_price = prices.iter().min().copied()?;
                let max_price = prices.iter().max().copied()?;
                let sum: Decimal = prices.iter().sum();
                Some(CategoryStats {
                    category,
                    count: prices.len() as u64,
                    min_price,
                    max_price,
                    avg_price: (sum / Decimal::from(prices.len())).round_dp(2),
                })
            })
            .collect())
    }

    pub async fn by_category(
        &self,
        category: ProductCategory,
        page: PageRequest,
    ) -> Result<Page<product::Model>, ServiceError> {
        self.list(
            ProductFilters {
                category: Some(category),
                ..Default::default()
            },
            page,
        )
        .await
    }

    pub async fn featured(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::AverageRating)
            .order_by_desc(product::Column::CreatedAt)
            .limit(FEATURED_LIMIT)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn create(
        &self,
        actor: &user::Model,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let vendor_id = match actor.role {
            UserRole::Vendor => Some(actor.id),
            UserRole::Admin => request.vendor_id,
            _ => {
                return Err(ServiceError::Forbidden(
                    "Only vendors and admins can add products".to_string(),
                ))
            }
        };

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            name: Set(request.name),
            description: Set(request.description.unwrap_or_default()),
            category: Set(request.category),
            brand: Set(request.brand),
            price: Set(request.price),
            stock: Set(request.stock),
            unit: Set(request.unit.unwrap_or_default()),
            image_url: Set(request.image_url),
            is_active: Set(true),
            is_featured: Set(request.is_featured.unwrap_or(false)),
            average_rating: Set(0.0),
            rating_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %created.id, name = %created.name, "product created");
        Ok(created)
    }

    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &user::Model,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let existing = ProductEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;

        let owns = actor.role == UserRole::Vendor && existing.vendor_id == Some(actor.id);
        if actor.role != UserRole::Admin && !owns {
            return Err(ServiceError::Forbidden(
                "You can only edit your own products".to_string(),
            ));
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(category) = request.category {
            active.category = Set(category);
        }
        if let Some(brand) = request.brand {
            active.brand = Set(Some(brand));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(stock) = request.stock {
            active.stock = Set(stock);
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit);
        }
        if let Some(url) = request.image_url {
            active.image_url = Set(Some(url));
        }
        if let Some(featured) = request.is_featured {
            active.is_featured = Set(featured);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// Hides the product from the catalog; existing orders keep their lines.
    pub async fn deactivate(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        let existing = ProductEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))?;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(product_id = %id, "product deactivated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_user, test_db};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn new_product(name: &str, category: ProductCategory, price: Decimal) -> CreateProductRequest {
        CreateProductRequest {
            name: name.to_string(),
            description: Some(format!("{name} for kharif season")),
            category,
            brand: Some("IFFCO".into()),
            price,
            stock: 100,
            unit: None,
            image_url: None,
            is_featured: Some(price > dec!(1000)),
            vendor_id: None,
        }
    }

    async fn catalog() -> (tempfile::TempDir, ProductService, user::Model, user::Model) {
        let (dir, db) = test_db().await;
        let vendor = seed_user(&db, UserRole::Vendor, "vendor@agro.in").await;
        let customer = seed_user(&db, UserRole::Customer, "farmer@agro.in").await;
        let svc = ProductService::new(Arc::new(db));
        for (name, category, price) in [
            ("Neem Coated Urea", ProductCategory::Urea, dec!(266)),
            ("DAP 18-46-0", ProductCategory::Dap, dec!(1350)),
            ("NPK 10-26-26", ProductCategory::Npk, dec!(1470)),
            ("Vermicompost", ProductCategory::Organic, dec!(450)),
        ] {
            svc.create(&vendor, new_product(name, category, price))
                .await
                .unwrap();
        }
        (dir, svc, vendor, customer)
    }

    #[tokio::test]
    async fn filters_sorting_and_pagination() {
        let (_dir, svc, _, _) = catalog().await;

        let cheap_first = svc
            .list(
                ProductFilters {
                    sort_by: Some(ProductSort::Price),
                    sort_order: Some(SortOrder::Asc),
                    ..Default::default()
                },
                PageRequest::new(Some(1), 3),
            )
            .await
            .unwrap();
        assert_eq!(cheap_first.total, 4);
        assert_eq!(cheap_first.items.len(), 3);
        assert!(cheap_first.has_next());
        assert_eq!(cheap_first.items[0].name, "Neem Coated Urea");

        let ranged = svc
            .list(
                ProductFilters {
                    min_price: Some(dec!(400)),
                    max_price: Some(dec!(1400)),
                    ..Default::default()
                },
                PageRequest::new(None, 10),
            )
            .await
            .unwrap();
        assert_eq!(ranged.total, 2);

        let searched = svc.search("npk").await.unwrap();
        assert_eq!(searched.len(), 1);
        assert_matches!(svc.search("n").await, Err(ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn stats_featured_and_soft_delete() {
        let (_dir, svc, _, _) = catalog().await;

        let stats = svc.category_stats().await.unwrap();
        assert_eq!(stats.len(), 4);
        assert!(stats.iter().all(|s| s.count == 1));

        let featured = svc.featured().await.unwrap();
        assert_eq!(featured.len(), 2);

        let urea = svc.search("urea").await.unwrap().remove(0);
        svc.deactivate(urea.id).await.unwrap();
        assert_matches!(svc.get(urea.id).await, Err(ServiceError::NotFound(_)));
        let remaining = svc
            .by_category(ProductCategory::Urea, PageRequest::new(None, 10))
            .await
            .unwrap();
        assert_eq!(remaining.total, 0);
    }

    #[tokio::test]
    async fn only_owners_and_admins_edit() {
        let (_dir, svc, vendor, customer) = catalog().await;
        let dap = svc.search("dap").await.unwrap().remove(0);
        assert_eq!(dap.vendor_id, Some(vendor.id));

        let update = UpdateProductRequest {
            price: Some(dec!(1400)),
            ..Default::default()
        };
        assert_matches!(
            svc.update(&customer, dap.id, update.clone()).await,
            Err(ServiceError::Forbidden(_))
        );
        let updated = svc.update(&vendor, dap.id, update).await.unwrap();
        assert_eq!(updated.price.round_dp(2), dec!(1400));

        assert_matches!(
            svc.create(&customer, new_product("Seeds", ProductCategory::Other, dec!(10)))
                .await,
            Err(ServiceError::Forbidden(_))
        );
    }
}
