//! Vendor inventory: CRUD for the per-(vendor, product) stock rows and the
//! ledger operations the order workflow runs inside its transactions.
//!
//! Ledger writes never trust a value read earlier in the request. Each one
//! is a conditional `UPDATE ... WHERE version = ?` (plus
//! `available_stock >= qty` for reservations); a lost race re-reads the row
//! and tries again.

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition,
    ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, Page, PageRequest};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::vendor_inventory::{self, Entity as InventoryEntity, StockAlerts};
use crate::errors::ServiceError;

const MAX_LEDGER_ATTEMPTS: usize = 5;
pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 10;
pub const DEFAULT_MAX_STOCK_LEVEL: i32 = 1000;

/// Movement applied to a stock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LedgerOp {
    /// Hold stock for an accepted order.
    Reserve,
    /// Give a hold back.
    Release,
    /// Goods left the shelf: consume stock and the matching hold.
    ConfirmUsage,
}

impl LedgerOp {
    /// New `(stock, reserved)` after applying `qty`, or the shortfall when a
    /// reservation exceeds what is available.
    pub fn apply(self, stock: i32, reserved: i32, qty: i32) -> Result<(i32, i32), i32> {
        match self {
            LedgerOp::Reserve => {
                let available = stock - reserved;
                if available < qty {
                    Err(qty - available)
                } else {
                    Ok((stock, reserved + qty))
                }
            }
            LedgerOp::Release => Ok((stock, (reserved - qty).max(0))),
            LedgerOp::ConfirmUsage => Ok(((stock - qty).max(0), (reserved - qty).max(0))),
        }
    }
}

async fn find_row<C>(
    conn: &C,
    vendor_id: Uuid,
    product_id: Uuid,
) -> Result<Option<vendor_inventory::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(InventoryEntity::find()
        .filter(vendor_inventory::Column::VendorId.eq(vendor_id))
        .filter(vendor_inventory::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

/// Applies a ledger movement to the vendor's row for `product_id`.
///
/// Returns `Ok(None)` when the vendor keeps no inventory row for the
/// product; such lines are only tracked through the catalog stock.
#[instrument(skip(conn))]
pub async fn apply_ledger<C>(
    conn: &C,
    op: LedgerOp,
    vendor_id: Uuid,
    product_id: Uuid,
    qty: i32,
) -> Result<Option<vendor_inventory::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    if qty <= 0 {
        return Err(ServiceError::BadRequest(
            "Quantity must be positive".to_string(),
        ));
    }

    for attempt in 1..=MAX_LEDGER_ATTEMPTS {
        let Some(row) = find_row(conn, vendor_id, product_id).await? else {
            debug!("no inventory row tracked, skipping");
            return Ok(None);
        };

        let (stock, reserved) = op.apply(row.stock, row.reserved_stock, qty).map_err(|short| {
            counter!("krushidoot.inventory.insufficient", 1);
            ServiceError::InsufficientStock(format!(
                "Product {} has {} available, {} requested ({} short)",
                product_id,
                row.available_stock,
                qty,
                short
            ))
        })?;

        let now = Utc::now();
        let available = stock - reserved;
        let alerts = StockAlerts::evaluate(available, row.min_stock_level, row.expiry_date, now);

        let mut update = InventoryEntity::update_many()
            .col_expr(vendor_inventory::Column::Stock, Expr::value(stock))
            .col_expr(vendor_inventory::Column::ReservedStock, Expr::value(reserved))
            .col_expr(vendor_inventory::Column::AvailableStock, Expr::value(available))
            .col_expr(vendor_inventory::Column::LowStock, Expr::value(alerts.low_stock))
            .col_expr(vendor_inventory::Column::NearExpiry, Expr::value(alerts.near_expiry))
            .col_expr(vendor_inventory::Column::OutOfStock, Expr::value(alerts.out_of_stock))
            .col_expr(
                vendor_inventory::Column::Version,
                Expr::col(vendor_inventory::Column::Version).add(1),
            )
            .col_expr(vendor_inventory::Column::UpdatedAt, Expr::value(now))
            .filter(vendor_inventory::Column::Id.eq(row.id))
            .filter(vendor_inventory::Column::Version.eq(row.version));
        if op == LedgerOp::Reserve {
            update = update.filter(vendor_inventory::Column::AvailableStock.gte(qty));
        }

        if update.exec(conn).await?.rows_affected == 1 {
            counter!("krushidoot.inventory.ledger", 1, "op" => op.to_string());
            return Ok(Some(vendor_inventory::Model {
                stock,
                reserved_stock: reserved,
                available_stock: available,
                low_stock: alerts.low_stock,
                near_expiry: alerts.near_expiry,
                out_of_stock: alerts.out_of_stock,
                version: row.version + 1,
                updated_at: now,
                ..row
            }));
        }
        warn!(attempt, inventory_id = %row.id, "inventory row changed underneath, retrying");
    }

    Err(ServiceError::Conflict(format!(
        "Inventory for product {} is being modified concurrently",
        product_id
    )))
}

pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    vendor_id: Uuid,
    product_id: Uuid,
    qty: i32,
) -> Result<Option<vendor_inventory::Model>, ServiceError> {
    apply_ledger(conn, LedgerOp::Reserve, vendor_id, product_id, qty).await
}

pub async fn release<C: ConnectionTrait>(
    conn: &C,
    vendor_id: Uuid,
    product_id: Uuid,
    qty: i32,
) -> Result<Option<vendor_inventory::Model>, ServiceError> {
    apply_ledger(conn, LedgerOp::Release, vendor_id, product_id, qty).await
}

pub async fn confirm_usage<C: ConnectionTrait>(
    conn: &C,
    vendor_id: Uuid,
    product_id: Uuid,
    qty: i32,
) -> Result<Option<vendor_inventory::Model>, ServiceError> {
    apply_ledger(conn, LedgerOp::ConfirmUsage, vendor_id, product_id, qty).await
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInventoryRequest {
    pub product_id: Uuid,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    #[validate(range(min = 1))]
    pub max_stock_level: Option<i32>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    #[validate(custom = "crate::config::validate_percentage")]
    pub discount_percentage: Option<Decimal>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[validate(length(max = 64))]
    pub batch_number: Option<String>,
    pub manufacturing_date: Option<DateTime<Utc>>,
    pub supplier: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateInventoryRequest {
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    #[validate(range(min = 1))]
    pub max_stock_level: Option<i32>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[validate(custom = "crate::config::validate_percentage")]
    pub discount_percentage: Option<Decimal>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub batch_number: Option<String>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

/// Inventory row as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub inventory: vendor_inventory::Model,
    pub product_name: Option<String>,
    pub profit_margin: Option<Decimal>,
}

#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn create(
        &self,
        vendor_id: Uuid,
        request: CreateInventoryRequest,
    ) -> Result<InventoryView, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        let product = ProductEntity::find_by_id(request.product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", request.product_id))?;

        if find_row(db, vendor_id, product.id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Inventory for product {} already exists",
                product.id
            )));
        }

        let now = Utc::now();
        let row = vendor_inventory::ActiveModel {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            product_id: Set(product.id),
            stock: Set(request.stock),
            reserved_stock: Set(0),
            min_stock_level: Set(request.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL)),
            max_stock_level: Set(request.max_stock_level.unwrap_or(DEFAULT_MAX_STOCK_LEVEL)),
            cost_price: Set(request.cost_price),
            selling_price: Set(request.selling_price),
            discount_percentage: Set(request.discount_percentage.unwrap_or(Decimal::ZERO)),
            is_active: Set(true),
            last_restocked: Set((request.stock > 0).then_some(now)),
            expiry_date: Set(request.expiry_date),
            batch_number: Set(request.batch_number),
            manufacturing_date: Set(request.manufacturing_date),
            supplier: Set(request.supplier),
            location: Set(request.location),
            version: Set(1),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(inventory_id = %row.id, %vendor_id, "inventory row created");
        Ok(Self::view(row, Some(product.name)))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        vendor_id: Uuid,
        low_stock_only: bool,
        page: PageRequest,
    ) -> Result<Page<InventoryView>, ServiceError> {
        let mut query = InventoryEntity::find()
            .filter(vendor_inventory::Column::VendorId.eq(vendor_id))
            .order_by_desc(vendor_inventory::Column::UpdatedAt);
        if low_stock_only {
            query = query.filter(vendor_inventory::Column::LowStock.eq(true));
        }
        let page = fetch_page(&self.db, query, page).await?;
        let names = self.product_names(&page.items).await?;
        Ok(page.map(|row| {
            let name = names.get(&row.product_id).cloned();
            Self::view(row, name)
        }))
    }

    pub async fn get(&self, vendor_id: Uuid, id: Uuid) -> Result<InventoryView, ServiceError> {
        let row = self.owned_row(vendor_id, id).await?;
        let name = ProductEntity::find_by_id(row.product_id)
            .one(&*self.db)
            .await?
            .map(|p| p.name);
        Ok(Self::view(row, name))
    }

    /// Applies a vendor edit. The write is guarded by the row version so it
    /// cannot clobber a reservation that landed after the read; a lost race
    /// re-reads and applies the edit again.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        vendor_id: Uuid,
        id: Uuid,
        request: UpdateInventoryRequest,
    ) -> Result<InventoryView, ServiceError> {
        request.validate()?;
        for attempt in 1..=MAX_LEDGER_ATTEMPTS {
            let row = self.owned_row(vendor_id, id).await?;
            if let Some(updated) = self.write_update(&row, &request).await? {
                info!(inventory_id = %id, version = updated.version, "inventory row updated");
                return self.get(vendor_id, updated.id).await;
            }
            warn!(attempt, inventory_id = %id, "inventory row changed underneath, retrying edit");
        }
        Err(ServiceError::Conflict(format!(
            "Inventory item {} is being modified concurrently",
            id
        )))
    }

    /// Writes `request` over `row` if nobody has written the row since it
    /// was read. `Ok(None)` means the version moved on.
    async fn write_update(
        &self,
        row: &vendor_inventory::Model,
        request: &UpdateInventoryRequest,
    ) -> Result<Option<vendor_inventory::Model>, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let mut active: vendor_inventory::ActiveModel = row.clone().into();
        if let Some(stock) = request.stock {
            if stock < row.reserved_stock {
                return Err(ServiceError::BadRequest(format!(
                    "Stock cannot drop below the {} units reserved for orders",
                    row.reserved_stock
                )));
            }
            if stock > row.stock {
                active.last_restocked = Set(Some(now));
            }
            active.stock = Set(stock);
        }
        if let Some(v) = request.min_stock_level {
            active.min_stock_level = Set(v);
        }
        if let Some(v) = request.max_stock_level {
            active.max_stock_level = Set(v);
        }
        if let Some(v) = request.cost_price {
            active.cost_price = Set(v);
        }
        if let Some(v) = request.selling_price {
            active.selling_price = Set(v);
        }
        if let Some(v) = request.discount_percentage {
            active.discount_percentage = Set(v);
        }
        if let Some(v) = request.expiry_date {
            active.expiry_date = Set(Some(v));
        }
        if let Some(v) = &request.batch_number {
            active.batch_number = Set(Some(v.clone()));
        }
        if let Some(v) = &request.supplier {
            active.supplier = Set(Some(v.clone()));
        }
        if let Some(v) = &request.location {
            active.location = Set(Some(v.clone()));
        }
        if let Some(v) = request.is_active {
            active.is_active = Set(v);
        }
        active.version = Set(row.version + 1);

        // `Entity::update` skips the behavior hooks, so derive fields here.
        let active = active.before_save(db, false).await?;
        match InventoryEntity::update(active)
            .filter(vendor_inventory::Column::Version.eq(row.version))
            .exec(db)
            .await
        {
            Ok(updated) => Ok(Some(updated)),
            Err(DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, vendor_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let row = self.owned_row(vendor_id, id).await?;
        if row.reserved_stock > 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "{} units are still reserved for open orders",
                row.reserved_stock
            )));
        }
        InventoryEntity::delete_by_id(row.id).exec(&*self.db).await?;
        info!(inventory_id = %id, "inventory row deleted");
        Ok(())
    }

    /// Rows at or under their minimum level, emptiest first.
    pub async fn low_stock_report(&self, vendor_id: Uuid) -> Result<Vec<InventoryView>, ServiceError> {
        let rows = InventoryEntity::find()
            .filter(vendor_inventory::Column::VendorId.eq(vendor_id))
            .filter(
                Condition::any()
                    .add(vendor_inventory::Column::LowStock.eq(true))
                    .add(vendor_inventory::Column::OutOfStock.eq(true)),
            )
            .order_by_asc(vendor_inventory::Column::AvailableStock)
            .all(&*self.db)
            .await?;
        let names = self.product_names(&rows).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let name = names.get(&row.product_id).cloned();
                Self::view(row, name)
            })
            .collect())
    }

    async fn owned_row(&self, vendor_id: Uuid, id: Uuid) -> Result<vendor_inventory::Model, ServiceError> {
        InventoryEntity::find_by_id(id)
            .filter(vendor_inventory::Column::VendorId.eq(vendor_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory item", id))
    }

    async fn product_names(
        &self,
        rows: &[vendor_inventory::Model],
    ) -> Result<HashMap<Uuid, String>, ServiceError> {
        if rows.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.product_id).collect();
        Ok(ProductEntity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect())
    }

    fn view(row: vendor_inventory::Model, product_name: Option<String>) -> InventoryView {
        InventoryView {
            profit_margin: row.profit_margin(),
            inventory: row,
            product_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_product, seed_user, test_db};
    use crate::models::UserRole;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(LedgerOp::Reserve, 100, 20, 30, Ok((100, 50)))]
    #[case(LedgerOp::Reserve, 100, 90, 30, Err(20))]
    #[case(LedgerOp::Release, 100, 20, 30, Ok((100, 0)))]
    #[case(LedgerOp::ConfirmUsage, 100, 30, 30, Ok((70, 0)))]
    #[case(LedgerOp::ConfirmUsage, 10, 0, 30, Ok((0, 0)))]
    fn ledger_arithmetic(
        #[case] op: LedgerOp,
        #[case] stock: i32,
        #[case] reserved: i32,
        #[case] qty: i32,
        #[case] expected: Result<(i32, i32), i32>,
    ) {
        assert_eq!(op.apply(stock, reserved, qty), expected);
    }

    proptest! {
        #[test]
        fn ledger_never_goes_negative(
            stock in 0i32..10_000,
            reserved_frac in 0u32..=100,
            qty in 1i32..5_000,
            op_idx in 0usize..3,
        ) {
            let reserved = (stock as i64 * reserved_frac as i64 / 100) as i32;
            let op = [LedgerOp::Reserve, LedgerOp::Release, LedgerOp::ConfirmUsage][op_idx];
            if let Ok((s, r)) = op.apply(stock, reserved, qty) {
                prop_assert!(s >= 0);
                prop_assert!(r >= 0);
                prop_assert!(s - r >= 0 || op != LedgerOp::Reserve);
            }
        }
    }

    async fn setup() -> (tempfile::TempDir, InventoryService, Uuid, Uuid) {
        let (dir, db) = test_db().await;
        let vendor = seed_user(&db, UserRole::Vendor, "vendor@agro.in").await;
        let product = seed_product(&db, Some(vendor.id), dec!(1200), 500).await;
        (dir, InventoryService::new(Arc::new(db)), vendor.id, product.id)
    }

    fn create_request(product_id: Uuid, stock: i32) -> CreateInventoryRequest {
        CreateInventoryRequest {
            product_id,
            stock,
            min_stock_level: None,
            max_stock_level: None,
            cost_price: dec!(1000),
            selling_price: dec!(1200),
            discount_percentage: Some(dec!(10)),
            expiry_date: None,
            batch_number: Some("B-7".into()),
            manufacturing_date: None,
            supplier: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn create_derives_fields_and_rejects_duplicates() {
        let (_dir, svc, vendor, product) = setup().await;
        let view = svc.create(vendor, create_request(product, 40)).await.unwrap();
        assert_eq!(view.inventory.available_stock, 40);
        assert_eq!(view.inventory.final_price.round_dp(2), dec!(1080));
        assert_eq!(view.profit_margin.map(|m| m.round_dp(2)), Some(dec!(8)));
        assert!(!view.inventory.low_stock);
        assert!(view.inventory.last_restocked.is_some());

        assert_matches!(
            svc.create(vendor, create_request(product, 5)).await,
            Err(ServiceError::Conflict(_))
        );
        assert_matches!(
            svc.create(vendor, create_request(Uuid::new_v4(), 5)).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn ledger_round_trip_keeps_available_consistent() {
        let (_dir, svc, vendor, product) = setup().await;
        svc.create(vendor, create_request(product, 40)).await.unwrap();
        let db = &*svc.db;

        let row = reserve(db, vendor, product, 25).await.unwrap().unwrap();
        assert_eq!((row.stock, row.reserved_stock, row.available_stock), (40, 25, 15));
        assert!(!row.low_stock);

        assert_matches!(
            reserve(db, vendor, product, 16).await,
            Err(ServiceError::InsufficientStock(_))
        );

        let row = confirm_usage(db, vendor, product, 25).await.unwrap().unwrap();
        assert_eq!((row.stock, row.reserved_stock, row.available_stock), (15, 0, 15));

        let row = reserve(db, vendor, product, 6).await.unwrap().unwrap();
        assert!(row.low_stock);
        let row = release(db, vendor, product, 100).await.unwrap().unwrap();
        assert_eq!(row.reserved_stock, 0);

        let stored = InventoryEntity::find_by_id(row.id).one(db).await.unwrap().unwrap();
        assert_eq!(stored.available_stock, stored.stock - stored.reserved_stock);
        assert_eq!(stored.version, row.version);

        assert_eq!(reserve(db, Uuid::new_v4(), product, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_tracks_restock_and_guards_reservations() {
        let (_dir, svc, vendor, product) = setup().await;
        let created = svc.create(vendor, create_request(product, 40)).await.unwrap();
        let id = created.inventory.id;
        reserve(&*svc.db, vendor, product, 30).await.unwrap();

        assert_matches!(
            svc.update(
                vendor,
                id,
                UpdateInventoryRequest {
                    stock: Some(20),
                    ..Default::default()
                }
            )
            .await,
            Err(ServiceError::BadRequest(_))
        );

        let updated = svc
            .update(
                vendor,
                id,
                UpdateInventoryRequest {
                    stock: Some(100),
                    discount_percentage: Some(dec!(0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.inventory.available_stock, 70);
        assert_eq!(updated.inventory.final_price.round_dp(2), dec!(1200));
        assert!(updated.inventory.last_restocked >= created.inventory.last_restocked);

        assert_matches!(svc.delete(vendor, id).await, Err(ServiceError::InvalidOperation(_)));
        assert_matches!(svc.get(Uuid::new_v4(), id).await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_from_a_stale_read_does_not_clobber_a_reservation() {
        let (_dir, svc, vendor, product) = setup().await;
        let id = svc.create(vendor, create_request(product, 40)).await.unwrap().inventory.id;
        let stale = svc.owned_row(vendor, id).await.unwrap();
        let restock = UpdateInventoryRequest {
            stock: Some(50),
            ..Default::default()
        };

        reserve(&*svc.db, vendor, product, 25).await.unwrap();
        assert_eq!(svc.write_update(&stale, &restock).await.unwrap(), None);

        let stored = svc.owned_row(vendor, id).await.unwrap();
        assert_eq!(
            (stored.stock, stored.reserved_stock, stored.available_stock),
            (40, 25, 15)
        );

        let updated = svc.update(vendor, id, restock).await.unwrap().inventory;
        assert_eq!(
            (updated.stock, updated.reserved_stock, updated.available_stock),
            (50, 25, 25)
        );
        assert_eq!(updated.version, stored.version + 1);
        assert!(!updated.low_stock);

        let row = release(&*svc.db, vendor, product, 25).await.unwrap().unwrap();
        assert_eq!(row.available_stock, 50);
    }

    #[tokio::test]
    async fn low_stock_report_lists_flagged_rows() {
        let (_dir, svc, vendor, product) = setup().await;
        svc.create(vendor, create_request(product, 8)).await.unwrap();
        let report = svc.low_stock_report(vendor).await.unwrap();
        assert_eq!(report.len(), 1);
        assert!(report[0].inventory.low_stock);
        assert!(report[0].product_name.is_some());

        let page = svc.list(vendor, true, PageRequest::new(None, 10)).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
