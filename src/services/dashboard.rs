use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Query, ColumnTrait, DatabaseConnection, EntityTrait, Iterable, PaginatorTrait,
    QueryFilter, QuerySelect,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::earnings::EarningsService;
use super::orders::{OrderDetails, OrderService};
use super::PageRequest;
use crate::entities::delivery_assignment::{self, Entity as AssignmentEntity};
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item;
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::scheduled_job::{self, Entity as JobEntity};
use crate::entities::user::{self, Entity as UserEntity};
use crate::entities::vendor_inventory::{self, Entity as InventoryEntity};
use crate::errors::ServiceError;
use crate::models::{DeliveryStatus, JobStatus, OrderStatus, UserRole};

const RECENT_ORDERS: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct VendorDashboard {
    pub product_count: u64,
    pub inventory_count: u64,
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
    pub total_orders: u64,
    pub orders_by_status: BTreeMap<String, u64>,
    pub total_earnings: Decimal,
    pub monthly_earnings: Decimal,
    pub pending_earnings: Decimal,
    pub recent_orders: Vec<OrderDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub users_by_role: BTreeMap<String, u64>,
    pub total_products: u64,
    pub active_products: u64,
    pub total_orders: u64,
    pub orders_by_status: BTreeMap<String, u64>,
    pub delivered_revenue: Decimal,
    pub total_assignments: u64,
    pub assignments_by_status: BTreeMap<String, u64>,
    pub inventory_rows: u64,
    pub pending_jobs: u64,
    pub failed_jobs: u64,
}

#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    earnings: EarningsService,
}

impl DashboardService {
    pub fn new(db: Arc<DatabaseConnection>, orders: OrderService, earnings: EarningsService) -> Self {
        Self {
            db,
            orders,
            earnings,
        }
    }

    #[instrument(skip(self))]
    pub async fn vendor(&self, vendor_id: Uuid) -> Result<VendorDashboard, ServiceError> {
        let db = &*self.db;
        let inventory = || {
            InventoryEntity::find().filter(vendor_inventory::Column::VendorId.eq(vendor_id))
        };

        let product_count = ProductEntity::find()
            .filter(product::Column::VendorId.eq(vendor_id))
            .filter(product::Column::IsActive.eq(true))
            .count(db)
            .await?;
        let inventory_count = inventory().count(db).await?;
        let low_stock_count = inventory()
            .filter(vendor_inventory::Column::LowStock.eq(true))
            .count(db)
            .await?;
        let out_of_stock_count = inventory()
            .filter(vendor_inventory::Column::OutOfStock.eq(true))
            .count(db)
            .await?;

        let statuses: Vec<OrderStatus> = OrderEntity::find()
            .select_only()
            .column(order::Column::OrderStatus)
            .filter(
                order::Column::Id.in_subquery(
                    Query::select()
                        .column(order_item::Column::OrderId)
                        .from(order_item::Entity)
                        .and_where(order_item::Column::VendorId.eq(vendor_id))
                        .to_owned(),
                ),
            )
            .into_tuple::<OrderStatus>()
            .all(db)
            .await?;
        let mut orders_by_status = BTreeMap::new();
        for status in &statuses {
            *orders_by_status.entry(status.to_string()).or_insert(0u64) += 1;
        }

        let total = self.earnings.summary(vendor_id, None, None).await?;
        let month = self.earnings.current_month(vendor_id).await?;
        let recent_orders = self
            .orders
            .vendor_orders(vendor_id, None, PageRequest::new(None, RECENT_ORDERS))
            .await?
            .items;

        Ok(VendorDashboard {
            product_count,
            inventory_count,
            low_stock_count,
            out_of_stock_count,
            total_orders: statuses.len() as u64,
            orders_by_status,
            total_earnings: total.total_net,
            monthly_earnings: month.total_net,
            pending_earnings: total.pending_amount,
            recent_orders,
        })
    }

    /// Platform-wide counters for the admin console.
    #[instrument(skip(self))]
    pub async fn admin(&self) -> Result<AdminStats, ServiceError> {
        let db = &*self.db;

        let mut users_by_role = BTreeMap::new();
        for role in UserRole::iter() {
            let count = UserEntity::find()
                .filter(user::Column::Role.eq(role))
                .count(db)
                .await?;
            users_by_role.insert(role.to_string(), count);
        }

        let mut orders_by_status = BTreeMap::new();
        for status in OrderStatus::iter() {
            let count = OrderEntity::find()
                .filter(order::Column::OrderStatus.eq(status))
                .count(db)
                .await?;
            orders_by_status.insert(status.to_string(), count);
        }

        let mut assignments_by_status = BTreeMap::new();
        for status in DeliveryStatus::iter() {
            let count = AssignmentEntity::find()
                .filter(delivery_assignment::Column::Status.eq(status))
                .count(db)
                .await?;
            assignments_by_status.insert(status.to_string(), count);
        }

        let delivered_revenue: Decimal = OrderEntity::find()
            .filter(order::Column::OrderStatus.eq(OrderStatus::Delivered))
            .all(db)
            .await?
            .iter()
            .map(|o| o.total_amount)
            .sum();

        let jobs = |status: JobStatus| {
            JobEntity::find().filter(scheduled_job::Column::Status.eq(status))
        };

        Ok(AdminStats {
            total_users: users_by_role.values().sum(),
            users_by_role,
            total_products: ProductEntity::find().count(db).await?,
            active_products: ProductEntity::find()
                .filter(product::Column::IsActive.eq(true))
                .count(db)
                .await?,
            total_orders: orders_by_status.values().sum(),
            orders_by_status,
            delivered_revenue: delivered_revenue.round_dp(2),
            total_assignments: assignments_by_status.values().sum(),
            assignments_by_status,
            inventory_rows: InventoryEntity::find().count(db).await?,
            pending_jobs: jobs(JobStatus::Pending).count(db).await?,
            failed_jobs: jobs(JobStatus::Failed).count(db).await?,
        })
    }
}
