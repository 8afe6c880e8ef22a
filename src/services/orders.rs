use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Query},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::inventory;
use super::notifications::templates;
use super::scheduler;
use super::workflow::{load_order, restore_product_stock, transition_order, Effects, WorkflowService};
use super::{fetch_page, Page, PageRequest};
use crate::entities::delivery_assignment::{self, Entity as AssignmentEntity};
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::scheduled_job::{self, Entity as JobEntity};
use crate::entities::user;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::models::{
    DeliveryStatus, ItemStatus, JobStatus, OrderStatus, PaymentMethod, PaymentStatus, TimeSlot,
    UserRole,
};

fn validate_pincode(value: &str) -> Result<(), ValidationError> {
    if value.len() == 6 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("pincode");
        err.message = Some("Pincode must be 6 digits".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DeliveryAddress {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(custom = "validate_pincode")]
    pub pincode: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    /// Overrides the product's default vendor.
    pub vendor_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[validate]
    pub delivery_address: DeliveryAddress,
    pub delivery_date: Option<NaiveDate>,
    pub time_slot: Option<TimeSlot>,
    pub payment_method: Option<PaymentMethod>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

pub(crate) fn tracking_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD{}", hex[..6].to_uppercase())
}

async fn attach_items<C>(conn: &C, orders: Vec<order::Model>) -> Result<Vec<OrderDetails>, ServiceError>
where
    C: ConnectionTrait,
{
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
    if !ids.is_empty() {
        for item in OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?
        {
            by_order.entry(item.order_id).or_default().push(item);
        }
    }
    Ok(orders
        .into_iter()
        .map(|order| OrderDetails {
            items: by_order.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    workflow: WorkflowService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, workflow: WorkflowService) -> Self {
        Self { db, workflow }
    }

    /// Places an order: prices the lines from the catalog, takes the
    /// quantities out of product stock and starts the vendor workflow, all
    /// in one transaction.
    #[instrument(skip(self, customer, request), fields(customer_id = %customer.id))]
    pub async fn create(
        &self,
        customer: &user::Model,
        request: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let txn = self.db.begin().await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let mut items = Vec::with_capacity(request.items.len());
        let mut total = Decimal::ZERO;

        for line in &request.items {
            let product = ProductEntity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            let vendor_id = line.vendor_id.or(product.vendor_id).ok_or_else(|| {
                ServiceError::BadRequest(format!("No vendor available for {}", product.name))
            })?;

            let taken = ProductEntity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(line.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::Stock.gte(line.quantity))
                .exec(&txn)
                .await?;
            if taken.rows_affected == 0 {
                return Err(ServiceError::BadRequest(format!(
                    "Insufficient stock for {}",
                    product.name
                )));
            }

            total += product.price * Decimal::from(line.quantity);
            items.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                vendor_id: Set(vendor_id),
                product_name: Set(product.name.clone()),
                quantity: Set(line.quantity),
                price: Set(product.price),
                status: Set(ItemStatus::Pending),
                created_at: Set(now),
            });
        }

        let mut tracking = tracking_number();
        while OrderEntity::find()
            .filter(order::Column::TrackingNumber.eq(tracking.as_str()))
            .one(&txn)
            .await?
            .is_some()
        {
            tracking = tracking_number();
        }

        let address = request.delivery_address;
        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(customer.id),
            total_amount: Set(total),
            street: Set(address.street),
            city: Set(address.city),
            state: Set(address.state),
            pincode: Set(address.pincode),
            latitude: Set(address.latitude),
            longitude: Set(address.longitude),
            delivery_date: Set(request.delivery_date),
            time_slot: Set(request.time_slot),
            payment_method: Set(request.payment_method.unwrap_or_default()),
            payment_status: Set(PaymentStatus::Pending),
            order_status: Set(OrderStatus::Pending),
            delivery_partner_id: Set(None),
            tracking_number: Set(tracking),
            estimated_delivery_time: Set(None),
            actual_delivery_time: Set(None),
            notes: Set(request.notes),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            saved.push(item.insert(&txn).await?);
        }

        let effects = self
            .workflow
            .handle_order_placement(&txn, &order, &saved)
            .await?;
        txn.commit().await?;

        info!(order_id = %order.id, tracking = %order.tracking_number, total = %order.total_amount, "order placed");
        counter!("krushidoot.orders.created", 1);
        self.workflow.publish(effects).await;
        Ok(OrderDetails { order, items: saved })
    }

    pub async fn my_orders(
        &self,
        customer_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<OrderDetails>, ServiceError> {
        let query = OrderEntity::find()
            .filter(order::Column::UserId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt);
        let page = fetch_page(&self.db, query, page).await?;
        self.with_items(page).await
    }

    async fn with_items(&self, page: Page<order::Model>) -> Result<Page<OrderDetails>, ServiceError> {
        let Page {
            items,
            total,
            page,
            per_page,
        } = page;
        Ok(Page {
            items: attach_items(&*self.db, items).await?,
            total,
            page,
            per_page,
        })
    }

    /// Loads an order the viewer is allowed to see.
    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn get(&self, viewer: &user::Model, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let (order, items) = load_order(&*self.db, order_id).await?;
        let allowed = match viewer.role {
            UserRole::Admin => true,
            UserRole::Customer => order.user_id == viewer.id,
            UserRole::Vendor => {
                order.user_id == viewer.id || items.iter().any(|i| i.vendor_id == viewer.id)
            }
            UserRole::DeliveryPartner => {
                order.delivery_partner_id == Some(viewer.id)
                    || AssignmentEntity::find()
                        .filter(delivery_assignment::Column::OrderId.eq(order_id))
                        .filter(delivery_assignment::Column::DeliveryPartnerId.eq(viewer.id))
                        .one(&*self.db)
                        .await?
                        .is_some()
            }
        };
        if !allowed {
            return Err(ServiceError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }
        Ok(OrderDetails { order, items })
    }

    /// Administrative status change, checked against the transition table.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<order::Model, ServiceError> {
        if request.status == OrderStatus::Cancelled {
            return self.cancel_unchecked(order_id, request.notes).await;
        }

        let txn = self.db.begin().await?;
        let (order, _) = load_order(&txn, order_id).await?;
        let notes = request.notes;
        let updated = transition_order(&txn, &order, request.status, move |a| {
            if let Some(notes) = notes {
                a.notes = Set(Some(notes));
            }
        })
        .await?;
        txn.commit().await?;

        info!(%order_id, from = %order.order_status, to = %updated.order_status, "order status updated");
        let mut effects = Effects::default();
        effects.emit(Event::OrderStatusChanged {
            order_id,
            from: order.order_status,
            to: updated.order_status,
        });
        self.workflow.publish(effects).await;
        Ok(updated)
    }

    /// Cancels an order on behalf of its customer or an admin.
    pub async fn cancel(
        &self,
        viewer: &user::Model,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if order.user_id != viewer.id && viewer.role != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Only the customer or an admin can cancel this order".to_string(),
            ));
        }
        self.cancel_unchecked(order_id, reason).await
    }

    #[instrument(skip(self, reason))]
    async fn cancel_unchecked(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let (order, items) = load_order(&txn, order_id).await?;
        if !order.order_status.can_be_cancelled() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is {} and can no longer be cancelled",
                order.order_status
            )));
        }

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Cancelled by request".to_string());
        let note = reason.clone();
        let updated = transition_order(&txn, &order, OrderStatus::Cancelled, move |a| {
            a.notes = Set(Some(note));
            a.delivery_partner_id = Set(None);
        })
        .await?;

        restore_product_stock(&txn, &items).await?;
        for item in items.iter().filter(|i| i.status == ItemStatus::Confirmed) {
            inventory::release(&txn, item.vendor_id, item.product_id, item.quantity).await?;
        }
        scheduler::cancel_for_order(&txn, order_id, None).await?;
        AssignmentEntity::update_many()
            .col_expr(
                delivery_assignment::Column::Status,
                Expr::value(DeliveryStatus::Cancelled),
            )
            .col_expr(delivery_assignment::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(delivery_assignment::Column::OrderId.eq(order_id))
            .filter(delivery_assignment::Column::Status.is_in([
                DeliveryStatus::Assigned,
                DeliveryStatus::Accepted,
            ]))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(%order_id, %reason, "order cancelled");
        counter!("krushidoot.orders.cancelled", 1);

        let mut effects = Effects::default();
        effects.notify(templates::order_cancelled(
            order.user_id,
            order.id,
            &order.tracking_number,
            Some(&reason),
        ));
        let vendors: BTreeSet<Uuid> = items.iter().map(|i| i.vendor_id).collect();
        for vendor_id in vendors {
            effects.notify(templates::order_cancelled(
                vendor_id,
                order.id,
                &order.tracking_number,
                Some(&reason),
            ));
        }
        effects.emit(Event::OrderCancelled { order_id, reason });
        self.workflow.publish(effects).await;
        Ok(updated)
    }

    pub async fn assign_delivery(
        &self,
        order_id: Uuid,
        partner_id: Option<Uuid>,
    ) -> Result<delivery_assignment::Model, ServiceError> {
        self.workflow
            .assign_delivery_partner(order_id, None, partner_id)
            .await
    }

    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<OrderDetails>, ServiceError> {
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::OrderStatus.eq(status));
        }
        let page = fetch_page(&self.db, query, page).await?;
        self.with_items(page).await
    }

    /// Hard delete of the order, its lines, assignments and pending jobs.
    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn delete(&self, viewer: &user::Model, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if order.user_id != viewer.id && viewer.role != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Only the customer or an admin can delete this order".to_string(),
            ));
        }

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        AssignmentEntity::delete_many()
            .filter(delivery_assignment::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        JobEntity::delete_many()
            .filter(scheduled_job::Column::OrderId.eq(order_id))
            .filter(scheduled_job::Column::Status.eq(JobStatus::Pending))
            .exec(&txn)
            .await?;
        OrderEntity::delete_by_id(order_id).exec(&txn).await?;
        txn.commit().await?;

        info!(%order_id, tracking = %order.tracking_number, "order deleted");
        Ok(())
    }

    /// Orders that contain at least one of the vendor's lines, with the
    /// other vendors' lines left out.
    pub async fn vendor_orders(
        &self,
        vendor_id: Uuid,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<OrderDetails>, ServiceError> {
        let mut query = OrderEntity::find()
            .filter(
                order::Column::Id.in_subquery(
                    Query::select()
                        .column(order_item::Column::OrderId)
                        .from(order_item::Entity)
                        .and_where(order_item::Column::VendorId.eq(vendor_id))
                        .to_owned(),
                ),
            )
            .order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::OrderStatus.eq(status));
        }
        let page = fetch_page(&self.db, query, page).await?;
        let mut page = self.with_items(page).await?;
        for details in &mut page.items {
            details.items.retain(|i| i.vendor_id == vendor_id);
        }
        Ok(page)
    }
}
