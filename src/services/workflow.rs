//! Order lifecycle orchestration.
//!
//! Each handler does all of its writes in one database transaction and
//! collects the notifications and domain events it wants to publish in an
//! [`Effects`] value. Effects go out only after the commit, so a failed
//! step leaves neither half-applied rows nor messages about them.

use chrono::{Duration, Utc};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::delivery::{delivery_fee, haversine_km};
use super::earnings::{self, NewEarning};
use super::inventory;
use super::notifications::{templates, NewNotification, NotificationService};
use super::scheduler;
use crate::config::{DeliveryConfig, WorkflowConfig};
use crate::entities::delivery_assignment::{self, Entity as AssignmentEntity};
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::user::{self, Entity as UserEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    DeliveryPriority, DeliveryStatus, ItemStatus, JobKind, OrderStatus, PaymentMethod,
    PaymentStatus, UserRole, VerificationStatus,
};

pub const EXPIRY_NOTE: &str = "Order cancelled due to no vendor response within 24 hours";

/// Vendor decision on the items it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VendorAction {
    Accept,
    Reject,
}

/// Messages to publish once a transaction has committed.
#[derive(Debug, Default)]
pub struct Effects {
    pub notifications: Vec<NewNotification>,
    pub events: Vec<Event>,
}

impl Effects {
    pub fn notify(&mut self, notification: NewNotification) {
        self.notifications.push(notification);
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, other: Effects) {
        self.notifications.extend(other.notifications);
        self.events.extend(other.events);
    }
}

/// Writes `active` over `original`, bumping the version. Fails with
/// `Conflict` when the row changed since `original` was read.
pub(crate) async fn save_order<C>(
    conn: &C,
    original: &order::Model,
    mut active: order::ActiveModel,
) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    active.version = Set(original.version + 1);
    active.updated_at = Set(Utc::now());
    OrderEntity::update(active)
        .filter(order::Column::Version.eq(original.version))
        .exec(conn)
        .await
        .map_err(|e| match e {
            DbErr::RecordNotUpdated => ServiceError::Conflict(format!(
                "Order {} was modified concurrently",
                original.id
            )),
            other => ServiceError::DatabaseError(other),
        })
}

/// Validated status change plus any extra column updates.
pub(crate) async fn transition_order<C>(
    conn: &C,
    order: &order::Model,
    to: OrderStatus,
    edit: impl FnOnce(&mut order::ActiveModel),
) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if !order.order_status.can_transition_to(to) {
        return Err(ServiceError::InvalidStatus(format!(
            "Order cannot move from {} to {}",
            order.order_status, to
        )));
    }
    let mut active: order::ActiveModel = order.clone().into();
    active.order_status = Set(to);
    if to == OrderStatus::Delivered {
        active.actual_delivery_time = Set(Some(Utc::now()));
    }
    edit(&mut active);
    let updated = save_order(conn, order, active).await?;
    counter!("krushidoot.orders.transitions", 1, "to" => to.to_string());
    Ok(updated)
}

/// Puts the catalog stock of every line back.
pub(crate) async fn restore_product_stock<C>(
    conn: &C,
    items: &[order_item::Model],
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    for item in items {
        ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(item.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(item.product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn load_order<C>(
    conn: &C,
    order_id: Uuid,
) -> Result<(order::Model, Vec<order_item::Model>), ServiceError>
where
    C: ConnectionTrait,
{
    let order = OrderEntity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
    let items = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok((order, items))
}

async fn set_item_status<C>(
    conn: &C,
    order_id: Uuid,
    vendor_id: Uuid,
    status: ItemStatus,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    OrderItemEntity::update_many()
        .col_expr(order_item::Column::Status, Expr::value(status))
        .filter(order_item::Column::OrderId.eq(order_id))
        .filter(order_item::Column::VendorId.eq(vendor_id))
        .exec(conn)
        .await?;
    Ok(())
}

fn delivery_otp() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}

#[derive(Clone)]
pub struct WorkflowService {
    db: Arc<DatabaseConnection>,
    notifications: NotificationService,
    events: EventSender,
    workflow: WorkflowConfig,
    delivery: DeliveryConfig,
    currency: String,
}

impl WorkflowService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifications: NotificationService,
        events: EventSender,
        workflow: WorkflowConfig,
        delivery: DeliveryConfig,
        currency: String,
    ) -> Self {
        Self {
            db,
            notifications,
            events,
            workflow,
            delivery,
            currency,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Sends committed effects. Failures are logged only.
    pub async fn publish(&self, effects: Effects) {
        self.notifications.send_all(effects.notifications).await;
        for event in effects.events {
            self.events.emit(event).await;
        }
    }

    /// Runs on the caller's transaction: tells every vendor in the order
    /// about it and arms the vendor response timeout.
    #[instrument(skip(self, conn, order, items), fields(order_id = %order.id))]
    pub async fn handle_order_placement<C>(
        &self,
        conn: &C,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Effects, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut effects = Effects::default();
        let vendors: BTreeSet<Uuid> = items.iter().map(|i| i.vendor_id).collect();
        for vendor_id in vendors {
            effects.notify(templates::order_placed(
                vendor_id,
                order.id,
                &order.tracking_number,
                order.total_amount,
            ));
        }

        let expires_at = Utc::now() + self.workflow.vendor_response_timeout();
        scheduler::schedule(conn, JobKind::OrderExpiry, order.id, expires_at).await?;

        effects.emit(Event::OrderPlaced {
            order_id: order.id,
            customer_id: order.user_id,
            total_amount: order.total_amount,
        });
        info!(tracking = %order.tracking_number, %expires_at, "order workflow started");
        Ok(effects)
    }

    /// Applies a vendor's accept or reject decision.
    #[instrument(skip(self, reason))]
    pub async fn handle_vendor_response(
        &self,
        order_id: Uuid,
        vendor_id: Uuid,
        action: VendorAction,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let (order, items) = load_order(&txn, order_id).await?;

        let vendor_items: Vec<&order_item::Model> =
            items.iter().filter(|i| i.vendor_id == vendor_id).collect();
        if vendor_items.is_empty() {
            return Err(ServiceError::Forbidden(
                "You have no items in this order".to_string(),
            ));
        }
        if order.order_status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is {} and no longer awaits a vendor response",
                order.order_status
            )));
        }

        let mut effects = Effects::default();
        let updated = match action {
            VendorAction::Accept => {
                self.accept(&txn, &order, &vendor_items, vendor_id, &mut effects)
                    .await?
            }
            VendorAction::Reject => {
                self.reject(&txn, &order, &items, vendor_id, reason, &mut effects)
                    .await?
            }
        };

        txn.commit().await?;
        info!(%order_id, %vendor_id, %action, status = %updated.order_status, "vendor responded");
        counter!("krushidoot.workflow.vendor_responses", 1, "action" => action.to_string());
        self.publish(effects).await;
        Ok(updated)
    }

    async fn accept<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        vendor_items: &[&order_item::Model],
        vendor_id: Uuid,
        effects: &mut Effects,
    ) -> Result<order::Model, ServiceError> {
        for item in vendor_items {
            let Some(row) =
                inventory::reserve(conn, vendor_id, item.product_id, item.quantity).await?
            else {
                continue;
            };
            effects.emit(Event::InventoryReserved {
                vendor_id,
                product_id: item.product_id,
                quantity: item.quantity,
            });
            if row.low_stock {
                effects.notify(templates::low_stock(
                    vendor_id,
                    row.id,
                    row.product_id,
                    &item.product_name,
                    row.available_stock,
                    row.min_stock_level,
                ));
                effects.emit(Event::LowStock {
                    vendor_id,
                    product_id: row.product_id,
                    available: row.available_stock,
                });
            }
        }
        set_item_status(conn, order.id, vendor_id, ItemStatus::Confirmed).await?;

        let commission_rate = UserEntity::find_by_id(vendor_id)
            .one(conn)
            .await?
            .map(|v| v.commission_rate)
            .unwrap_or(self.workflow.default_commission_rate);
        let gross: Decimal = vendor_items.iter().map(|i| i.line_total()).sum();
        let earning = earnings::record(
            conn,
            NewEarning::sale(vendor_id, order.id, gross, commission_rate)
                .describe(format!("Sale for order {}", order.tracking_number)),
            &self.currency,
        )
        .await?;
        effects.emit(Event::EarningRecorded {
            earning_id: earning.id,
            user_id: vendor_id,
            net_amount: earning.net_amount,
        });

        let updated = transition_order(conn, order, OrderStatus::Confirmed, |_| {}).await?;

        scheduler::cancel_for_order(conn, order.id, Some(JobKind::OrderExpiry)).await?;
        scheduler::schedule_with_payload(
            conn,
            JobKind::AssignDelivery,
            order.id,
            Utc::now() + self.workflow.preparation_delay(),
            Some(json!({ "vendor_id": vendor_id })),
        )
        .await?;

        effects.notify(templates::order_confirmed(
            order.user_id,
            order.id,
            &order.tracking_number,
        ));
        effects.emit(Event::OrderConfirmed {
            order_id: order.id,
            vendor_id,
        });
        effects.emit(Event::OrderStatusChanged {
            order_id: order.id,
            from: order.order_status,
            to: updated.order_status,
        });
        Ok(updated)
    }

    async fn reject<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        items: &[order_item::Model],
        vendor_id: Uuid,
        reason: Option<String>,
        effects: &mut Effects,
    ) -> Result<order::Model, ServiceError> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Rejected by vendor".to_string());

        set_item_status(conn, order.id, vendor_id, ItemStatus::Rejected).await?;
        let note = reason.clone();
        let updated = transition_order(conn, order, OrderStatus::Cancelled, move |a| {
            a.notes = Set(Some(note));
        })
        .await?;
        restore_product_stock(conn, items).await?;
        scheduler::cancel_for_order(conn, order.id, None).await?;

        effects.notify(templates::order_cancelled(
            order.user_id,
            order.id,
            &order.tracking_number,
            Some(&reason),
        ));
        effects.emit(Event::OrderCancelled {
            order_id: order.id,
            reason,
        });
        Ok(updated)
    }

    /// Picks the best available partner that has not already turned this
    /// order down.
    async fn select_partner<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Option<user::Model>, ServiceError> {
        let declined: Vec<Uuid> = AssignmentEntity::find()
            .filter(delivery_assignment::Column::OrderId.eq(order_id))
            .filter(delivery_assignment::Column::Status.eq(DeliveryStatus::Cancelled))
            .all(conn)
            .await?
            .into_iter()
            .map(|a| a.delivery_partner_id)
            .collect();

        let mut query = UserEntity::find()
            .filter(user::Column::Role.eq(UserRole::DeliveryPartner))
            .filter(user::Column::IsActive.eq(true))
            .filter(user::Column::IsAvailable.eq(true))
            .filter(user::Column::VerificationStatus.eq(VerificationStatus::Verified))
            .order_by_desc(user::Column::RatingAverage)
            .order_by_asc(user::Column::CreatedAt);
        if !declined.is_empty() {
            query = query.filter(user::Column::Id.is_not_in(declined));
        }
        Ok(query.limit(1).one(conn).await?)
    }

    /// Creates a delivery assignment for a confirmed order, either for the
    /// requested partner or the best available one.
    #[instrument(skip(self))]
    pub async fn assign_delivery_partner(
        &self,
        order_id: Uuid,
        vendor_id: Option<Uuid>,
        partner_id: Option<Uuid>,
    ) -> Result<delivery_assignment::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let (order, items) = load_order(&txn, order_id).await?;

        if !matches!(
            order.order_status,
            OrderStatus::Confirmed | OrderStatus::Processing
        ) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is {}; only confirmed orders can be assigned",
                order.order_status
            )));
        }
        let open = AssignmentEntity::find()
            .filter(delivery_assignment::Column::OrderId.eq(order_id))
            .filter(delivery_assignment::Column::Status.is_in([
                DeliveryStatus::Assigned,
                DeliveryStatus::Accepted,
                DeliveryStatus::PickedUp,
                DeliveryStatus::InTransit,
            ]))
            .one(&txn)
            .await?;
        if open.is_some() {
            return Err(ServiceError::Conflict(
                "Order already has an active delivery assignment".to_string(),
            ));
        }

        let vendor_id = vendor_id
            .or_else(|| {
                items
                    .iter()
                    .find(|i| i.status == ItemStatus::Confirmed)
                    .or_else(|| items.first())
                    .map(|i| i.vendor_id)
            })
            .ok_or_else(|| ServiceError::BadRequest("Order has no items".to_string()))?;

        let partner = match partner_id {
            Some(id) => {
                let partner = UserEntity::find_by_id(id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Delivery partner", id))?;
                if partner.role != UserRole::DeliveryPartner || !partner.is_active {
                    return Err(ServiceError::BadRequest(format!(
                        "User {} is not an active delivery partner",
                        id
                    )));
                }
                partner
            }
            None => self.select_partner(&txn, order_id).await?.ok_or_else(|| {
                ServiceError::NotFound("No available delivery partner".to_string())
            })?,
        };

        let vendor = UserEntity::find_by_id(vendor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Vendor", vendor_id))?;
        let customer = UserEntity::find_by_id(order.user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", order.user_id))?;

        let distance_km = match (vendor.coordinates(), order.coordinates()) {
            (Some(from), Some(to)) => haversine_km(from, to),
            _ => self.delivery.default_distance_km,
        };
        let fee = delivery_fee(&self.delivery, distance_km);
        let now = Utc::now();
        let eta = now + Duration::minutes(self.delivery.estimated_delivery_minutes);

        let assignment = delivery_assignment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            delivery_partner_id: Set(partner.id),
            vendor_id: Set(vendor.id),
            customer_id: Set(customer.id),
            status: Set(DeliveryStatus::Assigned),
            priority: Set(DeliveryPriority::Medium),
            pickup_address: Set(vendor.formatted_address()),
            pickup_latitude: Set(vendor.latitude),
            pickup_longitude: Set(vendor.longitude),
            pickup_contact_name: Set(Some(vendor.display_name().to_string())),
            pickup_contact_phone: Set(vendor.phone.clone()),
            delivery_address: Set(order.formatted_address()),
            delivery_latitude: Set(order.latitude),
            delivery_longitude: Set(order.longitude),
            delivery_contact_name: Set(Some(customer.name.clone())),
            delivery_contact_phone: Set(customer.phone.clone()),
            scheduled_pickup_time: Set(now),
            actual_pickup_time: Set(None),
            scheduled_delivery_time: Set(eta),
            actual_delivery_time: Set(None),
            distance_km: Set((distance_km * 100.0).round() / 100.0),
            estimated_duration_minutes: Set(self.delivery.estimated_delivery_minutes as i32),
            delivery_fee: Set(fee),
            tips: Set(Decimal::ZERO),
            total_earnings: Set(fee),
            proof_of_pickup: Set(None),
            proof_of_delivery: Set(None),
            current_latitude: Set(None),
            current_longitude: Set(None),
            speed: Set(None),
            heading: Set(None),
            last_tracked_at: Set(None),
            issues: Set(None),
            customer_rating: Set(None),
            customer_feedback: Set(None),
            payment_status: Set("pending".to_string()),
            delivery_otp: Set(delivery_otp()),
            assigned_at: Set(now),
            accepted_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut active: order::ActiveModel = order.clone().into();
        active.delivery_partner_id = Set(Some(partner.id));
        active.estimated_delivery_time = Set(Some(eta));
        save_order(&txn, &order, active).await?;

        txn.commit().await?;
        info!(
            %order_id,
            assignment_id = %assignment.id,
            partner_id = %partner.id,
            distance_km = assignment.distance_km,
            fee = %assignment.delivery_fee,
            "delivery partner assigned"
        );
        counter!("krushidoot.deliveries.assigned", 1);

        let mut effects = Effects::default();
        effects.notify(templates::delivery_assigned_partner(
            partner.id,
            order.id,
            assignment.id,
            &order.tracking_number,
            assignment.delivery_fee,
        ));
        effects.notify(templates::delivery_assigned_customer(
            order.user_id,
            order.id,
            &order.tracking_number,
            &partner.name,
            &assignment.delivery_otp,
        ));
        effects.emit(Event::DeliveryAssigned {
            order_id: order.id,
            assignment_id: assignment.id,
            partner_id: partner.id,
        });
        self.publish(effects).await;
        Ok(assignment)
    }

    /// Cancels the order if no vendor has answered yet. Returns whether it
    /// was cancelled.
    #[instrument(skip(self))]
    pub async fn handle_order_expiry(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let (order, items) = match load_order(&txn, order_id).await {
            Ok(loaded) => loaded,
            Err(ServiceError::NotFound(_)) => {
                warn!(%order_id, "expired order no longer exists");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if order.order_status != OrderStatus::Pending {
            return Ok(false);
        }

        transition_order(&txn, &order, OrderStatus::Cancelled, |a| {
            a.notes = Set(Some(EXPIRY_NOTE.to_string()));
        })
        .await?;
        restore_product_stock(&txn, &items).await?;
        scheduler::cancel_for_order(&txn, order.id, None).await?;
        txn.commit().await?;

        info!(tracking = %order.tracking_number, "order expired without vendor response");
        counter!("krushidoot.orders.expired", 1);

        let mut effects = Effects::default();
        effects.notify(templates::order_cancelled(
            order.user_id,
            order.id,
            &order.tracking_number,
            Some("No vendor responded within 24 hours."),
        ));
        effects.emit(Event::OrderCancelled {
            order_id: order.id,
            reason: EXPIRY_NOTE.to_string(),
        });
        self.publish(effects).await;
        Ok(true)
    }

    /// Runs on the caller's transaction once an assignment is delivered:
    /// closes the order, pays the partner and consumes the vendor's held
    /// stock.
    #[instrument(skip(self, conn, assignment), fields(assignment_id = %assignment.id))]
    pub async fn handle_delivery_completion<C>(
        &self,
        conn: &C,
        assignment: &delivery_assignment::Model,
    ) -> Result<Effects, ServiceError>
    where
        C: ConnectionTrait,
    {
        let (order, items) = load_order(conn, assignment.order_id).await?;
        let delivered = transition_order(conn, &order, OrderStatus::Delivered, |a| {
            if order.payment_method == PaymentMethod::Cod {
                a.payment_status = Set(PaymentStatus::Completed);
            }
        })
        .await?;

        let earning = earnings::record(
            conn,
            NewEarning::delivery(
                assignment.delivery_partner_id,
                order.id,
                assignment.id,
                assignment.delivery_fee + assignment.tips,
            )
            .describe(format!("Delivery for order {}", order.tracking_number)),
            &self.currency,
        )
        .await?;

        for item in items
            .iter()
            .filter(|i| i.vendor_id == assignment.vendor_id && i.status != ItemStatus::Rejected)
        {
            inventory::confirm_usage(conn, item.vendor_id, item.product_id, item.quantity).await?;
        }

        let mut effects = Effects::default();
        effects.notify(templates::order_delivered_customer(
            order.user_id,
            order.id,
            &order.tracking_number,
        ));
        effects.notify(templates::order_delivered_vendor(
            assignment.vendor_id,
            order.id,
            &order.tracking_number,
        ));
        effects.emit(Event::OrderDelivered {
            order_id: order.id,
            delivered_at: delivered.actual_delivery_time.unwrap_or_else(Utc::now),
        });
        effects.emit(Event::EarningRecorded {
            earning_id: earning.id,
            user_id: earning.user_id,
            net_amount: earning.net_amount,
        });
        counter!("krushidoot.orders.delivered", 1);
        Ok(effects)
    }
}
