//! Persisted notifications and their fan-out to delivery channels.
//!
//! A notification row is written first, then handed to every enabled
//! channel. Channel failures never propagate to the caller: the row is
//! marked `failed` and picked up again by [`NotificationService::retry_failed`].

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{fetch_page, Page, PageRequest};
use crate::config::NotificationConfig;
use crate::entities::notification::{self, Entity as NotificationEntity};
use crate::errors::ServiceError;
use crate::models::{
    NotificationPriority, NotificationStatus, NotificationType, RecipientType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    Push,
    Email,
    Sms,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("recipient rejected: {0}")]
    Rejected(String),
}

/// Outbound transport for a single notification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;
    async fn deliver(&self, notification: &notification::Model) -> Result<(), ChannelError>;
}

/// Channel that only records the dispatch in the log. Push, email and SMS
/// providers are external collaborators.
#[derive(Debug, Clone)]
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, notification: &notification::Model) -> Result<(), ChannelError> {
        info!(
            channel = %self.kind,
            notification_id = %notification.id,
            recipient_id = ?notification.recipient_id,
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Channel flags of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Channels {
    pub push: bool,
    pub email: bool,
    pub sms: bool,
    pub in_app: bool,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            push: true,
            email: false,
            sms: false,
            in_app: true,
        }
    }
}

impl Channels {
    pub fn with_email(mut self) -> Self {
        self.email = true;
        self
    }

    pub fn with_sms(mut self) -> Self {
        self.sms = true;
        self
    }

    fn enabled(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Push => self.push,
            ChannelKind::Email => self.email,
            ChannelKind::Sms => self.sms,
        }
    }
}

fn join_channels(kinds: &[ChannelKind]) -> String {
    kinds
        .iter()
        .map(ChannelKind::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_channels(list: &str) -> Vec<ChannelKind> {
    list.split(',')
        .filter_map(|kind| kind.trim().parse().ok())
        .collect()
}

/// A notification not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Option<Uuid>,
    pub recipient_type: RecipientType,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub delivery_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub action_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub priority: NotificationPriority,
    pub channels: Channels,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        recipient_type: RecipientType,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: Some(recipient_id),
            recipient_type,
            notification_type,
            title: title.into(),
            message: message.into(),
            order_id: None,
            product_id: None,
            delivery_id: None,
            amount: None,
            action_url: None,
            metadata: None,
            priority: NotificationPriority::Medium,
            channels: Channels::default(),
        }
    }

    /// Addressed to every admin rather than one user.
    pub fn for_admins(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: None,
            ..Self::new(
                Uuid::nil(),
                RecipientType::Admin,
                notification_type,
                title,
                message,
            )
        }
    }

    pub fn order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn product(mut self, product_id: Uuid) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn delivery(mut self, delivery_id: Uuid) -> Self {
        self.delivery_id = Some(delivery_id);
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn channels(mut self, channels: Channels) -> Self {
        self.channels = channels;
        self
    }
}

/// Title and message text per notification type.
pub mod templates {
    use super::*;

    pub fn order_placed(vendor_id: Uuid, order_id: Uuid, tracking: &str, total: Decimal) -> NewNotification {
        NewNotification::new(
            vendor_id,
            RecipientType::Vendor,
            NotificationType::OrderPlaced,
            "New Order Received",
            format!("You have received a new order #{} worth ₹{}", tracking, total),
        )
        .order(order_id)
        .amount(total)
        .action_url(format!("/vendor/orders/{}", order_id))
        .priority(NotificationPriority::High)
        .channels(Channels::default().with_email())
    }

    pub fn order_confirmed(customer_id: Uuid, order_id: Uuid, tracking: &str) -> NewNotification {
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::OrderConfirmed,
            "Order Confirmed",
            format!(
                "Your order #{} has been confirmed and is being prepared",
                tracking
            ),
        )
        .order(order_id)
        .action_url(format!("/orders/{}", order_id))
        .channels(Channels::default().with_email().with_sms())
    }

    pub fn order_cancelled(
        customer_id: Uuid,
        order_id: Uuid,
        tracking: &str,
        reason: Option<&str>,
    ) -> NewNotification {
        let message = match reason {
            Some(reason) if !reason.trim().is_empty() => {
                format!("Your order #{} has been cancelled. {}", tracking, reason.trim())
            }
            _ => format!("Your order #{} has been cancelled.", tracking),
        };
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::OrderCancelled,
            "Order Cancelled",
            message,
        )
        .order(order_id)
        .priority(NotificationPriority::High)
    }

    pub fn delivery_assigned_partner(
        partner_id: Uuid,
        order_id: Uuid,
        assignment_id: Uuid,
        tracking: &str,
        fee: Decimal,
    ) -> NewNotification {
        NewNotification::new(
            partner_id,
            RecipientType::DeliveryPartner,
            NotificationType::DeliveryAssigned,
            "New Delivery Assignment",
            format!("You have been assigned delivery for order #{}", tracking),
        )
        .order(order_id)
        .delivery(assignment_id)
        .amount(fee)
        .action_url(format!("/delivery/assignments/{}", assignment_id))
        .priority(NotificationPriority::High)
        .channels(Channels::default().with_sms())
    }

    /// Carries the delivery code the customer reads out to the partner at
    /// the door.
    pub fn delivery_assigned_customer(
        customer_id: Uuid,
        order_id: Uuid,
        tracking: &str,
        partner_name: &str,
        delivery_otp: &str,
    ) -> NewNotification {
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::DeliveryAssigned,
            "Delivery Partner Assigned",
            format!(
                "{} will deliver your order #{}. Share code {} only when you receive it.",
                partner_name, tracking, delivery_otp
            ),
        )
        .order(order_id)
        .action_url(format!("/orders/{}/track", order_id))
        .metadata(serde_json::json!({ "delivery_otp": delivery_otp }))
    }

    pub fn out_for_delivery(
        customer_id: Uuid,
        order_id: Uuid,
        tracking: &str,
        partner_name: &str,
    ) -> NewNotification {
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::OrderOutForDelivery,
            "Order Out For Delivery",
            format!(
                "Your order #{} is now out for delivery with {}",
                tracking, partner_name
            ),
        )
        .order(order_id)
        .action_url(format!("/orders/{}/track", order_id))
    }

    pub fn order_delivered_customer(customer_id: Uuid, order_id: Uuid, tracking: &str) -> NewNotification {
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::OrderDelivered,
            "Order Delivered",
            format!("Your order #{} has been delivered successfully", tracking),
        )
        .order(order_id)
        .action_url(format!("/orders/{}", order_id))
        .priority(NotificationPriority::High)
    }

    pub fn order_delivered_vendor(vendor_id: Uuid, order_id: Uuid, tracking: &str) -> NewNotification {
        NewNotification::new(
            vendor_id,
            RecipientType::Vendor,
            NotificationType::OrderDelivered,
            "Order Delivered",
            format!("Order #{} has been delivered to the customer", tracking),
        )
        .order(order_id)
        .action_url(format!("/vendor/orders/{}", order_id))
    }

    pub fn delivery_failed(customer_id: Uuid, order_id: Uuid, tracking: &str, reason: &str) -> NewNotification {
        NewNotification::new(
            customer_id,
            RecipientType::Customer,
            NotificationType::DeliveryFailed,
            "Delivery Failed",
            format!("Delivery of your order #{} could not be completed: {}", tracking, reason),
        )
        .order(order_id)
        .priority(NotificationPriority::High)
    }

    pub fn low_stock(
        vendor_id: Uuid,
        inventory_id: Uuid,
        product_id: Uuid,
        product_name: &str,
        available: i32,
        min_stock_level: i32,
    ) -> NewNotification {
        NewNotification::new(
            vendor_id,
            RecipientType::Vendor,
            NotificationType::LowStock,
            "Low Stock Alert",
            format!(
                "{} is running low on stock ({} units remaining)",
                product_name, available
            ),
        )
        .product(product_id)
        .action_url(format!("/vendor/inventory/{}", inventory_id))
        .metadata(serde_json::json!({
            "current_stock": available,
            "min_stock_level": min_stock_level,
        }))
    }

    pub fn payment_received(vendor_id: Uuid, order_id: Option<Uuid>, amount: Decimal) -> NewNotification {
        let mut n = NewNotification::new(
            vendor_id,
            RecipientType::Vendor,
            NotificationType::PaymentReceived,
            "Payment Received",
            format!("Payment of ₹{} has been released to you", amount),
        )
        .amount(amount);
        n.order_id = order_id;
        n
    }

    pub fn new_vendor_registration(user_id: Uuid, name: &str, role: RecipientType) -> NewNotification {
        let label = match role {
            RecipientType::DeliveryPartner => "delivery partner",
            _ => "vendor",
        };
        NewNotification::for_admins(
            NotificationType::NewVendorRegistration,
            format!("New {} registration", label),
            format!("{} registered as a {} and awaits verification", name, label),
        )
        .action_url(format!("/admin/users/{}", user_id))
    }

    pub fn system_alert(title: impl Into<String>, message: impl Into<String>) -> NewNotification {
        NewNotification::for_admins(NotificationType::SystemAlert, title, message)
            .priority(NotificationPriority::Urgent)
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    config: NotificationConfig,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>, config: NotificationConfig) -> Self {
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![
            Arc::new(LogChannel::new(ChannelKind::Push)),
            Arc::new(LogChannel::new(ChannelKind::Email)),
            Arc::new(LogChannel::new(ChannelKind::Sms)),
        ];
        Self::with_channels(db, config, channels)
    }

    pub fn with_channels(
        db: Arc<DatabaseConnection>,
        config: NotificationConfig,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            db,
            config,
            channels,
        }
    }

    /// Persists the notification, fans it out and records the outcome.
    #[instrument(skip(self, new), fields(kind = %new.notification_type, recipient_id = ?new.recipient_id))]
    pub async fn create_and_send(
        &self,
        new: NewNotification,
    ) -> Result<notification::Model, ServiceError> {
        let now = Utc::now();
        let row = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(new.recipient_id),
            recipient_type: Set(new.recipient_type),
            notification_type: Set(new.notification_type),
            title: Set(new.title),
            message: Set(new.message),
            order_id: Set(new.order_id),
            product_id: Set(new.product_id),
            delivery_id: Set(new.delivery_id),
            amount: Set(new.amount),
            action_url: Set(new.action_url),
            metadata: Set(new.metadata),
            priority: Set(new.priority),
            channel_push: Set(new.channels.push),
            channel_email: Set(new.channels.email),
            channel_sms: Set(new.channels.sms),
            channel_in_app: Set(new.channels.in_app),
            status: Set(NotificationStatus::Pending),
            is_read: Set(false),
            read_at: Set(None),
            sent_at: Set(None),
            expires_at: Set(now + Duration::days(self.config.ttl_days)),
            retry_count: Set(0),
            max_retries: Set(self.config.max_retries),
            failed_channels: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.dispatch(row).await
    }

    /// Sends a batch, logging failures. Used after workflow commits where
    /// a notification problem must not undo the business change.
    pub async fn send_all(&self, batch: Vec<NewNotification>) {
        for new in batch {
            let kind = new.notification_type;
            if let Err(e) = self.create_and_send(new).await {
                warn!(error = %e, %kind, "failed to persist notification");
                counter!("krushidoot.notifications.failed", 1, "type" => kind.to_string());
            }
        }
    }

    /// Hands the row to its channels. A first attempt goes to every enabled
    /// channel; a retry only to those listed in `failed_channels`.
    async fn dispatch(
        &self,
        row: notification::Model,
    ) -> Result<notification::Model, ServiceError> {
        let flags = Channels {
            push: row.channel_push,
            email: row.channel_email,
            sms: row.channel_sms,
            in_app: row.channel_in_app,
        };
        let owed = row.failed_channels.as_deref().map(parse_channels);

        let mut failed: Vec<ChannelKind> = Vec::new();
        let mut last_error: Option<String> = None;
        for channel in self.channels.iter().filter(|c| {
            let kind = c.kind();
            flags.enabled(kind) && owed.as_ref().map_or(true, |owed| owed.contains(&kind))
        }) {
            if let Err(e) = channel.deliver(&row).await {
                warn!(notification_id = %row.id, channel = %channel.kind(), error = %e, "channel delivery failed");
                failed.push(channel.kind());
                last_error = Some(e.to_string());
            }
        }

        let now = Utc::now();
        let retry_count = row.retry_count;
        let mut active: notification::ActiveModel = row.into();
        match last_error {
            None => {
                active.status = Set(NotificationStatus::Sent);
                active.sent_at = Set(Some(now));
                active.failed_channels = Set(None);
                counter!("krushidoot.notifications.sent", 1);
            }
            Some(error) => {
                debug!(%error, ?failed, "notification left owed to channels");
                active.status = Set(NotificationStatus::Failed);
                active.retry_count = Set(retry_count + 1);
                active.failed_channels = Set(Some(join_channels(&failed)));
                counter!("krushidoot.notifications.failed", 1);
            }
        }
        active.updated_at = Set(now);
        Ok(active.update(&*self.db).await?)
    }

    /// Re-dispatches failed notifications that still have retries left.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self, limit: u64) -> Result<usize, ServiceError> {
        let failed = NotificationEntity::find()
            .filter(notification::Column::Status.eq(NotificationStatus::Failed))
            .filter(
                Expr::col(notification::Column::RetryCount)
                    .lt(Expr::col(notification::Column::MaxRetries)),
            )
            .filter(notification::Column::ExpiresAt.gt(Utc::now()))
            .order_by_asc(notification::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?;

        let count = failed.len();
        for row in failed {
            self.dispatch(row).await?;
        }
        if count > 0 {
            debug!(count, "retried failed notifications");
        }
        Ok(count)
    }

    /// Notifications visible to a user, newest first. Admins also see
    /// broadcasts addressed to all admins. A broadcast is one shared row, so
    /// its read state is the admin team's: once any admin reads it, it is
    /// read for all of them.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: Uuid,
        include_admin_broadcasts: bool,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<notification::Model>, ServiceError> {
        let mut query = NotificationEntity::find()
            .filter(Self::visible_to(user_id, include_admin_broadcasts))
            .order_by_desc(notification::Column::CreatedAt);
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }
        fetch_page(&self.db, query, page).await
    }

    /// Unread notifications that actually went out.
    pub async fn unread_count(
        &self,
        user_id: Uuid,
        include_admin_broadcasts: bool,
    ) -> Result<u64, ServiceError> {
        Ok(NotificationEntity::find()
            .filter(Self::visible_to(user_id, include_admin_broadcasts))
            .filter(notification::Column::IsRead.eq(false))
            .filter(
                notification::Column::Status
                    .is_in([NotificationStatus::Sent, NotificationStatus::Delivered]),
            )
            .count(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        include_admin_broadcasts: bool,
    ) -> Result<notification::Model, ServiceError> {
        let row = NotificationEntity::find_by_id(id)
            .filter(Self::visible_to(user_id, include_admin_broadcasts))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification", id))?;

        if row.is_read {
            return Ok(row);
        }

        let now = Utc::now();
        let mut active: notification::ActiveModel = row.into();
        active.is_read = Set(true);
        active.read_at = Set(Some(now));
        active.status = Set(NotificationStatus::Read);
        active.updated_at = Set(now);
        Ok(active.update(&*self.db).await?)
    }

    /// Returns the number of rows flipped to read. For admins this includes
    /// the shared broadcasts, same as [`Self::mark_read`].
    #[instrument(skip(self))]
    pub async fn mark_all_read(
        &self,
        user_id: Uuid,
        include_admin_broadcasts: bool,
    ) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let result = NotificationEntity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .col_expr(notification::Column::ReadAt, Expr::value(now))
            .col_expr(
                notification::Column::Status,
                Expr::value(NotificationStatus::Read),
            )
            .col_expr(notification::Column::UpdatedAt, Expr::value(now))
            .filter(Self::visible_to(user_id, include_admin_broadcasts))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes notifications past their expiry.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let result = NotificationEntity::delete_many()
            .filter(notification::Column::ExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(purged = result.rows_affected, "purged expired notifications");
        }
        Ok(result.rows_affected)
    }

    fn visible_to(user_id: Uuid, include_admin_broadcasts: bool) -> Condition {
        let mine = Condition::any().add(notification::Column::RecipientId.eq(user_id));
        if include_admin_broadcasts {
            mine.add(
                Condition::all()
                    .add(notification::Column::RecipientId.is_null())
                    .add(notification::Column::RecipientType.eq(RecipientType::Admin)),
            )
        } else {
            mine
        }
    }
}
