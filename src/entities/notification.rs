use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{
    NotificationPriority, NotificationStatus, NotificationType, RecipientType,
};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// `None` addresses every admin.
    pub recipient_id: Option<Uuid>,
    pub recipient_type: RecipientType,
    pub notification_type: NotificationType,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub order_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub delivery_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub action_url: Option<String>,
    pub metadata: Option<Json>,
    pub priority: NotificationPriority,
    pub channel_push: bool,
    pub channel_email: bool,
    pub channel_sms: bool,
    pub channel_in_app: bool,
    pub status: NotificationStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Comma-separated channels that failed on the last attempt; a retry
    /// goes to these only.
    pub failed_channels: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
