use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{DeliveryPriority, DeliveryStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_assignments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub delivery_partner_id: Uuid,
    pub vendor_id: Uuid,
    pub customer_id: Uuid,
    pub status: DeliveryStatus,
    pub priority: DeliveryPriority,
    #[sea_orm(column_type = "Text")]
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub pickup_contact_name: Option<String>,
    pub pickup_contact_phone: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub delivery_contact_name: Option<String>,
    pub delivery_contact_phone: Option<String>,
    pub scheduled_pickup_time: DateTime<Utc>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub scheduled_delivery_time: DateTime<Utc>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub distance_km: f64,
    pub estimated_duration_minutes: i32,
    pub delivery_fee: Decimal,
    pub tips: Decimal,
    pub total_earnings: Decimal,
    pub proof_of_pickup: Option<Json>,
    pub proof_of_delivery: Option<Json>,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub last_tracked_at: Option<DateTime<Utc>>,
    /// Reported problems, a JSON array of `{type, description, reported_at}`.
    pub issues: Option<Json>,
    pub customer_rating: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub customer_feedback: Option<String>,
    pub payment_status: String,
    #[serde(skip_serializing)]
    pub delivery_otp: String,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Past the scheduled delivery time plus `grace` and still not finished.
    pub fn is_overdue(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.status.is_open() && now > self.scheduled_delivery_time + grace
    }
}
