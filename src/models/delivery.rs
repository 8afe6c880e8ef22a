use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status of a delivery assignment.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "assigned")]
    Assigned,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "picked_up")]
    PickedUp,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DeliveryStatus {
    pub fn allowed_transitions(self) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match self {
            Assigned => &[Accepted, Cancelled],
            Accepted => &[PickedUp, Failed, Cancelled],
            PickedUp => &[InTransit, Delivered, Failed],
            InTransit => &[Delivered, Failed],
            Delivered | Failed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Whether the partner is still expected to complete this assignment.
    pub fn is_open(self) -> bool {
        !self.allowed_transitions().is_empty()
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryPriority {
    #[sea_orm(string_value = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}
