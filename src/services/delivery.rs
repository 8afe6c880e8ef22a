use chrono::{Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::earnings::EarningsService;
use super::notifications::templates;
use super::workflow::{load_order, save_order, transition_order, Effects, WorkflowService};
use super::{fetch_page, scheduler, Page, PageRequest};
use crate::config::DeliveryConfig;
use crate::entities::delivery_assignment::{self, Entity as AssignmentEntity};
use crate::entities::order;
use crate::entities::user::{self, Entity as UserEntity};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::models::{DeliveryStatus, JobKind, OrderStatus, VerificationStatus};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two `(latitude, longitude)` points.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Base fee plus the per-kilometre rate, rounded to paise.
pub fn delivery_fee(config: &DeliveryConfig, distance_km: f64) -> Decimal {
    let km = Decimal::from_f64(distance_km.max(0.0)).unwrap_or(Decimal::ZERO);
    (config.base_fee + km * config.per_km_fee).round_dp(2)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LocationUpdate {
    #[validate(custom = "validate_latitude")]
    pub latitude: f64,
    #[validate(custom = "validate_longitude")]
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("latitude_out_of_range"))
    }
}

fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("longitude_out_of_range"))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDeliveryStatusRequest {
    pub status: DeliveryStatus,
    #[validate]
    pub location: Option<LocationUpdate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub otp: Option<String>,
    pub received_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryFeedbackRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

/// Assignment as shown to its partner.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: delivery_assignment::Model,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerProfile {
    pub name: String,
    pub is_verified: bool,
    pub verification_status: VerificationStatus,
    pub is_available: bool,
    pub rating_average: f64,
    pub rating_count: i32,
    pub vehicle_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryDashboard {
    pub partner: PartnerProfile,
    pub counts_by_status: BTreeMap<String, u64>,
    pub today_deliveries: u64,
    pub total_earnings: Decimal,
    pub monthly_earnings: Decimal,
    pub pending_earnings: Decimal,
    pub available_assignments: Vec<AssignmentView>,
    pub current_assignments: Vec<AssignmentView>,
}

#[derive(Clone)]
pub struct DeliveryService {
    db: Arc<DatabaseConnection>,
    workflow: WorkflowService,
    earnings: EarningsService,
    config: DeliveryConfig,
}

impl DeliveryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        workflow: WorkflowService,
        earnings: EarningsService,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            db,
            workflow,
            earnings,
            config,
        }
    }

    fn view(&self, assignment: delivery_assignment::Model) -> AssignmentView {
        let grace = Duration::minutes(self.config.overdue_grace_minutes);
        AssignmentView {
            is_overdue: assignment.is_overdue(Utc::now(), grace),
            assignment,
        }
    }

    async fn owned(
        &self,
        partner_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<delivery_assignment::Model, ServiceError> {
        AssignmentEntity::find_by_id(assignment_id)
            .filter(delivery_assignment::Column::DeliveryPartnerId.eq(partner_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment", assignment_id))
    }

    #[instrument(skip(self, partner), fields(partner_id = %partner.id))]
    pub async fn dashboard(&self, partner: &user::Model) -> Result<DeliveryDashboard, ServiceError> {
        let db = &*self.db;
        let mine = || {
            AssignmentEntity::find()
                .filter(delivery_assignment::Column::DeliveryPartnerId.eq(partner.id))
        };

        let mut counts_by_status = BTreeMap::new();
        for row in mine().all(db).await? {
            *counts_by_status.entry(row.status.to_string()).or_insert(0u64) += 1;
        }

        let start_of_day = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or_else(Utc::now);
        let today_deliveries = mine()
            .filter(delivery_assignment::Column::Status.eq(DeliveryStatus::Delivered))
            .filter(delivery_assignment::Column::ActualDeliveryTime.gte(start_of_day))
            .count(db)
            .await?;

        let total = self.earnings.summary(partner.id, None, None).await?;
        let month = self.earnings.current_month(partner.id).await?;

        let available_assignments = self.available_assignments(partner.id).await?;
        let current_assignments = mine()
            .filter(delivery_assignment::Column::Status.is_in([
                DeliveryStatus::Accepted,
                DeliveryStatus::PickedUp,
                DeliveryStatus::InTransit,
            ]))
            .order_by_asc(delivery_assignment::Column::ScheduledDeliveryTime)
            .all(db)
            .await?
            .into_iter()
            .map(|a| self.view(a))
            .collect();

        Ok(DeliveryDashboard {
            partner: PartnerProfile {
                name: partner.name.clone(),
                is_verified: partner.is_verified,
                verification_status: partner.verification_status,
                is_available: partner.is_available,
                rating_average: partner.rating_average,
                rating_count: partner.rating_count,
                vehicle_type: partner.vehicle_type.clone(),
            },
            counts_by_status,
            today_deliveries,
            total_earnings: total.total_net,
            monthly_earnings: month.total_net,
            pending_earnings: total.pending_amount,
            available_assignments,
            current_assignments,
        })
    }

    /// Assignments offered to this partner and not yet answered.
    pub async fn available_assignments(&self, partner_id: Uuid) -> Result<Vec<AssignmentView>, ServiceError> {
        Ok(AssignmentEntity::find()
            .filter(delivery_assignment::Column::DeliveryPartnerId.eq(partner_id))
            .filter(delivery_assignment::Column::Status.eq(DeliveryStatus::Assigned))
            .order_by_asc(delivery_assignment::Column::AssignedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|a| self.view(a))
            .collect())
    }

    pub async fn list_assignments(
        &self,
        partner_id: Uuid,
        status: Option<DeliveryStatus>,
        page: PageRequest,
    ) -> Result<Page<AssignmentView>, ServiceError> {
        let mut query = AssignmentEntity::find()
            .filter(delivery_assignment::Column::DeliveryPartnerId.eq(partner_id))
            .order_by_desc(delivery_assignment::Column::AssignedAt);
        if let Some(status) = status {
            query = query.filter(delivery_assignment::Column::Status.eq(status));
        }
        Ok(fetch_page(&self.db, query, page).await?.map(|a| self.view(a)))
    }

    #[instrument(skip(self))]
    pub async fn accept(
        &self,
        partner: &user::Model,
        assignment_id: Uuid,
    ) -> Result<AssignmentView, ServiceError> {
        let current = self.owned(partner.id, assignment_id).await?;
        if current.status != DeliveryStatus::Assigned {
            return Err(ServiceError::InvalidStatus(
                "Assignment is no longer available".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let mut active: delivery_assignment::ActiveModel = current.into();
        active.status = Set(DeliveryStatus::Accepted);
        active.accepted_at = Set(Some(now));
        active.updated_at = Set(now);
        let accepted = active.update(&txn).await?;

        let (order, _) = load_order(&txn, accepted.order_id).await?;
        let partner_id = partner.id;
        transition_order(&txn, &order, OrderStatus::OutForDelivery, move |a| {
            a.delivery_partner_id = Set(Some(partner_id));
        })
        .await?;
        txn.commit().await?;

        info!(%assignment_id, order_id = %order.id, "assignment accepted");
        let mut effects = Effects::default();
        effects.notify(templates::out_for_delivery(
            order.user_id,
            order.id,
            &order.tracking_number,
            &partner.name,
        ));
        effects.emit(Event::OrderOutForDelivery {
            order_id: order.id,
            assignment_id,
        });
        effects.emit(Event::OrderStatusChanged {
            order_id: order.id,
            from: order.order_status,
            to: OrderStatus::OutForDelivery,
        });
        self.workflow.publish(effects).await;
        Ok(self.view(accepted))
    }

    /// Declines an offered assignment; the order goes back into the
    /// assignment queue immediately.
    #[instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        partner_id: Uuid,
        assignment_id: Uuid,
        reason: Option<String>,
    ) -> Result<AssignmentView, ServiceError> {
        let current = self.owned(partner_id, assignment_id).await?;
        if current.status != DeliveryStatus::Assigned {
            return Err(ServiceError::InvalidStatus(
                "Only offered assignments can be rejected".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let issues = append_issue(
            current.issues.clone(),
            "rejected",
            reason.as_deref().unwrap_or("Declined by delivery partner"),
        );
        let vendor_id = current.vendor_id;
        let mut active: delivery_assignment::ActiveModel = current.into();
        active.status = Set(DeliveryStatus::Cancelled);
        active.issues = Set(Some(issues));
        active.updated_at = Set(now);
        let cancelled = active.update(&txn).await?;

        let (order, _) = load_order(&txn, cancelled.order_id).await?;
        let mut order_active: order::ActiveModel = order.clone().into();
        order_active.delivery_partner_id = Set(None);
        order_active.estimated_delivery_time = Set(None);
        save_order(&txn, &order, order_active).await?;

        scheduler::schedule_with_payload(
            &txn,
            JobKind::AssignDelivery,
            order.id,
            now,
            Some(json!({ "vendor_id": vendor_id })),
        )
        .await?;
        txn.commit().await?;

        info!(%assignment_id, order_id = %order.id, "assignment rejected, reassigning");
        Ok(self.view(cancelled))
    }

    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_status(
        &self,
        partner_id: Uuid,
        assignment_id: Uuid,
        request: UpdateDeliveryStatusRequest,
    ) -> Result<AssignmentView, ServiceError> {
        request.validate()?;
        let current = self.owned(partner_id, assignment_id).await?;
        let next = request.status;

        if next == DeliveryStatus::Cancelled || next == DeliveryStatus::Accepted {
            return Err(ServiceError::BadRequest(
                "Use the accept or reject endpoints to answer an assignment".to_string(),
            ));
        }
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Assignment cannot move from {} to {}",
                current.status, next
            )));
        }
        if next == DeliveryStatus::Delivered {
            if let Some(otp) = request.otp.as_deref() {
                if otp.trim() != current.delivery_otp {
                    return Err(ServiceError::BadRequest("Invalid delivery OTP".to_string()));
                }
            }
        }

        let now = Utc::now();
        let location = request.location.as_ref().map(|l| json!({
            "latitude": l.latitude,
            "longitude": l.longitude,
        }));
        let issues = current.issues.clone();
        let mut active: delivery_assignment::ActiveModel = current.into();
        active.status = Set(next);
        active.updated_at = Set(now);
        if let Some(loc) = &request.location {
            apply_location(&mut active, loc);
        }

        match next {
            DeliveryStatus::PickedUp => {
                active.actual_pickup_time = Set(Some(now));
                active.proof_of_pickup = Set(Some(json!({
                    "timestamp": now,
                    "notes": request.notes,
                    "location": location,
                })));
            }
            DeliveryStatus::Delivered => {
                active.actual_delivery_time = Set(Some(now));
                active.completed_at = Set(Some(now));
                active.proof_of_delivery = Set(Some(json!({
                    "timestamp": now,
                    "otp_verified": request.otp.is_some(),
                    "received_by": request.received_by,
                    "notes": request.notes,
                    "location": location,
                })));
            }
            DeliveryStatus::Failed => {
                active.issues = Set(Some(append_issue(
                    issues,
                    "delivery_failed",
                    request.notes.as_deref().unwrap_or("Delivery failed"),
                )));
            }
            _ => {}
        }

        let txn = self.db.begin().await?;
        let updated = active.update(&txn).await?;
        let mut effects = Effects::default();
        match next {
            DeliveryStatus::Delivered => {
                effects = self
                    .workflow
                    .handle_delivery_completion(&txn, &updated)
                    .await?;
            }
            DeliveryStatus::Failed => {
                let (order, _) = load_order(&txn, updated.order_id).await?;
                let reason = request.notes.as_deref().unwrap_or("Delivery failed");
                effects.notify(templates::delivery_failed(
                    order.user_id,
                    order.id,
                    &order.tracking_number,
                    reason,
                ));
                effects.notify(
                    templates::system_alert(
                        "Delivery failed",
                        format!(
                            "Assignment {} for order {} failed: {}",
                            updated.id, order.tracking_number, reason
                        ),
                    )
                    .order(order.id)
                    .delivery(updated.id),
                );
                warn!(%assignment_id, order_id = %order.id, %reason, "delivery failed");
            }
            _ => {}
        }
        txn.commit().await?;

        info!(%assignment_id, status = %next, "delivery status updated");
        self.workflow.publish(effects).await;
        Ok(self.view(updated))
    }

    pub async fn update_location(
        &self,
        partner_id: Uuid,
        assignment_id: Uuid,
        location: LocationUpdate,
    ) -> Result<AssignmentView, ServiceError> {
        location.validate()?;
        let current = self.owned(partner_id, assignment_id).await?;
        if !current.status.is_open() {
            return Err(ServiceError::InvalidStatus(format!(
                "Assignment is {} and no longer tracked",
                current.status
            )));
        }
        let mut active: delivery_assignment::ActiveModel = current.into();
        apply_location(&mut active, &location);
        active.updated_at = Set(Utc::now());
        Ok(self.view(active.update(&*self.db).await?))
    }

    pub async fn set_availability(
        &self,
        partner: user::Model,
        is_available: bool,
    ) -> Result<user::Model, ServiceError> {
        let partner_id = partner.id;
        let mut active: user::ActiveModel = partner.into();
        active.is_available = Set(is_available);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(%partner_id, is_available, "partner availability changed");
        Ok(updated)
    }

    /// Customer rating of a finished delivery; also folds the rating into
    /// the partner's running average.
    #[instrument(skip(self, request))]
    pub async fn submit_feedback(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        request: DeliveryFeedbackRequest,
    ) -> Result<AssignmentView, ServiceError> {
        request.validate()?;
        let txn = self.db.begin().await?;
        let (order, _) = load_order(&txn, order_id).await?;
        if order.user_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Only the customer can rate this delivery".to_string(),
            ));
        }
        if order.order_status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidStatus(
                "Feedback is accepted once the order is delivered".to_string(),
            ));
        }

        let assignment = AssignmentEntity::find()
            .filter(delivery_assignment::Column::OrderId.eq(order_id))
            .filter(delivery_assignment::Column::Status.eq(DeliveryStatus::Delivered))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Delivered assignment not found".to_string()))?;
        if assignment.customer_rating.is_some() {
            return Err(ServiceError::Conflict(
                "This delivery has already been rated".to_string(),
            ));
        }

        let partner_id = assignment.delivery_partner_id;
        let mut active: delivery_assignment::ActiveModel = assignment.into();
        active.customer_rating = Set(Some(request.rating));
        active.customer_feedback = Set(request.comment);
        active.updated_at = Set(Utc::now());
        let rated = active.update(&txn).await?;

        if let Some(partner) = UserEntity::find_by_id(partner_id).one(&txn).await? {
            let count = partner.rating_count;
            let average =
                (partner.rating_average * count as f64 + request.rating as f64) / (count + 1) as f64;
            let mut p: user::ActiveModel = partner.into();
            p.rating_average = Set((average * 100.0).round() / 100.0);
            p.rating_count = Set(count + 1);
            p.updated_at = Set(Utc::now());
            p.update(&txn).await?;
        }
        txn.commit().await?;
        Ok(self.view(rated))
    }
}

fn apply_location(active: &mut delivery_assignment::ActiveModel, loc: &LocationUpdate) {
    active.current_latitude = Set(Some(loc.latitude));
    active.current_longitude = Set(Some(loc.longitude));
    active.speed = Set(loc.speed);
    active.heading = Set(loc.heading);
    active.last_tracked_at = Set(Some(Utc::now()));
}

fn append_issue(existing: Option<Value>, kind: &str, description: &str) -> Value {
    let mut issues = match existing {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    issues.push(json!({
        "type": kind,
        "description": description,
        "reported_at": Utc::now(),
    }));
    Value::Array(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const MUMBAI: (f64, f64) = (19.0760, 72.8777);
    const PUNE: (f64, f64) = (18.5204, 73.8567);

    #[test]
    fn haversine_known_distance() {
        let km = haversine_km(MUMBAI, PUNE);
        assert!((115.0..125.0).contains(&km), "got {km}");
        assert_eq!(haversine_km(PUNE, PUNE), 0.0);
    }

    #[test]
    fn fee_is_base_plus_distance() {
        let cfg = DeliveryConfig::default();
        assert_eq!(delivery_fee(&cfg, 5.0), dec!(100));
        assert_eq!(delivery_fee(&cfg, 0.0), dec!(50));
        assert_eq!(delivery_fee(&cfg, 12.345), dec!(173.45));
    }

    #[test]
    fn issues_accumulate() {
        let first = append_issue(None, "rejected", "vehicle breakdown");
        let second = append_issue(Some(first), "delivery_failed", "customer absent");
        assert_eq!(second.as_array().map(Vec::len), Some(2));
        assert_eq!(second[1]["type"], "delivery_failed");
    }

    proptest! {
        #[test]
        fn haversine_is_symmetric_and_bounded(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let ab = haversine_km((lat1, lon1), (lat2, lon2));
            let ba = haversine_km((lat2, lon2), (lat1, lon1));
            prop_assert!((ab - ba).abs() < 1e-6);
            prop_assert!(ab >= 0.0);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }
    }
}
