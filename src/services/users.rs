use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::notifications::{templates, NotificationService};
use super::{fetch_page, Page, PageRequest};
use crate::auth::{hash_password, verify_password, AccessToken, AuthService};
use crate::entities::user::{self, Entity as UserEntity};
use crate::errors::ServiceError;
use crate::models::{RecipientType, UserRole, VerificationStatus};

const DEFAULT_SERVICE_RADIUS_KM: i32 = 10;

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{10,14}$").unwrap());

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(value.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Phone must be 10-14 digits, optionally prefixed with +".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub business_name: Option<String>,
    pub gst_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub business_name: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: user::Model,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    notifications: NotificationService,
    default_commission_rate: Decimal,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        notifications: NotificationService,
        default_commission_rate: Decimal,
    ) -> Self {
        Self {
            db,
            auth,
            notifications,
            default_commission_rate,
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let role = request.role.unwrap_or(UserRole::Customer);
        if role == UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Admin accounts cannot be self-registered".to_string(),
            ));
        }

        let email = request.email.trim().to_lowercase();
        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        // Vendors and delivery partners wait for an admin review.
        let needs_review = matches!(role, UserRole::Vendor | UserRole::DeliveryPartner);
        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(email),
            phone: Set(request.phone),
            password_hash: Set(hash_password(&request.password)?),
            role: Set(role),
            is_verified: Set(!needs_review),
            is_active: Set(true),
            street: Set(request.street),
            city: Set(request.city),
            state: Set(request.state),
            pincode: Set(request.pincode),
            latitude: Set(request.latitude),
            longitude: Set(request.longitude),
            business_name: Set(request.business_name),
            gst_number: Set(request.gst_number),
            commission_rate: Set(self.default_commission_rate),
            vehicle_type: Set(request.vehicle_type),
            vehicle_number: Set(request.vehicle_number),
            is_available: Set(true),
            service_radius_km: Set(DEFAULT_SERVICE_RADIUS_KM),
            verification_status: Set(if needs_review {
                VerificationStatus::Pending
            } else {
                VerificationStatus::Verified
            }),
            rating_average: Set(0.0),
            rating_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(user_id = %created.id, role = %created.role, "user registered");
        if needs_review {
            let recipient = match role {
                UserRole::DeliveryPartner => RecipientType::DeliveryPartner,
                _ => RecipientType::Vendor,
            };
            self.notifications
                .send_all(vec![templates::new_vendor_registration(
                    created.id,
                    created.display_name(),
                    recipient,
                )])
                .await;
        }

        Ok(AuthResponse {
            token: self.auth.issue_token(&created)?,
            user: created,
        })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let invalid = || ServiceError::Unauthorized("Invalid email or password".to_string());

        let user = self
            .find_by_email(&request.email.trim().to_lowercase())
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&request.password, &user.password_hash) {
            warn!(user_id = %user.id, "failed login attempt");
            return Err(invalid());
        }
        if !user.is_active {
            return Err(ServiceError::Unauthorized("Account is deactivated".to_string()));
        }

        Ok(AuthResponse {
            token: self.auth.issue_token(&user)?,
            user,
        })
    }

    pub async fn update_profile(
        &self,
        current: user::Model,
        request: UpdateProfileRequest,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let mut active: user::ActiveModel = current.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(street) = request.street {
            active.street = Set(Some(street));
        }
        if let Some(city) = request.city {
            active.city = Set(Some(city));
        }
        if let Some(state) = request.state {
            active.state = Set(Some(state));
        }
        if let Some(pincode) = request.pincode {
            active.pincode = Set(Some(pincode));
        }
        if let Some(latitude) = request.latitude {
            active.latitude = Set(Some(latitude));
        }
        if let Some(longitude) = request.longitude {
            active.longitude = Set(Some(longitude));
        }
        if let Some(business) = request.business_name {
            active.business_name = Set(Some(business));
        }
        if let Some(vehicle) = request.vehicle_type {
            active.vehicle_type = Set(Some(vehicle));
        }
        if let Some(number) = request.vehicle_number {
            active.vehicle_number = Set(Some(number));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn list(
        &self,
        role: Option<UserRole>,
        page: PageRequest,
    ) -> Result<Page<user::Model>, ServiceError> {
        let mut query = UserEntity::find().order_by_desc(user::Column::CreatedAt);
        if let Some(role) = role {
            query = query.filter(user::Column::Role.eq(role));
        }
        fetch_page(&self.db, query, page).await
    }

    async fn get(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        UserEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    /// Records the outcome of an onboarding review.
    #[instrument(skip(self))]
    pub async fn set_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
    ) -> Result<user::Model, ServiceError> {
        let existing = self.get(id).await?;
        if !matches!(existing.role, UserRole::Vendor | UserRole::DeliveryPartner) {
            return Err(ServiceError::BadRequest(
                "Only vendors and delivery partners go through verification".to_string(),
            ));
        }
        let mut active: user::ActiveModel = existing.into();
        active.verification_status = Set(status);
        active.is_verified = Set(status == VerificationStatus::Verified);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(user_id = %id, %status, "verification status changed");
        Ok(updated)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<user::Model, ServiceError> {
        let existing = self.get(id).await?;
        let mut active: user::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(user_id = %id, is_active, "account activation changed");
        Ok(updated)
    }
}
