pub mod admin;
pub mod auth;
pub mod common;
pub mod delivery;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod vendor;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    dashboard::DashboardService, delivery::DeliveryService, earnings::EarningsService,
    inventory::InventoryService, notifications::NotificationService, orders::OrderService,
    products::ProductService, scheduler::JobRunner, users::UserService,
    workflow::WorkflowService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: UserService,
    pub products: ProductService,
    pub inventory: InventoryService,
    pub orders: OrderService,
    pub workflow: WorkflowService,
    pub delivery: DeliveryService,
    pub earnings: EarningsService,
    pub notifications: NotificationService,
    pub dashboard: DashboardService,
    pub jobs: JobRunner,
}

impl AppServices {
    /// Wires every service over one connection pool and event channel.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        auth: Arc<AuthService>,
        events: EventSender,
    ) -> Self {
        let notifications = NotificationService::new(db.clone(), config.notifications.clone());
        Self::with_notifications(db, config, auth, events, notifications)
    }

    /// Same as [`AppServices::new`] with caller-supplied notification delivery.
    pub fn with_notifications(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        auth: Arc<AuthService>,
        events: EventSender,
        notifications: NotificationService,
    ) -> Self {
        let workflow = WorkflowService::new(
            db.clone(),
            notifications.clone(),
            events.clone(),
            config.workflow.clone(),
            config.delivery.clone(),
            config.default_currency.clone(),
        );
        let earnings = EarningsService::new(db.clone());
        let orders = OrderService::new(db.clone(), workflow.clone());
        let delivery = DeliveryService::new(
            db.clone(),
            workflow.clone(),
            earnings.clone(),
            config.delivery.clone(),
        );
        let dashboard = DashboardService::new(db.clone(), orders.clone(), earnings.clone());
        let jobs = JobRunner::new(
            db.clone(),
            workflow.clone(),
            notifications.clone(),
            events,
            config.workflow.clone(),
        );
        let users = UserService::new(
            db.clone(),
            auth,
            notifications.clone(),
            config.workflow.default_commission_rate,
        );

        Self {
            users,
            products: ProductService::new(db.clone()),
            inventory: InventoryService::new(db),
            orders,
            workflow,
            delivery,
            earnings,
            notifications,
            dashboard,
            jobs,
        }
    }
}
