//! Domain enumerations shared by entities, services and handlers.
//!
//! Every enum is stored as a short snake_case string column and serialized
//! the same way over the wire.

pub mod delivery;
pub mod earnings;
pub mod job;
pub mod notification;
pub mod order;
pub mod product;
pub mod user;

pub use delivery::{DeliveryPriority, DeliveryStatus};
pub use earnings::{EarningStatus, EarningUserType, PayoutMethod, TransactionType};
pub use job::{JobKind, JobStatus};
pub use notification::{
    NotificationPriority, NotificationStatus, NotificationType, RecipientType,
};
pub use order::{ItemStatus, OrderStatus, PaymentMethod, PaymentStatus, TimeSlot};
pub use product::{ProductCategory, ProductUnit};
pub use user::{UserRole, VerificationStatus};
