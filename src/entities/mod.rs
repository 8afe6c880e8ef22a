//! SeaORM entities, one module per table.

pub mod delivery_assignment;
pub mod earning;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod product;
pub mod scheduled_job;
pub mod user;
pub mod vendor_inventory;

use sea_orm::ActiveValue;

/// Value currently held by an active model field, whether freshly set or
/// loaded from the database.
pub(crate) fn current<V>(value: &ActiveValue<V>) -> Option<V>
where
    V: Into<sea_orm::Value> + Clone,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}
