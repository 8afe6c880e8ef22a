//! Business services. Each service owns a handle to the connection pool and
//! exposes async operations returning [`ServiceError`].

pub mod dashboard;
pub mod delivery;
pub mod earnings;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod scheduler;
pub mod users;
pub mod workflow;

use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, Select};
use serde::Serialize;

use crate::errors::ServiceError;

/// One-based page request, already clamped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, per_page: u64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.max(1),
        }
    }

    fn index(&self) -> u64 {
        self.page - 1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Runs a paginated query and counts the full result set.
pub(crate) async fn fetch_page<E>(
    db: &DatabaseConnection,
    select: Select<E>,
    req: PageRequest,
) -> Result<Page<E::Model>, ServiceError>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let paginator = select.paginate(db, req.per_page);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(req.index()).await?;
    Ok(Page {
        items,
        total,
        page: req.page,
        per_page: req.per_page,
    })
}
