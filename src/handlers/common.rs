use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::entities::earning;
use crate::errors::ServiceError;
use crate::services::earnings::{EarningsService, EarningsSummary, MonthlyEarnings};
use crate::services::{Page, PageRequest};
use crate::ApiResponse;
use chrono::{Datelike, Utc};
use uuid::Uuid;

const RECENT_EARNINGS: u64 = 10;

/// `page` / `limit` query parameters shared by list endpoints.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Clamps the requested size to the configured bounds.
    pub fn to_request(self, config: &AppConfig) -> PageRequest {
        PageRequest::new(self.page, config.page_size(self.limit))
    }
}

/// Standard pagination response metadata
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn of<T>(page: &Page<T>) -> Self {
        Self {
            current_page: page.page,
            per_page: page.per_page,
            total: page.total,
            total_pages: page.total_pages(),
            has_next: page.has_next(),
            has_prev: page.has_prev(),
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> From<Page<T>> for PaginatedResponse<T> {
    fn from(page: Page<T>) -> Self {
        let pagination = PaginationMeta::of(&page);
        Self {
            items: page.items,
            pagination,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<i32>,
}

/// Earnings page shared by vendors and delivery partners.
#[derive(Debug, Serialize)]
pub struct EarningsOverview {
    pub summary: EarningsSummary,
    pub current_month: EarningsSummary,
    pub recent: Vec<earning::Model>,
}

pub async fn earnings_overview(
    earnings: &EarningsService,
    user_id: Uuid,
    period: PeriodQuery,
) -> Result<EarningsOverview, ServiceError> {
    if let Some(month) = period.month {
        if !(1..=12).contains(&month) {
            return Err(ServiceError::BadRequest(format!("Invalid month: {}", month)));
        }
    }
    Ok(EarningsOverview {
        summary: earnings.summary(user_id, period.year, period.month).await?,
        current_month: earnings.current_month(user_id).await?,
        recent: earnings.recent(user_id, RECENT_EARNINGS).await?,
    })
}

/// Month-by-month totals; defaults to the current year.
pub async fn earnings_trend(
    earnings: &EarningsService,
    user_id: Uuid,
    period: PeriodQuery,
) -> Result<Vec<MonthlyEarnings>, ServiceError> {
    let year = period.year.unwrap_or_else(|| Utc::now().year());
    earnings.monthly_trend(user_id, year).await
}

/// 201 with the standard envelope.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_reflects_page_position() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
            page: 2,
            per_page: 2,
        };
        let body = PaginatedResponse::from(page);
        assert_eq!(body.pagination.total_pages, 3);
        assert!(body.pagination.has_next);
        assert!(body.pagination.has_prev);
        assert_eq!(body.items, vec![1, 2]);
    }

    #[test]
    fn requested_limit_is_clamped() {
        let config = AppConfig::new(
            "sqlite::memory:".into(),
            "handler-test-secret-0123456789abcdef".into(),
            "127.0.0.1".into(),
            5000,
            "development".into(),
        );
        let req = PaginationParams {
            page: Some(0),
            limit: Some(10_000),
        }
        .to_request(&config);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, config.api_max_page_size);
    }
}
