use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{fetch_page, Page, PageRequest};
use crate::entities::earning::{self, Entity as EarningEntity};
use crate::errors::ServiceError;
use crate::models::{EarningStatus, EarningUserType, PayoutMethod, TransactionType};

/// An earning to append to the ledger.
#[derive(Debug, Clone)]
pub struct NewEarning {
    pub user_id: Uuid,
    pub user_type: EarningUserType,
    pub order_id: Uuid,
    pub delivery_assignment_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub gross_amount: Decimal,
    pub commission_rate: Decimal,
    pub tax_rate: Decimal,
    pub description: Option<String>,
}

impl NewEarning {
    pub fn sale(vendor_id: Uuid, order_id: Uuid, gross: Decimal, commission_rate: Decimal) -> Self {
        Self {
            user_id: vendor_id,
            user_type: EarningUserType::Vendor,
            order_id,
            delivery_assignment_id: None,
            transaction_type: TransactionType::Sale,
            gross_amount: gross,
            commission_rate,
            tax_rate: Decimal::ZERO,
            description: None,
        }
    }

    pub fn delivery(partner_id: Uuid, order_id: Uuid, assignment_id: Uuid, gross: Decimal) -> Self {
        Self {
            user_id: partner_id,
            user_type: EarningUserType::DeliveryPartner,
            order_id,
            delivery_assignment_id: Some(assignment_id),
            transaction_type: TransactionType::Delivery,
            gross_amount: gross,
            commission_rate: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarningFilters {
    pub status: Option<EarningStatus>,
    pub transaction_type: Option<TransactionType>,
    pub year: Option<i32>,
    pub month: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EarningsSummary {
    pub total_gross: Decimal,
    pub total_net: Decimal,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
    pub total_deductions: Decimal,
    pub transaction_count: u64,
    pub pending_amount: Decimal,
    pub paid_amount: Decimal,
}

impl EarningsSummary {
    fn add(&mut self, row: &earning::Model) {
        self.total_gross += row.gross_amount;
        self.total_net += row.net_amount;
        self.total_commission += row.commission_amount;
        self.total_tax += row.tax_amount;
        self.total_deductions +=
            row.platform_fee + row.processing_fee + row.penalty + row.other_deductions;
        self.transaction_count += 1;
        match row.status {
            EarningStatus::Pending | EarningStatus::Processed => self.pending_amount += row.net_amount,
            EarningStatus::Paid => self.paid_amount += row.net_amount,
            EarningStatus::Failed | EarningStatus::Disputed => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyEarnings {
    pub month: i32,
    pub total_gross: Decimal,
    pub total_net: Decimal,
    pub transaction_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_method: PayoutMethod,
    pub payment_reference: Option<String>,
}

/// Appends an earning on any connection, including an open transaction.
pub async fn record<C>(
    conn: &C,
    new: NewEarning,
    currency: &str,
) -> Result<earning::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let zero = Decimal::ZERO;
    let row = earning::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(new.user_id),
        user_type: Set(new.user_type),
        order_id: Set(new.order_id),
        delivery_assignment_id: Set(new.delivery_assignment_id),
        transaction_type: Set(new.transaction_type),
        gross_amount: Set(new.gross_amount),
        commission_rate: Set(new.commission_rate),
        tax_rate: Set(new.tax_rate),
        platform_fee: Set(zero),
        processing_fee: Set(zero),
        penalty: Set(zero),
        other_deductions: Set(zero),
        currency: Set(currency.to_string()),
        status: Set(EarningStatus::Pending),
        payment_method: Set(None),
        payment_reference: Set(None),
        paid_at: Set(None),
        description: Set(new.description),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!(
        earning_id = %row.id,
        user_id = %row.user_id,
        kind = %row.transaction_type,
        net = %row.net_amount,
        "earning recorded"
    );
    Ok(row)
}

#[derive(Clone)]
pub struct EarningsService {
    db: Arc<DatabaseConnection>,
}

impl EarningsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filters))]
    pub async fn list(
        &self,
        user_id: Uuid,
        filters: EarningFilters,
        page: PageRequest,
    ) -> Result<Page<earning::Model>, ServiceError> {
        let mut query = EarningEntity::find()
            .filter(earning::Column::UserId.eq(user_id))
            .order_by_desc(earning::Column::CreatedAt);
        if let Some(status) = filters.status {
            query = query.filter(earning::Column::Status.eq(status));
        }
        if let Some(kind) = filters.transaction_type {
            query = query.filter(earning::Column::TransactionType.eq(kind));
        }
        if let Some(year) = filters.year {
            query = query.filter(earning::Column::PeriodYear.eq(year));
        }
        if let Some(month) = filters.month {
            query = query.filter(earning::Column::PeriodMonth.eq(month));
        }
        fetch_page(&self.db, query, page).await
    }

    /// Totals over a user's ledger, optionally limited to a year and month.
    #[instrument(skip(self))]
    pub async fn summary(
        &self,
        user_id: Uuid,
        year: Option<i32>,
        month: Option<i32>,
    ) -> Result<EarningsSummary, ServiceError> {
        let mut query = EarningEntity::find().filter(earning::Column::UserId.eq(user_id));
        if let Some(year) = year {
            query = query.filter(earning::Column::PeriodYear.eq(year));
        }
        if let Some(month) = month {
            query = query.filter(earning::Column::PeriodMonth.eq(month));
        }

        let mut summary = EarningsSummary::default();
        for row in query.all(&*self.db).await? {
            summary.add(&row);
        }
        Ok(summary)
    }

    /// Totals of the current calendar month.
    pub async fn current_month(&self, user_id: Uuid) -> Result<EarningsSummary, ServiceError> {
        let now = Utc::now();
        self.summary(user_id, Some(now.year()), Some(now.month() as i32))
            .await
    }

    /// Per-month totals for one year, months ascending. Months without
    /// earnings are left out.
    #[instrument(skip(self))]
    pub async fn monthly_trend(
        &self,
        user_id: Uuid,
        year: i32,
    ) -> Result<Vec<MonthlyEarnings>, ServiceError> {
        let rows = EarningEntity::find()
            .filter(earning::Column::UserId.eq(user_id))
            .filter(earning::Column::PeriodYear.eq(year))
            .all(&*self.db)
            .await?;

        let mut months: BTreeMap<i32, MonthlyEarnings> = BTreeMap::new();
        for row in rows {
            let entry = months.entry(row.period_month).or_insert(MonthlyEarnings {
                month: row.period_month,
                total_gross: Decimal::ZERO,
                total_net: Decimal::ZERO,
                transaction_count: 0,
            });
            entry.total_gross += row.gross_amount;
            entry.total_net += row.net_amount;
            entry.transaction_count += 1;
        }
        Ok(months.into_values().collect())
    }

    pub async fn recent(&self, user_id: Uuid, limit: u64) -> Result<Vec<earning::Model>, ServiceError> {
        Ok(self
            .list(user_id, EarningFilters::default(), PageRequest::new(None, limit))
            .await?
            .items)
    }

    /// Settles a pending or processed earning.
    #[instrument(skip(self, request))]
    pub async fn mark_as_paid(
        &self,
        id: Uuid,
        request: MarkPaidRequest,
    ) -> Result<earning::Model, ServiceError> {
        let row = EarningEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Earning", id))?;

        if !row.status.is_payable() {
            return Err(ServiceError::InvalidStatus(format!(
                "Earning in status {} cannot be paid",
                row.status
            )));
        }

        let mut active: earning::ActiveModel = row.into();
        active.status = Set(EarningStatus::Paid);
        active.payment_method = Set(Some(request.payment_method));
        active.payment_reference = Set(request.payment_reference);
        active.paid_at = Set(Some(Utc::now()));
        let paid = active.update(&*self.db).await?;
        info!(earning_id = %paid.id, user_id = %paid.user_id, "earning paid out");
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn recorded_sale_has_derived_amounts_and_period() {
        let (_dir, db) = test_db().await;
        let vendor = Uuid::new_v4();
        let order = Uuid::new_v4();

        let row = record(
            &db,
            NewEarning::sale(vendor, order, dec!(2400), dec!(10)).describe("Sale for order ORDABCDEF"),
            "INR",
        )
        .await
        .unwrap();

        assert_eq!(row.commission_amount.round_dp(2), dec!(240));
        assert_eq!(row.net_amount.round_dp(2), dec!(2160));
        assert_eq!(row.status, EarningStatus::Pending);
        assert_eq!(row.currency, "INR");
        let now = Utc::now();
        assert_eq!(row.period_year, now.year());
        assert_eq!(row.period_month, now.month() as i32);
        assert_eq!(row.description.as_deref(), Some("Sale for order ORDABCDEF"));
    }

    #[tokio::test]
    async fn summary_trend_and_payout() {
        let (_dir, db) = test_db().await;
        let partner = Uuid::new_v4();
        for fee in [dec!(100), dec!(80)] {
            record(
                &db,
                NewEarning::delivery(partner, Uuid::new_v4(), Uuid::new_v4(), fee),
                "INR",
            )
            .await
            .unwrap();
        }
        let svc = EarningsService::new(Arc::new(db));

        let summary = svc.summary(partner, None, None).await.unwrap();
        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.total_net.round_dp(2), dec!(180));
        assert_eq!(summary.pending_amount.round_dp(2), dec!(180));

        let trend = svc.monthly_trend(partner, Utc::now().year()).await.unwrap();
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].transaction_count, 2);

        let first = svc.recent(partner, 1).await.unwrap().remove(0);
        let paid = svc
            .mark_as_paid(
                first.id,
                MarkPaidRequest {
                    payment_method: PayoutMethod::Upi,
                    payment_reference: Some("UTR123".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(paid.status, EarningStatus::Paid);
        assert!(paid.paid_at.is_some());

        assert_matches!(
            svc.mark_as_paid(
                first.id,
                MarkPaidRequest {
                    payment_method: PayoutMethod::Cash,
                    payment_reference: None
                }
            )
            .await,
            Err(ServiceError::InvalidStatus(_))
        );

        let after = svc.summary(partner, None, None).await.unwrap();
        assert_eq!(after.paid_amount.round_dp(2), paid.net_amount.round_dp(2));
    }
}
