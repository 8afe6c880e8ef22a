use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use super::current;
use crate::models::{EarningStatus, EarningUserType, PayoutMethod, TransactionType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "earnings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_type: EarningUserType,
    pub order_id: Uuid,
    pub delivery_assignment_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub gross_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub platform_fee: Decimal,
    pub processing_fee: Decimal,
    pub penalty: Decimal,
    pub other_deductions: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub status: EarningStatus,
    pub payment_method: Option<PayoutMethod>,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub period_year: i32,
    pub period_month: i32,
    pub period_week: i32,
    pub period_day: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// Amounts derived from the gross figure and the configured rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breakdown {
    pub commission_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_deductions: Decimal,
    pub net_amount: Decimal,
}

impl Breakdown {
    pub fn compute(
        gross: Decimal,
        commission_rate: Decimal,
        tax_rate: Decimal,
        deductions: [Decimal; 4],
    ) -> Self {
        let commission_amount = (gross * commission_rate / Decimal::ONE_HUNDRED).round_dp(2);
        let tax_amount = (gross * tax_rate / Decimal::ONE_HUNDRED).round_dp(2);
        let total_deductions: Decimal = deductions.iter().copied().sum();
        Self {
            commission_amount,
            tax_amount,
            total_deductions,
            net_amount: gross - commission_amount - tax_amount - total_deductions,
        }
    }
}

/// Calendar bucket of a timestamp: (year, month, week of month, day).
pub fn period_of(at: DateTime<Utc>) -> (i32, i32, i32, i32) {
    let day = at.day() as i32;
    (at.year(), at.month() as i32, (day + 6) / 7, day)
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let zero = Decimal::ZERO;
        let breakdown = Breakdown::compute(
            current(&self.gross_amount).unwrap_or(zero),
            current(&self.commission_rate).unwrap_or(zero),
            current(&self.tax_rate).unwrap_or(zero),
            [
                current(&self.platform_fee).unwrap_or(zero),
                current(&self.processing_fee).unwrap_or(zero),
                current(&self.penalty).unwrap_or(zero),
                current(&self.other_deductions).unwrap_or(zero),
            ],
        );
        self.commission_amount = Set(breakdown.commission_amount);
        self.tax_amount = Set(breakdown.tax_amount);
        self.net_amount = Set(breakdown.net_amount);

        if insert {
            let created_at = current(&self.created_at).unwrap_or_else(Utc::now);
            let (year, month, week, day) = period_of(created_at);
            self.created_at = Set(created_at);
            self.period_year = Set(year);
            self.period_month = Set(month);
            self.period_week = Set(week);
            self.period_day = Set(day);
        }
        self.updated_at = Set(Utc::now());
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn vendor_sale_breakdown() {
        let b = Breakdown::compute(dec!(2400), dec!(10), dec!(0), [dec!(0); 4]);
        assert_eq!(b.commission_amount, dec!(240));
        assert_eq!(b.net_amount, dec!(2160));
    }

    #[test]
    fn deductions_and_tax_reduce_net() {
        let b = Breakdown::compute(
            dec!(1000),
            dec!(5),
            dec!(18),
            [dec!(10), dec!(2.5), dec!(0), dec!(7.5)],
        );
        assert_eq!(b.commission_amount, dec!(50));
        assert_eq!(b.tax_amount, dec!(180));
        assert_eq!(b.total_deductions, dec!(20));
        assert_eq!(b.net_amount, dec!(750));
    }

    #[test]
    fn week_of_month_is_ceil_of_day_over_seven() {
        let at = |d| Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap();
        assert_eq!(period_of(at(1)), (2025, 3, 1, 1));
        assert_eq!(period_of(at(7)), (2025, 3, 1, 7));
        assert_eq!(period_of(at(8)), (2025, 3, 2, 8));
        assert_eq!(period_of(at(31)), (2025, 3, 5, 31));
    }

    proptest! {
        #[test]
        fn net_plus_parts_equals_gross(
            gross in 0u64..10_000_000,
            rate in 0u32..=100,
            fee in 0u64..10_000,
        ) {
            let gross = Decimal::new(gross as i64, 2);
            let fee = Decimal::new(fee as i64, 2);
            let b = Breakdown::compute(gross, Decimal::from(rate), Decimal::ZERO, [fee, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO]);
            prop_assert_eq!(b.net_amount + b.commission_amount + b.tax_amount + b.total_deductions, gross);
        }
    }
}
