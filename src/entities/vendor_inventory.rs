use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use super::current;

/// Days ahead of expiry at which a batch is flagged.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_inventory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub product_id: Uuid,
    pub stock: i32,
    pub reserved_stock: i32,
    pub available_stock: i32,
    pub min_stock_level: i32,
    pub max_stock_level: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub discount_percentage: Decimal,
    pub final_price: Decimal,
    pub is_active: bool,
    pub last_restocked: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub batch_number: Option<String>,
    pub manufacturing_date: Option<DateTime<Utc>>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub low_stock: bool,
    pub near_expiry: bool,
    pub out_of_stock: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

/// Alert flags derived from availability and expiry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StockAlerts {
    pub low_stock: bool,
    pub near_expiry: bool,
    pub out_of_stock: bool,
}

impl StockAlerts {
    pub fn evaluate(
        available: i32,
        min_stock_level: i32,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            low_stock: available <= min_stock_level,
            near_expiry: expiry_date
                .map(|expiry| expiry <= now + Duration::days(NEAR_EXPIRY_DAYS))
                .unwrap_or(false),
            out_of_stock: available <= 0,
        }
    }
}

/// Selling price after the percentage discount, rounded to paise.
pub fn discounted_price(selling_price: Decimal, discount_percentage: Decimal) -> Decimal {
    (selling_price * (Decimal::ONE_HUNDRED - discount_percentage) / Decimal::ONE_HUNDRED)
        .round_dp(2)
}

impl Model {
    /// Margin of the final price over cost, in percent.
    pub fn profit_margin(&self) -> Option<Decimal> {
        if self.cost_price.is_zero() {
            return None;
        }
        Some(
            ((self.final_price - self.cost_price) / self.cost_price * Decimal::ONE_HUNDRED)
                .round_dp(2),
        )
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Keeps `available_stock`, `final_price` and the alert flags in step
    /// with the fields they derive from on every write.
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let stock = current(&self.stock).unwrap_or_default();
        let reserved = current(&self.reserved_stock).unwrap_or_default();
        let available = stock - reserved;
        self.available_stock = Set(available);

        if let (Some(selling), Some(discount)) = (
            current(&self.selling_price),
            current(&self.discount_percentage),
        ) {
            self.final_price = Set(discounted_price(selling, discount));
        }

        let alerts = StockAlerts::evaluate(
            available,
            current(&self.min_stock_level).unwrap_or_default(),
            current(&self.expiry_date).flatten(),
            Utc::now(),
        );
        self.low_stock = Set(alerts.low_stock);
        self.near_expiry = Set(alerts.near_expiry);
        self.out_of_stock = Set(alerts.out_of_stock);
        self.updated_at = Set(Utc::now());
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn alerts_follow_availability_and_expiry() {
        let now = Utc::now();
        let alerts = StockAlerts::evaluate(10, 10, Some(now + Duration::days(5)), now);
        assert_eq!(
            alerts,
            StockAlerts {
                low_stock: true,
                near_expiry: true,
                out_of_stock: false
            }
        );

        let healthy = StockAlerts::evaluate(50, 10, Some(now + Duration::days(90)), now);
        assert_eq!(healthy, StockAlerts::default());

        let empty = StockAlerts::evaluate(0, 10, None, now);
        assert!(empty.out_of_stock && empty.low_stock && !empty.near_expiry);
    }

    #[test]
    fn discount_is_applied_as_percentage() {
        assert_eq!(discounted_price(dec!(1200), dec!(10)), dec!(1080));
        assert_eq!(discounted_price(dec!(99.99), dec!(0)), dec!(99.99));
        assert_eq!(discounted_price(dec!(250), dec!(100)), dec!(0));
    }
}
