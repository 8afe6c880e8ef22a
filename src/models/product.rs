use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductCategory {
    #[sea_orm(string_value = "urea")]
    Urea,
    #[sea_orm(string_value = "dap")]
    Dap,
    #[sea_orm(string_value = "npk")]
    Npk,
    #[sea_orm(string_value = "organic")]
    Organic,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductUnit {
    #[default]
    #[sea_orm(string_value = "kg")]
    Kg,
    #[sea_orm(string_value = "ton")]
    Ton,
}
