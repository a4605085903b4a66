//! Department entity
//!
//! Table: org_departments

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_departments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// auth_user.id of the creator; the creator manages the department
    pub created_by: i64,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
