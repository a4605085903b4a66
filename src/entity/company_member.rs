//! CompanyMember entity - company-level roles
//!
//! Table: org_company_members

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::access::CompanyRole;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_company_members")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub company_id: i64,

    pub user_id: i64,

    /// admin, manager or member
    #[sea_orm(column_type = "String(Some(32))")]
    pub role: String,

    /// Job title shown on the company page
    #[sea_orm(column_type = "String(Some(128))", default_value = "")]
    pub position: String,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed role; unknown strings are treated as having no company role
    pub fn company_role(&self) -> Option<CompanyRole> {
        self.role.parse().ok()
    }
}
