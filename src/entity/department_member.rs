//! DepartmentMember entity - one row per (department, user)
//!
//! Table: org_department_members
//!
//! `manager_id` points at another row of this table in the same department.
//! The storage layer does not prevent cycles; writers must consult
//! [`crate::hierarchy::would_create_cycle`] first.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::hierarchy::HierarchyMember;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_department_members")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub department_id: i64,

    pub user_id: i64,

    /// Free-text title, e.g. "Designer"
    #[sea_orm(column_type = "String(Some(64))")]
    pub role: String,

    /// NULL means top-level
    #[sea_orm(nullable)]
    pub manager_id: Option<i64>,

    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Join in display fields from the owning user row
    pub fn into_hierarchy_member(self, user: Option<&user::Model>) -> HierarchyMember {
        HierarchyMember {
            id: self.id,
            department_id: self.department_id,
            user_id: self.user_id,
            role: self.role,
            manager_id: self.manager_id,
            user_name: user.map(|u| u.name.clone()).unwrap_or_else(|| "Unknown".to_string()),
            user_email: user.map(|u| u.email.clone()).unwrap_or_default(),
        }
    }
}
