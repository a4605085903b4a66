//! OpLog entity - audit trail of membership changes
//!
//! Table: org_op_log

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operation type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Login,
    Logout,
    AddMember,
    RemoveMember,
    UpdateRole,
    AssignManager,
    UpdateDepartment,
    DeleteDepartment,
    UpdateMember,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Login => "login",
            OpType::Logout => "logout",
            OpType::AddMember => "add_member",
            OpType::RemoveMember => "remove_member",
            OpType::UpdateRole => "update_role",
            OpType::AssignManager => "assign_manager",
            OpType::UpdateDepartment => "update_department",
            OpType::DeleteDepartment => "delete_department",
            OpType::UpdateMember => "update_member",
        }
    }
}

/// Outcome recorded with each entry
pub const OP_SUCCESS: &str = "success";
pub const OP_REJECTED: &str = "rejected";
pub const OP_FAILED: &str = "failed";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "org_op_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Unix timestamp
    pub op_time: i64,

    #[sea_orm(column_type = "String(Some(255))")]
    pub user_email: String,

    #[sea_orm(column_type = "String(Some(32))")]
    pub op_type: String,

    #[sea_orm(column_type = "Text")]
    pub op_desc: String,

    #[sea_orm(column_type = "String(Some(16))")]
    pub result: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
