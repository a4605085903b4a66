//! User entity - application accounts
//!
//! Table: auth_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Display name
    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// Login email (unique)
    #[sea_orm(column_type = "String(Some(255))", unique)]
    pub email: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// Global administrator
    pub is_admin: bool,

    pub is_active: bool,

    /// Unix timestamp
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// User response (no password)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            is_admin: model.is_admin,
        }
    }
}
