//! Authentication middleware
//!
//! Session-based authentication for API routes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::ops::Deref;
use tower_sessions::Session;

use crate::entity::user;
use crate::error::AppError;
use crate::state::AppState;

/// Session key for storing the user id
pub const SESSION_USER_KEY: &str = "user_id";
pub const SESSION_TIMESTAMP_KEY: &str = "timestamp";

/// Database connection wrapper for use in handlers via Extension
#[derive(Clone)]
pub struct DbConn(pub DatabaseConnection);

impl Deref for DbConn {
    type Target = DatabaseConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<user::Model> for CurrentUser {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            is_admin: u.is_admin,
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }
    matches!(path, "/api/login" | "/api/health")
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(DbConn(state.db.clone()));

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let user_id: Option<i64> = session.get(SESSION_USER_KEY).await.unwrap_or(None);

    let Some(user_id) = user_id else {
        return AppError::Unauthorized.into_response();
    };

    match user::Entity::find_by_id(user_id).one(&state.db).await {
        Ok(Some(user_model)) if user_model.is_active => {
            request.extensions_mut().insert(CurrentUser::from(user_model));
            next.run(request).await
        }
        Ok(Some(_)) => {
            tracing::warn!("Inactive user rejected: {}", user_id);
            AppError::Unauthorized.into_response()
        }
        Ok(None) => {
            tracing::warn!("User not found in database: {}", user_id);
            AppError::Unauthorized.into_response()
        }
        Err(e) => AppError::Database(e).into_response(),
    }
}
