//! Authentication handlers
//!
//! Implements login, logout, and current user endpoints

use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Deserialize;
use tower_sessions::Session;

use crate::audit::log_operation;
use crate::entity::op_log::{OpType, OP_FAILED, OP_SUCCESS};
use crate::entity::user::{self, UserResponse};
use crate::error::{AppResult, OptionExt};
use crate::middleware::auth::{CurrentUser, SESSION_TIMESTAMP_KEY, SESSION_USER_KEY};
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/login
pub async fn login(
    Extension(db): Extension<DbConn>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "bad request"})),
        );
    }

    let user_result = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&*db)
        .await;

    let db_user = match user_result {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("Login failed: user not found - {}", email);
            log_operation(&email, OpType::Login, "unknown user", OP_FAILED);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "email or password error"})),
            );
        }
        Err(e) => {
            tracing::error!("Database error during login: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal error"})),
            );
        }
    };

    if !bcrypt::verify(&req.password, &db_user.password).unwrap_or(false) {
        tracing::warn!("Login failed: wrong password - {}", email);
        log_operation(&email, OpType::Login, "wrong password", OP_FAILED);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "email or password error"})),
        );
    }

    if !db_user.is_active {
        tracing::warn!("Login failed: user disabled - {}", email);
        log_operation(&email, OpType::Login, "user disabled", OP_FAILED);
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "user is disabled"})),
        );
    }

    if let Err(e) = session.insert(SESSION_USER_KEY, db_user.id).await {
        tracing::error!("Failed to save session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "internal error"})),
        );
    }
    if let Err(e) = session
        .insert(SESSION_TIMESTAMP_KEY, chrono::Utc::now().timestamp())
        .await
    {
        tracing::error!("Failed to save session timestamp: {}", e);
    }

    tracing::info!("User logged in: {}", email);
    log_operation(&email, OpType::Login, "", OP_SUCCESS);

    (
        StatusCode::OK,
        Json(serde_json::json!({"message": "login success"})),
    )
}

/// POST /api/logout
pub async fn logout(
    session: Session,
    Extension(current_user): Extension<CurrentUser>,
) -> impl IntoResponse {
    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(500, "internal error")),
        );
    }

    log_operation(&current_user.email, OpType::Logout, "", OP_SUCCESS);

    (
        StatusCode::OK,
        Json(ApiResponse::success_msg("logout success")),
    )
}

/// GET /api/user/current
pub async fn current_user(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let model = user::Entity::find_by_id(user.id)
        .one(&*db)
        .await?
        .ok_or_not_found("User not found")?;
    Ok(Json(ApiResponse::success(UserResponse::from(model))))
}
