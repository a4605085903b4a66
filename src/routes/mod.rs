use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(_code: i32, message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.session_secure)
        .with_http_only(true);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/user/current", get(handlers::auth::current_user))
        .route("/users/search", get(handlers::user::search_users))
        // Company routes
        .route(
            "/companies",
            get(handlers::company::list_companies).post(handlers::company::create_company),
        )
        .route(
            "/companies/:company_id/members",
            get(handlers::company::list_company_members).post(handlers::company::add_company_member),
        )
        .route(
            "/companies/:company_id/members/:user_id",
            post(handlers::company::update_company_member)
                .delete(handlers::company::remove_company_member),
        )
        .route(
            "/companies/:company_id/departments",
            get(handlers::company::list_departments).post(handlers::company::create_department),
        )
        .route("/companies/:company_id/org-chart", get(handlers::company::get_org_chart))
        // Department routes
        .route(
            "/departments/:dept_id",
            post(handlers::department::rename_department)
                .delete(handlers::department::delete_department),
        )
        .route(
            "/departments/:dept_id/members",
            get(handlers::department::list_members).post(handlers::department::add_member),
        )
        .route("/departments/:dept_id/tree", get(handlers::department::get_tree))
        .route(
            "/departments/:dept_id/members/:member_id",
            get(handlers::department::get_member).delete(handlers::department::remove_member),
        )
        .route(
            "/departments/:dept_id/members/:member_id/role",
            post(handlers::department::update_role),
        )
        .route(
            "/departments/:dept_id/members/:member_id/manager",
            post(handlers::department::assign_manager),
        )
        .route(
            "/departments/:dept_id/members/:member_id/eligible-managers",
            get(handlers::department::get_eligible_managers),
        );

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(404, "Not Found")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt;

    use crate::config::Config;

    fn app() -> Router {
        create_router(AppState::new(DatabaseConnection::Disconnected, Config::default()))
    }

    async fn status_of(method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app().oneshot(request).await.unwrap().status()
    }

    #[test]
    fn test_api_response_serialization() {
        let json = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(json["code"], true);
        assert_eq!(json["data"][1], 2);

        let json = serde_json::to_value(ApiResponse::<()>::error(400, "bad")).unwrap();
        assert_eq!(json["code"], false);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_health_is_public() {
        let status = tokio_test::block_on(status_of("GET", "/api/health"));
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_member_routes_require_session() {
        let status = tokio_test::block_on(status_of("GET", "/api/departments/1/members"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = tokio_test::block_on(status_of("POST", "/api/departments/1/members/2/manager"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_company_routes_require_session() {
        for (method, uri) in [
            ("GET", "/api/companies"),
            ("GET", "/api/companies/1/members"),
            ("DELETE", "/api/companies/1/members/2"),
            ("DELETE", "/api/departments/3"),
            ("GET", "/api/users/search?email=ann"),
        ] {
            let status = tokio_test::block_on(status_of(method, uri));
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[test]
    fn test_missing_session_uses_error_body() {
        let request = Request::builder()
            .uri("/api/user/current")
            .body(Body::empty())
            .unwrap();
        let response = tokio_test::block_on(app().oneshot(request)).unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = tokio_test::block_on(axum::body::to_bytes(response.into_body(), usize::MAX))
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], 401);
        assert_eq!(json["message"], "Unauthorized");
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let status = tokio_test::block_on(status_of("GET", "/nowhere"));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
