//! User lookup
//!
//! Backs the "add member" pickers on the company and department pages.

use axum::{extract::Query, response::Json, Extension};
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select};
use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppResult;
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const SEARCH_LIMIT: u64 = 5;
const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub email: String,
}

/// Search hit; never carries admin or password fields
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<user::Model> for UserSummary {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
        }
    }
}

/// GET /api/users/search?email=
///
/// Case-insensitive substring match on active accounts. Queries shorter
/// than two characters return nothing.
pub async fn search_users(
    Extension(db): Extension<DbConn>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<UserSummary>>>> {
    let Some(pattern) = email_pattern(&query.email) else {
        return Ok(Json(ApiResponse::success(Vec::new())));
    };

    let users = user_search(pattern).all(&*db).await?;
    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserSummary::from).collect(),
    )))
}

/// `%needle%` with LIKE wildcards in the needle escaped, lowercased
fn email_pattern(raw: &str) -> Option<String> {
    let needle = raw.trim().to_lowercase();
    if needle.chars().count() < MIN_QUERY_LEN {
        return None;
    }

    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

fn user_search(pattern: String) -> Select<user::Entity> {
    user::Entity::find()
        .filter(
            Expr::expr(Func::lower(Expr::col(user::Column::Email)))
                .like(LikeExpr::new(pattern).escape('\\')),
        )
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Email)
        .limit(SEARCH_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn test_email_pattern() {
        assert_eq!(email_pattern("  Ann@Example "), Some("%ann@example%".to_string()));
        assert_eq!(email_pattern("a"), None);
        assert_eq!(email_pattern("   "), None);
        assert_eq!(email_pattern("50%_off"), Some(r"%50\%\_off%".to_string()));
    }

    #[test]
    fn test_user_search_query() {
        let sql = user_search("%ann%".to_string())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("LIKE '%ann%'"), "{}", sql);
        assert!(sql.contains(r#""is_active""#), "{}", sql);
        assert!(sql.ends_with("LIMIT 5"), "{}", sql);
    }
}
