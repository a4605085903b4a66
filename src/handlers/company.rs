//! Company handlers
//!
//! Companies visible to the caller, company membership (roles and
//! positions), department creation and listing, and the company-wide org
//! chart (one member tree per department).

use axum::{extract::Path, response::Json, Extension};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::CompanyRole;
use crate::audit::log_operation;
use crate::entity::op_log::{OpType, OP_SUCCESS};
use crate::entity::{company, company_member, department, user};
use crate::error::{unique_conflict, AppError, AppResult, OptionExt};
use crate::handlers::department::load_members;
use crate::hierarchy::{build_hierarchy_tree, HierarchyMember, TreeNode};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const MAX_NAME_LEN: usize = 128;
const MAX_POSITION_LEN: usize = 128;

/// Create company / department request
#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CompanyResponse {
    pub id: i64,
    pub name: String,
}

/// Company list entry with member and department counts
#[derive(Debug, Serialize)]
pub struct CompanySummary {
    pub id: i64,
    pub name: String,
    pub created_by: i64,
    pub created_at: i64,
    pub member_count: usize,
    pub dept_count: usize,
}

/// Company member with user display fields joined in
#[derive(Debug, Serialize)]
pub struct CompanyMemberResponse {
    pub user_id: i64,
    pub role: String,
    pub position: String,
    pub user_name: String,
    pub user_email: String,
}

/// Add company member request; the user is given by id or by exact email
#[derive(Debug, Deserialize)]
pub struct AddCompanyMemberRequest {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub position: Option<String>,
}

/// Change a company member's role and/or position
#[derive(Debug, Deserialize)]
pub struct UpdateCompanyMemberRequest {
    pub role: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepartmentResponse {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub created_by: i64,
}

impl From<department::Model> for DepartmentResponse {
    fn from(m: department::Model) -> Self {
        Self {
            id: m.id,
            company_id: m.company_id,
            name: m.name,
            created_by: m.created_by,
        }
    }
}

/// One department in the org chart
#[derive(Debug, Serialize)]
pub struct DepartmentChart {
    pub id: i64,
    pub name: String,
    pub member_count: usize,
    pub tree: Vec<TreeNode>,
}

/// GET /api/companies
///
/// Admins see every company, everyone else the companies they belong to.
/// Newest first.
pub async fn list_companies(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<CompanySummary>>>> {
    let mut query = company::Entity::find();
    if !user.is_admin {
        let ids: Vec<i64> = company_member::Entity::find()
            .filter(company_member::Column::UserId.eq(user.id))
            .all(&*db)
            .await?
            .into_iter()
            .map(|m| m.company_id)
            .collect();
        if ids.is_empty() {
            return Ok(Json(ApiResponse::success(Vec::new())));
        }
        query = query.filter(company::Column::Id.is_in(ids));
    }

    let companies = query
        .order_by_desc(company::Column::CreatedAt)
        .order_by_desc(company::Column::Id)
        .all(&*db)
        .await?;
    if companies.is_empty() {
        return Ok(Json(ApiResponse::success(Vec::new())));
    }

    let ids: Vec<i64> = companies.iter().map(|c| c.id).collect();
    let members = company_member::Entity::find()
        .filter(company_member::Column::CompanyId.is_in(ids.clone()))
        .all(&*db)
        .await?;
    let depts = department::Entity::find()
        .filter(department::Column::CompanyId.is_in(ids))
        .all(&*db)
        .await?;

    Ok(Json(ApiResponse::success(summarize_companies(
        companies,
        members.iter().map(|m| m.company_id),
        depts.iter().map(|d| d.company_id),
    ))))
}

/// Attach member and department counts, keeping company order
pub fn summarize_companies(
    companies: Vec<company::Model>,
    member_company_ids: impl IntoIterator<Item = i64>,
    dept_company_ids: impl IntoIterator<Item = i64>,
) -> Vec<CompanySummary> {
    let mut member_counts: HashMap<i64, usize> = HashMap::new();
    for id in member_company_ids {
        *member_counts.entry(id).or_default() += 1;
    }
    let mut dept_counts: HashMap<i64, usize> = HashMap::new();
    for id in dept_company_ids {
        *dept_counts.entry(id).or_default() += 1;
    }

    companies
        .into_iter()
        .map(|c| CompanySummary {
            member_count: member_counts.get(&c.id).copied().unwrap_or(0),
            dept_count: dept_counts.get(&c.id).copied().unwrap_or(0),
            id: c.id,
            name: c.name,
            created_by: c.created_by,
            created_at: c.created_at,
        })
        .collect()
}

/// POST /api/companies
///
/// The creator becomes the company's admin.
pub async fn create_company(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<NameRequest>,
) -> AppResult<Json<ApiResponse<CompanyResponse>>> {
    let name = validate_name(&req.name)?;
    let now = chrono::Utc::now().timestamp();

    let txn = db.begin().await?;
    let created = company::ActiveModel {
        name: Set(name),
        created_by: Set(user.id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    company_member::ActiveModel {
        company_id: Set(created.id),
        user_id: Set(user.id),
        role: Set(CompanyRole::Admin.as_str().to_string()),
        position: Set(String::new()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!("Company {} created by {}", created.id, user.email);
    Ok(Json(ApiResponse::success(CompanyResponse {
        id: created.id,
        name: created.name,
    })))
}

/// GET /api/companies/:company_id/members
pub async fn list_company_members(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(company_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<CompanyMemberResponse>>>> {
    load_company(&*db, company_id).await?;
    require_company_access(&*db, &user, company_id).await?;

    let rows = company_member::Entity::find()
        .filter(company_member::Column::CompanyId.eq(company_id))
        .order_by_asc(company_member::Column::Id)
        .all(&*db)
        .await?;
    let user_ids: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
    let users: HashMap<i64, user::Model> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&*db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect()
    };

    Ok(Json(ApiResponse::success(
        rows.into_iter()
            .map(|r| {
                let u = users.get(&r.user_id);
                company_member_response(r, u)
            })
            .collect(),
    )))
}

/// POST /api/companies/:company_id/members
pub async fn add_company_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(company_id): Path<i64>,
    Json(req): Json<AddCompanyMemberRequest>,
) -> AppResult<Json<ApiResponse<CompanyMemberResponse>>> {
    let company = load_company(&*db, company_id).await?;
    require_company_manage(&*db, &user, company_id).await?;

    let role = parse_company_role(req.role.as_deref().unwrap_or(CompanyRole::Member.as_str()))?;
    let position = normalize_position(req.position.as_deref().unwrap_or(""))?;

    let target = match (req.user_id, req.email.as_deref().map(str::trim)) {
        (Some(id), _) => user::Entity::find_by_id(id).one(&*db).await?,
        (None, Some(email)) if !email.is_empty() => {
            user::Entity::find()
                .filter(user::Column::Email.eq(email))
                .one(&*db)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Either user_id or email is required".to_string(),
            ))
        }
    }
    .ok_or_not_found("User not found")?;

    let row = company_member::ActiveModel {
        company_id: Set(company_id),
        user_id: Set(target.id),
        role: Set(role.as_str().to_string()),
        position: Set(position),
        created_at: Set(chrono::Utc::now().timestamp()),
        ..Default::default()
    }
    .insert(&*db)
    .await
    .map_err(|e| unique_conflict(e, "User is already a member of this company"))?;

    tracing::info!("User {} joined company {} as {}", target.id, company_id, row.role);
    log_operation(
        &user.email,
        OpType::AddMember,
        &format!("{} -> {} ({})", target.email, company.name, row.role),
        OP_SUCCESS,
    );

    Ok(Json(ApiResponse::success(company_member_response(row, Some(&target)))))
}

/// POST /api/companies/:company_id/members/:user_id
pub async fn update_company_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((company_id, member_user_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateCompanyMemberRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    load_company(&*db, company_id).await?;
    require_company_manage(&*db, &user, company_id).await?;

    if req.role.is_none() && req.position.is_none() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let row = find_company_member(&*db, company_id, member_user_id).await?;
    let mut active: company_member::ActiveModel = row.into();
    let mut changes = Vec::new();
    if let Some(role) = req.role.as_deref() {
        let role = parse_company_role(role)?;
        active.role = Set(role.as_str().to_string());
        changes.push(format!("role={}", role.as_str()));
    }
    if let Some(position) = req.position.as_deref() {
        let position = normalize_position(position)?;
        changes.push(format!("position={}", position));
        active.position = Set(position);
    }
    active.update(&*db).await?;

    log_operation(
        &user.email,
        OpType::UpdateMember,
        &format!("user {} of company {}: {}", member_user_id, company_id, changes.join(", ")),
        OP_SUCCESS,
    );
    Ok(Json(ApiResponse::success_msg("success")))
}

/// DELETE /api/companies/:company_id/members/:user_id
///
/// Department memberships are left in place.
pub async fn remove_company_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((company_id, member_user_id)): Path<(i64, i64)>,
) -> AppResult<Json<ApiResponse<()>>> {
    load_company(&*db, company_id).await?;
    require_company_manage(&*db, &user, company_id).await?;

    let row = find_company_member(&*db, company_id, member_user_id).await?;
    company_member::Entity::delete_by_id(row.id).exec(&*db).await?;

    tracing::info!("User {} removed from company {}", member_user_id, company_id);
    log_operation(
        &user.email,
        OpType::RemoveMember,
        &format!("user {} of company {}", member_user_id, company_id),
        OP_SUCCESS,
    );
    Ok(Json(ApiResponse::success_msg("success")))
}

fn company_member_response(
    row: company_member::Model,
    user: Option<&user::Model>,
) -> CompanyMemberResponse {
    CompanyMemberResponse {
        user_id: row.user_id,
        role: row.role,
        position: row.position,
        user_name: user.map(|u| u.name.clone()).unwrap_or_else(|| "Unknown".to_string()),
        user_email: user.map(|u| u.email.clone()).unwrap_or_default(),
    }
}

fn parse_company_role(role: &str) -> AppResult<CompanyRole> {
    role.trim().parse().map_err(AppError::Validation)
}

fn normalize_position(position: &str) -> AppResult<String> {
    let position = position.trim();
    if position.chars().count() > MAX_POSITION_LEN {
        return Err(AppError::Validation(format!(
            "Position must not exceed {} characters",
            MAX_POSITION_LEN
        )));
    }
    Ok(position.to_string())
}

/// POST /api/companies/:company_id/departments
pub async fn create_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(company_id): Path<i64>,
    Json(req): Json<NameRequest>,
) -> AppResult<Json<ApiResponse<DepartmentResponse>>> {
    load_company(&*db, company_id).await?;
    require_company_manage(&*db, &user, company_id).await?;

    let name = validate_name(&req.name)?;
    let existing = department::Entity::find()
        .filter(department::Column::CompanyId.eq(company_id))
        .filter(department::Column::Name.eq(&name))
        .one(&*db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Department name already exists".to_string()));
    }

    let dept = department::ActiveModel {
        company_id: Set(company_id),
        name: Set(name),
        created_by: Set(user.id),
        created_at: Set(chrono::Utc::now().timestamp()),
        ..Default::default()
    }
    .insert(&*db)
    .await?;

    tracing::info!("Department {} created in company {}", dept.id, company_id);
    Ok(Json(ApiResponse::success(DepartmentResponse::from(dept))))
}

/// GET /api/companies/:company_id/departments
pub async fn list_departments(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(company_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentResponse>>>> {
    load_company(&*db, company_id).await?;
    require_company_access(&*db, &user, company_id).await?;

    let depts = company_departments(&*db, company_id).await?;
    Ok(Json(ApiResponse::success(
        depts.into_iter().map(DepartmentResponse::from).collect(),
    )))
}

/// GET /api/companies/:company_id/org-chart
pub async fn get_org_chart(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(company_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<DepartmentChart>>>> {
    load_company(&*db, company_id).await?;
    require_company_access(&*db, &user, company_id).await?;

    let depts = company_departments(&*db, company_id).await?;
    let dept_ids: Vec<i64> = depts.iter().map(|d| d.id).collect();
    let members = load_members(&*db, &dept_ids).await?;

    Ok(Json(ApiResponse::success(build_org_chart(depts, members))))
}

/// Group members by department and build one forest per department,
/// keeping department order
pub fn build_org_chart(
    depts: Vec<department::Model>,
    members: Vec<HierarchyMember>,
) -> Vec<DepartmentChart> {
    let mut by_dept: HashMap<i64, Vec<HierarchyMember>> = HashMap::new();
    for m in members {
        by_dept.entry(m.department_id).or_default().push(m);
    }

    depts
        .into_iter()
        .map(|d| {
            let list = by_dept.remove(&d.id).unwrap_or_default();
            DepartmentChart {
                id: d.id,
                name: d.name,
                member_count: list.len(),
                tree: build_hierarchy_tree(&list),
            }
        })
        .collect()
}

pub(crate) fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Name must not exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

async fn load_company<C: ConnectionTrait>(db: &C, company_id: i64) -> AppResult<company::Model> {
    company::Entity::find_by_id(company_id)
        .one(db)
        .await?
        .ok_or_not_found("Company not found")
}

async fn company_departments<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
) -> AppResult<Vec<department::Model>> {
    Ok(department::Entity::find()
        .filter(department::Column::CompanyId.eq(company_id))
        .order_by_asc(department::Column::CreatedAt)
        .order_by_asc(department::Column::Id)
        .all(db)
        .await?)
}

/// Company role of `user_id`; `Ok(None)` when not a member
async fn company_role<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    user_id: i64,
) -> AppResult<Option<CompanyRole>> {
    Ok(company_member::Entity::find()
        .filter(company_member::Column::CompanyId.eq(company_id))
        .filter(company_member::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .and_then(|m| m.company_role()))
}

async fn find_company_member<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    user_id: i64,
) -> AppResult<company_member::Model> {
    company_member::Entity::find()
        .filter(company_member::Column::CompanyId.eq(company_id))
        .filter(company_member::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_not_found("Company member not found")
}

/// Admins, company admins and company managers
async fn require_company_manage<C: ConnectionTrait>(
    db: &C,
    user: &CurrentUser,
    company_id: i64,
) -> AppResult<()> {
    let role = company_role(db, company_id, user.id).await?;
    if user.is_admin || matches!(role, Some(CompanyRole::Admin) | Some(CompanyRole::Manager)) {
        Ok(())
    } else {
        tracing::warn!("User {} may not manage company {}", user.email, company_id);
        Err(AppError::Forbidden)
    }
}

/// Admins and company members only
async fn require_company_access<C: ConnectionTrait>(
    db: &C,
    user: &CurrentUser,
    company_id: i64,
) -> AppResult<()> {
    if user.is_admin || company_role(db, company_id, user.id).await?.is_some() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::member;

    fn dept(id: i64, name: &str) -> department::Model {
        department::Model {
            id,
            company_id: 1,
            name: name.to_string(),
            created_by: 1,
            created_at: id,
        }
    }

    #[test]
    fn test_build_org_chart_groups_by_department() {
        let mut design_lead = member(1, None);
        design_lead.department_id = 10;
        let mut designer = member(2, Some(1));
        designer.department_id = 10;
        let mut engineer = member(3, None);
        engineer.department_id = 20;

        let chart = build_org_chart(
            vec![dept(10, "Design"), dept(20, "Engineering"), dept(30, "Empty")],
            vec![design_lead, engineer, designer],
        );

        assert_eq!(chart.len(), 3);
        assert_eq!(chart[0].name, "Design");
        assert_eq!(chart[0].member_count, 2);
        assert_eq!(chart[0].tree.len(), 1);
        assert_eq!(chart[0].tree[0].children[0].member.id, 2);
        assert_eq!(chart[1].member_count, 1);
        assert_eq!(chart[2].member_count, 0);
        assert!(chart[2].tree.is_empty());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(" Acme ").unwrap(), "Acme");
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_summarize_companies_counts() {
        let companies = vec![
            company::Model {
                id: 2,
                name: "Beta".to_string(),
                created_by: 1,
                created_at: 20,
            },
            company::Model {
                id: 1,
                name: "Acme".to_string(),
                created_by: 1,
                created_at: 10,
            },
        ];

        let summary = summarize_companies(companies, vec![1, 1, 2, 1], vec![2, 2]);
        assert_eq!(summary[0].name, "Beta");
        assert_eq!((summary[0].member_count, summary[0].dept_count), (1, 2));
        assert_eq!((summary[1].member_count, summary[1].dept_count), (3, 0));
    }

    #[test]
    fn test_parse_company_role() {
        assert_eq!(parse_company_role(" manager ").unwrap(), CompanyRole::Manager);
        assert!(matches!(parse_company_role("owner"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_normalize_position() {
        assert_eq!(normalize_position("  Lead Designer ").unwrap(), "Lead Designer");
        assert_eq!(normalize_position("").unwrap(), "");
        assert!(normalize_position(&"p".repeat(129)).is_err());
    }

    #[test]
    fn test_company_member_response_missing_user() {
        let row = company_member::Model {
            id: 1,
            company_id: 1,
            user_id: 42,
            role: "member".to_string(),
            position: "Analyst".to_string(),
            created_at: 0,
        };
        let resp = company_member_response(row, None);
        assert_eq!(resp.user_name, "Unknown");
        assert_eq!(resp.user_email, "");
        assert_eq!(resp.position, "Analyst");
    }
}
