//! Department membership handlers
//!
//! Member listing, tree view, add/remove, role edits and manager
//! reassignment. Every write that touches `manager_id` runs the cycle guard
//! against the department's current member list first.

use axum::{extract::Path, response::Json, Extension};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Insert, QueryFilter, QueryOrder,
    QuerySelect, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::access::{can_view_member, visible_members, CompanyRole, Viewer};
use crate::audit::log_operation;
use crate::entity::op_log::{OpType, OP_REJECTED, OP_SUCCESS};
use crate::entity::{company_member, department, department_member, user};
use crate::error::{unique_conflict, AppError, AppResult, OptionExt};
use crate::hierarchy::{
    build_hierarchy_tree, eligible_managers, is_manager_of, would_create_cycle, HierarchyMember,
    MemberId, TreeNode,
};
use crate::handlers::company::{validate_name, NameRequest};
use crate::middleware::auth::CurrentUser;
use crate::middleware::DbConn;
use crate::routes::ApiResponse;

const DEFAULT_MEMBER_ROLE: &str = "member";
const MAX_ROLE_LEN: usize = 64;

/// Add member request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: i64,
    pub role: Option<String>,
    pub manager_id: Option<MemberId>,
}

/// Update role request
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// Assign manager request; `null` makes the member top-level
#[derive(Debug, Deserialize)]
pub struct AssignManagerRequest {
    pub manager_id: Option<MemberId>,
}

/// Department tree response
#[derive(Debug, Serialize)]
pub struct DepartmentTreeResponse {
    pub department_id: i64,
    pub name: String,
    pub can_manage: bool,
    pub tree: Vec<TreeNode>,
}

/// Single member with the name of the person they report to
#[derive(Debug, Serialize)]
pub struct MemberDetailResponse {
    #[serde(flatten)]
    pub member: HierarchyMember,
    pub reports_to: Option<String>,
    /// The viewer sits above this member in the hierarchy
    pub is_hierarchy_manager: bool,
}

/// GET /api/departments/:dept_id/members
pub async fn list_members(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(dept_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<HierarchyMember>>>> {
    let dept = load_department(&*db, dept_id).await?;
    let viewer = load_viewer(&*db, &user, &dept).await?;
    let members = load_members(&*db, &[dept_id]).await?;

    Ok(Json(ApiResponse::success(visible_members(&members, &viewer))))
}

/// GET /api/departments/:dept_id/tree
pub async fn get_tree(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(dept_id): Path<i64>,
) -> AppResult<Json<ApiResponse<DepartmentTreeResponse>>> {
    let dept = load_department(&*db, dept_id).await?;
    let viewer = load_viewer(&*db, &user, &dept).await?;
    let members = load_members(&*db, &[dept_id]).await?;
    let visible = visible_members(&members, &viewer);

    Ok(Json(ApiResponse::success(DepartmentTreeResponse {
        department_id: dept.id,
        name: dept.name,
        can_manage: viewer.can_manage(),
        tree: build_hierarchy_tree(&visible),
    })))
}

/// GET /api/departments/:dept_id/members/:member_id
pub async fn get_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((dept_id, member_id)): Path<(i64, MemberId)>,
) -> AppResult<Json<ApiResponse<MemberDetailResponse>>> {
    let dept = load_department(&*db, dept_id).await?;
    let viewer = load_viewer(&*db, &user, &dept).await?;
    let members = load_members(&*db, &[dept_id]).await?;

    let detail = member_detail(&members, &viewer, member_id);
    if matches!(detail, Err(AppError::Forbidden)) {
        tracing::warn!("User {} denied view of member {}", user.email, member_id);
    }
    Ok(Json(ApiResponse::success(detail?)))
}

/// Detail view of `member_id` as seen by `viewer`.
///
/// The view check runs first so a viewer without rights gets `Forbidden`
/// whether or not the membership exists.
pub fn member_detail(
    members: &[HierarchyMember],
    viewer: &Viewer,
    member_id: MemberId,
) -> AppResult<MemberDetailResponse> {
    if !can_view_member(members, viewer, member_id) {
        return Err(AppError::Forbidden);
    }

    let target = members
        .iter()
        .find(|m| m.id == member_id)
        .cloned()
        .ok_or_not_found("Member not found")?;

    let reports_to = target
        .manager_id
        .and_then(|mid| members.iter().find(|m| m.id == mid))
        .map(|m| m.user_name.clone());
    let is_hierarchy_manager = viewer
        .membership(members)
        .is_some_and(|own| is_manager_of(members, own.id, member_id));

    Ok(MemberDetailResponse {
        member: target,
        reports_to,
        is_hierarchy_manager,
    })
}

/// GET /api/departments/:dept_id/members/:member_id/eligible-managers
pub async fn get_eligible_managers(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((dept_id, member_id)): Path<(i64, MemberId)>,
) -> AppResult<Json<ApiResponse<Vec<HierarchyMember>>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;
    let members = load_members(&*db, &[dept_id]).await?;

    if !members.iter().any(|m| m.id == member_id) {
        return Err(AppError::NotFound("Member not found".to_string()));
    }

    let eligible = eligible_managers(&members, member_id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ApiResponse::success(eligible)))
}

/// POST /api/departments/:dept_id/members
pub async fn add_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(dept_id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Json<ApiResponse<HierarchyMember>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;

    let role = normalize_role(req.role.as_deref().unwrap_or(DEFAULT_MEMBER_ROLE))?;

    let new_user = user::Entity::find_by_id(req.user_id)
        .one(&*db)
        .await?
        .ok_or_not_found("User not found")?;

    let txn = db.begin().await?;
    lock_department(&txn, dept_id).await?;

    let existing = department_member::Entity::find()
        .filter(department_member::Column::DepartmentId.eq(dept_id))
        .filter(department_member::Column::UserId.eq(req.user_id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("User is already in this department".to_string()));
    }

    if let Some(manager_id) = req.manager_id {
        let members = load_members(&txn, &[dept_id]).await?;
        if !members.iter().any(|m| m.id == manager_id) {
            return Err(AppError::BadRequest(
                "Manager is not a member of this department".to_string(),
            ));
        }
    }

    ensure_company_member(&txn, dept.company_id, req.user_id).await?;

    let now = chrono::Utc::now().timestamp();
    let row = department_member::ActiveModel {
        department_id: Set(dept_id),
        user_id: Set(req.user_id),
        role: Set(role),
        manager_id: Set(req.manager_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| unique_conflict(e, "User is already in this department"))?;

    txn.commit().await?;

    tracing::info!("User {} added to department {} as member {}", req.user_id, dept_id, row.id);
    log_operation(
        &user.email,
        OpType::AddMember,
        &format!("{} -> {}", new_user.email, dept.name),
        OP_SUCCESS,
    );

    Ok(Json(ApiResponse::success(row.into_hierarchy_member(Some(&new_user)))))
}

/// DELETE /api/departments/:dept_id/members/:member_id
///
/// Direct reports of the removed member become top-level.
pub async fn remove_member(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((dept_id, member_id)): Path<(i64, MemberId)>,
) -> AppResult<Json<ApiResponse<()>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;

    let txn = db.begin().await?;
    lock_department(&txn, dept_id).await?;

    let row = find_member_row(&txn, dept_id, member_id).await?;

    let orphaned = department_member::Entity::update_many()
        .col_expr(department_member::Column::ManagerId, Expr::value(Option::<i64>::None))
        .filter(department_member::Column::DepartmentId.eq(dept_id))
        .filter(department_member::Column::ManagerId.eq(member_id))
        .exec(&txn)
        .await?;

    department_member::Entity::delete_by_id(row.id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        "Member {} removed from department {}, {} direct reports moved to top level",
        member_id,
        dept_id,
        orphaned.rows_affected
    );
    log_operation(
        &user.email,
        OpType::RemoveMember,
        &format!("member {} of {}", member_id, dept.name),
        OP_SUCCESS,
    );

    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/departments/:dept_id/members/:member_id/role
pub async fn update_role(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((dept_id, member_id)): Path<(i64, MemberId)>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;

    let role = normalize_role(&req.role)?;
    let row = find_member_row(&*db, dept_id, member_id).await?;

    let old_role = row.role.clone();
    let mut active: department_member::ActiveModel = row.into();
    active.role = Set(role.clone());
    active.update(&*db).await?;

    log_operation(
        &user.email,
        OpType::UpdateRole,
        &format!("member {}: {} -> {}", member_id, old_role, role),
        OP_SUCCESS,
    );

    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/departments/:dept_id/members/:member_id/manager
///
/// Serves both the "assign manager" dialog and drag-and-drop reassignment.
pub async fn assign_manager(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path((dept_id, member_id)): Path<(i64, MemberId)>,
    Json(req): Json<AssignManagerRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;

    let txn = db.begin().await?;
    // Writers to this department queue on the row lock, so the guard below
    // sees every reassignment committed before ours.
    lock_department(&txn, dept_id).await?;
    let members = load_members(&txn, &[dept_id]).await?;
    if let Err(e) = check_reassignment(&members, member_id, req.manager_id) {
        if matches!(e, AppError::Conflict(_)) {
            tracing::warn!(
                "Rejected reassignment of member {} to {:?}: cycle",
                member_id,
                req.manager_id
            );
            log_operation(
                &user.email,
                OpType::AssignManager,
                &format!("member {} -> {:?}", member_id, req.manager_id),
                OP_REJECTED,
            );
        }
        return Err(e);
    }

    let row = find_member_row(&txn, dept_id, member_id).await?;
    let mut active: department_member::ActiveModel = row.into();
    active.manager_id = Set(req.manager_id);
    active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!("Member {} now reports to {:?}", member_id, req.manager_id);
    log_operation(
        &user.email,
        OpType::AssignManager,
        &format!("member {} -> {:?}", member_id, req.manager_id),
        OP_SUCCESS,
    );

    Ok(Json(ApiResponse::success_msg("success")))
}

/// POST /api/departments/:dept_id
///
/// Rename; the name stays unique within the company.
pub async fn rename_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(dept_id): Path<i64>,
    Json(req): Json<NameRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;
    let name = validate_name(&req.name)?;

    let taken = department::Entity::find()
        .filter(department::Column::CompanyId.eq(dept.company_id))
        .filter(department::Column::Name.eq(&name))
        .filter(department::Column::Id.ne(dept_id))
        .one(&*db)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict("Department name already exists".to_string()));
    }

    let old_name = dept.name.clone();
    let mut active: department::ActiveModel = dept.into();
    active.name = Set(name.clone());
    active.update(&*db).await?;

    log_operation(
        &user.email,
        OpType::UpdateDepartment,
        &format!("{} -> {}", old_name, name),
        OP_SUCCESS,
    );
    Ok(Json(ApiResponse::success_msg("success")))
}

/// DELETE /api/departments/:dept_id
///
/// Removes the department together with all of its memberships.
pub async fn delete_department(
    Extension(db): Extension<DbConn>,
    Extension(user): Extension<CurrentUser>,
    Path(dept_id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let dept = load_department(&*db, dept_id).await?;
    require_manage(&*db, &user, &dept).await?;

    let txn = db.begin().await?;
    lock_department(&txn, dept_id).await?;

    let removed = department_member::Entity::delete_many()
        .filter(department_member::Column::DepartmentId.eq(dept_id))
        .exec(&txn)
        .await?;
    department::Entity::delete_by_id(dept_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        "Department {} deleted with {} memberships",
        dept_id,
        removed.rows_affected
    );
    log_operation(&user.email, OpType::DeleteDepartment, &dept.name, OP_SUCCESS);
    Ok(Json(ApiResponse::success_msg("success")))
}

/// Validate a manager change against the department's member list
pub fn check_reassignment(
    members: &[HierarchyMember],
    member_id: MemberId,
    manager_id: Option<MemberId>,
) -> AppResult<()> {
    if !members.iter().any(|m| m.id == member_id) {
        return Err(AppError::NotFound("Member not found".to_string()));
    }

    let Some(manager_id) = manager_id else {
        return Ok(());
    };

    if !members.iter().any(|m| m.id == manager_id) {
        return Err(AppError::BadRequest(
            "Manager is not a member of this department".to_string(),
        ));
    }

    if would_create_cycle(members, member_id, manager_id) {
        return Err(AppError::Conflict(
            "Cannot assign: this would create a circular hierarchy".to_string(),
        ));
    }

    Ok(())
}

fn normalize_role(role: &str) -> AppResult<String> {
    let role = role.trim();
    if role.is_empty() {
        return Err(AppError::Validation("Role must not be empty".to_string()));
    }
    if role.chars().count() > MAX_ROLE_LEN {
        return Err(AppError::Validation(format!(
            "Role must not exceed {} characters",
            MAX_ROLE_LEN
        )));
    }
    Ok(role.to_string())
}

pub(crate) async fn load_department<C: ConnectionTrait>(
    db: &C,
    dept_id: i64,
) -> AppResult<department::Model> {
    department::Entity::find_by_id(dept_id)
        .one(db)
        .await?
        .ok_or_not_found("Department not found")
}

async fn find_member_row<C: ConnectionTrait>(
    db: &C,
    dept_id: i64,
    member_id: MemberId,
) -> AppResult<department_member::Model> {
    department_member::Entity::find_by_id(member_id)
        .one(db)
        .await?
        .filter(|m| m.department_id == dept_id)
        .ok_or_not_found("Member not found")
}

/// Memberships of the given departments with user display fields joined in,
/// ordered by membership id
pub(crate) async fn load_members<C: ConnectionTrait>(
    db: &C,
    dept_ids: &[i64],
) -> AppResult<Vec<HierarchyMember>> {
    if dept_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = department_member::Entity::find()
        .filter(department_member::Column::DepartmentId.is_in(dept_ids.iter().copied()))
        .order_by_asc(department_member::Column::Id)
        .all(db)
        .await?;

    let mut user_ids: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    let users: HashMap<i64, user::Model> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|r| {
            let u = users.get(&r.user_id);
            r.into_hierarchy_member(u)
        })
        .collect())
}

pub(crate) async fn load_viewer<C: ConnectionTrait>(
    db: &C,
    user: &CurrentUser,
    dept: &department::Model,
) -> AppResult<Viewer> {
    let company_role = company_member::Entity::find()
        .filter(company_member::Column::CompanyId.eq(dept.company_id))
        .filter(company_member::Column::UserId.eq(user.id))
        .one(db)
        .await?
        .and_then(|m| m.company_role());

    Ok(Viewer {
        user_id: user.id,
        is_admin: user.is_admin,
        company_role,
        is_department_creator: dept.created_by == user.id,
    })
}

async fn require_manage<C: ConnectionTrait>(
    db: &C,
    user: &CurrentUser,
    dept: &department::Model,
) -> AppResult<Viewer> {
    let viewer = load_viewer(db, user, dept).await?;
    if !viewer.can_manage() {
        tracing::warn!("User {} may not manage department {}", user.email, dept.id);
        return Err(AppError::Forbidden);
    }
    Ok(viewer)
}

/// `SELECT ... FOR UPDATE` on the department row
fn department_lock(dept_id: i64) -> Select<department::Entity> {
    department::Entity::find_by_id(dept_id).lock_exclusive()
}

/// Serialise hierarchy writes within one department. Must run inside a
/// transaction; the lock is held until commit or rollback.
async fn lock_department<C: ConnectionTrait>(db: &C, dept_id: i64) -> AppResult<()> {
    department_lock(dept_id)
        .one(db)
        .await?
        .ok_or_not_found("Department not found")?;
    Ok(())
}

/// Plain-member company row that leaves an existing membership untouched
fn company_member_insert(company_id: i64, user_id: i64) -> Insert<company_member::ActiveModel> {
    company_member::Entity::insert(company_member::ActiveModel {
        company_id: Set(company_id),
        user_id: Set(user_id),
        role: Set(CompanyRole::Member.as_str().to_string()),
        position: Set(String::new()),
        created_at: Set(chrono::Utc::now().timestamp()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([
            company_member::Column::CompanyId,
            company_member::Column::UserId,
        ])
        .do_nothing()
        .to_owned(),
    )
}

/// Add `user_id` to the company with the plain member role unless already there
pub(crate) async fn ensure_company_member<C: ConnectionTrait>(
    db: &C,
    company_id: i64,
    user_id: i64,
) -> AppResult<()> {
    let inserted = company_member_insert(company_id, user_id)
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        tracing::info!("User {} auto-added to company {}", user_id, company_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::member;
    use sea_orm::{DbBackend, QueryTrait};

    fn members() -> Vec<HierarchyMember> {
        vec![member(1, None), member(2, Some(1)), member(3, Some(2))]
    }

    #[test]
    fn test_reassignment_ok() {
        assert!(check_reassignment(&members(), 3, Some(1)).is_ok());
        assert!(check_reassignment(&members(), 2, None).is_ok());
    }

    #[test]
    fn test_reassignment_cycle_conflict() {
        let err = check_reassignment(&members(), 1, Some(3)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = check_reassignment(&members(), 2, Some(2)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_reassignment_unknown_ids() {
        assert!(matches!(
            check_reassignment(&members(), 9, None),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            check_reassignment(&members(), 3, Some(42)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("  Designer ").unwrap(), "Designer");
        assert!(matches!(normalize_role("   "), Err(AppError::Validation(_))));
        assert!(normalize_role(&"x".repeat(65)).is_err());
    }

    fn plain_viewer(user_id: i64) -> Viewer {
        Viewer {
            user_id,
            is_admin: false,
            company_role: Some(CompanyRole::Member),
            is_department_creator: false,
        }
    }

    #[test]
    fn test_member_detail_reports_to() {
        // member(n) belongs to user n * 100
        let detail = member_detail(&members(), &plain_viewer(100), 3).unwrap();
        assert_eq!(detail.member.id, 3);
        assert_eq!(detail.reports_to.as_deref(), Some("user2"));
        assert!(detail.is_hierarchy_manager);

        let detail = member_detail(&members(), &plain_viewer(300), 3).unwrap();
        assert!(!detail.is_hierarchy_manager);
    }

    #[test]
    fn test_member_detail_hides_existence_from_plain_viewers() {
        assert!(matches!(
            member_detail(&members(), &plain_viewer(300), 1),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            member_detail(&members(), &plain_viewer(300), 99),
            Err(AppError::Forbidden)
        ));

        let admin = Viewer {
            is_admin: true,
            ..plain_viewer(300)
        };
        assert!(matches!(
            member_detail(&members(), &admin, 99),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_department_lock_is_for_update() {
        let sql = department_lock(5).build(DbBackend::Postgres).to_string();
        assert!(sql.contains(r#"WHERE "org_departments"."id" = 5"#), "{}", sql);
        assert!(sql.ends_with("FOR UPDATE"), "{}", sql);
    }

    #[test]
    fn test_company_member_insert_ignores_duplicates() {
        let sql = company_member_insert(3, 7).build(DbBackend::Postgres).to_string();
        assert!(sql.starts_with(r#"INSERT INTO "org_company_members""#), "{}", sql);
        assert!(
            sql.contains(r#"ON CONFLICT ("company_id", "user_id") DO NOTHING"#),
            "{}",
            sql
        );
    }
}
