//! Member visibility rules
//!
//! Decides which department members a viewer may see or manage. Privileged
//! viewers (global admins, company admins/managers, the department creator)
//! see everyone; everybody else sees themselves plus whoever reports to them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::hierarchy::{get_subordinate_ids, is_manager_of, HierarchyMember, MemberId, UserId};

/// Role of a user inside a company (`org_company_members.role`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyRole {
    Admin,
    Manager,
    Member,
}

impl CompanyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyRole::Admin => "admin",
            CompanyRole::Manager => "manager",
            CompanyRole::Member => "member",
        }
    }
}

impl FromStr for CompanyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(CompanyRole::Admin),
            "manager" => Ok(CompanyRole::Manager),
            "member" => Ok(CompanyRole::Member),
            other => Err(format!("unknown company role: {}", other)),
        }
    }
}

/// Who is looking at a department
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    pub is_admin: bool,
    pub company_role: Option<CompanyRole>,
    pub is_department_creator: bool,
}

impl Viewer {
    /// Admins, company admins/managers and the department creator see (and
    /// manage) every member
    pub fn sees_everything(&self) -> bool {
        self.is_admin
            || matches!(
                self.company_role,
                Some(CompanyRole::Admin) | Some(CompanyRole::Manager)
            )
            || self.is_department_creator
    }

    pub fn can_manage(&self) -> bool {
        self.sees_everything()
    }

    /// The viewer's own membership in `members`, if any
    pub fn membership<'a>(&self, members: &'a [HierarchyMember]) -> Option<&'a HierarchyMember> {
        members.iter().find(|m| m.user_id == self.user_id)
    }
}

/// Members `viewer` is allowed to see, in input order
pub fn visible_members(members: &[HierarchyMember], viewer: &Viewer) -> Vec<HierarchyMember> {
    if viewer.sees_everything() {
        return members.to_vec();
    }

    let Some(own) = viewer.membership(members) else {
        return Vec::new();
    };

    let subordinates: HashSet<UserId> = get_subordinate_ids(members, own.id).into_iter().collect();
    members
        .iter()
        .filter(|m| m.user_id == viewer.user_id || subordinates.contains(&m.user_id))
        .cloned()
        .collect()
}

/// Whether `viewer` may open the detail page of membership `target_id`
pub fn can_view_member(members: &[HierarchyMember], viewer: &Viewer, target_id: MemberId) -> bool {
    if viewer.sees_everything() {
        return true;
    }

    let Some(target) = members.iter().find(|m| m.id == target_id) else {
        return false;
    };
    if target.user_id == viewer.user_id {
        return true;
    }

    viewer
        .membership(members)
        .is_some_and(|own| is_manager_of(members, own.id, target.id))
}
