//! Department hierarchy utilities
//!
//! Pure functions over a flat snapshot of department memberships: forest
//! construction, the cycle guard used before every manager reassignment,
//! subordinate closure and the manager-of predicate.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Membership row id (`org_department_members.id`)
pub type MemberId = i64;

/// Global user id (`auth_user.id`)
pub type UserId = i64;

/// One (department, user) membership with display fields joined in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyMember {
    pub id: MemberId,
    pub department_id: i64,
    pub user_id: UserId,
    pub role: String,
    /// `None` means top-level
    pub manager_id: Option<MemberId>,
    pub user_name: String,
    pub user_email: String,
}

/// A member with its direct reports attached, rebuilt on every read
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub member: HierarchyMember,
    pub children: Vec<TreeNode>,
}

// Tear down iteratively; the derived drop recurses once per level and a
// long reporting chain would exhaust the stack.
impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

fn index_by_id(members: &[HierarchyMember]) -> HashMap<MemberId, usize> {
    let mut index = HashMap::with_capacity(members.len());
    for (i, m) in members.iter().enumerate() {
        index.entry(m.id).or_insert(i);
    }
    index
}

/// Build a forest from a flat member list.
///
/// A member becomes a root when it has no manager, when its manager is not
/// in `members` (e.g. filtered out for access control), or when it points at
/// itself. Siblings keep input order. Every input member appears exactly
/// once: a ring of manager references with no way out is broken at the
/// member that comes first in the input.
pub fn build_hierarchy_tree(members: &[HierarchyMember]) -> Vec<TreeNode> {
    let n = members.len();
    let index = index_by_id(members);

    let mut parent: Vec<Option<usize>> = members
        .iter()
        .map(|m| {
            m.manager_id
                .filter(|&mid| mid != m.id)
                .and_then(|mid| index.get(&mid).copied())
        })
        .collect();

    // Break rings so every chain ends at a root.
    let mut resolved = vec![false; n];
    let mut walk_stamp = vec![usize::MAX; n];
    for start in 0..n {
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            if resolved[cur] {
                break;
            }
            if walk_stamp[cur] == start {
                if let Some(pos) = path.iter().position(|&p| p == cur) {
                    if let Some(&head) = path[pos..].iter().min() {
                        parent[head] = None;
                    }
                }
                break;
            }
            walk_stamp[cur] = start;
            path.push(cur);
            match parent[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        for p in path {
            resolved[p] = true;
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order from the roots, then assemble in reverse so every child is
    // finished before its manager.
    let mut order = Vec::with_capacity(n);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(children[i].iter().rev());
    }

    let mut built: Vec<Option<TreeNode>> = (0..n).map(|_| None).collect();
    for &i in order.iter().rev() {
        let kids = children[i].iter().filter_map(|&c| built[c].take()).collect();
        built[i] = Some(TreeNode {
            member: members[i].clone(),
            children: kids,
        });
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}

/// Whether making `proposed_manager_id` the manager of `member_id` would
/// close a loop. Walks upward from the proposed manager; a ring already
/// present in the data also counts as a cycle.
pub fn would_create_cycle(
    members: &[HierarchyMember],
    member_id: MemberId,
    proposed_manager_id: MemberId,
) -> bool {
    if member_id == proposed_manager_id {
        return true;
    }

    let index = index_by_id(members);
    let mut visited = HashSet::with_capacity(members.len());
    let mut current = index.get(&proposed_manager_id).map(|&i| &members[i]);

    while let Some(m) = current {
        if !visited.insert(m.id) {
            return true;
        }
        let Some(mid) = m.manager_id else {
            return false;
        };
        if mid == member_id {
            return true;
        }
        current = index.get(&mid).map(|&i| &members[i]);
    }
    false
}

/// User ids of everyone reporting to `manager_id`, directly or indirectly.
///
/// Depth-first, pre-order, siblings in input order. The manager's own user id
/// is never included.
pub fn get_subordinate_ids(members: &[HierarchyMember], manager_id: MemberId) -> Vec<UserId> {
    let mut reports: HashMap<MemberId, Vec<&HierarchyMember>> = HashMap::new();
    for m in members {
        if let Some(mid) = m.manager_id {
            reports.entry(mid).or_default().push(m);
        }
    }

    let mut result = Vec::new();
    let mut visited: HashSet<MemberId> = HashSet::from([manager_id]);
    let mut stack: Vec<&HierarchyMember> = reports
        .get(&manager_id)
        .map(|r| r.iter().rev().copied().collect())
        .unwrap_or_default();

    while let Some(m) = stack.pop() {
        if !visited.insert(m.id) {
            continue;
        }
        result.push(m.user_id);
        if let Some(r) = reports.get(&m.id) {
            stack.extend(r.iter().rev().copied());
        }
    }
    result
}

/// Whether `candidate_id` sits anywhere above `target_id` in its reporting
/// chain. A member is never its own manager.
pub fn is_manager_of(
    members: &[HierarchyMember],
    candidate_id: MemberId,
    target_id: MemberId,
) -> bool {
    if candidate_id == target_id {
        return false;
    }

    let index = index_by_id(members);
    let mut visited = HashSet::with_capacity(members.len());
    let mut current = index.get(&target_id).map(|&i| &members[i]);

    while let Some(m) = current {
        let Some(mid) = m.manager_id else {
            return false;
        };
        if !visited.insert(m.id) {
            return false;
        }
        if mid == candidate_id {
            return true;
        }
        current = index.get(&mid).map(|&i| &members[i]);
    }
    false
}

/// Members that `member_id` may be assigned to report to
pub fn eligible_managers(members: &[HierarchyMember], member_id: MemberId) -> Vec<&HierarchyMember> {
    members
        .iter()
        .filter(|m| m.id != member_id && !would_create_cycle(members, member_id, m.id))
        .collect()
}
