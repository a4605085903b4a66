//! Forest properties of the hierarchy utilities over generated departments

use std::collections::{HashMap, HashSet};

use orgchart::hierarchy::{
    build_hierarchy_tree, eligible_managers, get_subordinate_ids, is_manager_of,
    would_create_cycle, HierarchyMember, MemberId, TreeNode,
};

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn member(id: MemberId, manager_id: Option<MemberId>) -> HierarchyMember {
    HierarchyMember {
        id,
        department_id: 7,
        user_id: 1000 + id,
        role: "member".to_string(),
        manager_id,
        user_name: format!("user {}", id),
        user_email: format!("u{}@example.com", id),
    }
}

/// Acyclic department: each member reports to an earlier one, nobody, or an
/// id outside the list. Output order is shuffled.
fn department(rng: &mut Lcg, size: usize) -> Vec<HierarchyMember> {
    let mut members: Vec<HierarchyMember> = (0..size as i64)
        .map(|i| {
            let id = i + 1;
            let manager = match rng.below(10) {
                0..=1 => None,
                2 => Some(500 + id),
                _ if i > 0 => Some(rng.below(i as u64) as i64 + 1),
                _ => None,
            };
            member(id, manager)
        })
        .collect();

    for i in (1..members.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        members.swap(i, j);
    }
    members
}

fn departments() -> Vec<Vec<HierarchyMember>> {
    let mut rng = Lcg(0x5eed);
    (0..60).map(|i| department(&mut rng, i % 25)).collect()
}

fn all_nodes<'a>(forest: &'a [TreeNode], out: &mut Vec<&'a TreeNode>) {
    for node in forest {
        out.push(node);
        all_nodes(&node.children, out);
    }
}

fn find<'a>(forest: &'a [TreeNode], id: MemberId) -> Option<&'a TreeNode> {
    let mut stack: Vec<&TreeNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        if node.member.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter());
    }
    None
}

/// Pre-order members strictly below `node`
fn descendants(node: &TreeNode) -> Vec<&HierarchyMember> {
    let mut out = Vec::new();
    let mut stack: Vec<&TreeNode> = node.children.iter().rev().collect();
    while let Some(n) = stack.pop() {
        out.push(&n.member);
        stack.extend(n.children.iter().rev());
    }
    out
}

#[test]
fn test_every_member_appears_exactly_once() {
    for members in departments() {
        let forest = build_hierarchy_tree(&members);
        let mut nodes = Vec::new();
        all_nodes(&forest, &mut nodes);

        assert_eq!(nodes.len(), members.len());
        let seen: HashSet<MemberId> = nodes.iter().map(|n| n.member.id).collect();
        let expected: HashSet<MemberId> = members.iter().map(|m| m.id).collect();
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_roots_are_unmanaged_or_dangling() {
    for members in departments() {
        let ids: HashSet<MemberId> = members.iter().map(|m| m.id).collect();
        let forest = build_hierarchy_tree(&members);
        let roots: HashSet<MemberId> = forest.iter().map(|n| n.member.id).collect();

        for m in &members {
            let should_be_root = match m.manager_id {
                None => true,
                Some(mid) => !ids.contains(&mid),
            };
            assert_eq!(roots.contains(&m.id), should_be_root, "member {}", m.id);
        }
    }
}

#[test]
fn test_roots_keep_input_order() {
    for members in departments() {
        let forest = build_hierarchy_tree(&members);
        let positions: HashMap<MemberId, usize> =
            members.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let order: Vec<usize> = forest.iter().map(|n| positions[&n.member.id]).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
    }
}

#[test]
fn test_nobody_manages_themselves() {
    for members in departments() {
        for m in &members {
            assert!(!is_manager_of(&members, m.id, m.id));
            assert!(would_create_cycle(&members, m.id, m.id));
        }
    }
}

#[test]
fn test_manager_of_implies_subtree() {
    for members in departments() {
        let forest = build_hierarchy_tree(&members);
        for a in &members {
            for b in &members {
                if is_manager_of(&members, a.id, b.id) {
                    let sub = find(&forest, a.id).expect("manager node present");
                    assert!(
                        find(std::slice::from_ref(sub), b.id).is_some(),
                        "{} should be under {}",
                        b.id,
                        a.id
                    );
                }
            }
        }
    }
}

#[test]
fn test_cycle_guard_matches_manager_of() {
    for members in departments() {
        for x in &members {
            for y in &members {
                assert_eq!(
                    would_create_cycle(&members, x.id, y.id),
                    is_manager_of(&members, x.id, y.id) || x.id == y.id,
                    "x={} y={}",
                    x.id,
                    y.id
                );
            }
        }
    }
}

#[test]
fn test_subordinates_match_subtree() {
    for members in departments() {
        let forest = build_hierarchy_tree(&members);
        for m in &members {
            let node = find(&forest, m.id).expect("node present");
            let from_tree: Vec<i64> = descendants(node).iter().map(|d| d.user_id).collect();
            assert_eq!(get_subordinate_ids(&members, m.id), from_tree, "member {}", m.id);
        }
    }
}

#[test]
fn test_eligible_managers_exclude_self_and_reports() {
    for members in departments() {
        for m in &members {
            let reports: HashSet<i64> = get_subordinate_ids(&members, m.id).into_iter().collect();
            for candidate in eligible_managers(&members, m.id) {
                assert_ne!(candidate.id, m.id);
                assert!(!reports.contains(&candidate.user_id));
            }
        }
    }
}

#[test]
fn test_three_level_chain() {
    let members = vec![member(1, None), member(2, Some(1)), member(3, Some(2))];

    let forest = build_hierarchy_tree(&members);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].member.id, 1);
    assert_eq!(forest[0].children.len(), 1);
    assert_eq!(forest[0].children[0].member.id, 2);
    assert_eq!(forest[0].children[0].children.len(), 1);
    assert_eq!(forest[0].children[0].children[0].member.id, 3);

    assert!(is_manager_of(&members, 1, 3));
    assert!(would_create_cycle(&members, 1, 3));
    assert_eq!(get_subordinate_ids(&members, 1), vec![1002, 1003]);
}

#[test]
fn test_dangling_manager_becomes_root() {
    let members = vec![member(1, None), member(5, Some(99))];
    let forest = build_hierarchy_tree(&members);
    let roots: Vec<MemberId> = forest.iter().map(|n| n.member.id).collect();
    assert_eq!(roots, vec![1, 5]);
}

#[test]
fn test_long_chain_builds_and_drops() {
    // Shuffled 50k-deep chain: 1 <- 2 <- ... <- 50000
    let mut rng = Lcg(0xc4a1);
    let mut members: Vec<HierarchyMember> = (1..=50_000)
        .map(|id| member(id, if id == 1 { None } else { Some(id - 1) }))
        .collect();
    for i in (1..members.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        members.swap(i, j);
    }

    let forest = build_hierarchy_tree(&members);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].member.id, 1);
    assert_eq!(descendants(&forest[0]).len(), 49_999);
    assert_eq!(get_subordinate_ids(&members, 1).len(), 49_999);
    assert!(would_create_cycle(&members, 1, 50_000));
}
