//! Orgchart - department hierarchy service
//!
//! Companies, departments and department memberships with a manager/report
//! forest per department. The pure hierarchy logic lives in [`hierarchy`];
//! the HTTP service around it stores memberships in Postgres and runs the
//! cycle guard before every manager change.

pub mod access;
pub mod audit;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use hierarchy::{
    build_hierarchy_tree, get_subordinate_ids, is_manager_of, would_create_cycle,
    HierarchyMember, TreeNode,
};
pub use state::AppState;
