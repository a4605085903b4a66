//! Entity module - SeaORM entity definitions

pub mod company;
pub mod company_member;
pub mod department;
pub mod department_member;
pub mod op_log;
pub mod user;
