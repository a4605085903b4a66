//! Request handlers module

pub mod auth;
pub mod company;
pub mod department;
pub mod user;
