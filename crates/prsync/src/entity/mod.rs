//! SeaORM entity definitions for the prsync database schema.

pub mod prelude;
pub mod pull_request;
pub mod repository;
pub mod review;
pub mod user;
