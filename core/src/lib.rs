pub mod error;
pub mod models;
pub mod nutrition;
pub mod quantity;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod vision;
