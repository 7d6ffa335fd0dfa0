pub mod models;
pub mod persist;
pub mod queries;
pub mod sink;
