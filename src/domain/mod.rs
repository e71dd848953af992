pub mod error;
pub mod handler;
pub mod model;
pub mod reconciler;
pub mod sql_backend_handler;
pub mod sql_tables;
pub mod types;
