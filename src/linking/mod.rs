pub mod error;
pub mod manager;
pub mod metric;
pub mod resolver;
