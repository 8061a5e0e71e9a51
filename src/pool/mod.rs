pub mod connection;
pub mod manager;
pub mod types;

pub use connection::MiddlewarePoolConnection;
pub use manager::ConnectionManager;
pub use types::{MiddlewarePool, PoolStatus};
