pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod outbox;
pub mod sql;
pub mod sweeper;
pub mod tenant;
pub mod time;
pub mod tls;
pub mod wal;
pub mod wire;
