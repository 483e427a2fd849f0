pub mod auth;
pub mod catalog;
pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod slots;
pub mod sql;
pub mod tenant;
pub mod wal;
pub mod wire;
