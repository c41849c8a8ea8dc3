//! Relational storage for the mirror

pub mod schema;
pub mod queries;
pub mod connection;

pub use connection::Database;
