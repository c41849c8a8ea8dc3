//! MultiChain relational mirror
//!
//! Keeps a SQLite copy of a node's blocks, transactions, outputs, inputs and
//! stream items, rolling back local state when the node reorganizes.

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod indexer;
pub mod models;
pub mod rpc_client;

pub use error::{IndexerError, Result};
