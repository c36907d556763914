//! Core library for Questlog.
//!
//! This crate provides the domain models, database operations, and the
//! progression engine for Questlog, independent of any transport layer.
//!
//! # Usage
//!
//! ```no_run
//! use questlog_core::db::Database;
//!
//! let db = Database::open_default()?;
//! db.migrate()?;
//!
//! let user = db.create_user("alice", "$argon2id$...")?;
//! let _tasks = db.list_tasks(user.id)?;
//! # Ok::<(), questlog_core::Error>(())
//! ```

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod progression;

// Re-export commonly used types at crate root
pub use db::Database;
pub use error::Error;
