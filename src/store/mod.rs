//! Persistence layer.

mod sqlite;

pub use sqlite::*;
