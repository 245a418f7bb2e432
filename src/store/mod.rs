//! The relational fact store
//!
//! Holds the academic hierarchy, the schedule and the semester-partitioned
//! attendance facts. Every other mirror is rebuilt from it.

pub mod facts;
pub mod schema_gen;
pub mod value;

pub use facts::{FactStore, TIMESTAMP_FORMAT};
pub use value::SqlValue;
