//! Graph mirror persistence
//!
//! Nodes are keyed by `(label, id)` where `id` is the relational primary key.
//! Edges reference nodes by that key only.

pub mod store;

pub use store::{Checkpoint, ClearStats, EdgeSpec, GraphBatch, GraphStore, NodeSpec};
