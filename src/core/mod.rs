//! In-memory annotation store and its undo/redo log.

/// Bounded undo/redo stacks of action records.
pub mod history;
/// Authoritative per-slice annotation store.
pub mod store;
