//! Editor actor: one task owns the store, callers talk to it through a handle.

/// Editor events broadcast to subscribers.
pub mod events;
/// Command loop and cloneable editor handle.
pub mod handle;
