//! Conflict store.
//!
//! Provider proposals that cannot be applied automatically are queued here
//! for a human to accept, reject or ignore.

mod db;
mod types;

pub use db::{
    count_pending, get_conflict, list_conflicts, mark_resolved, resolve, upsert_pending,
    was_dismissed,
};
pub use types::{
    ConflictFilter, ConflictPage, ConflictStatus, MAX_PAGE_SIZE, MetadataConflict, NewConflict,
    ResolveAction,
};
