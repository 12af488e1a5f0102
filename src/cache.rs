//! Cache store, entry lifecycle, fetch coordination, and eviction.

pub mod entry;
pub mod invalidation;
pub mod key;
pub mod pruner;
pub mod state;
pub mod store;

pub(crate) mod coordinator;
