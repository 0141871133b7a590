//! Message recency cache.
//!
//! Suppresses reprocessing of already-seen message ids during floods,
//! confirmations, and unicast contests. Fixed capacity with wrap-around
//! overwrite eviction, intentionally simpler than LRU and preserved as a
//! testable contract.

mod dedup;

pub use dedup::{DedupCache, DedupFlag, MessageRecord, MAX_MESSAGE_DATA};
