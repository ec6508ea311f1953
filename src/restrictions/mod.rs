//! Restriction storage
//!
//! A restriction is a forbidden contiguous vertex sequence. A single vertex
//! forbids passing through it; longer sequences are "complex" and can only
//! be honoured by an edge-based hierarchy.
//!
//! The db keeps three flat arrays:
//! 1. `hashes`: 2*H slots, the even slot of each pair points at a bucket
//! 2. `index`: buckets laid out as `[size, p0, p1, ...]`
//! 3. `restrictions`: records laid out as `[len, v0, v1, ...]`
//!
//! A record's offset in `restrictions` is its pointer; every member vertex
//! hashes to a bucket holding that pointer exactly once.

mod db;
mod enumerator;

pub use db::RestrictionsDb;
pub use enumerator::{RestrictionEnumerator, RestrictionsFor};

/// Empty hash slot / no current restriction
pub const NO_DATA: u32 = u32::MAX;

/// Growth step of the index and restriction arenas
pub const BLOCK_SIZE: usize = 1000;

/// Default number of hash buckets
pub const DEFAULT_HASH_COUNT: usize = 1024 * 1024;
