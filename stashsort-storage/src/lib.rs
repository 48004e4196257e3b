//! # stashsort-storage
//!
//! Snapshot layer for stashsort.
//!
//! This crate provides:
//! - The item catalog (names, rarity, footprints)
//! - The snapshot builder turning character detail into slotted item records
//! - The on-disk store of decoded messages
//! - A single-flight in-memory snapshot cache with an active character

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod store;

pub use builder::{CharacterSnapshot, SnapshotBuilder};
pub use cache::SnapshotCache;
pub use catalog::{strip_design_prefix, ItemCatalog, ItemDescriptor, DESIGN_PREFIX};
pub use error::StorageError;
pub use store::{Persisted, SnapshotStore};
