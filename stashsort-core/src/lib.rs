//! # stashsort-core
//!
//! Inventory model and sort engine for stashsort.
//!
//! This crate provides:
//! - Container kinds with their fixed grid dimensions
//! - Item records, footprints and rectangle geometry
//! - The storage grid (placement, removal, empty-slot search)
//! - A greedy shelf-packing sort engine with displacement and cancellation
//! - The actuator interface plus screen geometry and a dry-run actuator

pub mod actuator;
pub mod cancel;
pub mod container;
pub mod engine;
pub mod error;
pub mod grid;
pub mod item;
pub mod order;

pub use actuator::{Actuator, DryRunActuator, Location, RecordedDrag, ScreenLayout, ScreenPoint};
pub use cancel::CancellationToken;
pub use container::{equipment_slot, ContainerKind, EquipmentSlot, EQUIPMENT_SLOTS};
pub use engine::{PlacementKind, PlacementOp, SortEngine, SortReport, SortStatus};
pub use error::{ActuatorError, CoreError, GridError, SortFailure};
pub use grid::{GridItem, StorageGrid};
pub use item::{Footprint, ItemKey, ItemRecord, Position, Rarity, Rect};
pub use order::{Direction, SortField, SortKey, SortOrder};
