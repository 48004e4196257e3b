//! Core error types.

use crate::container::ContainerKind;
use crate::item::{ItemKey, Position};
use thiserror::Error;

/// Errors from storage grid operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("{kind} has no rectangular grid")]
    NotAGrid { kind: ContainerKind },

    #[error("item {item} does not fit at {pos} in a {width}x{height} grid")]
    OutOfBounds {
        item: ItemKey,
        pos: Position,
        width: u32,
        height: u32,
    },

    #[error("item {item} overlaps item {other} at {pos}")]
    Overlap {
        item: ItemKey,
        other: ItemKey,
        pos: Position,
    },

    #[error("item not in grid: {0}")]
    UnknownItem(ItemKey),

    #[error("item already in grid: {0}")]
    DuplicateItem(ItemKey),
}

/// Errors reported by an actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    #[error("target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("no screen position for {0}")]
    NoScreenPosition(ContainerKind),

    #[error("move failed: {0}")]
    MoveFailed(String),
}

/// Why a sort stopped before draining its queue.
///
/// Moves applied before the failure are kept; they correspond to physical
/// actions that have already happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortFailure {
    #[error("out of space: item {item} ({width}x{height}) does not fit at row {row}")]
    OutOfSpace {
        item: ItemKey,
        width: u32,
        height: u32,
        row: u32,
    },

    #[error("no room to displace item {blocker} from the target of item {item}")]
    NoDisplacementSpace { item: ItemKey, blocker: ItemKey },

    #[error("target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("actuator error: {0}")]
    Actuator(String),

    #[error("grid error: {0}")]
    Grid(#[from] GridError),
}

impl SortFailure {
    /// Returns whether retrying after the user frees space could succeed.
    pub fn is_space_error(&self) -> bool {
        matches!(
            self,
            SortFailure::OutOfSpace { .. } | SortFailure::NoDisplacementSpace { .. }
        )
    }

    /// Short label for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            SortFailure::OutOfSpace { .. } => "OUT_OF_SPACE",
            SortFailure::NoDisplacementSpace { .. } => "NO_DISPLACEMENT_SPACE",
            SortFailure::TargetUnavailable(_) => "TARGET_UNAVAILABLE",
            SortFailure::Actuator(_) => "ACTUATOR_ERROR",
            SortFailure::Grid(_) => "GRID_ERROR",
        }
    }
}

impl From<ActuatorError> for SortFailure {
    fn from(err: ActuatorError) -> Self {
        match err {
            ActuatorError::TargetUnavailable(reason) => SortFailure::TargetUnavailable(reason),
            other => SortFailure::Actuator(other.to_string()),
        }
    }
}

/// Errors raised before a sort can start.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("container {0} cannot be sorted")]
    NotSortable(ContainerKind),

    #[error("invalid sort order: {0}")]
    InvalidSortOrder(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}
