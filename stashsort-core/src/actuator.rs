//! Actuation interface and screen geometry.
//!
//! Each placement operation is replayed as one pointer drag from the centre
//! of the item's current footprint to the centre of its destination. The
//! driver that performs the drag lives outside this crate; it only has to
//! implement [`Actuator`].

use crate::container::ContainerKind;
use crate::error::ActuatorError;
use crate::item::{Footprint, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// A cell in a specific container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub container: ContainerKind,
    pub pos: Position,
}

impl Location {
    pub fn new(container: ContainerKind, pos: Position) -> Self {
        Self { container, pos }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.container.name(), self.pos)
    }
}

/// Performs physical pick-and-place moves.
///
/// `move_item` blocks until the move has settled. It is called once per
/// placement, in order.
pub trait Actuator: Send {
    /// Checks that the game window is present and focused.
    fn ensure_target(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn move_item(
        &mut self,
        from: Location,
        to: Location,
        footprint: Footprint,
    ) -> Result<(), ActuatorError>;
}

/// A point on screen, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.0},{:.0})", self.x, self.y)
    }
}

/// On-screen placement of the container grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenLayout {
    /// Top-left pixel of cell (0,0) of any stash-like container.
    pub stash_origin: ScreenPoint,
    /// Top-left pixel of cell (0,0) of the bag.
    pub bag_origin: ScreenPoint,
    /// Pixels between adjacent cells.
    pub cell_pitch: f64,
    /// Time to let each drag phase settle.
    #[serde(with = "millis")]
    pub settle: Duration,
}

impl Default for ScreenLayout {
    /// Geometry for a 1920x1080 client.
    fn default() -> Self {
        Self {
            stash_origin: ScreenPoint::new(1378.0, 199.0),
            bag_origin: ScreenPoint::new(690.0, 626.0),
            cell_pitch: 40.0,
            settle: Duration::from_millis(200),
        }
    }
}

impl ScreenLayout {
    pub fn origin(&self, container: ContainerKind) -> Option<ScreenPoint> {
        if container.is_stash() {
            Some(self.stash_origin)
        } else if container == ContainerKind::Bag {
            Some(self.bag_origin)
        } else {
            None
        }
    }

    /// Pixel centre of a footprint anchored at `loc`.
    pub fn center(&self, loc: Location, footprint: Footprint) -> Result<ScreenPoint, ActuatorError> {
        let origin = self
            .origin(loc.container)
            .ok_or(ActuatorError::NoScreenPosition(loc.container))?;
        Ok(ScreenPoint::new(
            origin.x + self.cell_pitch * (loc.pos.x as f64 + footprint.width as f64 / 2.0),
            origin.y + self.cell_pitch * (loc.pos.y as f64 + footprint.height as f64 / 2.0),
        ))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// One drag as the dry-run actuator saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDrag {
    pub from: Location,
    pub to: Location,
    pub footprint: Footprint,
    pub start: ScreenPoint,
    pub end: ScreenPoint,
}

/// Logs and records drags without touching the pointer.
#[derive(Debug, Default)]
pub struct DryRunActuator {
    layout: ScreenLayout,
    drags: Vec<RecordedDrag>,
}

impl DryRunActuator {
    pub fn new(layout: ScreenLayout) -> Self {
        Self {
            layout,
            drags: Vec::new(),
        }
    }

    pub fn drags(&self) -> &[RecordedDrag] {
        &self.drags
    }

    pub fn into_drags(self) -> Vec<RecordedDrag> {
        self.drags
    }
}

impl Actuator for DryRunActuator {
    fn move_item(
        &mut self,
        from: Location,
        to: Location,
        footprint: Footprint,
    ) -> Result<(), ActuatorError> {
        let start = self.layout.center(from, footprint)?;
        let end = self.layout.center(to, footprint)?;
        info!("drag {} {} -> {} {} [{}]", from, start, to, end, footprint);
        self.drags.push(RecordedDrag {
            from,
            to,
            footprint,
            start,
            end,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_of_footprint() {
        let layout = ScreenLayout::default();
        let p = layout
            .center(
                Location::new(ContainerKind::Storage, Position::new(0, 0)),
                Footprint::new(2, 2),
            )
            .unwrap();
        assert_eq!(p, ScreenPoint::new(1418.0, 239.0));

        let p = layout
            .center(
                Location::new(ContainerKind::Bag, Position::new(3, 1)),
                Footprint::UNIT,
            )
            .unwrap();
        assert_eq!(p, ScreenPoint::new(690.0 + 140.0, 626.0 + 60.0));
    }

    #[test]
    fn test_no_screen_position_for_equipment() {
        let layout = ScreenLayout::default();
        let err = layout
            .center(
                Location::new(ContainerKind::Equipment, Position::new(0, 0)),
                Footprint::UNIT,
            )
            .unwrap_err();
        assert_eq!(err, ActuatorError::NoScreenPosition(ContainerKind::Equipment));
    }

    #[test]
    fn test_dry_run_records() {
        let mut actuator = DryRunActuator::default();
        actuator.ensure_target().unwrap();
        actuator
            .move_item(
                Location::new(ContainerKind::Storage, Position::new(11, 19)),
                Location::new(ContainerKind::Bag, Position::new(0, 0)),
                Footprint::UNIT,
            )
            .unwrap();
        assert_eq!(actuator.drags().len(), 1);
        assert_eq!(actuator.drags()[0].end, ScreenPoint::new(710.0, 646.0));
    }

    #[test]
    fn test_layout_serde_millis() {
        let layout: ScreenLayout = serde_json::from_str(r#"{"settle": 350}"#).unwrap();
        assert_eq!(layout.settle, Duration::from_millis(350));
        assert_eq!(layout.cell_pitch, 40.0);
    }
}
