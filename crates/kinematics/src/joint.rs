//! Joint values and the local matrices they drive
//!
//! Each operator-facing control maps to one entry of [`JointVector`]. Values
//! are clamped to the machine's travel limits at the moment they are set, so
//! everything downstream can assume in-range inputs. Joints that move a node
//! of the transform hierarchy also know how to produce that node's local
//! matrix; the zoom and instrument controls have no hierarchy node and fold
//! into the camera and the imaging scene instead.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::geometry::MachineGeometry;

/// Builds the rigid transform that rotates about an arbitrary pivot point.
///
/// Applied to a point this reads right to left: move the pivot to the
/// origin, rotate, move back.
pub fn rotate_about(pivot: DVec3, rotation: DQuat) -> DMat4 {
    DMat4::from_translation(pivot) * DMat4::from_quat(rotation) * DMat4::from_translation(-pivot)
}

/// Identifies one operator-facing control of the machine.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    /// Orbital rotation of the C about the isocenter, in degrees
    CRotation,
    /// Tilt of the gantry about the horizontal axis, in degrees
    Gantry,
    /// Horizontal swing of the whole arm about its column, in degrees
    Wag,
    /// Longitudinal table travel, in drive units
    Table,
    /// Magnification step; shortens the source-to-isocenter distance
    Zoom,
    /// Lateral offset of the tracked instrument inside the imaging scene
    Instrument,
}

impl JointId {
    /// Travel limits of this control as `(min, max)`
    pub fn range(self) -> (f64, f64) {
        match self {
            JointId::CRotation => (0.0, 100.0),
            JointId::Gantry => (-55.0, 55.0),
            JointId::Wag => (-40.0, 40.0),
            JointId::Table => (-155.0, 155.0),
            JointId::Zoom => (0.0, 50.0),
            JointId::Instrument => (-55.0, 55.0),
        }
    }

    /// Clamps a requested value to this control's travel limits
    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.range();
        value.clamp(min, max)
    }

    /// Local matrix for the hierarchy node this joint drives, or `None` for
    /// controls that bypass the transform chain.
    ///
    /// The value is clamped before any matrix is built, so an out-of-range
    /// request can never push a node past the machine's travel limits.
    pub fn local_matrix(self, value: f64, geometry: &MachineGeometry) -> Option<DMat4> {
        let value = self.clamp(value);
        match self {
            JointId::CRotation => Some(rotate_about(
                geometry.c_pivot,
                DQuat::from_rotation_z(value.to_radians()),
            )),
            JointId::Gantry => Some(DMat4::from_quat(DQuat::from_rotation_x(value.to_radians()))),
            JointId::Wag => Some(rotate_about(
                DVec3::new(geometry.wag_pivot_x, 0.0, 0.0),
                DQuat::from_rotation_y(value.to_radians()),
            )),
            JointId::Table => Some(DMat4::from_translation(DVec3::new(
                0.0,
                geometry.table_drive_scale * value,
                0.0,
            ))),
            JointId::Zoom | JointId::Instrument => None,
        }
    }
}

/// Current values of every control, in the units of [`JointId`].
///
/// The plain fields make snapshots cheap to copy and serialize; use
/// [`JointVector::set`] rather than writing fields directly so the travel
/// limits are enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointVector {
    pub c_rotation: f64,
    pub gantry: f64,
    pub wag: f64,
    pub table: f64,
    pub zoom: f64,
    pub instrument: f64,
}

impl JointVector {
    /// All controls listed in the order log rows are emitted
    pub const ORDER: [JointId; 6] = [
        JointId::CRotation,
        JointId::Gantry,
        JointId::Wag,
        JointId::Table,
        JointId::Zoom,
        JointId::Instrument,
    ];

    /// Reads the current value of one control
    pub fn get(&self, id: JointId) -> f64 {
        match id {
            JointId::CRotation => self.c_rotation,
            JointId::Gantry => self.gantry,
            JointId::Wag => self.wag,
            JointId::Table => self.table,
            JointId::Zoom => self.zoom,
            JointId::Instrument => self.instrument,
        }
    }

    /// Stores a value for one control, clamped to its travel limits, and
    /// returns the value actually applied
    pub fn set(&mut self, id: JointId, value: f64) -> f64 {
        let applied = id.clamp(value);
        match id {
            JointId::CRotation => self.c_rotation = applied,
            JointId::Gantry => self.gantry = applied,
            JointId::Wag => self.wag = applied,
            JointId::Table => self.table = applied,
            JointId::Zoom => self.zoom = applied,
            JointId::Instrument => self.instrument = applied,
        }
        applied
    }

    /// Values of every control in [`JointVector::ORDER`]
    pub fn row(&self) -> [f64; 6] {
        Self::ORDER.map(|id| self.get(id))
    }
}
