//! Fixed geometry of the simulated machine
//!
//! These constants describe one concrete C-arm: where its rotation pivots
//! sit, how far the beam source stands from the isocenter, and how the
//! magnification steps fold into that distance. They are plain data so a
//! machine profile can override any of them.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Geometric constants of the simulated C-arm.
///
/// All lengths are in scene units (millimeters). The defaults describe the
/// machine the bundled assets were modeled on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineGeometry {
    /// Pivot of the orbital (C) rotation: the isocenter expressed in the
    /// frame of the C node's parent
    pub c_pivot: DVec3,

    /// X coordinate of the wag pivot; the wag axis is vertical and crosses
    /// the floor plane at (wag_pivot_x, 0, 0)
    pub wag_pivot_x: f64,

    /// Scene units of table travel per unit of table input
    pub table_drive_scale: f64,

    /// Distance from the beam source to the isocenter at zoom zero
    pub source_distance: f64,

    /// Reduction of the source distance per zoom step
    pub zoom_distance_scale: f64,

    /// Local offset of the monitor plane that receives the rendered frames
    pub display_offset: DVec3,
}

impl MachineGeometry {
    /// Effective source-to-isocenter distance for a given zoom value.
    ///
    /// Formula: source_distance - zoom_distance_scale * zoom
    pub fn camera_distance(&self, zoom: f64) -> f64 {
        self.source_distance - self.zoom_distance_scale * zoom
    }
}

impl Default for MachineGeometry {
    fn default() -> Self {
        Self {
            c_pivot: DVec3::new(1262.2704, 337.5527, -5.7),
            wag_pivot_x: 739.2168,
            table_drive_scale: 4.0,
            source_distance: 400.0,
            zoom_distance_scale: 4.0,
            display_offset: DVec3::new(2125.160, 605.795, -340.272),
        }
    }
}
