//! Virtual-camera pose for the beam's eye view
//!
//! The fluoroscopic image is synthesized from a camera standing in for the
//! beam source and looking at the isocenter. This module turns a full set of
//! joint values into that camera's pose. The pose is rebuilt from scratch on
//! every call; identical joint values always produce the identical pose, so
//! rendered frames are reproducible.
//!
//! Stages are applied to the camera position in a fixed order: the zoomed
//! source distance along -Y, the orbital rotation about Z, the gantry tilt
//! about X, the wag swing about its vertical pivot, and finally the table
//! travel. The focal point only picks up the wag and table stages, because
//! orbital and gantry motion pivot the source around the patient rather than
//! moving the patient.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::geometry::MachineGeometry;
use crate::joint::{rotate_about, JointId, JointVector};

/// Pose of the virtual beam camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Where the beam source sits, in scene units
    pub position: DVec3,
    /// The point the beam is aimed at
    pub focal_point: DVec3,
    /// Up direction of the resulting image
    pub view_up: DVec3,
}

impl CameraPose {
    /// The pose at all-default joint values: source on the -Y axis at the
    /// full source distance, aimed at the origin, image up along +Z.
    pub fn reference(geometry: &MachineGeometry) -> Self {
        Self {
            position: DVec3::new(0.0, -geometry.source_distance, 0.0),
            focal_point: DVec3::ZERO,
            view_up: DVec3::Z,
        }
    }

    /// Unit vector from the source toward the focal point
    pub fn forward(&self) -> DVec3 {
        (self.focal_point - self.position).normalize()
    }
}

/// Computes the camera pose implied by a set of joint values.
///
/// Inputs are clamped to their travel limits before any math runs, so a raw
/// [`JointVector`] built from untrusted values is safe to pass straight in.
pub fn solve_pose(joints: &JointVector, geometry: &MachineGeometry) -> CameraPose {
    let c = JointId::CRotation.clamp(joints.c_rotation).to_radians();
    let gantry = JointId::Gantry.clamp(joints.gantry).to_radians();
    let wag = JointId::Wag.clamp(joints.wag).to_radians();
    let table = JointId::Table.clamp(joints.table);
    let zoom = JointId::Zoom.clamp(joints.zoom);

    // Source position before any joint moves: out along -Y by the zoomed
    // source distance
    let start = DVec3::new(0.0, -geometry.camera_distance(zoom), 0.0);

    // Orbital rotation is applied to the point before the gantry tilt
    let arm_rotation = DQuat::from_rotation_x(gantry) * DQuat::from_rotation_z(-c);

    // Wag swings the whole arm about its vertical pivot; table travel then
    // carries source and aim point together
    let wag_swing = rotate_about(
        DVec3::new(geometry.wag_pivot_x, 0.0, 0.0),
        DQuat::from_rotation_y(wag),
    );
    let table_travel = DMat4::from_translation(DVec3::new(
        0.0,
        0.0,
        geometry.table_drive_scale * table,
    ));
    let carrier = table_travel * wag_swing;

    let position = carrier.transform_point3(arm_rotation * start);
    let focal_point = carrier.transform_point3(DVec3::ZERO);
    let view_up = DQuat::from_rotation_y(wag) * (arm_rotation * DVec3::Z);

    CameraPose {
        position,
        focal_point,
        view_up,
    }
}
