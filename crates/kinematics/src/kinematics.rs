//! # Machine kinematics for a mobile C-arm
//!
//! This crate describes the moving parts of the imaging system as pure math:
//! the machine's fixed geometry, the clamped joint values an operator can
//! drive, the local matrix each joint contributes to the transform hierarchy,
//! and the virtual-camera pose implied by a full set of joint values.
//!
//! Nothing here owns scene state. The simulator core feeds these functions
//! and pushes the resulting matrices into its scene graph.

pub mod camera;
pub mod geometry;
pub mod joint;
