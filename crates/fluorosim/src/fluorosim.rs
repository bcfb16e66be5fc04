//! # Fluorosim
//!
//! The simulator core: one façade type that owns the machine's transform
//! hierarchy, the joint state, and the DRR render pipeline, and exposes the
//! narrow control surface a host UI or script driver talks to.
//!
//! The crates underneath carry the reusable pieces. `scene_graph` is the
//! generic transform tree, `kinematics` turns joint values into matrices and
//! camera poses, and `drr` renders the synthetic fluoro image. This crate
//! wires them into one machine.

pub mod command;
pub mod config;
pub mod scene;
pub mod simulator;

pub use command::{Command, CommandOutcome};
pub use config::MachineProfile;
pub use simulator::{CarmSimulator, SimulatorError};
