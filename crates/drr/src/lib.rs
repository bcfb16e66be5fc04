//! Digitally reconstructed radiograph (DRR) pipeline.
//!
//! This crate owns everything between "the joints moved" and "a new frame is
//! on the monitor plane": the grayscale frame type, the narrow traits a host
//! implements to supply an offscreen renderer and a display surface, the
//! pipeline state machine that decides when a frame is rendered, and a
//! software ray-march renderer that satisfies the renderer trait without any
//! GPU or host toolkit.
//!
//! The pipeline is deliberately stateless about joint values. Callers pass a
//! camera pose into every call that may render, so the pipeline never holds a
//! stale copy of machine state.

mod frame;
mod pipeline;
mod raycast;
mod volume;

pub use frame::{FrameBuffer, FrameSize};
pub use pipeline::{
    BufferedDisplay, DisplaySurface, DrrPipeline, OffscreenRenderer, PipelineState, RenderError,
};
pub use raycast::RayMarchRenderer;
pub use volume::VoxelVolume;
