//! Pipeline state machine and the host-facing render traits.
//!
//! The pipeline tracks a single piece of state: whether the DRR view has
//! never been set up, is live on the monitor, or is temporarily hidden. Every
//! transition that can put a frame on screen takes the camera pose to render
//! with, so the pipeline itself never caches machine state. Hiding is cheap
//! (a visibility flip), and a hidden pipeline defers rendering entirely; the
//! frame shown after reactivation is rendered fresh from whatever pose the
//! caller passes in, so it always reflects the latest joint values.

use kinematics::camera::CameraPose;
use std::fmt;
use strum_macros::Display;

use crate::frame::{FrameBuffer, FrameSize};

/// Error raised by the render side of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The offscreen render target could not be allocated
    TargetAllocation(String),
    /// A render pass failed after the target was in place
    Render(String),
    /// The rendered frame could not be read back
    Capture(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::TargetAllocation(msg) => {
                write!(f, "Failed to allocate render target: {}", msg)
            }
            RenderError::Render(msg) => write!(f, "Render pass failed: {}", msg),
            RenderError::Capture(msg) => write!(f, "Frame capture failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// The offscreen renderer a host plugs into the pipeline.
///
/// Implementations own their scene content; the pipeline only tells them
/// where the camera stands and when to produce a frame. `render` blocks until
/// the frame is complete.
pub trait OffscreenRenderer {
    /// Allocates (or reallocates) the offscreen target at the given size
    fn allocate_target(&mut self, size: FrameSize) -> Result<(), RenderError>;

    /// Positions the virtual beam camera for the next render
    fn set_camera_pose(&mut self, pose: &CameraPose);

    /// Moves the tracked instrument inside the offscreen scene.
    ///
    /// Renderers without an instrument can ignore this; the default does.
    fn set_instrument_offset(&mut self, _offset: f64) {}

    /// Renders one frame to completion
    fn render(&mut self) -> Result<(), RenderError>;

    /// Reads back the most recently rendered frame
    fn capture_frame(&self) -> Result<FrameBuffer, RenderError>;
}

/// The surface that shows captured frames to the operator.
///
/// In the full system this is a textured plane hanging in the host's scene;
/// in tests it is usually a [`BufferedDisplay`].
pub trait DisplaySurface {
    /// Replaces the displayed texture with a new frame
    fn set_texture(&mut self, frame: &FrameBuffer);

    /// Shows or hides the surface without touching the texture
    fn set_visible(&mut self, visible: bool);
}

/// Lifecycle of the DRR view.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No render target exists yet; nothing has ever been shown
    #[default]
    Uninitialized,
    /// The target is allocated and the monitor shows the latest frame
    Active,
    /// The target is allocated but the monitor is hidden; rendering is
    /// deferred until reactivation
    Hidden,
}

/// Drives the offscreen renderer and the display surface through the
/// [`PipelineState`] lifecycle.
///
/// State only advances after the work backing a transition has succeeded:
/// a failed first enable leaves the pipeline `Uninitialized` and the next
/// enable starts over from scratch.
pub struct DrrPipeline {
    state: PipelineState,
    frame_size: FrameSize,
}

impl DrrPipeline {
    pub fn new(frame_size: FrameSize) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            frame_size,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == PipelineState::Active
    }

    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    /// Brings the DRR view on screen.
    ///
    /// From `Uninitialized` this allocates the render target, renders the
    /// given pose, publishes the frame, and shows the surface. From `Hidden`
    /// it re-renders the given pose before showing the surface again, so the
    /// operator never sees a frame older than the current joint values. An
    /// `Active` pipeline is left untouched.
    pub fn enable(
        &mut self,
        pose: &CameraPose,
        renderer: &mut dyn OffscreenRenderer,
        display: &mut dyn DisplaySurface,
    ) -> Result<PipelineState, RenderError> {
        match self.state {
            PipelineState::Uninitialized => {
                if let Err(err) = renderer.allocate_target(self.frame_size) {
                    log::error!(
                        "Offscreen target allocation ({}) failed: {}",
                        self.frame_size,
                        err
                    );
                    return Err(err);
                }
                self.render_to_display(pose, renderer, display)?;
                display.set_visible(true);
                self.state = PipelineState::Active;
                log::info!("DRR pipeline initialized at {}", self.frame_size);
            }
            PipelineState::Hidden => {
                self.render_to_display(pose, renderer, display)?;
                display.set_visible(true);
                self.state = PipelineState::Active;
                log::info!("DRR pipeline reactivated");
            }
            PipelineState::Active => {}
        }
        Ok(self.state)
    }

    /// Takes the DRR view off screen without releasing the render target.
    ///
    /// Only an `Active` pipeline changes state; disabling is never an error.
    pub fn disable(&mut self, display: &mut dyn DisplaySurface) -> PipelineState {
        if self.state == PipelineState::Active {
            display.set_visible(false);
            self.state = PipelineState::Hidden;
            log::info!("DRR pipeline hidden");
        }
        self.state
    }

    /// Renders a fresh frame for the given pose if the view is on screen.
    ///
    /// Returns whether a frame was actually rendered. A hidden or
    /// uninitialized pipeline defers, which keeps joint motion cheap while
    /// the view is off.
    pub fn refresh(
        &mut self,
        pose: &CameraPose,
        renderer: &mut dyn OffscreenRenderer,
        display: &mut dyn DisplaySurface,
    ) -> Result<bool, RenderError> {
        match self.state {
            PipelineState::Active => {
                self.render_to_display(pose, renderer, display)?;
                Ok(true)
            }
            PipelineState::Uninitialized | PipelineState::Hidden => {
                log::debug!("DRR refresh deferred while {}", self.state);
                Ok(false)
            }
        }
    }

    fn render_to_display(
        &self,
        pose: &CameraPose,
        renderer: &mut dyn OffscreenRenderer,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), RenderError> {
        renderer.set_camera_pose(pose);
        renderer.render()?;
        let frame = renderer.capture_frame()?;
        display.set_texture(&frame);
        Ok(())
    }
}

/// A [`DisplaySurface`] that just keeps the latest frame in memory.
///
/// Useful for headless hosts and for asserting on pipeline behavior in
/// tests.
#[derive(Debug, Default)]
pub struct BufferedDisplay {
    frame: Option<FrameBuffer>,
    visible: bool,
}

impl BufferedDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent frame published to this surface, if any
    pub fn latest_frame(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl DisplaySurface for BufferedDisplay {
    fn set_texture(&mut self, frame: &FrameBuffer) {
        self.frame = Some(frame.clone());
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}
