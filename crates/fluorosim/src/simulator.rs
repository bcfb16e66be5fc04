//! The simulator façade.
//!
//! [`CarmSimulator`] owns every moving part: the transform hierarchy, the
//! joint state, the machine geometry, and the DRR pipeline together with the
//! renderer and display surface plugged into it. Hosts drive it through a
//! deliberately narrow surface: one setter per control, one DRR toggle, and
//! the [`Command`] envelope that wraps both for scripted sessions.
//!
//! Setters are safe to call at any time. Before the hierarchy is assembled
//! they store the (clamped) value and defer the node update; afterwards they
//! push matrices immediately and re-render if the DRR view is on screen.
//! Only the DRR toggle demands an assembled hierarchy, because it has to
//! reach the monitor plane node.

use drr::{
    BufferedDisplay, DisplaySurface, DrrPipeline, FrameBuffer, OffscreenRenderer, PipelineState,
    RayMarchRenderer, RenderError, VoxelVolume,
};
use kinematics::camera::{solve_pose, CameraPose};
use kinematics::geometry::MachineGeometry;
use kinematics::joint::{JointId, JointVector};
use scene_graph::{AttachError, SceneGraph};
use std::fmt;

use crate::command::{Command, CommandOutcome};
use crate::config::MachineProfile;
use crate::scene::{self, SceneHandles};

/// Error surfaced by simulator operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorError {
    /// The operation needs the machine hierarchy, which has not been
    /// assembled yet
    NotReady,
    /// A hierarchy edit failed while assembling the machine
    Scene(AttachError),
    /// The render side of the DRR pipeline failed
    Render(RenderError),
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::NotReady => write!(f, "Scene hierarchy has not been assembled"),
            SimulatorError::Scene(err) => write!(f, "Scene assembly failed: {}", err),
            SimulatorError::Render(err) => write!(f, "DRR pipeline error: {}", err),
        }
    }
}

impl std::error::Error for SimulatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulatorError::NotReady => None,
            SimulatorError::Scene(err) => Some(err),
            SimulatorError::Render(err) => Some(err),
        }
    }
}

impl From<AttachError> for SimulatorError {
    fn from(err: AttachError) -> Self {
        SimulatorError::Scene(err)
    }
}

impl From<RenderError> for SimulatorError {
    fn from(err: RenderError) -> Self {
        SimulatorError::Render(err)
    }
}

/// The assembled machine: hierarchy, joints, camera, and DRR view in one
/// place.
///
/// Construction wires the renderer and display in but touches neither; call
/// [`CarmSimulator::assemble_scene`] to build the hierarchy and
/// [`CarmSimulator::set_drr_active`] to bring the DRR view up.
pub struct CarmSimulator {
    graph: SceneGraph,
    handles: Option<SceneHandles>,
    joints: JointVector,
    geometry: MachineGeometry,
    pipeline: DrrPipeline,
    renderer: Box<dyn OffscreenRenderer>,
    display: Box<dyn DisplaySurface>,
}

impl CarmSimulator {
    pub fn new(
        profile: MachineProfile,
        renderer: Box<dyn OffscreenRenderer>,
        display: Box<dyn DisplaySurface>,
    ) -> Self {
        Self {
            graph: SceneGraph::new(),
            handles: None,
            joints: JointVector::default(),
            geometry: profile.geometry,
            pipeline: DrrPipeline::new(profile.frame_size),
            renderer,
            display,
        }
    }

    /// A simulator backed by the built-in ray-march renderer over the
    /// standard phantom, publishing frames to an in-memory display.
    pub fn with_software_renderer(profile: MachineProfile) -> Self {
        Self::new(
            profile,
            Box::new(RayMarchRenderer::new(VoxelVolume::phantom())),
            Box::new(BufferedDisplay::new()),
        )
    }

    /// Builds the machine hierarchy and pushes the current joint values into
    /// it.
    ///
    /// Safe to call again on an assembled simulator; the existing nodes are
    /// reused. The monitor plane's visibility is synced to the DRR state, so
    /// a fresh assembly starts with the monitor hidden.
    pub fn assemble_scene(&mut self) -> Result<(), SimulatorError> {
        let handles = scene::assemble(&mut self.graph, &self.geometry)?;
        scene::apply_joints(&mut self.graph, &handles, &self.joints, &self.geometry);
        self.graph
            .set_visible(handles.drr_to_monitor, self.pipeline.is_active());
        self.handles = Some(handles);
        log::info!("Machine hierarchy assembled");
        Ok(())
    }

    /// Whether the hierarchy has been assembled
    pub fn is_ready(&self) -> bool {
        self.handles.is_some()
    }

    /// Drives one control to an absolute value and returns the value
    /// actually applied after clamping.
    ///
    /// Before assembly the value is stored and the node update deferred.
    /// While the DRR view is active, a joint change re-renders the frame;
    /// that render is the only way this can fail.
    pub fn set_joint(&mut self, joint: JointId, value: f64) -> Result<f64, SimulatorError> {
        let applied = self.joints.set(joint, value);
        if applied != value {
            log::debug!("{} request {} clamped to {}", joint, value, applied);
        }

        let handles = match self.handles {
            Some(handles) => handles,
            None => {
                log::debug!("{} stored before assembly; node update deferred", joint);
                return Ok(applied);
            }
        };

        if let Some(node) = handles.node_for(joint) {
            if let Some(matrix) = joint.local_matrix(applied, &self.geometry) {
                self.graph.set_local_matrix(node, matrix);
            }
        }
        if joint == JointId::Instrument {
            self.renderer.set_instrument_offset(applied);
        }

        let pose = solve_pose(&self.joints, &self.geometry);
        self.pipeline
            .refresh(&pose, self.renderer.as_mut(), self.display.as_mut())?;
        Ok(applied)
    }

    /// Turns the DRR view on or off.
    ///
    /// The first activation renders the machine's reference pose; every
    /// later activation renders the pose implied by the current joint
    /// values. Turning the view off hides the monitor without rendering.
    pub fn set_drr_active(&mut self, active: bool) -> Result<PipelineState, SimulatorError> {
        let handles = self.handles.ok_or(SimulatorError::NotReady)?;

        if active {
            let pose = match self.pipeline.state() {
                PipelineState::Uninitialized => CameraPose::reference(&self.geometry),
                PipelineState::Active | PipelineState::Hidden => {
                    solve_pose(&self.joints, &self.geometry)
                }
            };
            self.renderer.set_instrument_offset(self.joints.instrument);
            let state = self
                .pipeline
                .enable(&pose, self.renderer.as_mut(), self.display.as_mut())?;
            self.graph.set_visible(handles.drr_to_monitor, true);
            Ok(state)
        } else {
            let state = self.pipeline.disable(self.display.as_mut());
            self.graph.set_visible(handles.drr_to_monitor, false);
            Ok(state)
        }
    }

    /// Executes one [`Command`], translating any failure into an error
    /// outcome rather than propagating it.
    pub fn apply(&mut self, command: &Command) -> CommandOutcome {
        match command {
            Command::SetJoint { joint, value } => match self.set_joint(*joint, *value) {
                Ok(applied) => CommandOutcome::applied_one(*joint, applied),
                Err(err) => CommandOutcome::error(err.to_string()),
            },
            Command::NudgeJoint { joint, delta } => {
                let target = self.joints.get(*joint) + *delta;
                match self.set_joint(*joint, target) {
                    Ok(applied) => CommandOutcome::applied_one(*joint, applied),
                    Err(err) => CommandOutcome::error(err.to_string()),
                }
            }
            Command::SetDrrActive { active } => match self.set_drr_active(*active) {
                Ok(_) => CommandOutcome::done(),
                Err(err) => CommandOutcome::error(err.to_string()),
            },
            Command::Batch { commands } => {
                let mut updates = Vec::new();
                for command in commands {
                    match self.apply(command) {
                        CommandOutcome::Applied { applied } => updates.extend(applied),
                        error @ CommandOutcome::Error { .. } => return error,
                    }
                }
                CommandOutcome::Applied { applied: updates }
            }
        }
    }

    /// Current values of every control
    pub fn joints(&self) -> &JointVector {
        &self.joints
    }

    /// The machine geometry this simulator was built with
    pub fn geometry(&self) -> &MachineGeometry {
        &self.geometry
    }

    /// Read access to the transform hierarchy
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Handles into the assembled hierarchy, if assembly has run
    pub fn handles(&self) -> Option<SceneHandles> {
        self.handles
    }

    /// Current state of the DRR pipeline
    pub fn drr_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// The camera pose implied by the current joint values
    pub fn camera_pose(&self) -> CameraPose {
        solve_pose(&self.joints, &self.geometry)
    }

    /// Reads back the most recently rendered DRR frame
    pub fn capture_frame(&self) -> Result<FrameBuffer, SimulatorError> {
        Ok(self.renderer.capture_frame()?)
    }

    /// Column labels for session log rows, in [`JointVector::ORDER`]
    pub fn log_header() -> [String; 6] {
        JointVector::ORDER.map(|id| id.to_string())
    }

    /// Current joint values as one session log row
    pub fn log_row(&self) -> [f64; 6] {
        self.joints.row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drr::FrameSize;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// What the simulator asked of its renderer, shared with the test.
    #[derive(Default)]
    struct RenderProbe {
        allocations: usize,
        renders: usize,
        last_pose: Option<CameraPose>,
        instrument_offset: f64,
        fail_allocation: bool,
    }

    struct ProbeRenderer {
        probe: Rc<RefCell<RenderProbe>>,
        target: Option<FrameSize>,
    }

    impl OffscreenRenderer for ProbeRenderer {
        fn allocate_target(&mut self, size: FrameSize) -> Result<(), RenderError> {
            let mut probe = self.probe.borrow_mut();
            probe.allocations += 1;
            if probe.fail_allocation {
                return Err(RenderError::TargetAllocation("no device memory".into()));
            }
            self.target = Some(size);
            Ok(())
        }

        fn set_camera_pose(&mut self, pose: &CameraPose) {
            self.probe.borrow_mut().last_pose = Some(*pose);
        }

        fn set_instrument_offset(&mut self, offset: f64) {
            self.probe.borrow_mut().instrument_offset = offset;
        }

        fn render(&mut self) -> Result<(), RenderError> {
            if self.target.is_none() {
                return Err(RenderError::Render("no target".into()));
            }
            self.probe.borrow_mut().renders += 1;
            Ok(())
        }

        fn capture_frame(&self) -> Result<FrameBuffer, RenderError> {
            let size = self
                .target
                .ok_or_else(|| RenderError::Capture("no target".into()))?;
            Ok(FrameBuffer::new(size))
        }
    }

    #[derive(Default)]
    struct DisplayProbe {
        visible: bool,
        frames: usize,
    }

    struct ProbeDisplay {
        probe: Rc<RefCell<DisplayProbe>>,
    }

    impl DisplaySurface for ProbeDisplay {
        fn set_texture(&mut self, _frame: &FrameBuffer) {
            self.probe.borrow_mut().frames += 1;
        }

        fn set_visible(&mut self, visible: bool) {
            self.probe.borrow_mut().visible = visible;
        }
    }

    fn probed_simulator() -> (
        CarmSimulator,
        Rc<RefCell<RenderProbe>>,
        Rc<RefCell<DisplayProbe>>,
    ) {
        let render_probe = Rc::new(RefCell::new(RenderProbe::default()));
        let display_probe = Rc::new(RefCell::new(DisplayProbe::default()));
        let simulator = CarmSimulator::new(
            MachineProfile::default(),
            Box::new(ProbeRenderer {
                probe: Rc::clone(&render_probe),
                target: None,
            }),
            Box::new(ProbeDisplay {
                probe: Rc::clone(&display_probe),
            }),
        );
        (simulator, render_probe, display_probe)
    }

    fn monitor_visible(simulator: &CarmSimulator) -> bool {
        let handles = simulator.handles().unwrap();
        simulator
            .graph()
            .get_node(handles.drr_to_monitor)
            .unwrap()
            .is_visible()
    }

    #[test]
    fn test_setters_store_before_assembly() {
        let (mut simulator, render_probe, _display) = probed_simulator();

        assert!(!simulator.is_ready());
        assert_eq!(simulator.set_joint(JointId::Gantry, 30.0).unwrap(), 30.0);
        assert_eq!(simulator.joints().gantry, 30.0);
        assert_eq!(render_probe.borrow().renders, 0);

        // Assembly picks the stored value up
        simulator.assemble_scene().unwrap();
        let handles = simulator.handles().unwrap();
        let expected = JointId::Gantry
            .local_matrix(30.0, simulator.geometry())
            .unwrap();
        assert_eq!(simulator.graph().local_matrix(handles.gantry), Some(expected));
    }

    #[test]
    fn test_setter_returns_the_clamped_value() {
        let (mut simulator, _render, _display) = probed_simulator();

        assert_eq!(simulator.set_joint(JointId::Gantry, 500.0).unwrap(), 55.0);
        assert_eq!(simulator.joints().gantry, 55.0);
    }

    #[test]
    fn test_drr_toggle_requires_assembled_scene() {
        let (mut simulator, _render, _display) = probed_simulator();

        let result = simulator.set_drr_active(true);
        assert_eq!(result, Err(SimulatorError::NotReady));
        assert_eq!(simulator.drr_state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_first_enable_renders_the_reference_pose() {
        let (mut simulator, render_probe, display_probe) = probed_simulator();
        simulator.assemble_scene().unwrap();

        // Joints moved before the first activation do not affect the first
        // frame; that one always shows the reference pose
        simulator.set_joint(JointId::CRotation, 40.0).unwrap();
        simulator.set_joint(JointId::Table, 20.0).unwrap();
        simulator.set_drr_active(true).unwrap();

        let expected = CameraPose::reference(simulator.geometry());
        assert_eq!(render_probe.borrow().last_pose, Some(expected));
        assert!(display_probe.borrow().visible);
        assert!(monitor_visible(&simulator));
    }

    #[test]
    fn test_joint_motion_rerenders_while_active() {
        let (mut simulator, render_probe, display_probe) = probed_simulator();
        simulator.assemble_scene().unwrap();
        simulator.set_drr_active(true).unwrap();
        assert_eq!(render_probe.borrow().renders, 1);

        simulator.set_joint(JointId::Wag, 10.0).unwrap();

        assert_eq!(render_probe.borrow().renders, 2);
        assert_eq!(display_probe.borrow().frames, 2);
        let expected = solve_pose(simulator.joints(), simulator.geometry());
        assert_eq!(render_probe.borrow().last_pose, Some(expected));
    }

    #[test]
    fn test_reactivation_renders_current_joint_values() {
        let (mut simulator, render_probe, display_probe) = probed_simulator();
        simulator.assemble_scene().unwrap();

        // enable, move, disable, move while hidden, enable again
        simulator.set_drr_active(true).unwrap();
        simulator.set_joint(JointId::Wag, 10.0).unwrap();
        simulator.set_drr_active(false).unwrap();
        assert!(!display_probe.borrow().visible);
        assert!(!monitor_visible(&simulator));

        simulator.set_joint(JointId::Wag, 25.0).unwrap();
        assert_eq!(render_probe.borrow().renders, 2, "hidden update must defer");

        simulator.set_drr_active(true).unwrap();

        assert_eq!(render_probe.borrow().renders, 3);
        let expected = solve_pose(simulator.joints(), simulator.geometry());
        assert_eq!(render_probe.borrow().last_pose, Some(expected));
        assert!(display_probe.borrow().visible);
        assert!(monitor_visible(&simulator));
    }

    #[test]
    fn test_allocation_failure_is_reported_and_recoverable() {
        let (mut simulator, render_probe, _display) = probed_simulator();
        simulator.assemble_scene().unwrap();

        render_probe.borrow_mut().fail_allocation = true;
        let result = simulator.set_drr_active(true);
        assert!(matches!(
            result,
            Err(SimulatorError::Render(RenderError::TargetAllocation(_)))
        ));
        assert_eq!(simulator.drr_state(), PipelineState::Uninitialized);
        assert!(!monitor_visible(&simulator));

        // Once the renderer recovers, the same simulator activates normally
        render_probe.borrow_mut().fail_allocation = false;
        assert_eq!(
            simulator.set_drr_active(true),
            Ok(PipelineState::Active)
        );
    }

    #[test]
    fn test_instrument_offset_reaches_the_renderer() {
        let (mut simulator, render_probe, _display) = probed_simulator();
        simulator.assemble_scene().unwrap();
        simulator.set_drr_active(true).unwrap();

        simulator.set_joint(JointId::Instrument, 30.0).unwrap();

        assert_eq!(render_probe.borrow().instrument_offset, 30.0);
        // Moving the instrument refreshes the frame like any other control
        assert_eq!(render_probe.borrow().renders, 2);
    }

    #[test]
    fn test_batch_applies_in_order_and_reports_clamped_values() {
        let (mut simulator, _render, _display) = probed_simulator();

        let outcome = simulator.apply(&Command::Batch {
            commands: vec![
                Command::SetJoint {
                    joint: JointId::Gantry,
                    value: 500.0,
                },
                Command::NudgeJoint {
                    joint: JointId::Gantry,
                    delta: -5.0,
                },
            ],
        });

        match outcome {
            CommandOutcome::Applied { applied } => {
                assert_eq!(applied.len(), 2);
                assert_eq!(applied[0].value, 55.0);
                assert_eq!(applied[1].value, 50.0);
            }
            CommandOutcome::Error { message } => panic!("batch failed: {}", message),
        }
        assert_eq!(simulator.joints().gantry, 50.0);
    }

    #[test]
    fn test_batch_stops_at_the_first_failure() {
        let (mut simulator, _render, _display) = probed_simulator();

        // The second command needs an assembled scene and fails there
        let outcome = simulator.apply(&Command::Batch {
            commands: vec![
                Command::SetJoint {
                    joint: JointId::Wag,
                    value: 10.0,
                },
                Command::SetDrrActive { active: true },
                Command::SetJoint {
                    joint: JointId::Wag,
                    value: -10.0,
                },
            ],
        });

        assert!(!outcome.is_ok());
        // Commands before the failure did run; the one after did not
        assert_eq!(simulator.joints().wag, 10.0);
    }

    #[test]
    fn test_log_row_tracks_joint_state() {
        let (mut simulator, _render, _display) = probed_simulator();
        simulator.set_joint(JointId::CRotation, 30.0).unwrap();
        simulator.set_joint(JointId::Zoom, 5.0).unwrap();

        assert_eq!(simulator.log_row(), [30.0, 0.0, 0.0, 0.0, 5.0, 0.0]);
        assert_eq!(CarmSimulator::log_header()[0], "CRotation");
        assert_eq!(CarmSimulator::log_header()[5], "Instrument");
    }

    #[test]
    fn test_software_renderer_end_to_end() {
        let profile = MachineProfile {
            frame_size: FrameSize::new(32, 32),
            ..MachineProfile::default()
        };
        let mut simulator = CarmSimulator::with_software_renderer(profile);
        simulator.assemble_scene().unwrap();
        simulator.set_drr_active(true).unwrap();

        let frame = simulator.capture_frame().unwrap();
        assert_eq!(frame.size(), FrameSize::new(32, 32));
        // The phantom sits in the beam, so the frame is not uniformly white
        assert!(frame.mean_luminance() < 250.0);

        // A zoomed view still renders and captures cleanly
        simulator.set_joint(JointId::Zoom, 50.0).unwrap();
        assert!(simulator.capture_frame().is_ok());
    }
}
