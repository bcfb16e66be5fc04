//! Fluorosim CLI - headless driver for the C-arm simulator.
//!
//! Solve camera poses, render DRR frames to PNG, sweep a joint through its
//! travel, or replay a JSON command script against a fresh simulator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use drr::FrameBuffer;
use fluorosim::{CarmSimulator, Command, MachineProfile};
use kinematics::camera::solve_pose;
use kinematics::joint::{JointId, JointVector};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Fluorosim CLI - drive the C-arm simulator without a UI
#[derive(Parser)]
#[command(name = "fluorosim")]
#[command(about = "Headless driver for the C-arm fluoroscopy simulator")]
struct Cli {
    /// Machine profile to load (KDL, default: built-in machine)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the camera pose for a set of joint values
    Pose {
        #[command(flatten)]
        joints: JointArgs,
    },

    /// Render one DRR frame to a PNG file
    Render {
        #[command(flatten)]
        joints: JointArgs,

        /// Output image path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Sweep one joint across its travel, rendering a frame per step
    Sweep {
        /// Joint to sweep (c_rotation, gantry, wag, table, zoom, instrument)
        #[arg(short, long)]
        joint: String,

        /// Number of frames to render
        #[arg(short = 'n', long, default_value_t = 10)]
        frames: u32,

        /// Directory for the frames and the session log
        #[arg(short, long, default_value = "sweep")]
        output_dir: PathBuf,
    },

    /// Print the active machine profile as KDL
    Profile,

    /// Replay JSON commands (one per line) from a file or stdin
    Run {
        /// Script file; reads stdin when omitted
        script: Option<PathBuf>,
    },
}

/// Joint values shared by the pose and render commands.
#[derive(Args)]
struct JointArgs {
    /// Orbital C rotation in degrees (0 to 100)
    #[arg(long, default_value_t = 0.0)]
    c_rotation: f64,

    /// Gantry tilt in degrees (-55 to 55)
    #[arg(long, default_value_t = 0.0)]
    gantry: f64,

    /// Wag swing in degrees (-40 to 40)
    #[arg(long, default_value_t = 0.0)]
    wag: f64,

    /// Table travel in drive units (-155 to 155)
    #[arg(long, default_value_t = 0.0)]
    table: f64,

    /// Zoom step (0 to 50)
    #[arg(long, default_value_t = 0.0)]
    zoom: f64,

    /// Instrument offset (-55 to 55)
    #[arg(long, default_value_t = 0.0)]
    instrument: f64,
}

impl JointArgs {
    fn to_vector(&self) -> JointVector {
        let mut joints = JointVector::default();
        joints.set(JointId::CRotation, self.c_rotation);
        joints.set(JointId::Gantry, self.gantry);
        joints.set(JointId::Wag, self.wag);
        joints.set(JointId::Table, self.table);
        joints.set(JointId::Zoom, self.zoom);
        joints.set(JointId::Instrument, self.instrument);
        joints
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let profile = load_profile(cli.profile.as_deref())?;

    match cli.command {
        Commands::Pose { joints } => print_pose(profile, &joints),
        Commands::Render { joints, output } => render_frame(profile, &joints, &output),
        Commands::Sweep {
            joint,
            frames,
            output_dir,
        } => sweep_joint(profile, &joint, frames, &output_dir),
        Commands::Profile => print_profile(profile),
        Commands::Run { script } => run_script(profile, script.as_deref()),
    }
}

/// Load the machine profile, falling back to the built-in machine.
fn load_profile(path: Option<&Path>) -> Result<MachineProfile> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            MachineProfile::from_kdl(&text)
                .with_context(|| format!("Invalid machine profile {}", path.display()))
        }
        None => Ok(MachineProfile::default()),
    }
}

/// Solve and print the camera pose as JSON.
fn print_pose(profile: MachineProfile, args: &JointArgs) -> Result<()> {
    let pose = solve_pose(&args.to_vector(), &profile.geometry);
    println!("{}", serde_json::to_string_pretty(&pose)?);
    Ok(())
}

/// Render one frame at the given joint values and save it as PNG.
fn render_frame(profile: MachineProfile, args: &JointArgs, output: &Path) -> Result<()> {
    let mut simulator = CarmSimulator::with_software_renderer(profile);
    simulator.assemble_scene()?;
    simulator.set_drr_active(true)?;

    // Joint motion after activation re-renders, so the captured frame shows
    // the requested values rather than the reference pose
    let joints = args.to_vector();
    for joint in JointVector::ORDER {
        simulator.set_joint(joint, joints.get(joint))?;
    }

    let frame = simulator.capture_frame()?;
    save_png(&frame, output)?;
    println!("Wrote {} ({})", output.display(), frame.size());
    Ok(())
}

/// Step one joint from its minimum to its maximum, saving a frame per step
/// and a CSV session log alongside.
fn sweep_joint(profile: MachineProfile, joint: &str, frames: u32, output_dir: &Path) -> Result<()> {
    if frames == 0 {
        return Err(anyhow::anyhow!("Sweep needs at least one frame"));
    }
    let joint = parse_joint(joint)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut simulator = CarmSimulator::with_software_renderer(profile);
    simulator.assemble_scene()?;
    simulator.set_drr_active(true)?;

    let mut log = String::from("frame");
    for label in CarmSimulator::log_header() {
        log.push(',');
        log.push_str(&label);
    }
    log.push('\n');

    let (min, max) = joint.range();
    for index in 0..frames {
        let t = if frames > 1 {
            index as f64 / (frames - 1) as f64
        } else {
            0.0
        };
        simulator.set_joint(joint, min + t * (max - min))?;

        let frame = simulator.capture_frame()?;
        save_png(&frame, &output_dir.join(format!("frame_{:03}.png", index)))?;

        log.push_str(&index.to_string());
        for value in simulator.log_row() {
            log.push_str(&format!(",{}", value));
        }
        log.push('\n');
    }

    let log_path = output_dir.join("session.csv");
    std::fs::write(&log_path, log)
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    println!(
        "Wrote {} frames and session.csv to {}",
        frames,
        output_dir.display()
    );
    Ok(())
}

/// Print the active profile as KDL.
fn print_profile(profile: MachineProfile) -> Result<()> {
    println!("{}", profile.to_kdl());
    Ok(())
}

/// Execute commands line by line against one simulator, printing each
/// outcome as JSON.
fn run_script(profile: MachineProfile, script: Option<&Path>) -> Result<()> {
    let text = match script {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut simulator = CarmSimulator::with_software_renderer(profile);
    simulator.assemble_scene()?;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: Command = serde_json::from_str(line)
            .with_context(|| format!("Invalid command JSON: {}", line))?;
        let outcome = simulator.apply(&command);
        println!("{}", serde_json::to_string(&outcome)?);
    }
    Ok(())
}

/// Resolve a joint name as it appears in command JSON, like "c_rotation".
fn parse_joint(name: &str) -> Result<JointId> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .with_context(|| format!("Unknown joint '{}'", name))
}

/// Save a grayscale frame as PNG.
fn save_png(frame: &FrameBuffer, path: &Path) -> Result<()> {
    let size = frame.size();
    image::GrayImage::from_raw(size.width, size.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow::anyhow!("Frame buffer does not match its declared size"))?
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
