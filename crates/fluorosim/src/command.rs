//! Command surface for driving the simulator from a host or script.
//!
//! Commands are a serialization-friendly mirror of the [`CarmSimulator`]
//! methods: a session recorder can log them, a script driver can replay
//! them, and a UI can forward slider events as them. Each command carries
//! everything needed to execute it, and every outcome reports the values
//! that were actually applied after clamping.
//!
//! [`CarmSimulator`]: crate::simulator::CarmSimulator

use kinematics::joint::JointId;
use serde::{Deserialize, Serialize};

/// A single instruction for the simulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // === Joint motion ===
    /// Drive one control to an absolute value. The value is clamped to the
    /// control's travel limits before anything moves.
    SetJoint { joint: JointId, value: f64 },

    /// Drive one control by a delta from its current value.
    NudgeJoint { joint: JointId, delta: f64 },

    // === Imaging ===
    /// Turn the DRR view on or off.
    SetDrrActive { active: bool },

    // === Composite ===
    /// Execute several commands in order. Execution stops at the first
    /// command that fails.
    Batch { commands: Vec<Command> },
}

/// One joint value as it landed after clamping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct JointUpdate {
    pub joint: JointId,
    pub value: f64,
}

/// The result of executing a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command executed.
    Applied {
        /// Joint values that changed, post-clamp. Empty for commands that
        /// touch no joints, like the DRR toggle.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        applied: Vec<JointUpdate>,
    },
    /// The command failed.
    Error { message: String },
}

impl CommandOutcome {
    /// An outcome that applied no joint values.
    pub fn done() -> Self {
        CommandOutcome::Applied {
            applied: Vec::new(),
        }
    }

    /// An outcome that applied a single joint value.
    pub fn applied_one(joint: JointId, value: f64) -> Self {
        CommandOutcome::Applied {
            applied: vec![JointUpdate { joint, value }],
        }
    }

    /// A failure outcome with a message for the host.
    pub fn error(message: impl Into<String>) -> Self {
        CommandOutcome::Error {
            message: message.into(),
        }
    }

    /// Whether this outcome reports success.
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandOutcome::Applied { .. })
    }
}
