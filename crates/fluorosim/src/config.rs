//! KDL-based machine profile format.
//! Pure data, no expressions - what you see is what's there.
//!
//! # Profile Format
//!
//! ```kdl
//! machine version="0.1" {
//!     geometry {
//!         c-pivot x=1262.2704 y=337.5527 z=-5.7
//!         wag-pivot-x 739.2168
//!         table-drive-scale 4.0
//!         source-distance 400.0
//!         zoom-distance-scale 4.0
//!         display-offset x=2125.16 y=605.795 z=-340.272
//!     }
//!     frame width=512 height=512
//! }
//! ```
//!
//! Every field is optional and falls back to the built-in machine; a profile
//! only has to spell out what it changes.

use drr::FrameSize;
use glam::DVec3;
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use kinematics::geometry::MachineGeometry;

pub const FORMAT_VERSION: &str = "0.1";

/// Error type for profile load and save operations.
#[derive(Debug)]
pub enum ConfigError {
    Parse(String),
    InvalidStructure(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
            Self::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            Self::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A machine profile that can be serialized to/from KDL.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineProfile {
    pub version: String,
    pub geometry: MachineGeometry,
    pub frame_size: FrameSize,
}

impl Default for MachineProfile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            geometry: MachineGeometry::default(),
            frame_size: FrameSize::default(),
        }
    }
}

impl MachineProfile {
    /// Serialize the profile to a KDL string.
    pub fn to_kdl(&self) -> String {
        let mut doc = KdlDocument::new();

        let mut machine = KdlNode::new("machine");
        machine.push(KdlEntry::new_prop("version", self.version.clone()));

        let children = machine.children_mut().get_or_insert_with(KdlDocument::new);

        let mut geometry = KdlNode::new("geometry");
        let fields = geometry.children_mut().get_or_insert_with(KdlDocument::new);
        fields
            .nodes_mut()
            .push(vec3_node("c-pivot", self.geometry.c_pivot));
        fields
            .nodes_mut()
            .push(scalar_node("wag-pivot-x", self.geometry.wag_pivot_x));
        fields
            .nodes_mut()
            .push(scalar_node("table-drive-scale", self.geometry.table_drive_scale));
        fields
            .nodes_mut()
            .push(scalar_node("source-distance", self.geometry.source_distance));
        fields
            .nodes_mut()
            .push(scalar_node("zoom-distance-scale", self.geometry.zoom_distance_scale));
        fields
            .nodes_mut()
            .push(vec3_node("display-offset", self.geometry.display_offset));
        children.nodes_mut().push(geometry);

        let mut frame = KdlNode::new("frame");
        frame.push(KdlEntry::new_prop("width", self.frame_size.width as i128));
        frame.push(KdlEntry::new_prop("height", self.frame_size.height as i128));
        children.nodes_mut().push(frame);

        doc.nodes_mut().push(machine);
        doc.to_string()
    }

    /// Parse a profile from a KDL string.
    ///
    /// Fields absent from the input keep the built-in machine's values. A
    /// frame with a zero dimension is rejected, since no render target can
    /// be allocated for it.
    pub fn from_kdl(input: &str) -> Result<Self, ConfigError> {
        let doc: KdlDocument = input
            .parse()
            .map_err(|e| ConfigError::Parse(format!("{}", e)))?;

        let machine = doc
            .get("machine")
            .ok_or_else(|| ConfigError::InvalidStructure("Missing 'machine' node".into()))?;

        let version = machine
            .get("version")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string())
            .unwrap_or_else(|| FORMAT_VERSION.to_string());

        let mut profile = MachineProfile {
            version,
            ..MachineProfile::default()
        };

        if let Some(children) = machine.children() {
            if let Some(geometry) = children.get("geometry") {
                read_geometry(geometry, &mut profile.geometry);
            }
            if let Some(frame) = children.get("frame") {
                let width = get_u32_prop(frame, "width").unwrap_or(profile.frame_size.width);
                let height = get_u32_prop(frame, "height").unwrap_or(profile.frame_size.height);
                if width == 0 || height == 0 {
                    return Err(ConfigError::InvalidValue(format!(
                        "Frame size {}x{} has a zero dimension",
                        width, height
                    )));
                }
                profile.frame_size = FrameSize::new(width, height);
            }
        }

        Ok(profile)
    }
}

fn vec3_node(name: &str, value: DVec3) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new_prop("x", value.x));
    node.push(KdlEntry::new_prop("y", value.y));
    node.push(KdlEntry::new_prop("z", value.z));
    node
}

fn scalar_node(name: &str, value: f64) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    node
}

fn read_geometry(node: &KdlNode, geometry: &mut MachineGeometry) {
    let children = match node.children() {
        Some(children) => children,
        None => return,
    };
    for child in children.nodes() {
        match child.name().value() {
            "c-pivot" => read_vec3(child, &mut geometry.c_pivot),
            "wag-pivot-x" => read_scalar(child, &mut geometry.wag_pivot_x),
            "table-drive-scale" => read_scalar(child, &mut geometry.table_drive_scale),
            "source-distance" => read_scalar(child, &mut geometry.source_distance),
            "zoom-distance-scale" => read_scalar(child, &mut geometry.zoom_distance_scale),
            "display-offset" => read_vec3(child, &mut geometry.display_offset),
            // Unknown geometry entries are ignored so newer profiles still load
            _ => {}
        }
    }
}

fn read_vec3(node: &KdlNode, target: &mut DVec3) {
    if let Some(x) = get_f64_prop(node, "x") {
        target.x = x;
    }
    if let Some(y) = get_f64_prop(node, "y") {
        target.y = y;
    }
    if let Some(z) = get_f64_prop(node, "z") {
        target.z = z;
    }
}

fn read_scalar(node: &KdlNode, target: &mut f64) {
    if let Some(value) = node.entries().first().and_then(|e| number_value(e.value())) {
        *target = value;
    }
}

fn get_f64_prop(node: &KdlNode, name: &str) -> Option<f64> {
    node.get(name).and_then(number_value)
}

fn get_u32_prop(node: &KdlNode, name: &str) -> Option<u32> {
    node.get(name)
        .and_then(|v| v.as_integer())
        .and_then(|v| u32::try_from(v).ok())
}

// KDL keeps 4.0 and 4 as different value types; geometry fields accept both
fn number_value(value: &KdlValue) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
}
