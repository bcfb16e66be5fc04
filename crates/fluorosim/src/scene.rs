//! Assembly of the fixed machine hierarchy.
//!
//! The C-arm is a rigid chain of named transform nodes. Three chains hang
//! off the scene root:
//!
//! ```text
//! Scene ─ Wag ─ Gantry ─ C
//! Scene ─ Table ─ TableZ
//! Scene ─ FluoroDisplay ─ DRRToMonitor
//! ```
//!
//! Node names are stable, host-visible identifiers: assembly looks nodes up
//! by name and creates only the ones that are missing, so re-running it on a
//! populated graph reuses the existing chain instead of duplicating it.

use glam::DMat4;
use kinematics::geometry::MachineGeometry;
use kinematics::joint::{JointId, JointVector};
use scene_graph::{AttachError, SceneGraph, TransformNodeId};

/// Well-known node names of the machine hierarchy.
pub mod node_names {
    pub const SCENE: &str = "SceneTransform";
    pub const WAG: &str = "WagTransform";
    pub const GANTRY: &str = "GantryTransform";
    pub const C_ROTATION: &str = "CTransform";
    pub const TABLE: &str = "TableTransform";
    pub const TABLE_Z: &str = "TableZTranslation";
    pub const FLUORO_DISPLAY: &str = "FluoroDisplay";
    pub const DRR_TO_MONITOR: &str = "DRRToMonitor";
}

/// Node ids of the assembled hierarchy, captured once at assembly time so
/// per-joint updates never go through name lookup.
#[derive(Clone, Copy, Debug)]
pub struct SceneHandles {
    pub scene: TransformNodeId,
    pub wag: TransformNodeId,
    pub gantry: TransformNodeId,
    pub c_rotation: TransformNodeId,
    pub table: TransformNodeId,
    pub table_z: TransformNodeId,
    pub fluoro_display: TransformNodeId,
    pub drr_to_monitor: TransformNodeId,
}

impl SceneHandles {
    /// The node a joint drives, if it drives one at all.
    ///
    /// Zoom and the instrument offset feed the camera and the renderer
    /// instead of the hierarchy, so they map to no node.
    pub fn node_for(&self, joint: JointId) -> Option<TransformNodeId> {
        match joint {
            JointId::CRotation => Some(self.c_rotation),
            JointId::Gantry => Some(self.gantry),
            JointId::Wag => Some(self.wag),
            JointId::Table => Some(self.table_z),
            JointId::Zoom | JointId::Instrument => None,
        }
    }
}

fn ensure_node(
    graph: &mut SceneGraph,
    name: &str,
    parent: TransformNodeId,
) -> Result<TransformNodeId, AttachError> {
    match graph.node_by_name(name) {
        Some(id) => {
            graph.attach(parent, id)?;
            Ok(id)
        }
        None => Ok(graph.create_node(Some(parent), Some(name))),
    }
}

/// Build (or re-wire) the machine hierarchy and return handles to its nodes.
///
/// Joint-driven nodes come back with identity locals; call [`apply_joints`]
/// afterwards to push the current joint state into them. The monitor plane
/// gets its fixed mounting offset here.
pub fn assemble(
    graph: &mut SceneGraph,
    geometry: &MachineGeometry,
) -> Result<SceneHandles, AttachError> {
    let root = graph.root();
    let scene = ensure_node(graph, node_names::SCENE, root)?;
    let wag = ensure_node(graph, node_names::WAG, scene)?;
    let gantry = ensure_node(graph, node_names::GANTRY, wag)?;
    let c_rotation = ensure_node(graph, node_names::C_ROTATION, gantry)?;
    let table = ensure_node(graph, node_names::TABLE, scene)?;
    let table_z = ensure_node(graph, node_names::TABLE_Z, table)?;
    let fluoro_display = ensure_node(graph, node_names::FLUORO_DISPLAY, scene)?;
    let drr_to_monitor = ensure_node(graph, node_names::DRR_TO_MONITOR, fluoro_display)?;

    // The monitor plane hangs at a fixed offset beside the table.
    graph.set_local_matrix(
        drr_to_monitor,
        DMat4::from_translation(geometry.display_offset),
    );

    Ok(SceneHandles {
        scene,
        wag,
        gantry,
        c_rotation,
        table,
        table_z,
        fluoro_display,
        drr_to_monitor,
    })
}

/// Push every joint's local matrix into the node it drives.
pub fn apply_joints(
    graph: &mut SceneGraph,
    handles: &SceneHandles,
    joints: &JointVector,
    geometry: &MachineGeometry,
) {
    for joint in JointVector::ORDER {
        let node = match handles.node_for(joint) {
            Some(node) => node,
            None => continue,
        };
        if let Some(matrix) = joint.local_matrix(joints.get(joint), geometry) {
            graph.set_local_matrix(node, matrix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn assembled() -> (SceneGraph, SceneHandles) {
        let mut graph = SceneGraph::new();
        let handles = assemble(&mut graph, &MachineGeometry::default())
            .unwrap_or_else(|e| panic!("assembly failed: {}", e));
        (graph, handles)
    }

    #[test]
    fn test_assemble_builds_arm_chain() {
        let (graph, handles) = assembled();

        let parent_of = |id| graph.get_node(id).and_then(|n| n.parent());
        assert_eq!(parent_of(handles.scene), Some(graph.root()));
        assert_eq!(parent_of(handles.wag), Some(handles.scene));
        assert_eq!(parent_of(handles.gantry), Some(handles.wag));
        assert_eq!(parent_of(handles.c_rotation), Some(handles.gantry));
        assert_eq!(parent_of(handles.table), Some(handles.scene));
        assert_eq!(parent_of(handles.table_z), Some(handles.table));
        assert_eq!(parent_of(handles.fluoro_display), Some(handles.scene));
        assert_eq!(parent_of(handles.drr_to_monitor), Some(handles.fluoro_display));
    }

    #[test]
    fn test_assemble_registers_node_names() {
        let (graph, handles) = assembled();
        assert_eq!(graph.node_by_name(node_names::C_ROTATION), Some(handles.c_rotation));
        assert_eq!(graph.node_by_name(node_names::TABLE_Z), Some(handles.table_z));
        assert_eq!(
            graph.node_by_name(node_names::DRR_TO_MONITOR),
            Some(handles.drr_to_monitor)
        );
    }

    #[test]
    fn test_assemble_twice_reuses_nodes() {
        let (mut graph, first) = assembled();
        let second = assemble(&mut graph, &MachineGeometry::default())
            .unwrap_or_else(|e| panic!("assembly failed: {}", e));

        assert_eq!(first.gantry, second.gantry);
        assert_eq!(first.table_z, second.table_z);
        // No duplicate children appeared anywhere along the chains.
        assert_eq!(graph.children(graph.root()).len(), 1);
        assert_eq!(graph.children(first.scene).len(), 3);
        assert_eq!(graph.children(first.wag).len(), 1);
        assert_eq!(graph.children(first.table).len(), 1);
    }

    #[test]
    fn test_monitor_plane_sits_at_display_offset() {
        let (graph, handles) = assembled();
        let geometry = MachineGeometry::default();
        assert!(graph
            .world_position(handles.drr_to_monitor)
            .abs_diff_eq(geometry.display_offset, 1e-9));
    }

    #[test]
    fn test_apply_joints_drives_the_mapped_nodes() {
        let (mut graph, handles) = assembled();
        let geometry = MachineGeometry::default();
        let mut joints = JointVector::default();
        joints.set(JointId::Table, 10.0);
        joints.set(JointId::Wag, 15.0);

        apply_joints(&mut graph, &handles, &joints, &geometry);

        // Table drive scales 4x onto the TableZ node.
        assert!(graph
            .world_position(handles.table_z)
            .abs_diff_eq(DVec3::new(0.0, 40.0, 0.0), 1e-9));
        // The wag node got a pivoted rotation, so its translation is nonzero.
        let wag_local = graph
            .local_matrix(handles.wag)
            .unwrap_or_else(|| panic!("wag node missing"));
        assert!(wag_local.w_axis.truncate().length() > 1.0);
    }

    #[test]
    fn test_c_pivot_is_fixed_under_c_rotation() {
        let (mut graph, handles) = assembled();
        let geometry = MachineGeometry::default();
        let mut joints = JointVector::default();
        joints.set(JointId::CRotation, 65.0);

        apply_joints(&mut graph, &handles, &joints, &geometry);

        let world = graph.world_matrix(handles.c_rotation);
        assert!(world
            .transform_point3(geometry.c_pivot)
            .abs_diff_eq(geometry.c_pivot, 1e-9));
    }
}
