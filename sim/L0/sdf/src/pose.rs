//! Pose resolution: `relative_to` edges, zero-configuration poses and the
//! kinematic chain used by queries.
//!
//! `relative_to` and `attached_to` are independent. The first says which
//! coordinates a declared pose is written in; the second says what a frame
//! moves with. Declared poses are first composed along `relative_to` chains
//! into poses at zero articulation. The query chain then hangs every frame
//! below its attachment parent with a fixed offset taken from those poses,
//! re-rooted at joints so that articulation happens between a joint's two
//! frames:
//!
//! ```text
//! child link -> joint frame -> (articulated) -> parent-side frame -> parent link
//! ```

use nalgebra::{Isometry3, Vector3};
use tracing::debug;

use crate::attachment::AttachmentGraph;
use crate::error::{Result, SdfError};
use crate::frame_table::{FrameId, FrameTable, JointEntry, parent_first_order};
use crate::orientation::safe_normalize_axis;
use crate::types::{JointAxis, JointType};
use crate::version::{PoseDefault, default_rule};

/// Transform carried by a pose edge, mapping child coordinates to parent
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeTransform {
    /// A rigid transform fixed at construction.
    Fixed(Isometry3<f64>),
    /// The articulation of joint `index`, a function of its values.
    Joint {
        /// Index into [`PoseResolution::joints`].
        index: usize,
    },
}

/// An edge of the query chain.
///
/// `relative_to` only shapes the zero-configuration offsets; queries walk
/// the kinematic tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEdge {
    /// Child frame.
    pub frame: FrameId,
    /// Kinematic parent the transform maps into. This is not the
    /// `relative_to` target.
    pub reference: FrameId,
    /// The transform.
    pub transform: EdgeTransform,
}

/// Everything needed to articulate one joint.
#[derive(Debug, Clone, PartialEq)]
pub struct JointMotion {
    /// Scoped joint name.
    pub name: String,
    /// Joint type.
    pub joint_type: JointType,
    /// First axis, unit length, in joint frame coordinates.
    pub axis: Vector3<f64>,
    /// Second axis, unit length, in joint frame coordinates.
    pub axis2: Vector3<f64>,
    /// Translation per revolution (screw joints).
    pub thread_pitch: f64,
}

/// Output of the pose resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseResolution {
    /// Resolved `relative_to` target of each frame (None for the world).
    pub relative_to: Vec<Option<FrameId>>,
    /// Pose of each frame in world coordinates at zero articulation.
    pub world_poses: Vec<Isometry3<f64>>,
    /// Query-chain edge of each frame (None for the world).
    pub edges: Vec<Option<PoseEdge>>,
    /// Articulation data, indexed like [`FrameTable::joints`].
    pub joints: Vec<JointMotion>,
}

impl PoseResolution {
    /// Resolve poses for a table and its attachment graph.
    ///
    /// # Errors
    ///
    /// - [`SdfError::UnknownPoseReference`] for a `relative_to` or
    ///   `expressed_in` naming no frame
    /// - [`SdfError::PoseReferenceCycle`] if `relative_to` references loop
    /// - [`SdfError::AttachmentCycle`] if joints close a kinematic loop
    pub fn resolve(table: &FrameTable, attachment: &AttachmentGraph) -> Result<Self> {
        let relative_to = resolve_relative_to(table, attachment)?;
        let order = parent_first_order(&relative_to)
            .map_err(|cycle| SdfError::PoseReferenceCycle(table.describe_chain(&cycle)))?;

        let mut world_poses = vec![Isometry3::identity(); table.len()];
        for id in order {
            if let Some(reference) = relative_to[id.index()] {
                world_poses[id.index()] =
                    world_poses[reference.index()] * table.record(id).declared_pose;
            }
        }

        let edges = kinematic_edges(table, attachment, &world_poses)?;
        let joints = table
            .joints()
            .iter()
            .map(|joint| {
                let express = |axis: &JointAxis| express_axis(table, &world_poses, joint, axis);
                Ok(JointMotion {
                    name: joint.name.clone(),
                    joint_type: joint.attrs.joint_type,
                    axis: express(&joint.attrs.axis)?,
                    axis2: express(&joint.attrs.axis2)?,
                    thread_pitch: joint.attrs.thread_pitch,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(frames = edges.len(), joints = joints.len(), "poses resolved");
        Ok(Self {
            relative_to,
            world_poses,
            edges,
            joints,
        })
    }

    /// Edge of a frame (None for the world).
    pub fn edge(&self, id: FrameId) -> Option<&PoseEdge> {
        self.edges[id.index()].as_ref()
    }

    /// Zero-configuration world pose of a frame.
    pub fn world_pose(&self, id: FrameId) -> &Isometry3<f64> {
        &self.world_poses[id.index()]
    }
}

fn resolve_relative_to(
    table: &FrameTable,
    attachment: &AttachmentGraph,
) -> Result<Vec<Option<FrameId>>> {
    let mut relative_to = vec![None; table.len()];
    for id in table.ids().skip(1) {
        let record = table.record(id);
        let reference = match &record.relative_to {
            Some(reference) => table.resolve(reference, record.scope).ok_or_else(|| {
                SdfError::unknown_pose_reference(
                    record.scoped_name.clone(),
                    reference.display_with(table.delimiter()),
                )
            })?,
            None => {
                let rule = default_rule(record.version.family(), record.kind)
                    .map_or(PoseDefault::ScopeFrame, |rule| rule.relative_to);
                match (rule, record.joint) {
                    (PoseDefault::AttachmentParent, _) => {
                        attachment.parent(id).unwrap_or(record.scope)
                    }
                    (PoseDefault::JointFrame, Some(j)) => table.joints()[j].child_side,
                    _ => record.scope,
                }
            }
        };
        if reference == id {
            return Err(SdfError::PoseReferenceCycle(format!(
                "{0} -> {0}",
                record.scoped_name
            )));
        }
        relative_to[id.index()] = Some(reference);
    }
    Ok(relative_to)
}

fn kinematic_edges(
    table: &FrameTable,
    attachment: &AttachmentGraph,
    world_poses: &[Isometry3<f64>],
) -> Result<Vec<Option<PoseEdge>>> {
    let fixed = |frame: FrameId, reference: FrameId| PoseEdge {
        frame,
        reference,
        transform: EdgeTransform::Fixed(
            world_poses[reference.index()].inv_mul(&world_poses[frame.index()]),
        ),
    };

    let mut edges: Vec<Option<PoseEdge>> = table
        .ids()
        .map(|id| attachment.parent(id).map(|parent| fixed(id, parent)))
        .collect();

    for (index, joint) in table.joints().iter().enumerate() {
        let (parent_link, child_link) = attachment.joint_links(index);
        edges[child_link.index()] = Some(fixed(child_link, joint.child_side));
        edges[joint.child_side.index()] = Some(PoseEdge {
            frame: joint.child_side,
            reference: joint.parent_side,
            transform: EdgeTransform::Joint { index },
        });
        edges[joint.parent_side.index()] = Some(fixed(joint.parent_side, parent_link));
    }

    let parents: Vec<Option<FrameId>> = edges
        .iter()
        .map(|edge| edge.map(|e| e.reference))
        .collect();
    if let Err(cycle) = parent_first_order(&parents) {
        return Err(SdfError::AttachmentCycle(format!(
            "kinematic loop: {}",
            table.describe_chain(&cycle)
        )));
    }
    Ok(edges)
}

/// Re-express a declared axis in the joint frame.
fn express_axis(
    table: &FrameTable,
    world_poses: &[Isometry3<f64>],
    joint: &JointEntry,
    axis: &JointAxis,
) -> Result<Vector3<f64>> {
    let xyz = match &axis.expressed_in {
        None => axis.xyz,
        Some(reference) => {
            let frame = table.resolve(reference, joint.scope).ok_or_else(|| {
                SdfError::unknown_pose_reference(
                    joint.name.clone(),
                    reference.display_with(table.delimiter()),
                )
            })?;
            let joint_pose = &world_poses[joint.child_side.index()];
            let rotation = joint_pose.rotation.inverse() * world_poses[frame.index()].rotation;
            rotation * axis.xyz
        }
    };
    Ok(safe_normalize_axis(xyz))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::types::{CanonicalElement, ElementKind, JointAttrs, ModelAttrs};
    use crate::version::FormatVersion;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn model(name: &str, version: FormatVersion) -> CanonicalElement {
        CanonicalElement::new(ElementKind::Model(ModelAttrs::default()), name, version)
    }

    fn element(kind: ElementKind, name: &str, version: FormatVersion) -> CanonicalElement {
        CanonicalElement::new(kind, name, version)
    }

    fn shift(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    fn resolve(children: Vec<CanonicalElement>) -> Result<(FrameTable, PoseResolution)> {
        let world = CanonicalElement::world("w", FormatVersion::LATEST, children);
        let table = FrameTable::build(&world, &ResolverConfig::default())?;
        let attachment = AttachmentGraph::build(&table)?;
        let poses = PoseResolution::resolve(&table, &attachment)?;
        Ok((table, poses))
    }

    #[test]
    fn test_world_poses_compose() {
        let v = FormatVersion::LATEST;
        let (table, poses) = resolve(vec![
            model("m", v)
                .with_pose(shift(1.0, 0.0, 0.0))
                .with_child(element(ElementKind::Link, "a", v).with_pose(shift(0.0, 2.0, 0.0)))
                .with_child(
                    element(ElementKind::Frame, "f", v)
                        .with_pose(shift(0.0, 0.0, 3.0))
                        .with_relative_to("a"),
                ),
        ])
        .unwrap();
        let f = table.get("m::f").unwrap();
        assert_relative_eq!(
            poses.world_pose(f).translation.vector,
            Vector3::new(1.0, 2.0, 3.0),
            epsilon = 1e-12
        );
        // f is attached to the model, so its fixed edge maps into model coordinates.
        let edge = poses.edge(f).unwrap();
        assert_eq!(edge.reference, table.get("m").unwrap());
        let EdgeTransform::Fixed(t) = edge.transform else {
            panic!("expected fixed edge");
        };
        assert_relative_eq!(t.translation.vector, Vector3::new(0.0, 2.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pose_reference_cycle() {
        let v = FormatVersion::LATEST;
        let result = resolve(vec![
            model("m", v)
                .with_child(element(ElementKind::Frame, "a", v).with_relative_to("b"))
                .with_child(element(ElementKind::Frame, "b", v).with_relative_to("a")),
        ]);
        assert!(matches!(result, Err(SdfError::PoseReferenceCycle(_))));
    }

    #[test]
    fn test_unknown_pose_reference() {
        let v = FormatVersion::LATEST;
        let result = resolve(vec![
            model("m", v).with_child(element(ElementKind::Link, "a", v).with_relative_to("ghost")),
        ]);
        assert!(matches!(
            result,
            Err(SdfError::UnknownPoseReference { ref reference, .. }) if reference == "ghost"
        ));
    }

    #[test]
    fn test_legacy_and_scoped_frame_defaults() {
        for (version, expected) in [("1.6", 1.0), ("1.7", 3.0)] {
            let v = FormatVersion::parse(version).unwrap();
            let (table, poses) = resolve(vec![
                model("m", v)
                    .with_child(element(ElementKind::Link, "a", v).with_pose(shift(2.0, 0.0, 0.0)))
                    .with_child(
                        element(ElementKind::Frame, "f", v)
                            .with_pose(shift(1.0, 0.0, 0.0))
                            .with_attached_to("a"),
                    ),
            ])
            .unwrap();
            let f = table.get("m::f").unwrap();
            assert_relative_eq!(poses.world_pose(f).translation.x, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_joint_edges_and_axis() {
        let v = FormatVersion::LATEST;
        let mut attrs = JointAttrs::new(JointType::Revolute, "a", "b");
        attrs.axis.xyz = Vector3::new(0.0, 0.0, 2.0);
        attrs.axis.expressed_in = Some(crate::types::FrameRef::local("__model__"));
        let (table, poses) = resolve(vec![
            model("m", v)
                .with_child(element(ElementKind::Link, "a", v))
                .with_child(element(ElementKind::Link, "b", v).with_pose(shift(0.0, 0.0, 1.0)))
                .with_child(
                    element(ElementKind::Joint(attrs), "j", v).with_pose(Isometry3::from_parts(
                        Translation3::identity(),
                        UnitQuaternion::from_euler_angles(FRAC_PI_2, 0.0, 0.0),
                    )),
                ),
        ])
        .unwrap();
        let id = |n: &str| table.get(n).unwrap();

        assert_eq!(poses.edge(id("m::b")).unwrap().reference, id("m::j"));
        let joint_edge = poses.edge(id("m::j")).unwrap();
        assert_eq!(joint_edge.reference, id("m::j_parent"));
        assert_eq!(joint_edge.transform, EdgeTransform::Joint { index: 0 });
        assert_eq!(poses.edge(id("m::j_parent")).unwrap().reference, id("m::a"));

        // Joint pose is relative to the child link; parent frame coincides.
        assert_relative_eq!(
            poses.world_pose(id("m::j_parent")),
            poses.world_pose(id("m::j")),
            epsilon = 1e-12
        );

        // Model z seen from a frame rolled by 90 degrees about x is +y.
        assert_relative_eq!(poses.joints[0].axis, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_expressed_in() {
        let v = FormatVersion::LATEST;
        let mut attrs = JointAttrs::new(JointType::Revolute, "a", "b");
        attrs.axis.expressed_in = Some(crate::types::FrameRef::local("ghost"));
        let result = resolve(vec![
            model("m", v)
                .with_child(element(ElementKind::Link, "a", v))
                .with_child(element(ElementKind::Link, "b", v))
                .with_child(element(ElementKind::Joint(attrs), "j", v)),
        ]);
        assert!(matches!(result, Err(SdfError::UnknownPoseReference { .. })));
    }

    #[test]
    fn test_kinematic_loop() {
        let v = FormatVersion::LATEST;
        let result = resolve(vec![
            model("m", v)
                .with_child(element(ElementKind::Link, "a", v))
                .with_child(element(ElementKind::Link, "b", v))
                .with_child(element(
                    ElementKind::Joint(JointAttrs::new(JointType::Revolute, "a", "b")),
                    "j1",
                    v,
                ))
                .with_child(element(
                    ElementKind::Joint(JointAttrs::new(JointType::Revolute, "b", "a")),
                    "j2",
                    v,
                )),
        ]);
        assert!(matches!(result, Err(SdfError::AttachmentCycle(_))));
    }
}
