//! The resolved, immutable frame graph and its queries.

use std::collections::HashMap;

use nalgebra::Isometry3;
use tracing::debug;

use crate::attachment::AttachmentGraph;
use crate::compose::{BatchTransform, JointValues, compose};
use crate::config::ResolverConfig;
use crate::error::{Result, SdfError};
use crate::frame_table::{FrameId, FrameTable};
use crate::pose::{PoseEdge, PoseResolution};
use crate::types::{CanonicalElement, FrameKind, FrameRef};
use crate::version::FormatVersion;

/// Read-only view of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    /// Handle of the frame in its graph.
    pub id: FrameId,
    /// Globally unique name.
    pub scoped_name: String,
    /// Frame kind.
    pub kind: FrameKind,
    /// Pose as declared, relative to `relative_to`.
    pub declared_pose: Isometry3<f64>,
    /// `relative_to` as declared (None when defaulted).
    pub declared_relative_to: Option<FrameRef>,
    /// `attached_to` as declared (None when defaulted).
    pub declared_attached_to: Option<FrameRef>,
    /// Scoped name of the resolved `relative_to` target.
    pub relative_to: Option<String>,
    /// Scoped name of the resolved attachment parent.
    pub attached_to: Option<String>,
    /// Pose in world coordinates with every joint at zero.
    pub world_pose: Isometry3<f64>,
    /// Whether this frame or an enclosing model is static.
    pub is_static: bool,
    /// Canonical link of a model frame.
    pub canonical_link: Option<String>,
    /// Version the element was written in.
    pub version: FormatVersion,
}

/// A fully resolved frame graph.
///
/// Built once from an expanded canonical tree; every query borrows it
/// immutably, so a graph can be shared across threads without locking.
#[derive(Debug, Clone)]
pub struct FrameGraph {
    table: FrameTable,
    attachment: AttachmentGraph,
    poses: PoseResolution,
    joint_index: HashMap<String, usize>,
}

impl FrameGraph {
    /// Build a graph from a world element whose includes are expanded.
    ///
    /// # Errors
    ///
    /// Any naming, attachment or pose error aborts the build.
    pub fn from_canonical(world: &CanonicalElement, config: &ResolverConfig) -> Result<Self> {
        let table = FrameTable::build(world, config)?;
        let attachment = AttachmentGraph::build(&table)?;
        let poses = PoseResolution::resolve(&table, &attachment)?;
        let joint_index = table
            .joints()
            .iter()
            .enumerate()
            .map(|(i, joint)| (joint.name.clone(), i))
            .collect();
        debug!(
            world = table.world_name(),
            frames = table.len(),
            "frame graph built"
        );
        Ok(Self {
            table,
            attachment,
            poses,
            joint_index,
        })
    }

    /// Describe the frame registered under `scoped_name`.
    pub fn lookup(&self, scoped_name: &str) -> Option<FrameDescriptor> {
        let id = self.table.get(scoped_name)?;
        let record = self.table.record(id);
        let name_of = |id: Option<FrameId>| id.map(|id| self.table.record(id).scoped_name.clone());
        Some(FrameDescriptor {
            id,
            scoped_name: record.scoped_name.clone(),
            kind: record.kind,
            declared_pose: record.declared_pose,
            declared_relative_to: record.relative_to.clone(),
            declared_attached_to: record.attached_to.clone(),
            relative_to: name_of(self.poses.relative_to[id.index()]),
            attached_to: name_of(self.attachment.parent(id)),
            world_pose: *self.poses.world_pose(id),
            is_static: record.is_static,
            canonical_link: name_of(self.attachment.canonical_link(id)),
            version: record.version,
        })
    }

    /// Whether a frame with this scoped name exists.
    pub fn contains(&self, scoped_name: &str) -> bool {
        self.table.get(scoped_name).is_some()
    }

    /// Scoped names of every frame, world first, in document order.
    pub fn list_frames(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.records().iter().map(|r| r.scoped_name.as_str())
    }

    /// Scoped names of every joint, in document order.
    pub fn joint_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.joints().iter().map(|j| j.name.as_str())
    }

    /// Query-chain edges of every non-world frame.
    pub fn pose_edges(&self) -> impl Iterator<Item = &PoseEdge> + '_ {
        self.poses.edges.iter().flatten()
    }

    /// Query-chain edge leaving one frame (None for the world).
    pub fn pose_edge(&self, scoped_name: &str) -> Option<&PoseEdge> {
        self.poses.edge(self.table.get(scoped_name)?)
    }

    /// Scoped name of a frame handle.
    pub fn frame_name(&self, id: FrameId) -> Option<&str> {
        self.table
            .records()
            .get(id.index())
            .map(|r| r.scoped_name.as_str())
    }

    /// Name of the world element the graph was built from.
    pub fn world_name(&self) -> &str {
        self.table.world_name()
    }

    /// Number of frames, the world included.
    pub fn frame_count(&self) -> usize {
        self.table.len()
    }

    /// Pose of `source` expressed in `target` coordinates.
    ///
    /// The result has one transform per element of the values' batch shape.
    ///
    /// # Errors
    ///
    /// - [`SdfError::UnknownFrame`] if either name is not in the graph
    /// - [`SdfError::UnknownJoint`] or [`SdfError::BatchShapeMismatch`] for
    ///   unusable articulation values
    /// - [`SdfError::DisconnectedFrames`] if the frames share no ancestor
    pub fn get_transform(
        &self,
        source: &str,
        target: &str,
        values: &JointValues,
    ) -> Result<BatchTransform> {
        let from = self.frame_id(source)?;
        let to = self.frame_id(target)?;
        let resolved = values.resolve(&self.poses.joints, &self.joint_index)?;
        compose(&self.poses.edges, &self.poses.joints, from, to, &resolved).ok_or_else(|| {
            SdfError::DisconnectedFrames {
                from: source.to_string(),
                to: target.to_string(),
            }
        })
    }

    /// Pose of `source` in `target` coordinates with every joint at zero.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::UnknownFrame`] or [`SdfError::DisconnectedFrames`].
    pub fn static_transform(&self, source: &str, target: &str) -> Result<Isometry3<f64>> {
        let batch = self.get_transform(source, target, &JointValues::new())?;
        batch.single().copied().ok_or_else(|| SdfError::DisconnectedFrames {
            from: source.to_string(),
            to: target.to_string(),
        })
    }

    fn frame_id(&self, name: &str) -> Result<FrameId> {
        self.table
            .get(name)
            .ok_or_else(|| SdfError::UnknownFrame(name.to_string()))
    }
}
