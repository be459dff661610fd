//! Attachment graph: which frame each frame moves with.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, SdfError};
use crate::frame_table::{FrameId, FrameTable, JointEntry, parent_first_order};
use crate::types::{FrameKind, FrameRef};
use crate::version::{AttachDefault, default_rule};

/// Resolved attachment relation. A tree rooted at the world frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentGraph {
    parents: Vec<Option<FrameId>>,
    joint_links: Vec<(FrameId, FrameId)>,
    canonical_links: HashMap<FrameId, FrameId>,
}

impl AttachmentGraph {
    /// Resolve every `attached_to` (declared or defaulted) of a table.
    ///
    /// # Errors
    ///
    /// - [`SdfError::UnknownAttachmentTarget`] if a reference names no frame
    /// - [`SdfError::InvalidJoint`] if a joint's parent or child is unusable
    /// - [`SdfError::AttachmentCycle`] if attachments loop
    pub fn build(table: &FrameTable) -> Result<Self> {
        let joint_links = table
            .joints()
            .iter()
            .map(|joint| resolve_joint_links(table, joint))
            .collect::<Result<Vec<_>>>()?;

        let mut claimed: HashMap<FrameId, &str> = HashMap::new();
        for (joint, (_, child)) in table.joints().iter().zip(&joint_links) {
            if let Some(previous) = claimed.insert(*child, joint.name.as_str()) {
                return Err(SdfError::invalid_joint(
                    joint.name.clone(),
                    format!(
                        "link '{}' is already the child of joint '{previous}'",
                        table.record(*child).scoped_name
                    ),
                ));
            }
        }

        let mut parents = vec![None; table.len()];
        for id in table.ids().skip(1) {
            let record = table.record(id);
            let parent = match &record.attached_to {
                Some(reference) => table.resolve(reference, record.scope).ok_or_else(|| {
                    SdfError::unknown_attachment(
                        record.scoped_name.clone(),
                        reference.display_with(table.delimiter()),
                    )
                })?,
                None => {
                    let rule = default_rule(record.version.family(), record.kind)
                        .map_or(AttachDefault::ScopeFrame, |rule| rule.attached_to);
                    match (rule, record.joint) {
                        (AttachDefault::ChildLink, Some(j)) => joint_links[j].1,
                        (AttachDefault::ParentLink, Some(j)) => joint_links[j].0,
                        _ => record.scope,
                    }
                }
            };
            if parent == id {
                return Err(SdfError::AttachmentCycle(format!(
                    "{0} -> {0}",
                    record.scoped_name
                )));
            }
            parents[id.index()] = Some(parent);
        }

        if let Err(cycle) = parent_first_order(&parents) {
            return Err(SdfError::AttachmentCycle(table.describe_chain(&cycle)));
        }

        let canonical_links = resolve_canonical_links(table)?;
        debug!(
            frames = parents.len(),
            models = canonical_links.len(),
            "attachment graph resolved"
        );
        Ok(Self {
            parents,
            joint_links,
            canonical_links,
        })
    }

    /// Frame `id` is attached to (None for the world).
    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.parents[id.index()]
    }

    /// Resolved (parent, child) links of joint `index`.
    pub fn joint_links(&self, index: usize) -> (FrameId, FrameId) {
        self.joint_links[index]
    }

    /// Canonical link of a model, if it has any link.
    pub fn canonical_link(&self, model: FrameId) -> Option<FrameId> {
        self.canonical_links.get(&model).copied()
    }
}

fn resolve_joint_links(table: &FrameTable, joint: &JointEntry) -> Result<(FrameId, FrameId)> {
    let lookup = |reference: &FrameRef| {
        table.resolve(reference, joint.scope).ok_or_else(|| {
            SdfError::unknown_attachment(joint.name.clone(), reference.display_with(table.delimiter()))
        })
    };
    let parent = lookup(&joint.attrs.parent)?;
    let child = lookup(&joint.attrs.child)?;

    if table.record(child).kind != FrameKind::Link {
        return Err(SdfError::invalid_joint(
            joint.name.clone(),
            format!(
                "child '{}' is a {}, not a link",
                table.record(child).scoped_name,
                table.record(child).kind
            ),
        ));
    }
    if parent == child {
        return Err(SdfError::invalid_joint(
            joint.name.clone(),
            "parent and child are the same link",
        ));
    }
    if matches!(
        table.record(parent).kind,
        FrameKind::Joint | FrameKind::JointParent
    ) {
        return Err(SdfError::invalid_joint(
            joint.name.clone(),
            format!("parent '{}' is a joint frame", table.record(parent).scoped_name),
        ));
    }
    Ok((parent, child))
}

fn resolve_canonical_links(table: &FrameTable) -> Result<HashMap<FrameId, FrameId>> {
    let mut links = HashMap::new();
    for model in table.ids() {
        let record = table.record(model);
        if record.kind != FrameKind::Model {
            continue;
        }
        let link = match &record.canonical_link {
            Some(name) => {
                let reference = FrameRef::local(name.as_str());
                let id = table
                    .resolve(&reference, model)
                    .filter(|id| table.record(*id).kind == FrameKind::Link)
                    .ok_or_else(|| {
                        SdfError::unknown_attachment(record.scoped_name.clone(), name.clone())
                    })?;
                Some(id)
            }
            None => table
                .ids()
                .find(|id| {
                    let r = table.record(*id);
                    r.scope == model && r.kind == FrameKind::Link
                }),
        };
        if let Some(link) = link {
            links.insert(model, link);
        }
    }
    Ok(links)
}
