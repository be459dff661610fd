//! Frame table: one record per frame, addressed by [`FrameId`].
//!
//! A single depth-first walk over the expanded canonical tree registers every
//! frame-introducing element (world, models, actors, links, explicit frames
//! and the two frames of each joint). References stay unresolved here; the
//! table only knows how to look them up.

use std::collections::HashMap;
use std::fmt;

use nalgebra::Isometry3;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{Result, SdfError};
use crate::types::{
    CanonicalElement, ElementKind, FrameKind, FrameRef, JointAttrs, MODEL_FRAME, WORLD_FRAME,
};
use crate::version::FormatVersion;

/// Opaque handle of a frame in one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    /// The world frame of every table.
    pub const WORLD: Self = Self(0);

    /// Position in the record arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered frame with its declared (unresolved) references.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Globally unique name.
    pub scoped_name: String,
    /// Name within its scope.
    pub local_name: String,
    /// Frame kind.
    pub kind: FrameKind,
    /// Declared pose, relative to `relative_to` (or its default).
    pub declared_pose: Isometry3<f64>,
    /// Declared `relative_to`.
    pub relative_to: Option<FrameRef>,
    /// Declared `attached_to`.
    pub attached_to: Option<FrameRef>,
    /// Scope frame references are resolved in (the world or a model).
    pub scope: FrameId,
    /// Whether this frame or an enclosing model is static.
    pub is_static: bool,
    /// Version the element was written in.
    pub version: FormatVersion,
    /// Index into [`FrameTable::joints`] for joint frames.
    pub joint: Option<usize>,
    /// Declared canonical link for models.
    pub canonical_link: Option<String>,
}

/// A joint and the two frames it introduced.
#[derive(Debug, Clone, PartialEq)]
pub struct JointEntry {
    /// Scoped name of the joint.
    pub name: String,
    /// Child-side frame, named after the joint.
    pub child_side: FrameId,
    /// Parent-side frame.
    pub parent_side: FrameId,
    /// Scope the joint was declared in.
    pub scope: FrameId,
    /// Declared joint attributes.
    pub attrs: JointAttrs,
}

/// Arena of frame records plus one name map per scope.
#[derive(Debug, Clone)]
pub struct FrameTable {
    records: Vec<FrameRecord>,
    by_name: HashMap<String, FrameId>,
    scopes: HashMap<FrameId, HashMap<String, FrameId>>,
    joints: Vec<JointEntry>,
    world_name: String,
    delimiter: String,
}

impl FrameTable {
    /// Register every frame of an expanded world element.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::DuplicateFrameName`] or [`SdfError::ReservedName`]
    /// for naming violations, and [`SdfError::UnresolvableInclude`] if an
    /// include directive was left in the tree. An unusable `config` fails
    /// with [`SdfError::InvalidAttribute`].
    pub fn build(world: &CanonicalElement, config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        if world.kind != ElementKind::World {
            return Err(SdfError::missing_element(
                "world",
                format!("{} '{}' given as root", world.kind.tag(), world.name),
            ));
        }

        let mut table = Self {
            records: vec![FrameRecord {
                scoped_name: WORLD_FRAME.to_string(),
                local_name: WORLD_FRAME.to_string(),
                kind: FrameKind::World,
                declared_pose: Isometry3::identity(),
                relative_to: None,
                attached_to: None,
                scope: FrameId::WORLD,
                is_static: true,
                version: world.version,
                joint: None,
                canonical_link: None,
            }],
            by_name: HashMap::from([(WORLD_FRAME.to_string(), FrameId::WORLD)]),
            scopes: HashMap::from([(FrameId::WORLD, HashMap::new())]),
            joints: Vec::new(),
            world_name: world.name.clone(),
            delimiter: config.scope_delimiter.clone(),
        };

        let mut path = Vec::new();
        table.walk(&world.children, FrameId::WORLD, &mut path, false, config)?;
        debug!(
            frames = table.records.len(),
            joints = table.joints.len(),
            "frame table built"
        );
        Ok(table)
    }

    fn walk(
        &mut self,
        children: &[CanonicalElement],
        scope: FrameId,
        path: &mut Vec<String>,
        is_static: bool,
        config: &ResolverConfig,
    ) -> Result<()> {
        for child in children {
            match &child.kind {
                ElementKind::Model(attrs) => {
                    let is_static = is_static || attrs.is_static;
                    let id = self.register(child, FrameKind::Model, scope, path, is_static)?;
                    self.records[id.0].canonical_link = attrs.canonical_link.clone();
                    self.scopes.insert(id, HashMap::new());
                    path.push(child.name.clone());
                    self.walk(&child.children, id, path, is_static, config)?;
                    path.pop();
                }
                ElementKind::Actor => {
                    let id = self.register(child, FrameKind::Actor, scope, path, is_static)?;
                    self.scopes.insert(id, HashMap::new());
                    path.push(child.name.clone());
                    self.walk(&child.children, id, path, is_static, config)?;
                    path.pop();
                }
                ElementKind::Link => {
                    self.register(child, FrameKind::Link, scope, path, is_static)?;
                }
                ElementKind::Frame => {
                    self.register(child, FrameKind::Frame, scope, path, is_static)?;
                }
                ElementKind::Joint(attrs) => {
                    self.register_joint(child, attrs, scope, path, is_static, config)?;
                }
                ElementKind::Light(_) | ElementKind::Sensor(_) => {}
                ElementKind::World => {
                    warn!(world = %child.name, "nested world ignored");
                }
                ElementKind::Include(attrs) => {
                    return Err(SdfError::unresolvable_include(
                        attrs.uri.clone(),
                        "include directive was not expanded",
                    ));
                }
            }
        }
        Ok(())
    }

    fn register_joint(
        &mut self,
        element: &CanonicalElement,
        attrs: &JointAttrs,
        scope: FrameId,
        path: &[String],
        is_static: bool,
        config: &ResolverConfig,
    ) -> Result<()> {
        let index = self.joints.len();
        let child_side = self.register(element, FrameKind::Joint, scope, path, is_static)?;

        let parent_name = format!("{}{}", element.name, config.joint_parent_suffix);
        let parent_side = self.insert(
            FrameRecord {
                scoped_name: String::new(),
                local_name: parent_name,
                kind: FrameKind::JointParent,
                declared_pose: Isometry3::identity(),
                relative_to: None,
                attached_to: None,
                scope,
                is_static,
                version: element.version,
                joint: Some(index),
                canonical_link: None,
            },
            path,
        )?;
        self.records[child_side.0].joint = Some(index);

        self.joints.push(JointEntry {
            name: self.records[child_side.0].scoped_name.clone(),
            child_side,
            parent_side,
            scope,
            attrs: attrs.clone(),
        });
        Ok(())
    }

    fn register(
        &mut self,
        element: &CanonicalElement,
        kind: FrameKind,
        scope: FrameId,
        path: &[String],
        is_static: bool,
    ) -> Result<FrameId> {
        self.insert(
            FrameRecord {
                scoped_name: String::new(),
                local_name: element.name.clone(),
                kind,
                declared_pose: element.pose_or_identity(),
                relative_to: element.relative_to.clone(),
                attached_to: element.attached_to.clone(),
                scope,
                is_static,
                version: element.version,
                joint: None,
                canonical_link: None,
            },
            path,
        )
    }

    fn insert(&mut self, mut record: FrameRecord, path: &[String]) -> Result<FrameId> {
        let scope_label = self.scope_label(record.scope);
        let name = record.local_name.as_str();
        if name.is_empty()
            || name == WORLD_FRAME
            || name == MODEL_FRAME
            || name.contains(self.delimiter.as_str())
        {
            return Err(SdfError::ReservedName {
                name: name.to_string(),
                scope: scope_label,
            });
        }

        let id = FrameId(self.records.len());
        let siblings = self.scopes.entry(record.scope).or_default();
        if siblings.contains_key(name) {
            return Err(SdfError::duplicate_frame(name, scope_label));
        }
        siblings.insert(name.to_string(), id);

        let mut segments: Vec<&str> = path.iter().map(String::as_str).collect();
        segments.push(name);
        record.scoped_name = segments.join(self.delimiter.as_str());
        self.by_name.insert(record.scoped_name.clone(), id);
        self.records.push(record);
        Ok(id)
    }

    /// Human readable name of a scope for messages.
    pub fn scope_label(&self, scope: FrameId) -> String {
        if scope == FrameId::WORLD {
            format!("world '{}'", self.world_name)
        } else {
            format!("model '{}'", self.records[scope.0].scoped_name)
        }
    }

    /// Resolve a reference as seen from inside `scope`.
    ///
    /// Local names may descend through nested scopes with the delimiter,
    /// `__model__` names the scope itself and `world` the world frame. There
    /// is no fallback to enclosing scopes.
    pub fn resolve(&self, reference: &FrameRef, scope: FrameId) -> Option<FrameId> {
        match reference {
            FrameRef::Local(name) => {
                if name == WORLD_FRAME {
                    return Some(FrameId::WORLD);
                }
                let mut current = scope;
                for (i, segment) in name.split(self.delimiter.as_str()).enumerate() {
                    if i == 0 && segment == MODEL_FRAME {
                        continue;
                    }
                    current = *self.scopes.get(&current)?.get(segment)?;
                }
                Some(current)
            }
            FrameRef::Scoped(path) => {
                let mut current = FrameId::WORLD;
                for segment in path {
                    current = *self.scopes.get(&current)?.get(segment.as_str())?;
                }
                Some(current)
            }
        }
    }

    /// Frame registered under a scoped name.
    pub fn get(&self, scoped_name: &str) -> Option<FrameId> {
        self.by_name.get(scoped_name).copied()
    }

    /// Record of a frame.
    pub fn record(&self, id: FrameId) -> &FrameRecord {
        &self.records[id.0]
    }

    /// All records in registration order.
    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// All joints in registration order.
    pub fn joints(&self) -> &[JointEntry] {
        &self.joints
    }

    /// Number of registered frames, the world included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Name of the world element the table was built from.
    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    /// Scope delimiter used for scoped names.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Ids of every frame, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        (0..self.records.len()).map(FrameId)
    }

    /// Join frame names for a cycle message.
    pub(crate) fn describe_chain(&self, chain: &[FrameId]) -> String {
        chain
            .iter()
            .map(|id| self.records[id.0].scoped_name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Order frames so every frame comes after its parent.
///
/// `parents[i]` is the parent of frame `i`. On a cycle, returns the frames
/// on it with the first one repeated at the end.
pub(crate) fn parent_first_order(
    parents: &[Option<FrameId>],
) -> std::result::Result<Vec<FrameId>, Vec<FrameId>> {
    let mut visited = vec![false; parents.len()];
    let mut visiting = vec![false; parents.len()];
    let mut order = Vec::with_capacity(parents.len());

    for start in 0..parents.len() {
        let mut path = Vec::new();
        let mut current = Some(FrameId(start));
        while let Some(id) = current {
            if visited[id.0] {
                break;
            }
            if visiting[id.0] {
                let begin = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle = path[begin..].to_vec();
                cycle.push(id);
                return Err(cycle);
            }
            visiting[id.0] = true;
            path.push(id);
            current = parents[id.0];
        }
        for id in path.into_iter().rev() {
            visiting[id.0] = false;
            visited[id.0] = true;
            order.push(id);
        }
    }
    Ok(order)
}
