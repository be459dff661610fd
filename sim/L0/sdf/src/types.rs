//! Canonical element tree produced by the version normalizer.
//!
//! These types are version independent: every supported format version
//! normalizes into the same field names and defaults. Leaf parameters
//! (geometry, materials, sensor noise) are not represented.

use std::fmt;

use nalgebra::{Isometry3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdfError};
use crate::version::FormatVersion;

/// Name of the world frame in every graph.
pub const WORLD_FRAME: &str = "world";

/// Keyword naming the enclosing model's own frame.
pub const MODEL_FRAME: &str = "__model__";

// ============================================================================
// Frame references
// ============================================================================

/// A reference from one element to a frame, by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameRef {
    /// Text as written in the document, resolved relative to the scope
    /// enclosing the referencing element.
    Local(String),
    /// Absolute path of scope segments from the document root.
    Scoped(Vec<String>),
}

impl FrameRef {
    /// Create a local reference.
    pub fn local(name: impl Into<String>) -> Self {
        Self::Local(name.into())
    }

    /// Parse an optional attribute value; empty strings mean "not given".
    pub fn from_attribute(value: Option<&str>) -> Option<Self> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::local)
    }

    /// Whether this reference names the world frame.
    pub fn is_world(&self) -> bool {
        match self {
            Self::Local(name) => name == WORLD_FRAME,
            Self::Scoped(path) => path.is_empty(),
        }
    }

    /// Render the reference using `delimiter` between scope segments.
    pub fn display_with(&self, delimiter: &str) -> String {
        match self {
            Self::Local(name) => name.clone(),
            Self::Scoped(path) if path.is_empty() => WORLD_FRAME.to_string(),
            Self::Scoped(path) => path.join(delimiter),
        }
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_with("::"))
    }
}

// ============================================================================
// Frame kinds
// ============================================================================

/// Kind of a registered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameKind {
    /// The root frame of a document.
    World,
    /// A model's implicit frame.
    Model,
    /// An actor's implicit frame.
    Actor,
    /// A link frame.
    Link,
    /// An explicit `<frame>`.
    Frame,
    /// The child-side frame of a joint.
    Joint,
    /// The parent-side frame of a joint.
    JointParent,
}

impl FrameKind {
    /// Whether frames of this kind open a naming scope.
    pub fn is_scope(self) -> bool {
        matches!(self, Self::World | Self::Model | Self::Actor)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::World => "world",
            Self::Model => "model",
            Self::Actor => "actor",
            Self::Link => "link",
            Self::Frame => "frame",
            Self::Joint => "joint",
            Self::JointParent => "joint parent",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Joints
// ============================================================================

/// Joint types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// No relative motion.
    #[default]
    Fixed,
    /// Rotation about `axis` within limits.
    Revolute,
    /// Rotation about `axis` without limits.
    Continuous,
    /// Translation along `axis`.
    Prismatic,
    /// Coupled rotation and translation about `axis`.
    Screw,
    /// Rotation about `axis` then `axis2`.
    Universal,
    /// Two revolute axes.
    Revolute2,
    /// Three rotational degrees of freedom.
    Ball,
    /// Gear coupling between other joints; no motion of its own.
    Gearbox,
}

impl JointType {
    /// Parse a joint type name.
    pub fn from_name(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "revolute" => Ok(Self::Revolute),
            "continuous" => Ok(Self::Continuous),
            "prismatic" => Ok(Self::Prismatic),
            "screw" => Ok(Self::Screw),
            "universal" => Ok(Self::Universal),
            "revolute2" => Ok(Self::Revolute2),
            "ball" => Ok(Self::Ball),
            "gearbox" => Ok(Self::Gearbox),
            other => Err(SdfError::invalid_attribute(
                "type",
                "joint",
                format!("unknown joint type '{other}'"),
            )),
        }
    }

    /// Number of articulation values this joint consumes.
    pub fn dof(self) -> usize {
        match self {
            Self::Fixed | Self::Gearbox => 0,
            Self::Revolute | Self::Continuous | Self::Prismatic | Self::Screw => 1,
            Self::Universal | Self::Revolute2 => 2,
            Self::Ball => 3,
        }
    }
}

/// A joint axis as declared.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointAxis {
    /// Axis direction.
    pub xyz: Vector3<f64>,
    /// Frame whose coordinates `xyz` is written in (None = the joint frame).
    pub expressed_in: Option<FrameRef>,
}

impl Default for JointAxis {
    fn default() -> Self {
        Self {
            xyz: Vector3::z(),
            expressed_in: None,
        }
    }
}

impl JointAxis {
    /// Axis along `xyz`, expressed in the joint frame.
    pub fn new(xyz: Vector3<f64>) -> Self {
        Self {
            xyz,
            expressed_in: None,
        }
    }
}

/// Joint-specific attributes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointAttrs {
    /// Joint type.
    pub joint_type: JointType,
    /// Parent link (or `world`).
    pub parent: FrameRef,
    /// Child link.
    pub child: FrameRef,
    /// First axis.
    pub axis: JointAxis,
    /// Second axis (universal, revolute2).
    pub axis2: JointAxis,
    /// Translation per revolution for screw joints.
    pub thread_pitch: f64,
}

impl JointAttrs {
    /// Create joint attributes with default axes.
    pub fn new(joint_type: JointType, parent: &str, child: &str) -> Self {
        Self {
            joint_type,
            parent: FrameRef::local(parent),
            child: FrameRef::local(child),
            axis: JointAxis::default(),
            axis2: JointAxis::new(Vector3::y()),
            thread_pitch: 1.0,
        }
    }

    /// Replace the first axis.
    #[must_use]
    pub fn with_axis(mut self, xyz: Vector3<f64>) -> Self {
        self.axis = JointAxis::new(xyz);
        self
    }
}

// ============================================================================
// Other element payloads
// ============================================================================

/// Model-specific attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelAttrs {
    /// Whether the model is immovable.
    pub is_static: bool,
    /// Link the model frame is associated with (None = first link).
    pub canonical_link: Option<String>,
}

/// Sensor kinds, after collapsing deprecated aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SensorKind {
    /// Color camera.
    Camera,
    /// Depth camera (legacy alias `depth`).
    DepthCamera,
    /// CPU lidar (legacy alias `ray`).
    Lidar,
    /// GPU lidar (legacy alias `gpu_ray`).
    GpuLidar,
    /// Inertial measurement unit.
    Imu,
    /// Contact sensor.
    Contact,
    /// Force/torque sensor.
    ForceTorque,
    /// Any other sensor type, by name.
    Other(String),
}

impl SensorKind {
    /// Map a type name to a kind.
    ///
    /// Returns the kind and whether the name was a deprecated alias.
    pub fn from_type_name(name: &str) -> (Self, bool) {
        match name.trim() {
            "camera" => (Self::Camera, false),
            "depth_camera" => (Self::DepthCamera, false),
            "depth" => (Self::DepthCamera, true),
            "lidar" => (Self::Lidar, false),
            "ray" => (Self::Lidar, true),
            "gpu_lidar" => (Self::GpuLidar, false),
            "gpu_ray" => (Self::GpuLidar, true),
            "imu" => (Self::Imu, false),
            "contact" => (Self::Contact, false),
            "force_torque" => (Self::ForceTorque, false),
            other => (Self::Other(other.to_string()), false),
        }
    }
}

/// Light kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LightKind {
    /// Omnidirectional point light.
    #[default]
    Point,
    /// Directional light.
    Directional,
    /// Spot light.
    Spot,
}

impl LightKind {
    /// Parse a light type name.
    pub fn from_name(s: &str) -> Result<Self> {
        match s.trim() {
            "point" => Ok(Self::Point),
            "directional" => Ok(Self::Directional),
            "spot" => Ok(Self::Spot),
            other => Err(SdfError::invalid_attribute(
                "type",
                "light",
                format!("unknown light type '{other}'"),
            )),
        }
    }
}

/// Include directive attributes. The override pose lives on the element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IncludeAttrs {
    /// Fragment location.
    pub uri: String,
    /// Replacement name for the fragment's root.
    pub name: Option<String>,
    /// Replacement static flag for the fragment's root.
    pub is_static: Option<bool>,
    /// Frame of the fragment that the override pose applies to.
    pub placement_frame: Option<String>,
}

impl IncludeAttrs {
    /// Include `uri` without overrides.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            is_static: None,
            placement_frame: None,
        }
    }
}

// ============================================================================
// Canonical element
// ============================================================================

/// Element kind with its kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementKind {
    /// A world.
    World,
    /// A model (possibly nested).
    Model(ModelAttrs),
    /// An animated actor.
    Actor,
    /// A link.
    Link,
    /// A joint.
    Joint(JointAttrs),
    /// An explicit frame.
    Frame,
    /// A light.
    Light(LightKind),
    /// A sensor.
    Sensor(SensorKind),
    /// An include directive not yet expanded.
    Include(IncludeAttrs),
}

impl ElementKind {
    /// Short tag name for messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Model(_) => "model",
            Self::Actor => "actor",
            Self::Link => "link",
            Self::Joint(_) => "joint",
            Self::Frame => "frame",
            Self::Light(_) => "light",
            Self::Sensor(_) => "sensor",
            Self::Include(_) => "include",
        }
    }

    /// Whether the element opens a naming scope for its children.
    pub fn is_scope(&self) -> bool {
        matches!(self, Self::World | Self::Model(_) | Self::Actor)
    }
}

/// A version-independent element of the description tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanonicalElement {
    /// Kind and kind-specific payload.
    pub kind: ElementKind,
    /// Local name, unique among siblings.
    pub name: String,
    /// Declared pose (None = identity).
    pub pose: Option<Isometry3<f64>>,
    /// Frame the declared pose is expressed in.
    pub relative_to: Option<FrameRef>,
    /// Frame this element moves with.
    pub attached_to: Option<FrameRef>,
    /// Format version the element was normalized from.
    pub version: FormatVersion,
    /// Owned children in document order.
    pub children: Vec<CanonicalElement>,
}

impl CanonicalElement {
    /// Create an element with no pose and no children.
    pub fn new(kind: ElementKind, name: impl Into<String>, version: FormatVersion) -> Self {
        Self {
            kind,
            name: name.into(),
            pose: None,
            relative_to: None,
            attached_to: None,
            version,
            children: Vec::new(),
        }
    }

    /// Create a world element holding `children`.
    pub fn world(
        name: impl Into<String>,
        version: FormatVersion,
        children: Vec<CanonicalElement>,
    ) -> Self {
        let mut world = Self::new(ElementKind::World, name, version);
        world.children = children;
        world
    }

    /// Set the declared pose.
    #[must_use]
    pub fn with_pose(mut self, pose: Isometry3<f64>) -> Self {
        self.pose = Some(pose);
        self
    }

    /// Set the `relative_to` reference.
    #[must_use]
    pub fn with_relative_to(mut self, reference: &str) -> Self {
        self.relative_to = Some(FrameRef::local(reference));
        self
    }

    /// Set the `attached_to` reference.
    #[must_use]
    pub fn with_attached_to(mut self, reference: &str) -> Self {
        self.attached_to = Some(FrameRef::local(reference));
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: CanonicalElement) -> Self {
        self.children.push(child);
        self
    }

    /// Declared pose, identity when omitted.
    pub fn pose_or_identity(&self) -> Isometry3<f64> {
        self.pose.unwrap_or_else(Isometry3::identity)
    }

    /// Visit every frame reference held directly by this element.
    pub fn for_each_reference_mut(&mut self, mut f: impl FnMut(&mut FrameRef)) {
        if let Some(reference) = &mut self.relative_to {
            f(reference);
        }
        if let Some(reference) = &mut self.attached_to {
            f(reference);
        }
        if let ElementKind::Joint(joint) = &mut self.kind {
            f(&mut joint.parent);
            f(&mut joint.child);
            if let Some(reference) = &mut joint.axis.expressed_in {
                f(reference);
            }
            if let Some(reference) = &mut joint.axis2.expressed_in {
                f(reference);
            }
        }
    }

    /// Visit this element and all descendants with the scope path their own
    /// references resolve in.
    ///
    /// `scope` is the path of the scope enclosing `self`.
    pub fn walk_scoped_mut(
        &mut self,
        scope: &mut Vec<String>,
        f: &mut impl FnMut(&mut CanonicalElement, &[String]),
    ) {
        f(self, scope);
        let opens_scope = matches!(self.kind, ElementKind::Model(_) | ElementKind::Actor);
        if opens_scope {
            scope.push(self.name.clone());
        }
        for child in &mut self.children {
            child.walk_scoped_mut(scope, f);
        }
        if opens_scope {
            scope.pop();
        }
    }
}
