//! Error types for SDF loading and frame graph resolution.

use thiserror::Error;

/// Errors that can occur while building or querying a frame graph.
///
/// Every construction error is terminal: the build aborts instead of
/// returning a partially resolved graph.
#[derive(Debug, Error)]
pub enum SdfError {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Missing required element.
    #[error("missing required element: {element} in {context}")]
    MissingElement {
        /// The missing element name.
        element: &'static str,
        /// Where the element was expected.
        context: String,
    },

    /// Missing required attribute.
    #[error("missing required attribute: {attribute} on {element}")]
    MissingAttribute {
        /// The missing attribute name.
        attribute: &'static str,
        /// The element that should have the attribute.
        element: String,
    },

    /// Invalid attribute or element value.
    #[error("invalid value for {attribute} on {element}: {message}")]
    InvalidAttribute {
        /// The attribute with the invalid value.
        attribute: &'static str,
        /// The element containing the attribute.
        element: String,
        /// Description of why the value is invalid.
        message: String,
    },

    /// The document declares a format version this crate does not know.
    #[error("unsupported SDF version: '{0}'")]
    UnsupportedVersion(String),

    /// An include directive could not be turned into exactly one entity.
    #[error("cannot resolve include '{uri}': {reason}")]
    UnresolvableInclude {
        /// The URI named by the include.
        uri: String,
        /// Why the fragment was rejected.
        reason: String,
    },

    /// An included entity's final name is already used by a sibling.
    #[error("included name '{name}' collides with a sibling in {scope}")]
    NameCollision {
        /// The computed name of the included entity.
        name: String,
        /// The scope the include was spliced into.
        scope: String,
    },

    /// Two frames in one scope share a local name.
    #[error("duplicate frame name '{name}' in {scope}")]
    DuplicateFrameName {
        /// The duplicated local name.
        name: String,
        /// The scope containing both frames.
        scope: String,
    },

    /// A frame uses a name reserved by the format.
    #[error("reserved frame name '{name}' in {scope}")]
    ReservedName {
        /// The offending local name.
        name: String,
        /// The scope containing the frame.
        scope: String,
    },

    /// An `attached_to` reference names no frame.
    #[error("frame '{frame}' is attached to unknown frame '{target}'")]
    UnknownAttachmentTarget {
        /// The frame carrying the reference.
        frame: String,
        /// The reference as written.
        target: String,
    },

    /// Following attachment edges revisits a frame.
    #[error("attachment cycle: {0}")]
    AttachmentCycle(String),

    /// A joint is structurally invalid.
    #[error("invalid joint '{joint}': {message}")]
    InvalidJoint {
        /// The joint's scoped name.
        joint: String,
        /// Description of the problem.
        message: String,
    },

    /// A `relative_to` (or `expressed_in`) reference names no frame.
    #[error("pose of '{frame}' is relative to unknown frame '{reference}'")]
    UnknownPoseReference {
        /// The frame carrying the reference.
        frame: String,
        /// The reference as written.
        reference: String,
    },

    /// Following `relative_to` edges revisits a frame.
    #[error("pose reference cycle: {0}")]
    PoseReferenceCycle(String),

    /// A query named a frame that is not in the graph.
    #[error("unknown frame: {0}")]
    UnknownFrame(String),

    /// Articulation values were supplied for a joint that is not in the graph.
    #[error("unknown joint: {0}")]
    UnknownJoint(String),

    /// Two frames have no common ancestor.
    #[error("frames '{from}' and '{to}' are not connected")]
    DisconnectedFrames {
        /// The source frame of the query.
        from: String,
        /// The target frame of the query.
        to: String,
    },

    /// The requested vector axis does not hold exactly three components.
    #[error("ambiguous vector axis {axis} for shape {shape:?}")]
    AmbiguousAxis {
        /// The requested axis (negative values count from the end).
        axis: isize,
        /// The array shape the axis was applied to.
        shape: Vec<usize>,
    },

    /// Batched values do not broadcast against the batch shape.
    #[error("batch shape mismatch: {0}")]
    BatchShapeMismatch(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdfError {
    /// Create a missing element error.
    pub fn missing_element(element: &'static str, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element,
            context: context.into(),
        }
    }

    /// Create a missing attribute error.
    pub fn missing_attribute(attribute: &'static str, element: impl Into<String>) -> Self {
        Self::MissingAttribute {
            attribute,
            element: element.into(),
        }
    }

    /// Create an invalid attribute error.
    pub fn invalid_attribute(
        attribute: &'static str,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            attribute,
            element: element.into(),
            message: message.into(),
        }
    }

    /// Create an unresolvable include error.
    pub fn unresolvable_include(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableInclude {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a name collision error.
    pub fn name_collision(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::NameCollision {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Create a duplicate frame name error.
    pub fn duplicate_frame(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::DuplicateFrameName {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Create an unknown attachment target error.
    pub fn unknown_attachment(frame: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnknownAttachmentTarget {
            frame: frame.into(),
            target: target.into(),
        }
    }

    /// Create an unknown pose reference error.
    pub fn unknown_pose_reference(frame: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnknownPoseReference {
            frame: frame.into(),
            reference: reference.into(),
        }
    }

    /// Create an invalid joint error.
    pub fn invalid_joint(joint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidJoint {
            joint: joint.into(),
            message: message.into(),
        }
    }
}

/// Result type for SDF operations.
pub type Result<T> = std::result::Result<T, SdfError>;
