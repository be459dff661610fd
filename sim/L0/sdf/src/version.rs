//! Format versions and the per-version default reference rules.
//!
//! Which frame an omitted `attached_to` or `relative_to` falls back to
//! depends on the element kind and on the format version the element was
//! written in. The rules live in one table, [`DEFAULT_RULES`], so they can be
//! audited and tested on their own.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdfError};
use crate::types::FrameKind;

/// A supported format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FormatVersion {
    major: u32,
    minor: u32,
}

/// Every `major.minor` pair accepted by [`FormatVersion::parse`].
const SUPPORTED: &[(u32, u32)] = &[
    (1, 0),
    (1, 2),
    (1, 3),
    (1, 4),
    (1, 5),
    (1, 6),
    (1, 7),
    (1, 8),
    (1, 9),
    (1, 10),
    (1, 11),
];

impl FormatVersion {
    /// Newest supported version.
    pub const LATEST: Self = Self {
        major: 1,
        minor: 11,
    };

    /// First version with `relative_to` / `attached_to`.
    pub const SCOPED: Self = Self { major: 1, minor: 7 };

    /// First version with `placement_frame`, `canonical_link` and `__model__`.
    pub const PLACEMENT: Self = Self { major: 1, minor: 8 };

    /// Parse a version tag such as `"1.7"`.
    pub fn parse(tag: &str) -> Result<Self> {
        let unsupported = || SdfError::UnsupportedVersion(tag.to_string());
        let (major, minor) = tag.trim().split_once('.').ok_or_else(unsupported)?;
        let major: u32 = major.parse().map_err(|_| unsupported())?;
        let minor: u32 = minor.parse().map_err(|_| unsupported())?;
        if SUPPORTED.contains(&(major, minor)) {
            Ok(Self { major, minor })
        } else {
            Err(unsupported())
        }
    }

    /// Major component.
    pub fn major(self) -> u32 {
        self.major
    }

    /// Minor component.
    pub fn minor(self) -> u32 {
        self.minor
    }

    /// Which default-rule family this version belongs to.
    pub fn family(self) -> VersionFamily {
        if self >= Self::SCOPED {
            VersionFamily::Scoped
        } else {
            VersionFamily::Legacy
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Groups of versions sharing the same default reference rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VersionFamily {
    /// Versions before 1.7: no `attached_to`, poses default to the scope.
    Legacy,
    /// 1.7 and later: explicit attachment and pose references.
    Scoped,
}

/// Target of an omitted `attached_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachDefault {
    /// The frame of the enclosing model (or the world).
    ScopeFrame,
    /// The joint's child link.
    ChildLink,
    /// The joint's parent link.
    ParentLink,
}

/// Target of an omitted `relative_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseDefault {
    /// Whatever the frame is attached to.
    AttachmentParent,
    /// The frame of the enclosing model (or the world).
    ScopeFrame,
    /// The child-side frame of the same joint.
    JointFrame,
}

/// Default reference rule for one element kind in one version family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRule {
    /// Fallback for `attached_to`.
    pub attached_to: AttachDefault,
    /// Fallback for `relative_to`.
    pub relative_to: PoseDefault,
}

const fn rule(attached_to: AttachDefault, relative_to: PoseDefault) -> DefaultRule {
    DefaultRule {
        attached_to,
        relative_to,
    }
}

/// The default reference table. The world frame has no entry.
pub const DEFAULT_RULES: &[(VersionFamily, FrameKind, DefaultRule)] = &[
    (
        VersionFamily::Legacy,
        FrameKind::Model,
        rule(AttachDefault::ScopeFrame, PoseDefault::ScopeFrame),
    ),
    (
        VersionFamily::Legacy,
        FrameKind::Actor,
        rule(AttachDefault::ScopeFrame, PoseDefault::ScopeFrame),
    ),
    (
        VersionFamily::Legacy,
        FrameKind::Link,
        rule(AttachDefault::ScopeFrame, PoseDefault::ScopeFrame),
    ),
    (
        VersionFamily::Legacy,
        FrameKind::Frame,
        rule(AttachDefault::ScopeFrame, PoseDefault::ScopeFrame),
    ),
    (
        VersionFamily::Legacy,
        FrameKind::Joint,
        rule(AttachDefault::ChildLink, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Legacy,
        FrameKind::JointParent,
        rule(AttachDefault::ParentLink, PoseDefault::JointFrame),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::Model,
        rule(AttachDefault::ScopeFrame, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::Actor,
        rule(AttachDefault::ScopeFrame, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::Link,
        rule(AttachDefault::ScopeFrame, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::Frame,
        rule(AttachDefault::ScopeFrame, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::Joint,
        rule(AttachDefault::ChildLink, PoseDefault::AttachmentParent),
    ),
    (
        VersionFamily::Scoped,
        FrameKind::JointParent,
        rule(AttachDefault::ParentLink, PoseDefault::JointFrame),
    ),
];

/// Look up the default rule for a frame kind in a version family.
pub fn default_rule(family: VersionFamily, kind: FrameKind) -> Option<DefaultRule> {
    DEFAULT_RULES
        .iter()
        .find(|(f, k, _)| *f == family && *k == kind)
        .map(|(_, _, rule)| *rule)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_supported() {
        let v = FormatVersion::parse("1.7").unwrap();
        assert_eq!(v.major(), 1);
        assert_eq!(v.minor(), 7);
        assert_eq!(v.to_string(), "1.7");
        assert_eq!(FormatVersion::parse(" 1.11 ").unwrap(), FormatVersion::LATEST);
    }

    #[test]
    fn test_parse_unsupported() {
        for tag in ["2.0", "1.12", "1.1", "abc", "", "1", "1.x"] {
            assert!(
                matches!(FormatVersion::parse(tag), Err(SdfError::UnsupportedVersion(_))),
                "{tag} should be rejected"
            );
        }
    }

    #[test]
    fn test_family_boundary() {
        assert_eq!(
            FormatVersion::parse("1.6").unwrap().family(),
            VersionFamily::Legacy
        );
        assert_eq!(
            FormatVersion::parse("1.7").unwrap().family(),
            VersionFamily::Scoped
        );
    }

    #[test]
    fn test_every_non_world_kind_has_a_rule() {
        let kinds = [
            FrameKind::Model,
            FrameKind::Actor,
            FrameKind::Link,
            FrameKind::Frame,
            FrameKind::Joint,
            FrameKind::JointParent,
        ];
        for family in [VersionFamily::Legacy, VersionFamily::Scoped] {
            for kind in kinds {
                assert!(default_rule(family, kind).is_some(), "{family:?} {kind}");
            }
            assert!(default_rule(family, FrameKind::World).is_none());
        }
    }

    #[test]
    fn test_frame_defaults_differ_by_family() {
        let legacy = default_rule(VersionFamily::Legacy, FrameKind::Frame).unwrap();
        let scoped = default_rule(VersionFamily::Scoped, FrameKind::Frame).unwrap();
        assert_eq!(legacy.relative_to, PoseDefault::ScopeFrame);
        assert_eq!(scoped.relative_to, PoseDefault::AttachmentParent);
        assert_eq!(legacy.attached_to, scoped.attached_to);
    }

    #[test]
    fn test_joint_rules() {
        for family in [VersionFamily::Legacy, VersionFamily::Scoped] {
            let joint = default_rule(family, FrameKind::Joint).unwrap();
            assert_eq!(joint.attached_to, AttachDefault::ChildLink);
            let parent = default_rule(family, FrameKind::JointParent).unwrap();
            assert_eq!(parent.attached_to, AttachDefault::ParentLink);
            assert_eq!(parent.relative_to, PoseDefault::JointFrame);
        }
    }
}
