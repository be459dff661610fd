//! Configuration for frame graph resolution.
//!
//! This module provides [`ResolverConfig`], which controls naming conventions
//! and limits used while expanding includes and building the frame graph.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdfError};

/// Main configuration for loading a document into a frame graph.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResolverConfig {
    /// Delimiter joining scope names in a scoped name.
    pub scope_delimiter: String,
    /// Suffix appended to a joint's name for its parent-side frame.
    pub joint_parent_suffix: String,
    /// Which `<world>` to build when a document declares several
    /// (None selects the first).
    pub world_name: Option<String>,
    /// Maximum nesting of include directives.
    pub max_include_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            scope_delimiter: "::".to_string(),
            joint_parent_suffix: "_parent".to_string(),
            world_name: None,
            max_include_depth: 32,
        }
    }
}

impl ResolverConfig {
    /// Use a custom scope delimiter.
    ///
    /// The delimiter must be non-empty; [`ResolverConfig::validate`] rejects
    /// an empty one when a document is loaded.
    #[must_use]
    pub fn with_scope_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.scope_delimiter = delimiter.into();
        self
    }

    /// Use a custom suffix for parent-side joint frames.
    #[must_use]
    pub fn with_joint_parent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.joint_parent_suffix = suffix.into();
        self
    }

    /// Select a world by name.
    #[must_use]
    pub fn with_world(mut self, name: impl Into<String>) -> Self {
        self.world_name = Some(name.into());
        self
    }

    /// Limit include nesting.
    #[must_use]
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Join scope segments with the configured delimiter.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut out = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                out.push_str(&self.scope_delimiter);
            }
            out.push_str(segment.as_ref());
        }
        out
    }

    /// Check that names built with these settings can be told apart.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::InvalidAttribute`] if the scope delimiter or the
    /// joint parent suffix is empty.
    pub fn validate(&self) -> Result<()> {
        if self.scope_delimiter.is_empty() {
            return Err(SdfError::invalid_attribute(
                "scope_delimiter",
                "resolver config",
                "must not be empty",
            ));
        }
        if self.joint_parent_suffix.is_empty() {
            return Err(SdfError::invalid_attribute(
                "joint_parent_suffix",
                "resolver config",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.scope_delimiter, "::");
        assert_eq!(config.joint_parent_suffix, "_parent");
        assert!(config.world_name.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = ResolverConfig::default()
            .with_scope_delimiter("/")
            .with_world("lab")
            .with_max_include_depth(4);
        assert_eq!(config.join(&["a", "b", "c"]), "a/b/c");
        assert_eq!(config.world_name.as_deref(), Some("lab"));
        assert_eq!(config.max_include_depth, 4);
    }

    #[test]
    fn test_join_empty() {
        let config = ResolverConfig::default();
        assert_eq!(config.join::<&str>(&[]), "");
        assert_eq!(config.join(&["solo"]), "solo");
    }

    #[test]
    fn test_validate() {
        assert!(ResolverConfig::default().validate().is_ok());
        assert!(matches!(
            ResolverConfig::default().with_scope_delimiter("").validate(),
            Err(SdfError::InvalidAttribute { attribute: "scope_delimiter", .. })
        ));
        assert!(matches!(
            ResolverConfig::default().with_joint_parent_suffix("").validate(),
            Err(SdfError::InvalidAttribute { attribute: "joint_parent_suffix", .. })
        ));
    }
}
