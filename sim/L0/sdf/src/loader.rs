//! Document to frame graph pipeline.
//!
//! Chains parsing, version normalization, include expansion and graph
//! construction.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::Result;
use crate::fetch::{DirectoryFetcher, ModelFetch};
use crate::graph::FrameGraph;
use crate::include::resolve_includes;
use crate::normalize::normalize_document;
use crate::parser::{RawDocument, parse_sdf_str};

/// Loader for SDF documents with configurable resolution.
#[derive(Debug, Clone, Default)]
pub struct SdfLoader {
    /// Resolution settings.
    pub config: ResolverConfig,
}

impl SdfLoader {
    /// Create a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given resolution settings.
    #[must_use]
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Load a document from a file.
    ///
    /// Includes are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any stage fails.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<FrameGraph> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        self.load_str(&content, &DirectoryFetcher::new(root))
    }

    /// Load a document from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or any later stage fails.
    pub fn load_str(&self, xml: &str, fetcher: &dyn ModelFetch) -> Result<FrameGraph> {
        let document = parse_sdf_str(xml)?;
        self.load_document(&document, fetcher)
    }

    /// Load an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if normalization, include expansion or graph
    /// construction fails.
    pub fn load_document(
        &self,
        document: &RawDocument,
        fetcher: &dyn ModelFetch,
    ) -> Result<FrameGraph> {
        let mut world = normalize_document(document, self.config.world_name.as_deref())?;
        debug!(world = %world.name, version = %world.version, "document normalized");
        resolve_includes(&mut world, fetcher, &self.config)?;
        debug!(world = %world.name, "includes expanded");
        FrameGraph::from_canonical(&world, &self.config)
    }
}

/// Load an SDF string.
///
/// # Errors
///
/// Returns an error if any stage fails.
pub fn load_sdf_str(
    xml: &str,
    fetcher: &dyn ModelFetch,
    config: &ResolverConfig,
) -> Result<FrameGraph> {
    SdfLoader::new().with_config(config.clone()).load_str(xml, fetcher)
}

/// Load an already parsed document.
///
/// # Errors
///
/// Returns an error if any stage fails.
pub fn load_document(
    document: &RawDocument,
    fetcher: &dyn ModelFetch,
    config: &ResolverConfig,
) -> Result<FrameGraph> {
    SdfLoader::new()
        .with_config(config.clone())
        .load_document(document, fetcher)
}

/// Convenience function to load an SDF file with default settings.
///
/// # Errors
///
/// Returns an error if the file cannot be read or any stage fails.
pub fn load_sdf_file(path: impl AsRef<Path>) -> Result<FrameGraph> {
    SdfLoader::default().load_file(path)
}
