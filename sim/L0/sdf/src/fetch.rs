//! Fetching included fragments.
//!
//! The include resolver never touches the filesystem itself; it asks a
//! [`ModelFetch`] implementation for the document behind a URI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SdfError};
use crate::parser::{RawDocument, parse_sdf_str};

/// File name looked up inside a model directory.
pub const MODEL_FILE: &str = "model.sdf";

/// A fetched and parsed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The URI the fragment was fetched for.
    pub uri: String,
    /// Fragment text as fetched.
    pub source: String,
    /// The parsed fragment document.
    pub document: RawDocument,
}

impl Fragment {
    /// Parse fragment text fetched for `uri`.
    pub fn parse(uri: &str, xml: &str) -> Result<Self> {
        let document = parse_sdf_str(xml)
            .map_err(|e| SdfError::unresolvable_include(uri, e.to_string()))?;
        Ok(Self {
            uri: uri.to_string(),
            source: xml.to_string(),
            document,
        })
    }
}

/// Source of included fragments.
pub trait ModelFetch {
    /// Fetch and parse the fragment named by `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`SdfError::UnresolvableInclude`] if the URI cannot be served.
    fn fetch(&self, uri: &str) -> Result<Fragment>;
}

/// Fetcher that serves nothing. Any include fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetch;

impl ModelFetch for NoFetch {
    fn fetch(&self, uri: &str) -> Result<Fragment> {
        Err(SdfError::unresolvable_include(uri, "no fetcher configured"))
    }
}

/// In-memory fragments keyed by exact URI.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    sources: HashMap<String, String>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment source.
    #[must_use]
    pub fn with_source(mut self, uri: impl Into<String>, xml: impl Into<String>) -> Self {
        self.insert(uri, xml);
        self
    }

    /// Add or replace a fragment source.
    pub fn insert(&mut self, uri: impl Into<String>, xml: impl Into<String>) {
        self.sources.insert(uri.into(), xml.into());
    }
}

impl ModelFetch for MemoryFetcher {
    fn fetch(&self, uri: &str) -> Result<Fragment> {
        let xml = self
            .sources
            .get(uri)
            .ok_or_else(|| SdfError::unresolvable_include(uri, "not found"))?;
        Fragment::parse(uri, xml)
    }
}

/// Fetcher resolving URIs against a directory.
///
/// - `model://name` reads `<root>/name/model.sdf`
/// - `model://name/path.sdf` reads `<root>/name/path.sdf`
/// - `file://path` and plain paths read the path itself, relative paths
///   resolved against `<root>`
///
/// A path naming a directory reads `model.sdf` inside it.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    /// Serve fragments from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory URIs are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URI to the file it names.
    pub fn resolve_path(&self, uri: &str) -> PathBuf {
        let path = if let Some(rest) = uri.strip_prefix("model://") {
            self.root.join(rest.trim_end_matches('/'))
        } else {
            let rest = uri.strip_prefix("file://").unwrap_or(uri);
            let path = Path::new(rest);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.root.join(path)
            }
        };
        if path.is_dir() {
            path.join(MODEL_FILE)
        } else {
            path
        }
    }
}

impl ModelFetch for DirectoryFetcher {
    fn fetch(&self, uri: &str) -> Result<Fragment> {
        let path = self.resolve_path(uri);
        debug!(uri, path = %path.display(), "fetching fragment");
        let xml = std::fs::read_to_string(&path).map_err(|e| {
            SdfError::unresolvable_include(uri, format!("cannot read '{}': {e}", path.display()))
        })?;
        Fragment::parse(uri, &xml)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    const ARM: &str = r#"<sdf version="1.9"><model name="arm"><link name="base"/></model></sdf>"#;

    fn setup_files(dir: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
        }
    }

    #[test]
    fn test_no_fetch() {
        let err = NoFetch.fetch("model://arm").unwrap_err();
        assert!(matches!(err, SdfError::UnresolvableInclude { ref uri, .. } if uri == "model://arm"));
    }

    #[test]
    fn test_memory_fetcher() {
        let fetcher = MemoryFetcher::new().with_source("model://arm", ARM);
        let fragment = fetcher.fetch("model://arm").unwrap();
        assert_eq!(fragment.uri, "model://arm");
        assert_eq!(fragment.document.version, "1.9");
        assert!(fetcher.fetch("model://leg").is_err());
    }

    #[test]
    fn test_malformed_fragment_is_unresolvable() {
        let fetcher = MemoryFetcher::new().with_source("bad", "<sdf version='1.9'><model>");
        assert!(matches!(
            fetcher.fetch("bad"),
            Err(SdfError::UnresolvableInclude { .. })
        ));
    }

    #[test]
    fn test_directory_fetcher_model_uri() {
        let dir = tempfile::tempdir().unwrap();
        setup_files(dir.path(), &[("arm/model.sdf", ARM), ("arm/alt.sdf", ARM)]);
        let fetcher = DirectoryFetcher::new(dir.path());

        assert_eq!(
            fetcher.resolve_path("model://arm"),
            dir.path().join("arm").join(MODEL_FILE)
        );
        assert!(fetcher.fetch("model://arm").is_ok());
        assert!(fetcher.fetch("model://arm/alt.sdf").is_ok());
    }

    #[test]
    fn test_directory_fetcher_paths() {
        let dir = tempfile::tempdir().unwrap();
        setup_files(dir.path(), &[("parts/arm.sdf", ARM)]);
        let fetcher = DirectoryFetcher::new(dir.path());

        assert!(fetcher.fetch("parts/arm.sdf").is_ok());
        let absolute = dir.path().join("parts/arm.sdf");
        let uri = format!("file://{}", absolute.display());
        assert!(fetcher.fetch(&uri).is_ok());
    }

    #[test]
    fn test_directory_fetcher_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        let err = fetcher.fetch("model://ghost").unwrap_err();
        assert!(err.to_string().contains("model://ghost"));
    }
}
