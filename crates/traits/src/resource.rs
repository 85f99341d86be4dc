//! ResourceProvider trait for abstracting test-suite file access.
//!
//! The catalog, test-set files, exceptions file and external assertion files are
//! all read through this trait, so a suite can live on disk or be assembled in
//! memory for tests.

use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to load resource '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("Invalid resource format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

/// Shared resource data type (reference-counted bytes).
pub type SharedResourceData = Arc<Vec<u8>>;

/// A source of test-suite files, addressed by paths relative to the suite root.
///
/// # Implementations
///
/// - `FilesystemResourceProvider`: reads below a suite directory (xtdriver-resource)
/// - `InMemoryResourceProvider`: reads from a pre-populated map
pub trait ResourceProvider: Send + Sync + Debug {
    /// Load a resource by its suite-relative path.
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError>;

    /// Check if a resource exists.
    fn exists(&self, path: &str) -> bool;

    /// Load a resource and decode it as UTF-8 text.
    fn load_string(&self, path: &str) -> Result<String, ResourceError> {
        let data = self.load(path)?;
        String::from_utf8(data.to_vec())
            .map_err(|e| ResourceError::InvalidFormat(format!("{}: {}", path, e)))
    }

    /// Get the base path for resolving relative resources.
    ///
    /// Returns `None` if the provider doesn't use path-based resolution.
    fn base_path(&self) -> Option<&str> {
        None
    }

    /// The location an external processor should be given for `path`.
    ///
    /// Path-based providers return an absolute path; others return `path` unchanged.
    fn locate(&self, path: &str) -> String {
        match self.base_path() {
            Some(base) if !path.starts_with('/') && !path.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), path)
            }
            _ => path.to_string(),
        }
    }

    /// Returns a human-readable name for this provider (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// An in-memory resource provider.
///
/// Resources are stored in memory and must be pre-populated before use.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    resources: std::sync::RwLock<std::collections::HashMap<String, SharedResourceData>>,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self {
            resources: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Add a resource to the in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::LoadFailed` if the internal lock is poisoned.
    pub fn add(&self, path: impl Into<String>, data: Vec<u8>) -> Result<(), ResourceError> {
        let path_string = path.into();
        let mut resources = self
            .resources
            .write()
            .map_err(|_| ResourceError::LoadFailed {
                path: path_string.clone(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources.insert(path_string, Arc::new(data));
        Ok(())
    }

    /// Add a text resource.
    pub fn add_text(&self, path: impl Into<String>, text: &str) -> Result<(), ResourceError> {
        self.add(path, text.as_bytes().to_vec())
    }

    /// Get the number of resources in the store.
    ///
    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    ///
    /// Returns `true` if the lock is poisoned (safe default).
    pub fn is_empty(&self) -> bool {
        self.resources.read().map(|r| r.is_empty()).unwrap_or(true)
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError> {
        let resources = self
            .resources
            .read()
            .map_err(|_| ResourceError::LoadFailed {
                path: path.to_string(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources
            .get(path)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.resources
            .read()
            .map(|r| r.contains_key(path))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryResourceProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_provider_add_and_load() {
        let provider = InMemoryResourceProvider::new();
        provider.add("catalog.xml", b"<test-suite/>".to_vec()).unwrap();

        let data = provider.load("catalog.xml").unwrap();
        assert_eq!(&*data, b"<test-suite/>");
    }

    #[test]
    fn test_in_memory_provider_not_found() {
        let provider = InMemoryResourceProvider::new();
        let result = provider.load("tests/missing.xml");
        assert!(matches!(result, Err(ResourceError::NotFound(_))));
    }

    #[test]
    fn test_in_memory_provider_exists() {
        let provider = InMemoryResourceProvider::new();
        provider.add("exists.xml", vec![]).unwrap();

        assert!(provider.exists("exists.xml"));
        assert!(!provider.exists("not_exists.xml"));
    }

    #[test]
    fn test_load_string_decodes_utf8() {
        let provider = InMemoryResourceProvider::new();
        provider.add_text("a.xml", "<a>é</a>").unwrap();
        assert_eq!(provider.load_string("a.xml").unwrap(), "<a>é</a>");
    }

    #[test]
    fn test_load_string_rejects_invalid_utf8() {
        let provider = InMemoryResourceProvider::new();
        provider.add("bad.xml", vec![0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            provider.load_string("bad.xml"),
            Err(ResourceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_in_memory_locate_is_identity() {
        let provider = InMemoryResourceProvider::new();
        assert!(provider.base_path().is_none());
        assert_eq!(provider.locate("tests/a/a.xsl"), "tests/a/a.xsl");
    }

    #[test]
    fn test_in_memory_provider_overwrite() {
        let provider = InMemoryResourceProvider::new();
        provider.add("test.txt", b"original".to_vec()).unwrap();
        provider.add("test.txt", b"updated".to_vec()).unwrap();

        let data = provider.load("test.txt").unwrap();
        assert_eq!(&*data, b"updated");
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_resource_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let resource_err: ResourceError = io_err.into();
        assert!(matches!(resource_err, ResourceError::Io(_)));
        assert!(resource_err.to_string().contains("file not found"));
    }
}
