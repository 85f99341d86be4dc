//! Filesystem-based resource provider rooted at a test-suite directory.
//!
//! Test-set files routinely reach sibling directories with `../`, so relative
//! paths may contain parent components as long as the resolved file stays inside
//! the root. Anything that escapes the root is reported as not found.

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xtdriver_traits::{ResourceError, ResourceProvider, SharedResourceData};

/// A resource provider that loads files relative to a root directory.
#[derive(Debug)]
pub struct FilesystemResourceProvider {
    base_path: PathBuf,
    /// Canonicalized root for containment checks
    canonical_base: Option<PathBuf>,
    base_str: Option<String>,
}

impl FilesystemResourceProvider {
    /// Creates a provider rooted at `base_path`.
    ///
    /// The root is canonicalized when it exists so that `locate` hands out
    /// absolute paths to external processors.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base = base_path.as_ref().to_path_buf();
        let canonical = base.canonicalize().ok();
        let base_str = canonical
            .as_deref()
            .unwrap_or(&base)
            .to_str()
            .map(str::to_string);
        Self {
            base_path: base,
            canonical_base: canonical,
            base_str,
        }
    }

    /// Returns the root directory for this provider.
    pub fn base(&self) -> &Path {
        self.canonical_base.as_deref().unwrap_or(&self.base_path)
    }

    /// Resolves a relative path and checks that it stays below the root.
    fn resolve_path_safe(&self, path: &str) -> Option<PathBuf> {
        if Path::new(path).is_absolute() {
            return None;
        }

        let full_path = self.base_path.join(path);

        if let Ok(canonical) = full_path.canonicalize()
            && let Some(ref base) = self.canonical_base
        {
            if canonical.starts_with(base) {
                return Some(canonical);
            }
            debug!("Blocked access outside suite root: {}", path);
            return None;
        }

        // Nonexistent file: without canonical form only plain descent is allowed
        for component in Path::new(path).components() {
            if let std::path::Component::ParentDir = component {
                return None;
            }
        }

        Some(full_path)
    }
}

impl ResourceProvider for FilesystemResourceProvider {
    fn load(&self, path: &str) -> Result<SharedResourceData, ResourceError> {
        let full_path = self
            .resolve_path_safe(path)
            .ok_or_else(|| ResourceError::NotFound(format!("{} (outside suite root)", path)))?;

        std::fs::read(&full_path).map(Arc::new).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(path.to_string())
            } else {
                ResourceError::LoadFailed {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path_safe(path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn base_path(&self) -> Option<&str> {
        self.base_str.as_deref()
    }

    fn name(&self) -> &'static str {
        "FilesystemResourceProvider"
    }
}
