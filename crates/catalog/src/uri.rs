//! Relative reference resolution for suite paths and result-document URIs.

use std::path::Path;

/// Resolves `href` against the document at `base_uri`.
///
/// Absolute paths and URIs with a scheme are returned unchanged. The result is
/// normalized, so `tests/a/../b/x.xml` becomes `tests/b/x.xml`.
pub fn resolve_uri(href: &str, base_uri: Option<&str>) -> String {
    if href.starts_with('/') || href.contains("://") {
        return href.to_string();
    }

    match base_uri {
        Some(base) => {
            if let Some(rest) = base.strip_prefix("file://") {
                return format!("file://{}", resolve_uri(href, Some(rest)));
            }
            let base_path = Path::new(base);
            let base_dir = base_path.parent().unwrap_or(Path::new(""));
            let resolved = base_dir.join(href);
            normalize_path(&resolved.to_string_lossy())
        }
        None => normalize_path(href),
    }
}

fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                // Keep leading ".." on relative paths so they can still escape a base
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !path.starts_with('/') {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// The `file://` URI for an absolute filesystem path.
pub fn file_uri(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.starts_with('/') {
        format!("file://{}", text)
    } else {
        format!("file:///{}", text)
    }
}

/// The filesystem path of a `file:` URI, or `None` for other schemes.
pub fn file_path(uri: &str) -> Option<&str> {
    uri.strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:").filter(|p| p.starts_with('/')))
}
