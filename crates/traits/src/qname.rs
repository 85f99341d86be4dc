//! Expanded names as they cross the engine boundary.

use std::fmt;

/// The XSLT namespace, used for the default initial template and `#default` modes.
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// A namespace-qualified name with the prefix already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<impl Into<String>>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(Into::into).filter(|ns: &String| !ns.is_empty()),
            local: local.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// A name in the XSLT namespace, e.g. `xsl:initial-template`.
    pub fn xsl(local: impl Into<String>) -> Self {
        Self {
            namespace: Some(XSLT_NAMESPACE.to_string()),
            local: local.into(),
        }
    }

    /// Parses the braced URI form `Q{uri}local`. Plain NCNames are accepted as no-namespace names.
    pub fn parse_eqname(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("Q{") {
            let (ns, local) = rest.split_once('}')?;
            if local.is_empty() {
                return None;
            }
            return Some(Self::new(Some(ns), local));
        }
        if text.is_empty() || text.contains(':') || text.contains(char::is_whitespace) {
            return None;
        }
        Some(Self::local(text))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}
