//! The maintainers' exceptions file: tests to skip and optimization checks.
//!
//! ```xml
//! <exceptions>
//!   <exception test-case="a b" run="false" edition="HE" reason="bug 123"/>
//!   <exception test-set="whole-set" reason="not supported"/>
//!   <exception test-case="opt-1" run="yes">
//!     <optimization assert="//sortedItems"/>
//!   </exception>
//! </exceptions>
//! ```

use crate::error::CatalogError;
use crate::parse::parse_document;
use log::debug;
use std::collections::HashMap;
use xtdriver_traits::Edition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub reason: String,
    pub bug: Option<String>,
}

/// Skip entries keyed by test-case name or `$` + test-set name, plus
/// optimization assertions keyed by test-case name.
#[derive(Debug, Clone, Default)]
pub struct Exceptions {
    skipped: HashMap<String, ExceptionEntry>,
    optimizations: HashMap<String, String>,
}

impl Exceptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an exceptions document, keeping only entries for `edition`.
    ///
    /// `run` defaults to `false`. `no` also skips, and `not-unfolded` skips
    /// when the run is unfolded. Any other value keeps the test running and
    /// reads its `<optimization assert>` child.
    pub fn parse(
        path: &str,
        text: &str,
        edition: Edition,
        unfolded: bool,
    ) -> Result<Self, CatalogError> {
        let doc = parse_document(path, text)?;
        let mut exceptions = Self::new();
        for entry in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "exception")
        {
            let scope = (entry.attribute("test-case"), entry.attribute("test-set"));
            let names: Vec<String> = match scope {
                (Some(cases), _) => cases.split_whitespace().map(str::to_string).collect(),
                (None, Some(set)) => vec![format!("${}", set.trim())],
                (None, None) => {
                    return Err(CatalogError::invalid(
                        path,
                        "exception without test-case or test-set",
                    ));
                }
            };
            let applies = entry
                .attribute("edition")
                .map(|editions| {
                    editions
                        .split_whitespace()
                        .any(|e| e == edition.as_str())
                })
                .unwrap_or(true);
            if !applies {
                continue;
            }
            let run = entry.attribute("run").unwrap_or("false");
            let skip = match run {
                "false" | "no" => true,
                "not-unfolded" => unfolded,
                _ => false,
            };
            if skip {
                let bug = entry.attribute("bug").map(str::to_string);
                let reason = match (entry.attribute("reason"), &bug) {
                    (Some(reason), _) => reason.to_string(),
                    (None, Some(bug)) => format!("see bug {}", bug),
                    (None, None) => "excluded by exceptions file".to_string(),
                };
                for name in names {
                    exceptions.insert(
                        name,
                        ExceptionEntry {
                            reason: reason.clone(),
                            bug: bug.clone(),
                        },
                    );
                }
            } else if let Some(assert) = entry
                .children()
                .find(|c| c.is_element() && c.tag_name().name() == "optimization")
                .and_then(|o| o.attribute("assert"))
            {
                for name in names {
                    debug!("Optimization assertion registered for {}", name);
                    exceptions.optimizations.insert(name, assert.to_string());
                }
            }
        }
        Ok(exceptions)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ExceptionEntry) {
        self.skipped.insert(name.into(), entry);
    }

    /// The entry excluding `test_case`, by its own name or its set's `$name`.
    pub fn lookup(&self, test_case: &str, test_set: &str) -> Option<&ExceptionEntry> {
        self.skipped
            .get(test_case)
            .or_else(|| self.skipped.get(&format!("${}", test_set)))
    }

    pub fn optimization_assertion(&self, test_case: &str) -> Option<&str> {
        self.optimizations.get(test_case).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
    }
}
