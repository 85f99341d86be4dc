//! What running one test case produced.

use std::collections::BTreeMap;
use xtdriver_traits::{EngineError, ResultDocument, TransformOutput};

#[derive(Debug, Clone, Default)]
pub struct TestOutcome {
    pub principal: Option<ResultDocument>,
    /// Result documents written to a URI other than the base output URI.
    pub secondary: BTreeMap<String, ResultDocument>,
    pub error: Option<EngineError>,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub comment: String,
    /// Set when an error was expected and raised, but with a different code.
    pub wrong_error: Option<String>,
}

impl TestOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_error(error: EngineError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Files a transformation's output. A result document written to
    /// `base_output_uri` is the principal result; every other URI is secondary.
    pub fn record_output(&mut self, output: TransformOutput, base_output_uri: &str) {
        if output.principal.is_some() {
            self.principal = output.principal;
        }
        for document in output.result_documents {
            match document.uri.as_deref() {
                None => self.principal = Some(document),
                Some(uri) if uri == base_output_uri => self.principal = Some(document),
                Some(uri) => {
                    self.secondary.insert(uri.to_string(), document);
                }
            }
        }
        self.messages.extend(output.messages);
        self.warnings.extend(output.warnings);
    }

    pub fn set_error(&mut self, error: EngineError) {
        self.error = Some(error);
    }

    /// Every error code the engine reported, primary code first.
    pub fn reported_codes(&self) -> Vec<&str> {
        self.error.as_ref().map(EngineError::all_codes).unwrap_or_default()
    }

    pub fn add_comment(&mut self, text: &str) {
        self.comment.push_str(text);
    }

    /// Text of the principal result, serialized form preferred.
    pub fn principal_text(&self) -> Option<&str> {
        self.principal.as_ref().and_then(ResultDocument::text)
    }
}
