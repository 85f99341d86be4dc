//! Evaluates a test case's expected-result assertions against its outcome.
//!
//! Structural checks (serialization, tree equality, error codes, messages,
//! result documents) are done here. XPath assertions go to the engine through
//! [`Engine::evaluate_boolean`] with the result bound as `$result`.

use crate::outcome::TestOutcome;
use log::debug;
use regex::RegexBuilder;
use roxmltree::{Document, Node, NodeType, ParsingOptions};
use xtdriver_catalog::{Assertion, resolve_uri};
use xtdriver_traits::{Engine, EngineConfig, ResultDocument};

const WRAPPER: &str = "xtdriver-fragment";

/// Comment recorded when a case declares nothing to check.
pub const NO_ASSERTIONS: &str = "no test assertions found";

pub struct AssertionEvaluator<'a> {
    engine: &'a dyn Engine,
    config: &'a EngineConfig,
    base_output_uri: &'a str,
}

#[derive(Default)]
struct Notes {
    comment: String,
    wrong_error: Option<String>,
}

impl Notes {
    fn add(&mut self, text: impl AsRef<str>) {
        if !self.comment.is_empty() {
            self.comment.push_str("; ");
        }
        self.comment.push_str(text.as_ref());
    }
}

impl<'a> AssertionEvaluator<'a> {
    pub fn new(engine: &'a dyn Engine, config: &'a EngineConfig, base_output_uri: &'a str) -> Self {
        Self {
            engine,
            config,
            base_output_uri,
        }
    }

    /// Returns whether the outcome satisfies `assertion`, recording comments and
    /// any wrong-error message on the outcome. No assertion at all is a failure.
    pub fn evaluate(&self, assertion: Option<&Assertion>, outcome: &mut TestOutcome) -> bool {
        let Some(assertion) = assertion else {
            outcome.add_comment(NO_ASSERTIONS);
            return false;
        };
        let mut notes = Notes::default();
        let passed = self.check(assertion, outcome.principal.as_ref(), outcome, &mut notes);
        if !passed && notes.comment.is_empty() {
            if let Some(error) = &outcome.error {
                notes.add(format!("unexpected {}", error));
            } else {
                notes.add("result does not match expectations");
            }
        }
        if passed {
            if let Some(message) = notes.wrong_error {
                outcome.add_comment(&message);
                outcome.wrong_error = Some(message);
            }
        } else {
            outcome.add_comment(&notes.comment);
        }
        passed
    }

    fn check(
        &self,
        assertion: &Assertion,
        result: Option<&ResultDocument>,
        outcome: &TestOutcome,
        notes: &mut Notes,
    ) -> bool {
        match assertion {
            Assertion::AllOf(items) => items
                .iter()
                .all(|item| self.check(item, result, outcome, notes)),
            Assertion::AnyOf(items) => self.check_any(items, result, outcome, notes),
            Assertion::Not(inner) => !self.check(inner, result, outcome, &mut Notes::default()),
            Assertion::Error { codes } | Assertion::AssertSerializationError { codes } => {
                check_error(codes, outcome, notes)
            }
            _ if outcome.error.is_some() => false,
            Assertion::AssertXml {
                expected,
                ignore_prefixes,
            } => {
                let Some(actual) = result.and_then(ResultDocument::text) else {
                    notes.add("no result to compare with assert-xml");
                    return false;
                };
                let equal = trees_equal(actual, expected, !*ignore_prefixes);
                if !equal {
                    notes.add(format!("assert-xml failed, got {}", abbreviate(actual)));
                }
                equal
            }
            Assertion::AssertSerialization {
                expected,
                normalize_space,
            } => {
                let Some(actual) = result.and_then(ResultDocument::text) else {
                    notes.add("no serialized result");
                    return false;
                };
                let equal = serialization_matches(actual, expected, *normalize_space);
                if !equal {
                    notes.add(format!(
                        "serialization mismatch, got {}",
                        abbreviate(actual)
                    ));
                }
                equal
            }
            Assertion::SerializationMatches { pattern, flags } => {
                let Some(actual) = result.and_then(ResultDocument::text) else {
                    notes.add("no serialized result");
                    return false;
                };
                match build_regex(pattern, flags) {
                    Ok(regex) => {
                        let found = regex.is_match(actual);
                        if !found {
                            notes.add(format!("serialization does not match /{}/", pattern));
                        }
                        found
                    }
                    Err(err) => {
                        notes.add(format!("invalid serialization-matches pattern: {}", err));
                        false
                    }
                }
            }
            Assertion::AssertMessage(inner) => outcome.messages.iter().any(|message| {
                let document = ResultDocument {
                    uri: None,
                    tree: Some(message.clone()),
                    serialized: None,
                };
                self.check(inner, Some(&document), outcome, &mut Notes::default())
            }),
            Assertion::AssertResultDocument { uri, assertion } => {
                let resolved = resolve_uri(uri, Some(self.base_output_uri));
                match outcome.secondary.get(&resolved) {
                    Some(document) => self.check(assertion, Some(document), outcome, notes),
                    None => {
                        notes.add(format!("result document {} not found", resolved));
                        false
                    }
                }
            }
            Assertion::AssertStringValue {
                expected,
                normalize_space,
            } => {
                let Some(actual) = result.and_then(ResultDocument::text) else {
                    notes.add("no result for assert-string-value");
                    return false;
                };
                let value = string_value(actual);
                let equal = if *normalize_space {
                    normalize(&value) == normalize(expected)
                } else {
                    value == *expected
                };
                if !equal {
                    notes.add(format!("string value is {}", abbreviate(&value)));
                }
                equal
            }
            Assertion::AssertWarning => !outcome.warnings.is_empty(),
            Assertion::XPath { check, operand } => {
                let expression = check.expression(operand);
                let context = result.and_then(ResultDocument::text);
                match self.engine.evaluate_boolean(&expression, context, self.config) {
                    Ok(value) => {
                        if !value {
                            notes.add(format!("{} is false", expression));
                        }
                        value
                    }
                    Err(err) => {
                        debug!("Assertion {} could not be evaluated: {}", expression, err);
                        notes.add(format!("cannot evaluate {}: {}", expression, err));
                        false
                    }
                }
            }
            Assertion::Unresolved { element, reason } => {
                notes.add(format!("{}: {}", element, reason));
                false
            }
            Assertion::Unknown(name) => {
                notes.add(format!("unrecognized assertion {}", name));
                false
            }
        }
    }

    /// A clean alternative wins over one that only matched with a wrong error code.
    fn check_any(
        &self,
        items: &[Assertion],
        result: Option<&ResultDocument>,
        outcome: &TestOutcome,
        notes: &mut Notes,
    ) -> bool {
        let mut wrong_error = None;
        let mut failures = Notes::default();
        for item in items {
            let mut attempt = Notes::default();
            if self.check(item, result, outcome, &mut attempt) {
                if attempt.wrong_error.is_none() {
                    return true;
                }
                if wrong_error.is_none() {
                    wrong_error = attempt.wrong_error;
                }
            } else if !attempt.comment.is_empty() {
                failures.add(&attempt.comment);
            }
        }
        if wrong_error.is_some() {
            notes.wrong_error = wrong_error;
            return true;
        }
        if !failures.comment.is_empty() {
            notes.add(&failures.comment);
        }
        false
    }
}

/// A raised error with an unexpected code still passes, with a wrong-error note.
fn check_error(codes: &[String], outcome: &TestOutcome, notes: &mut Notes) -> bool {
    let Some(error) = &outcome.error else {
        notes.add(format!("expected error {}, got success", codes.join(" ")));
        return false;
    };
    if codes.iter().any(|c| c == "*") {
        return true;
    }
    let reported = error.all_codes();
    if reported.iter().any(|code| codes.iter().any(|c| c == code)) {
        return true;
    }
    notes.wrong_error = Some(format!(
        "Expected {}, got {}",
        codes.join("|"),
        error.code.as_deref().unwrap_or("(no code)")
    ));
    true
}

fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .dot_matches_new_line(flags.contains('s'))
        .multi_line(flags.contains('m'))
        .ignore_whitespace(flags.contains('x'))
        .build()
}

/// Exact text first, then without an XML declaration, then as trees.
fn serialization_matches(actual: &str, expected: &str, normalize_space: bool) -> bool {
    if actual == expected {
        return true;
    }
    let (actual, expected) = (strip_declaration(actual), strip_declaration(expected));
    if actual == expected {
        return true;
    }
    if normalize_space && normalize(actual) == normalize(expected) {
        return true;
    }
    trees_equal(actual, expected, false)
}

fn strip_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml ")
        && let Some(end) = trimmed.find("?>")
    {
        return trimmed[end + 2..].trim_start();
    }
    text
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn abbreviate(text: &str) -> String {
    const LIMIT: usize = 80;
    match text.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

/// A namespace-aware tree with prefixes and whitespace-only text dropped.
#[derive(Debug, PartialEq)]
enum Item {
    Element {
        prefix: Option<String>,
        namespace: Option<String>,
        name: String,
        attributes: Vec<(Option<String>, String, String)>,
        children: Vec<Item>,
    },
    Text(String),
    Comment(String),
    Instruction(String, Option<String>),
}

fn parse_options<'input>() -> ParsingOptions<'input> {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

/// Parses a document, or a fragment wrapped in a synthetic element, and
/// returns its top-level items. Element prefixes are kept only on request.
fn canonical(text: &str, keep_prefixes: bool) -> Option<Vec<Item>> {
    let text = strip_declaration(text);
    if let Ok(doc) = Document::parse_with_options(text, parse_options()) {
        return Some(items(doc.root(), keep_prefixes));
    }
    let wrapped = format!("<{w}>{}</{w}>", text, w = WRAPPER);
    let doc = Document::parse_with_options(&wrapped, parse_options()).ok()?;
    Some(items(doc.root_element(), keep_prefixes))
}

fn items(parent: Node<'_, '_>, keep_prefixes: bool) -> Vec<Item> {
    parent
        .children()
        .filter_map(|node| item(node, keep_prefixes))
        .collect()
}

fn item(node: Node<'_, '_>, keep_prefixes: bool) -> Option<Item> {
    match node.node_type() {
        NodeType::Element => {
            let mut attributes: Vec<_> = node
                .attributes()
                .map(|a| {
                    (
                        a.namespace().map(str::to_string),
                        a.name().to_string(),
                        a.value().to_string(),
                    )
                })
                .collect();
            attributes.sort();
            let namespace = node.tag_name().namespace();
            let prefix = if keep_prefixes {
                namespace
                    .and_then(|uri| node.lookup_prefix(uri))
                    .map(str::to_string)
            } else {
                None
            };
            Some(Item::Element {
                prefix,
                namespace: namespace.map(str::to_string),
                name: node.tag_name().name().to_string(),
                attributes,
                children: items(node, keep_prefixes),
            })
        }
        NodeType::Text => {
            let text = node.text().unwrap_or("");
            (!text.trim().is_empty()).then(|| Item::Text(text.to_string()))
        }
        NodeType::Comment => Some(Item::Comment(node.text().unwrap_or("").to_string())),
        NodeType::PI => node
            .pi()
            .map(|pi| Item::Instruction(pi.target.to_string(), pi.value.map(str::to_string))),
        NodeType::Root => None,
    }
}

fn trees_equal(actual: &str, expected: &str, keep_prefixes: bool) -> bool {
    match (canonical(actual, keep_prefixes), canonical(expected, keep_prefixes)) {
        (Some(a), Some(e)) => a == e,
        _ => false,
    }
}

/// Concatenated text of the result, or the text itself when it is not XML.
fn string_value(text: &str) -> String {
    let stripped = strip_declaration(text);
    let wrapped = format!("<{w}>{}</{w}>", stripped, w = WRAPPER);
    match Document::parse_with_options(&wrapped, parse_options()) {
        Ok(doc) => doc
            .root_element()
            .descendants()
            .filter(Node::is_text)
            .filter_map(|n| n.text())
            .collect(),
        Err(_) => text.to_string(),
    }
}
