//! Expected-result assertions, parsed from a test case's `<result>` element.

use crate::parse::Context;
use roxmltree::Node;

/// XPath assertions that are delegated to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XPathCheck {
    Assert,
    Eq,
    DeepEq,
    Count,
    Empty,
    True,
    False,
    Type,
}

impl XPathCheck {
    fn from_element(name: &str) -> Option<Self> {
        Some(match name {
            "assert" => XPathCheck::Assert,
            "assert-eq" => XPathCheck::Eq,
            "assert-deep-eq" => XPathCheck::DeepEq,
            "assert-count" => XPathCheck::Count,
            "assert-empty" => XPathCheck::Empty,
            "assert-true" => XPathCheck::True,
            "assert-false" => XPathCheck::False,
            "assert-type" => XPathCheck::Type,
            _ => return None,
        })
    }

    /// The boolean expression that checks `$result` against `operand`.
    pub fn expression(&self, operand: &str) -> String {
        match self {
            XPathCheck::Assert => operand.to_string(),
            XPathCheck::Eq => format!("$result eq ({})", operand),
            XPathCheck::DeepEq => format!("deep-equal($result, ({}))", operand),
            XPathCheck::Count => format!("count($result) eq {}", operand),
            XPathCheck::Empty => "empty($result)".to_string(),
            XPathCheck::True => "$result instance of xs:boolean and $result".to_string(),
            XPathCheck::False => "$result instance of xs:boolean and not($result)".to_string(),
            XPathCheck::Type => format!("$result instance of {}", operand),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    AllOf(Vec<Assertion>),
    AnyOf(Vec<Assertion>),
    Not(Box<Assertion>),
    /// Expected error; `*` in `codes` accepts any code.
    Error { codes: Vec<String> },
    AssertXml {
        expected: String,
        ignore_prefixes: bool,
    },
    AssertSerialization {
        expected: String,
        normalize_space: bool,
    },
    SerializationMatches { pattern: String, flags: String },
    AssertSerializationError { codes: Vec<String> },
    AssertMessage(Box<Assertion>),
    AssertResultDocument {
        uri: String,
        assertion: Box<Assertion>,
    },
    AssertStringValue {
        expected: String,
        normalize_space: bool,
    },
    AssertWarning,
    XPath { check: XPathCheck, operand: String },
    /// An assertion that referenced a file that could not be read.
    Unresolved { element: String, reason: String },
    Unknown(String),
}

impl Assertion {
    /// True if this assertion, or any nested one, needs the serialized result.
    pub fn requires_serialization(&self) -> bool {
        match self {
            Assertion::AssertSerialization { .. }
            | Assertion::SerializationMatches { .. }
            | Assertion::AssertSerializationError { .. } => true,
            Assertion::AllOf(items) | Assertion::AnyOf(items) => {
                items.iter().any(Assertion::requires_serialization)
            }
            Assertion::Not(inner) | Assertion::AssertMessage(inner) => {
                inner.requires_serialization()
            }
            Assertion::AssertResultDocument { assertion, .. } => assertion.requires_serialization(),
            _ => false,
        }
    }

    /// True if the assertion tree can only pass when an error was raised.
    pub fn expects_error(&self) -> bool {
        match self {
            Assertion::Error { .. } | Assertion::AssertSerializationError { .. } => true,
            Assertion::AllOf(items) => items.iter().any(Assertion::expects_error),
            Assertion::AnyOf(items) => {
                !items.is_empty() && items.iter().all(Assertion::expects_error)
            }
            _ => false,
        }
    }
}

fn split_codes(text: Option<&str>) -> Vec<String> {
    text.unwrap_or("*")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn flag(node: Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name), Some("true" | "yes" | "1"))
}

fn children(node: Node<'_, '_>, ctx: &Context<'_>) -> Vec<Assertion> {
    node.children()
        .filter(Node::is_element)
        .map(|child| parse_assertion(child, ctx))
        .collect()
}

/// Wraps several nested assertions as `all-of`; a single one stands alone.
fn conjunction(mut items: Vec<Assertion>) -> Assertion {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Assertion::AllOf(items)
    }
}

pub(crate) fn parse_assertion(node: Node<'_, '_>, ctx: &Context<'_>) -> Assertion {
    let name = node.tag_name().name();
    if let Some(check) = XPathCheck::from_element(name) {
        return Assertion::XPath {
            check,
            operand: node.text().unwrap_or("").trim().to_string(),
        };
    }
    match name {
        "all-of" => Assertion::AllOf(children(node, ctx)),
        "any-of" => Assertion::AnyOf(children(node, ctx)),
        "not" => Assertion::Not(Box::new(conjunction(children(node, ctx)))),
        "error" => Assertion::Error {
            codes: split_codes(node.attribute("code")),
        },
        "assert-serialization-error" => Assertion::AssertSerializationError {
            codes: split_codes(node.attribute("code")),
        },
        "assert-xml" => match ctx.content_of(node) {
            Ok(expected) => Assertion::AssertXml {
                expected,
                ignore_prefixes: flag(node, "ignore-prefixes"),
            },
            Err(reason) => Assertion::Unresolved {
                element: name.to_string(),
                reason,
            },
        },
        "assert-serialization" => match ctx.content_of(node) {
            Ok(expected) => Assertion::AssertSerialization {
                expected,
                normalize_space: flag(node, "normalize-space"),
            },
            Err(reason) => Assertion::Unresolved {
                element: name.to_string(),
                reason,
            },
        },
        "serialization-matches" => match ctx.content_of(node) {
            Ok(pattern) => Assertion::SerializationMatches {
                pattern,
                flags: node.attribute("flags").unwrap_or("").to_string(),
            },
            Err(reason) => Assertion::Unresolved {
                element: name.to_string(),
                reason,
            },
        },
        "assert-string-value" => Assertion::AssertStringValue {
            expected: node.text().unwrap_or("").to_string(),
            normalize_space: flag(node, "normalize-space"),
        },
        "assert-message" => Assertion::AssertMessage(Box::new(conjunction(children(node, ctx)))),
        "assert-result-document" => Assertion::AssertResultDocument {
            uri: node.attribute("uri").unwrap_or("").to_string(),
            assertion: Box::new(conjunction(children(node, ctx))),
        },
        "assert-warning" => Assertion::AssertWarning,
        other => Assertion::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtdriver_traits::InMemoryResourceProvider;

    fn parse(xml: &str) -> Assertion {
        let provider = InMemoryResourceProvider::new();
        provider.add_text("tests/s/expected.xml", "<doc>from file</doc>").unwrap();
        let doc = roxmltree::Document::parse(xml).unwrap();
        let ctx = Context::new("tests/s/s.xml", &provider, xml);
        parse_assertion(doc.root_element(), &ctx)
    }

    #[test]
    fn test_parse_error_with_code_list() {
        let assertion = parse(r#"<error code="XTDE0640 XTDE0700"/>"#);
        assert_eq!(
            assertion,
            Assertion::Error {
                codes: vec!["XTDE0640".to_string(), "XTDE0700".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_error_without_code_is_wildcard() {
        assert_eq!(
            parse("<error/>"),
            Assertion::Error {
                codes: vec!["*".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_inline_assert_xml_markup() {
        let assertion = parse("<assert-xml><out><x a='1'/></out></assert-xml>");
        assert_eq!(
            assertion,
            Assertion::AssertXml {
                expected: "<out><x a='1'/></out>".to_string(),
                ignore_prefixes: false,
            }
        );
    }

    #[test]
    fn test_parse_cdata_assert_serialization() {
        let assertion = parse("<assert-serialization><![CDATA[<a/>]]></assert-serialization>");
        assert_eq!(
            assertion,
            Assertion::AssertSerialization {
                expected: "<a/>".to_string(),
                normalize_space: false,
            }
        );
    }

    #[test]
    fn test_parse_assert_xml_from_file() {
        let assertion = parse(r#"<assert-xml file="expected.xml"/>"#);
        assert_eq!(
            assertion,
            Assertion::AssertXml {
                expected: "<doc>from file</doc>".to_string(),
                ignore_prefixes: false,
            }
        );
    }

    #[test]
    fn test_missing_file_is_unresolved() {
        let assertion = parse(r#"<assert-xml file="missing.xml"/>"#);
        assert!(matches!(assertion, Assertion::Unresolved { .. }));
    }

    #[test]
    fn test_nested_any_of_and_serialization_detection() {
        let assertion = parse(
            "<any-of><assert-eq>3</assert-eq><serialization-matches>a+</serialization-matches></any-of>",
        );
        assert!(assertion.requires_serialization());
        let Assertion::AnyOf(items) = assertion else {
            panic!("expected any-of");
        };
        assert_eq!(
            items[0],
            Assertion::XPath {
                check: XPathCheck::Eq,
                operand: "3".to_string()
            }
        );
    }

    #[test]
    fn test_result_document_wraps_children() {
        let assertion = parse(
            r#"<assert-result-document uri="out/a.xml"><assert-xml><a/></assert-xml></assert-result-document>"#,
        );
        let Assertion::AssertResultDocument { uri, assertion } = assertion else {
            panic!("expected assert-result-document");
        };
        assert_eq!(uri, "out/a.xml");
        assert!(matches!(*assertion, Assertion::AssertXml { .. }));
    }

    #[test]
    fn test_expects_error() {
        assert!(parse("<error code='XTSE0010'/>").expects_error());
        let mixed = parse("<any-of><error code='X'/><assert-xml><a/></assert-xml></any-of>");
        assert!(!mixed.expects_error());
    }

    #[test]
    fn test_xpath_expressions() {
        assert_eq!(XPathCheck::Count.expression("2"), "count($result) eq 2");
        assert_eq!(XPathCheck::Assert.expression("$result/a"), "$result/a");
    }
}
