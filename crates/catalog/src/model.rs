//! Owned model of a test catalog.
//!
//! Paths stored here are suite-relative and already resolved against the file
//! that declared them.

use crate::assertion::Assertion;
use xtdriver_traits::QName;

/// A `(type, value, polarity)` precondition on the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: String,
    pub value: Option<String>,
    /// `false` when the test requires the inverse of the dependency.
    pub satisfied: bool,
}

impl Dependency {
    pub fn new(kind: impl Into<String>, value: Option<&str>, satisfied: bool) -> Self {
        Self {
            kind: kind.into(),
            value: value.map(str::to_string),
            satisfied,
        }
    }

    pub fn value_or_any(&self) -> &str {
        self.value.as_deref().unwrap_or("*")
    }

    pub fn is_inverse(&self) -> bool {
        !self.satisfied
    }

    /// `type[:value]`, with a leading `!` when the polarity is inverted.
    pub fn describe(&self) -> String {
        let mut text = match &self.value {
            Some(value) => format!("{}:{}", self.kind, value),
            None => self.kind.clone(),
        };
        if self.is_inverse() {
            text.insert(0, '!');
        }
        text
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDecl {
    pub file: Option<String>,
    pub tree: Option<bool>,
    pub serialize: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: QName,
    pub select: Option<String>,
    /// Suite-relative document whose root becomes the value, when present.
    pub source: Option<String>,
    pub is_static: bool,
    pub tunnel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDecl {
    pub role: Option<String>,
    pub file: Option<String>,
    pub content: Option<String>,
    pub uri: Option<String>,
    pub validation: Option<String>,
    pub streaming: bool,
}

impl SourceDecl {
    pub fn is_context(&self) -> bool {
        self.role.as_deref() == Some(".")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDecl {
    pub role: Option<String>,
    pub file: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollationDecl {
    pub uri: String,
    pub default: bool,
}

/// An unparsed-text resource made available under a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    pub uri: String,
    pub file: String,
    pub media_type: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDecl {
    pub uri: String,
    pub sources: Vec<SourceDecl>,
}

/// An `<environment>` declaration, global, test-set scoped or inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentDecl {
    pub name: Option<String>,
    /// File that declared this environment.
    pub declared_in: String,
    pub sources: Vec<SourceDecl>,
    pub schemas: Vec<SchemaDecl>,
    pub params: Vec<ParamDecl>,
    pub collations: Vec<CollationDecl>,
    pub static_base_uri: Option<String>,
    pub context_item: Option<String>,
    pub stylesheets: Vec<String>,
    pub secondary_packages: Vec<String>,
    pub namespaces: Vec<(String, String)>,
    pub resources: Vec<ResourceDecl>,
    pub collections: Vec<CollectionDecl>,
    pub dependencies: Vec<Dependency>,
    pub output: OutputDecl,
}

/// How a test case picks its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentRef {
    Named(String),
    Inline(Box<EnvironmentDecl>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialTemplate {
    pub name: Option<QName>,
    pub params: Vec<ParamDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialFunction {
    pub name: QName,
    pub params: Vec<ParamDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialMode {
    pub name: Option<QName>,
    pub select: Option<String>,
    pub params: Vec<ParamDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub file: String,
    pub secondary: bool,
}

/// The `<test>` element: unit under test plus invocation details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestInput {
    pub stylesheets: Vec<String>,
    pub packages: Vec<PackageRef>,
    pub query: Option<String>,
    pub params: Vec<ParamDecl>,
    pub initial_template: Option<InitialTemplate>,
    pub initial_function: Option<InitialFunction>,
    pub initial_mode: Option<InitialMode>,
    pub output: OutputDecl,
}

impl TestInput {
    pub fn principal_package(&self) -> Option<&PackageRef> {
        self.packages.iter().find(|p| !p.secondary)
    }

    pub fn secondary_packages(&self) -> impl Iterator<Item = &PackageRef> {
        self.packages.iter().filter(|p| p.secondary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub dependencies: Vec<Dependency>,
    pub environment: Option<EnvironmentRef>,
    pub test: TestInput,
    /// `None` when `<result>` has no element children.
    pub result: Option<Assertion>,
}

impl TestCase {
    /// True when an assertion in the result tree needs the serialized form.
    pub fn asserts_serialization(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(Assertion::requires_serialization)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSetRef {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSet {
    pub name: String,
    pub file: String,
    /// Legacy `dependency` children first, then `dependencies/*`.
    pub dependencies: Vec<Dependency>,
    /// Named environments declared anywhere in the test-set file.
    pub environments: Vec<EnvironmentDecl>,
    pub test_cases: Vec<TestCase>,
}

impl TestSet {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentDecl> {
        self.environments
            .iter()
            .find(|env| env.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub file: String,
    pub environments: Vec<EnvironmentDecl>,
    pub dependencies: Vec<Dependency>,
    pub test_sets: Vec<TestSetRef>,
}

impl Catalog {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentDecl> {
        self.environments
            .iter()
            .find(|env| env.name.as_deref() == Some(name))
    }

    pub fn test_set(&self, name: &str) -> Option<&TestSetRef> {
        self.test_sets.iter().find(|set| set.name == name)
    }
}
