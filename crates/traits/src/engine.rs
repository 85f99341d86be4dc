//! The boundary between the driver and the processor under test.
//!
//! The driver never interprets XSLT or XPath itself. Everything it needs from a
//! processor goes through three traits:
//!
//! - [`Engine`] compiles a unit under test and answers boolean XPath questions
//!   (used for assertions and for checks against an explain plan).
//! - [`Executable`] is a compiled unit. It can describe its plan and be loaded.
//! - [`Transformer`] is a loaded executable that accepts parameters and an entry
//!   point, runs once, and hands back result documents as XML text.
//!
//! Processor-wide settings that dependency resolution toggles live in
//! [`EngineConfig`]. The driver owns one per environment and passes it with every
//! compile request, so nothing here relies on ambient global state.

use crate::qname::QName;
use std::fmt;
use thiserror::Error;

/// Processor edition. Capability checks in the dependency table key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Edition {
    #[default]
    He,
    Pe,
    Ee,
}

impl Edition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edition::He => "HE",
            Edition::Pe => "PE",
            Edition::Ee => "EE",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "HE" => Some(Edition::He),
            "PE" => Some(Edition::Pe),
            "EE" => Some(Edition::Ee),
            _ => None,
        }
    }

    /// True for PE and EE.
    pub fn is_professional(&self) -> bool {
        matches!(self, Edition::Pe | Edition::Ee)
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, Edition::He)
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-code generation level requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteCodeLevel {
    #[default]
    Off,
    On,
    Debug,
}

impl ByteCodeLevel {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "off" => Some(ByteCodeLevel::Off),
            "on" => Some(ByteCodeLevel::On),
            "debug" => Some(ByteCodeLevel::Debug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlVersion {
    #[default]
    V10,
    V11,
}

impl XmlVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            XmlVersion::V10 => "1.0",
            XmlVersion::V11 => "1.1",
        }
    }
}

/// Processor settings that dependency resolution may change for the span of a
/// test case or test set. Compared by value to prove that every toggle was undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub xsd_version: String,
    pub xml_version: XmlVersion,
    pub streaming_fallback: bool,
    pub assertions_enabled: bool,
    pub default_language: Option<String>,
    pub byte_code: ByteCodeLevel,
    pub unfolded: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            xsd_version: "1.1".to_string(),
            xml_version: XmlVersion::V10,
            streaming_fallback: false,
            assertions_enabled: false,
            default_language: None,
            byte_code: ByteCodeLevel::Off,
            unfolded: false,
        }
    }
}

/// Shape of the unit under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Stylesheet,
    Package,
    Query,
}

/// A parameter binding. `select` is an XPath expression the engine evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: QName,
    pub select: String,
}

impl Param {
    pub fn new(name: QName, select: impl Into<String>) -> Self {
        Self {
            name,
            select: select.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub kind: UnitKind,
    /// Absolute path or URI of the principal stylesheet, package or query.
    pub location: String,
    pub secondary_packages: Vec<String>,
    pub base_uri: Option<String>,
    /// "2.0" or "3.0".
    pub language_version: String,
    pub static_params: Vec<Param>,
    pub schema_imports: Vec<String>,
    pub collations: Vec<String>,
    pub default_collation: Option<String>,
    pub config: &'a EngineConfig,
}

impl<'a> CompileRequest<'a> {
    pub fn new(kind: UnitKind, location: impl Into<String>, config: &'a EngineConfig) -> Self {
        Self {
            kind,
            location: location.into(),
            secondary_packages: Vec::new(),
            base_uri: None,
            language_version: "3.0".to_string(),
            static_params: Vec::new(),
            schema_imports: Vec::new(),
            collations: Vec::new(),
            default_collation: None,
            config,
        }
    }
}

/// A source document handed to the engine, either by location or inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    File(String),
    Inline {
        content: String,
        base_uri: Option<String>,
    },
}

/// The global context item of a transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextItem {
    Document(SourceInput),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    Template(QName),
    Function { name: QName, arguments: Vec<String> },
    /// Apply templates to the match selection, or to the source document when `select` is absent.
    ApplyTemplates { select: Option<String> },
}

/// Which forms of the result the driver wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureMode {
    pub tree: bool,
    pub serialize: bool,
}

impl Default for CaptureMode {
    fn default() -> Self {
        Self {
            tree: true,
            serialize: false,
        }
    }
}

/// One result document. Trees travel as XML text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultDocument {
    pub uri: Option<String>,
    pub tree: Option<String>,
    pub serialized: Option<String>,
}

impl ResultDocument {
    /// Builds a document captured in the requested modes from a single rendering.
    pub fn captured(uri: Option<String>, text: impl Into<String>, capture: CaptureMode) -> Self {
        let text = text.into();
        Self {
            uri,
            tree: capture.tree.then(|| text.clone()),
            serialized: capture.serialize.then_some(text),
        }
    }

    /// Serialized form if captured, otherwise the tree text.
    pub fn text(&self) -> Option<&str> {
        self.serialized.as_deref().or(self.tree.as_deref())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub principal: Option<ResultDocument>,
    pub result_documents: Vec<ResultDocument>,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Static,
    Dynamic,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Static => f.write_str("static"),
            Phase::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// An error raised by the unit under test, with every diagnostic code the
/// processor reported along the way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} error {}: {message}", .code.as_deref().unwrap_or("(no code)"))]
pub struct EngineError {
    pub phase: Phase,
    pub code: Option<String>,
    pub message: String,
    pub reported_codes: Vec<String>,
}

impl EngineError {
    pub fn static_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Static,
            code: Some(code.into()),
            message: message.into(),
            reported_codes: Vec::new(),
        }
    }

    pub fn dynamic_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Dynamic,
            code: Some(code.into()),
            message: message.into(),
            reported_codes: Vec::new(),
        }
    }

    /// An engine-side failure that carries no error code (I/O, unsupported call).
    pub fn uncoded(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            code: None,
            message: message.into(),
            reported_codes: Vec::new(),
        }
    }

    pub fn with_reported_codes(mut self, codes: impl IntoIterator<Item = String>) -> Self {
        self.reported_codes.extend(codes);
        self
    }

    /// The primary code followed by the other reported codes, without duplicates.
    pub fn all_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for code in self.code.iter().chain(self.reported_codes.iter()) {
            if !codes.contains(&code.as_str()) {
                codes.push(code);
            }
        }
        codes
    }
}

/// A processor under test.
pub trait Engine {
    fn edition(&self) -> Edition;

    fn product_name(&self) -> &str;

    /// Version string; it also names the results file.
    fn product_version(&self) -> &str;

    /// Compiles a stylesheet, package or query. Static errors come back as
    /// `Err` with all reported codes attached.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Box<dyn Executable>, EngineError>;

    /// Evaluates an XPath expression to its effective boolean value, with the
    /// given XML document (if any) bound as context item and as `$result`.
    fn evaluate_boolean(
        &self,
        expression: &str,
        context: Option<&str>,
        config: &EngineConfig,
    ) -> Result<bool, EngineError>;
}

pub trait Executable {
    /// The optimized expression tree as XML, if the engine can produce one.
    fn explain(&self) -> Option<String> {
        None
    }

    fn load(&self) -> Box<dyn Transformer + '_>;
}

pub trait Transformer {
    fn set_parameters(&mut self, params: &[Param]);

    fn set_initial_template_parameters(&mut self, params: &[Param], tunnel: bool);

    fn set_global_context_item(&mut self, item: &ContextItem);

    fn set_initial_mode(&mut self, mode: &QName);

    fn set_base_output_uri(&mut self, uri: &str);

    fn run(
        &mut self,
        entry: &EntryPoint,
        source: Option<&SourceInput>,
        capture: CaptureMode,
    ) -> Result<TransformOutput, EngineError>;
}
