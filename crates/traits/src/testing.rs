//! A scripted engine for exercising the driver without a real processor.
//!
//! Each unit location is mapped (by suffix) to a [`Script`] that says what the
//! compile and run should produce. The engine records every compile request,
//! including a snapshot of the [`EngineConfig`] it was given, and counts runs.

use crate::engine::{
    CaptureMode, CompileRequest, ContextItem, Edition, Engine, EngineConfig, EngineError,
    EntryPoint, Executable, Param, Phase, ResultDocument, SourceInput, TransformOutput,
    Transformer,
};
use crate::qname::QName;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// What a scripted unit does when compiled and run.
#[derive(Debug, Clone)]
pub enum Script {
    /// Compiles and produces this principal result.
    Output {
        text: String,
        messages: Vec<String>,
    },
    /// Fails to compile with this code.
    StaticError(String),
    /// Compiles, then fails at run time with this code.
    DynamicError(String),
    /// Compiles and writes result documents. `None` means the base output URI.
    Documents(Vec<(Option<String>, String)>),
}

impl Script {
    pub fn output(text: impl Into<String>) -> Self {
        Script::Output {
            text: text.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages(text: impl Into<String>, messages: Vec<String>) -> Self {
        Script::Output {
            text: text.into(),
            messages,
        }
    }
}

/// A compile call as the engine saw it.
#[derive(Debug, Clone)]
pub struct CompileRecord {
    pub location: String,
    pub language_version: String,
    pub static_params: Vec<Param>,
    pub config: EngineConfig,
}

/// A run call as the transformer saw it.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub entry: EntryPoint,
    pub capture: CaptureMode,
    pub params: Vec<Param>,
    pub initial_mode: Option<QName>,
    pub context_item: Option<ContextItem>,
    pub base_output_uri: Option<String>,
}

#[derive(Debug)]
pub struct ScriptedEngine {
    edition: Edition,
    version: String,
    scripts: RefCell<Vec<(String, Script)>>,
    plan: RefCell<Option<String>>,
    answers: RefCell<HashMap<String, bool>>,
    compiles: RefCell<Vec<CompileRecord>>,
    runs: Rc<RefCell<Vec<RunRecord>>>,
    evaluations: Cell<usize>,
}

impl ScriptedEngine {
    pub fn new(edition: Edition) -> Self {
        Self {
            edition,
            version: "12.0".to_string(),
            scripts: RefCell::new(Vec::new()),
            plan: RefCell::new(None),
            answers: RefCell::new(HashMap::new()),
            compiles: RefCell::new(Vec::new()),
            runs: Rc::new(RefCell::new(Vec::new())),
            evaluations: Cell::new(0),
        }
    }

    /// Registers the behaviour of any unit whose location ends with `suffix`.
    pub fn script(&self, suffix: impl Into<String>, script: Script) -> &Self {
        self.scripts.borrow_mut().push((suffix.into(), script));
        self
    }

    /// Sets the explain plan returned by every executable.
    pub fn with_plan(&self, plan: impl Into<String>) -> &Self {
        *self.plan.borrow_mut() = Some(plan.into());
        self
    }

    /// Fixes the answer of `evaluate_boolean` for an exact expression.
    pub fn answer(&self, expression: impl Into<String>, value: bool) -> &Self {
        self.answers.borrow_mut().insert(expression.into(), value);
        self
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.borrow().len()
    }

    pub fn run_count(&self) -> usize {
        self.runs.borrow().len()
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.get()
    }

    pub fn compiles(&self) -> Vec<CompileRecord> {
        self.compiles.borrow().clone()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.borrow().clone()
    }

    fn find_script(&self, location: &str) -> Option<Script> {
        self.scripts
            .borrow()
            .iter()
            .rev()
            .find(|(suffix, _)| location.ends_with(suffix.as_str()))
            .map(|(_, script)| script.clone())
    }
}

impl Engine for ScriptedEngine {
    fn edition(&self) -> Edition {
        self.edition
    }

    fn product_name(&self) -> &str {
        "ScriptedEngine"
    }

    fn product_version(&self) -> &str {
        &self.version
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Box<dyn Executable>, EngineError> {
        self.compiles.borrow_mut().push(CompileRecord {
            location: request.location.clone(),
            language_version: request.language_version.clone(),
            static_params: request.static_params.clone(),
            config: request.config.clone(),
        });
        let script = self.find_script(&request.location).ok_or_else(|| {
            EngineError::uncoded(
                Phase::Static,
                format!("no script for {}", request.location),
            )
        })?;
        if let Script::StaticError(code) = &script {
            return Err(EngineError::static_error(code.clone(), "scripted static error")
                .with_reported_codes(vec![code.clone()]));
        }
        Ok(Box::new(ScriptedExecutable {
            script,
            plan: self.plan.borrow().clone(),
            runs: Rc::clone(&self.runs),
        }))
    }

    fn evaluate_boolean(
        &self,
        expression: &str,
        _context: Option<&str>,
        _config: &EngineConfig,
    ) -> Result<bool, EngineError> {
        self.evaluations.set(self.evaluations.get() + 1);
        self.answers.borrow().get(expression).copied().ok_or_else(|| {
            EngineError::uncoded(Phase::Dynamic, format!("no answer for {}", expression))
        })
    }
}

struct ScriptedExecutable {
    script: Script,
    plan: Option<String>,
    runs: Rc<RefCell<Vec<RunRecord>>>,
}

impl Executable for ScriptedExecutable {
    fn explain(&self) -> Option<String> {
        self.plan.clone()
    }

    fn load(&self) -> Box<dyn Transformer + '_> {
        Box::new(ScriptedTransformer {
            executable: self,
            params: Vec::new(),
            initial_mode: None,
            context_item: None,
            base_output_uri: None,
        })
    }
}

struct ScriptedTransformer<'a> {
    executable: &'a ScriptedExecutable,
    params: Vec<Param>,
    initial_mode: Option<QName>,
    context_item: Option<ContextItem>,
    base_output_uri: Option<String>,
}

impl Transformer for ScriptedTransformer<'_> {
    fn set_parameters(&mut self, params: &[Param]) {
        self.params.extend_from_slice(params);
    }

    fn set_initial_template_parameters(&mut self, params: &[Param], _tunnel: bool) {
        self.params.extend_from_slice(params);
    }

    fn set_global_context_item(&mut self, item: &ContextItem) {
        self.context_item = Some(item.clone());
    }

    fn set_initial_mode(&mut self, mode: &QName) {
        self.initial_mode = Some(mode.clone());
    }

    fn set_base_output_uri(&mut self, uri: &str) {
        self.base_output_uri = Some(uri.to_string());
    }

    fn run(
        &mut self,
        entry: &EntryPoint,
        _source: Option<&SourceInput>,
        capture: CaptureMode,
    ) -> Result<TransformOutput, EngineError> {
        self.executable.runs.borrow_mut().push(RunRecord {
            entry: entry.clone(),
            capture,
            params: self.params.clone(),
            initial_mode: self.initial_mode.clone(),
            context_item: self.context_item.clone(),
            base_output_uri: self.base_output_uri.clone(),
        });
        match &self.executable.script {
            Script::Output { text, messages } => Ok(TransformOutput {
                principal: Some(ResultDocument::captured(
                    self.base_output_uri.clone(),
                    text.clone(),
                    capture,
                )),
                messages: messages.clone(),
                ..TransformOutput::default()
            }),
            Script::DynamicError(code) => Err(EngineError::dynamic_error(
                code.clone(),
                "scripted dynamic error",
            )),
            Script::StaticError(code) => Err(EngineError::static_error(
                code.clone(),
                "scripted static error",
            )),
            Script::Documents(documents) => Ok(TransformOutput {
                result_documents: documents
                    .iter()
                    .map(|(uri, text)| {
                        let uri = uri.clone().or_else(|| self.base_output_uri.clone());
                        ResultDocument::captured(uri, text.clone(), capture)
                    })
                    .collect(),
                ..TransformOutput::default()
            }),
        }
    }
}
