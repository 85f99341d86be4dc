//! An [`Engine`] that drives an external XSLT processor through its command line.
//!
//! Every compile and every transformation spawns the configured program with
//! Saxon-style `-name:value` arguments. Results are read back from a scratch
//! directory and error codes are recovered from the processor's stderr.

pub mod codes;
pub mod command;

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use xtdriver_traits::{
    CaptureMode, CompileRequest, ContextItem, Edition, Engine, EngineConfig, EngineError,
    EntryPoint, Executable, Param, Phase, QName, ResultDocument, SourceInput, TransformOutput,
    Transformer,
};

const OUTPUT_FILE: &str = "output.xml";
const SOURCE_FILE: &str = "source.xml";

#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    edition: Edition,
    product_name: String,
    product_version: String,
    check_compile: bool,
}

impl ProcessEngine {
    /// `args` are placed before any generated argument, e.g.
    /// `["-cp", "saxon.jar", "net.sf.saxon.Transform"]`.
    pub fn new(program: impl Into<String>, args: Vec<String>, edition: Edition) -> Self {
        Self {
            program: program.into(),
            args,
            edition,
            product_name: format!("Saxon-{}", edition),
            product_version: "unknown".to_string(),
            check_compile: true,
        }
    }

    pub fn with_product(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.product_name = name.into();
        self.product_version = version.into();
        self
    }

    /// Skips the `-nogo` compile pass; static errors then surface when the transformation runs.
    pub fn without_compile_check(mut self) -> Self {
        self.check_compile = false;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn execute(&self, mut command: Command, phase: Phase) -> Result<Output, EngineError> {
        debug!("Spawning {:?}", command);
        command.output().map_err(|e| {
            EngineError::uncoded(phase, format!("failed to run {}: {}", self.program, e))
        })
    }
}

fn scratch_dir(phase: Phase) -> Result<TempDir, EngineError> {
    tempfile::tempdir()
        .map_err(|e| EngineError::uncoded(phase, format!("cannot create scratch directory: {}", e)))
}

fn write_scratch(path: &Path, text: &str, phase: Phase) -> Result<(), EngineError> {
    fs::write(path, text)
        .map_err(|e| EngineError::uncoded(phase, format!("cannot write {}: {}", path.display(), e)))
}

impl Engine for ProcessEngine {
    fn edition(&self) -> Edition {
        self.edition
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn product_version(&self) -> &str {
        &self.product_version
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Box<dyn Executable>, EngineError> {
        let unit_args = command::unit_args(request)
            .map_err(|message| EngineError::uncoded(Phase::Static, message))?;

        let mut plan = None;
        if self.check_compile {
            let dir = scratch_dir(Phase::Static)?;
            let plan_path = dir.path().join("plan.xml");
            let mut cmd = self.command();
            cmd.args(&unit_args)
                .arg("-nogo")
                .arg(format!("-explain:{}", plan_path.display()));
            let output = self.execute(cmd, Phase::Static)?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(codes::engine_error(
                    Phase::Static,
                    &stderr,
                    &output.status.to_string(),
                ));
            }
            plan = fs::read_to_string(&plan_path).ok();
        }

        Ok(Box::new(ProcessExecutable {
            engine: self.clone(),
            unit_args,
            plan,
        }))
    }

    fn evaluate_boolean(
        &self,
        expression: &str,
        context: Option<&str>,
        config: &EngineConfig,
    ) -> Result<bool, EngineError> {
        let dir = scratch_dir(Phase::Dynamic)?;
        let stylesheet = dir.path().join("check.xsl");
        write_scratch(
            &stylesheet,
            &command::boolean_stylesheet(expression, context.is_some()),
            Phase::Dynamic,
        )?;

        let mut cmd = self.command();
        cmd.arg(format!("-xsl:{}", stylesheet.display()));
        match context {
            Some(xml) => {
                let source = dir.path().join(SOURCE_FILE);
                write_scratch(&source, xml, Phase::Dynamic)?;
                cmd.arg(format!("-s:{}", source.display()));
            }
            None => {
                cmd.arg("-it");
            }
        }
        cmd.args(command::config_args(config));

        let output = self.execute(cmd, Phase::Dynamic)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(codes::engine_error(
                Phase::Dynamic,
                &stderr,
                &output.status.to_string(),
            ));
        }
        match String::from_utf8_lossy(&output.stdout).trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(EngineError::uncoded(
                Phase::Dynamic,
                format!("unexpected answer '{}' for {}", other, expression),
            )),
        }
    }
}

struct ProcessExecutable {
    engine: ProcessEngine,
    unit_args: Vec<String>,
    plan: Option<String>,
}

impl Executable for ProcessExecutable {
    fn explain(&self) -> Option<String> {
        self.plan.clone()
    }

    fn load(&self) -> Box<dyn Transformer + '_> {
        Box::new(ProcessTransformer {
            executable: self,
            params: Vec::new(),
            context_item: None,
            initial_mode: None,
            base_output_uri: None,
        })
    }
}

struct ProcessTransformer<'a> {
    executable: &'a ProcessExecutable,
    params: Vec<Param>,
    context_item: Option<ContextItem>,
    initial_mode: Option<QName>,
    base_output_uri: Option<String>,
}

impl ProcessTransformer<'_> {
    fn source_arg(&self, source: &SourceInput, dir: &Path) -> Result<String, EngineError> {
        match source {
            SourceInput::File(path) => Ok(format!("-s:{}", path)),
            SourceInput::Inline { content, .. } => {
                let path = dir.join(SOURCE_FILE);
                write_scratch(&path, content, Phase::Dynamic)?;
                Ok(format!("-s:{}", path.display()))
            }
        }
    }

    /// URI a scratch file stands for: the base output URI for the principal
    /// result, otherwise the relative path resolved against its directory.
    fn document_uri(&self, relative: &str, output_path: &Path) -> String {
        match &self.base_output_uri {
            Some(base) if relative == OUTPUT_FILE => base.clone(),
            Some(base) => match base.rsplit_once('/') {
                Some((parent, _)) => format!("{}/{}", parent, relative),
                None => relative.to_string(),
            },
            None => {
                let path = output_path.with_file_name(relative);
                format!("file://{}", path.display())
            }
        }
    }
}

impl Transformer for ProcessTransformer<'_> {
    fn set_parameters(&mut self, params: &[Param]) {
        self.params.extend_from_slice(params);
    }

    fn set_initial_template_parameters(&mut self, params: &[Param], tunnel: bool) {
        if command::loses_tunnelling(params, tunnel) {
            warn!("Tunnel parameters are passed as ordinary parameters on the command line");
        }
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
        source: Option<&SourceInput>,
        capture: CaptureMode,
    ) -> Result<TransformOutput, EngineError> {
        let dir = scratch_dir(Phase::Dynamic)?;
        let output_path = dir.path().join(OUTPUT_FILE);
        let engine = &self.executable.engine;

        let mut cmd = engine.command();
        cmd.args(&self.executable.unit_args);
        let source = source.or(match &self.context_item {
            Some(ContextItem::Document(doc)) => Some(doc),
            Some(ContextItem::Expression(expr)) => {
                warn!("Context item expression '{}' is ignored on the command line", expr);
                None
            }
            None => None,
        });
        if let Some(source) = source {
            cmd.arg(self.source_arg(source, dir.path())?);
        }
        cmd.args(command::entry_args(entry).map_err(|m| EngineError::uncoded(Phase::Dynamic, m))?);
        if let Some(mode) = &self.initial_mode {
            cmd.arg(format!("-im:{}", command::clark(mode)));
        }
        cmd.arg(format!("-o:{}", output_path.display()));
        cmd.args(self.params.iter().map(command::param_arg));

        let output = engine.execute(cmd, Phase::Dynamic)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(codes::engine_error(
                Phase::Dynamic,
                &stderr,
                &output.status.to_string(),
            ));
        }

        let mut result = TransformOutput::default();
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            if codes::is_warning(line) {
                result.warnings.push(line.to_string());
            } else {
                result.messages.push(line.to_string());
            }
        }

        let mut files = Vec::new();
        collect_files(dir.path(), "", &mut files).map_err(|e| {
            EngineError::uncoded(Phase::Dynamic, format!("cannot read results: {}", e))
        })?;
        for (relative, path) in files {
            if relative == SOURCE_FILE {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| {
                let message = format!("cannot read {}: {}", path.display(), e);
                EngineError::uncoded(Phase::Dynamic, message)
            })?;
            let uri = self.document_uri(&relative, &output_path);
            if relative == OUTPUT_FILE {
                result.principal = Some(ResultDocument::captured(Some(uri), text, capture));
            } else {
                result
                    .result_documents
                    .push(ResultDocument::captured(Some(uri), text, capture));
            }
        }

        if result.principal.is_none() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                result.principal = Some(ResultDocument::captured(
                    self.base_output_uri.clone(),
                    stdout.into_owned(),
                    capture,
                ));
            }
        }
        Ok(result)
    }
}

/// Lists regular files below `dir` as `(relative path, full path)`, sorted.
fn collect_files(
    dir: &Path,
    prefix: &str,
    out: &mut Vec<(String, PathBuf)>,
) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, &relative, out)?;
        } else {
            out.push((relative, path));
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A stand-in processor: a shell script that sees the generated arguments as `$@`.
    fn scripted(script: &str) -> ProcessEngine {
        ProcessEngine::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "processor".to_string()],
            Edition::He,
        )
        .with_product("Scripted", "1.0")
    }

    const WRITE_OUTPUT: &str = r#"for a in "$@"; do case "$a" in -o:*) out="${a#-o:}";; esac; done
[ -n "$out" ] && printf '<done/>' > "$out"
[ -n "$out" ] && mkdir -p "$(dirname "$out")/sub" && printf '<extra/>' > "$(dirname "$out")/sub/extra.xml"
echo "a message" >&2
echo "Warning: be careful" >&2
exit 0"#;

    #[test]
    fn test_successful_run_collects_documents() {
        let engine = scripted(WRITE_OUTPUT);
        let config = EngineConfig::default();
        let request = CompileRequest::new(
            xtdriver_traits::UnitKind::Stylesheet,
            "/suite/a.xsl",
            &config,
        );
        let executable = engine.compile(&request).unwrap();
        let mut transformer = executable.load();
        transformer.set_base_output_uri("file:///results/results/output.xml");
        let output = transformer
            .run(
                &EntryPoint::Template(QName::xsl("initial-template")),
                None,
                CaptureMode::default(),
            )
            .unwrap();

        let principal = output.principal.unwrap();
        assert_eq!(principal.uri.as_deref(), Some("file:///results/results/output.xml"));
        assert_eq!(principal.text(), Some("<done/>"));
        assert_eq!(output.result_documents.len(), 1);
        assert_eq!(
            output.result_documents[0].uri.as_deref(),
            Some("file:///results/results/sub/extra.xml")
        );
        assert_eq!(output.messages, vec!["a message"]);
        assert_eq!(output.warnings, vec!["Warning: be careful"]);
    }

    #[test]
    fn test_compile_failure_reports_static_codes() {
        let engine = scripted("echo 'Error on line 3: XTSE0010 unknown element' >&2; exit 2");
        let config = EngineConfig::default();
        let request = CompileRequest::new(
            xtdriver_traits::UnitKind::Stylesheet,
            "/suite/a.xsl",
            &config,
        );
        let error = engine.compile(&request).err().unwrap();
        assert_eq!(error.phase, Phase::Static);
        assert_eq!(error.code.as_deref(), Some("XTSE0010"));
    }

    #[test]
    fn test_run_failure_reports_dynamic_codes() {
        let engine = scripted(
            r#"for a in "$@"; do [ "$a" = "-nogo" ] && exit 0; done
echo 'XTDE0820 bad element name' >&2; exit 2"#,
        );
        let config = EngineConfig::default();
        let request = CompileRequest::new(
            xtdriver_traits::UnitKind::Stylesheet,
            "/suite/a.xsl",
            &config,
        );
        let executable = engine.compile(&request).unwrap();
        let error = executable
            .load()
            .run(&EntryPoint::ApplyTemplates { select: None }, None, CaptureMode::default())
            .unwrap_err();
        assert_eq!(error.phase, Phase::Dynamic);
        assert_eq!(error.code.as_deref(), Some("XTDE0820"));
    }

    #[test]
    fn test_evaluate_boolean_reads_stdout() {
        let engine = scripted("echo true");
        assert!(
            engine
                .evaluate_boolean("$result/a", Some("<a/>"), &EngineConfig::default())
                .unwrap()
        );
        let engine = scripted("echo maybe");
        assert!(engine
            .evaluate_boolean("1", None, &EngineConfig::default())
            .is_err());
    }

    #[test]
    fn test_missing_program_is_uncoded() {
        let engine = ProcessEngine::new("/nonexistent/processor", Vec::new(), Edition::He);
        let error = engine
            .evaluate_boolean("true()", None, &EngineConfig::default())
            .unwrap_err();
        assert_eq!(error.code, None);
        assert!(error.message.contains("failed to run"));
    }
}
