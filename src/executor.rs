//! Compiles and runs the unit under test for one test case.
//!
//! Errors raised by the unit under test never leave this module: compile and
//! run failures are stored in the [`TestOutcome`] so that error assertions can
//! be checked against them.

use crate::config::RunOptions;
use crate::environment::{Environment, to_param};
use crate::outcome::TestOutcome;
use crate::results::Verdict;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use xtdriver_catalog::{Exceptions, ParamDecl, TestCase, TestInput, file_path, file_uri};
use xtdriver_traits::{
    CaptureMode, CompileRequest, Engine, EngineError, EntryPoint, Executable, Param, QName,
    ResourceProvider, UnitKind,
};

/// The recorded result of a test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub verdict: Verdict,
    pub comment: String,
    pub wrong_error: bool,
}

impl CaseResult {
    pub fn new(verdict: Verdict, comment: impl Into<String>) -> Self {
        Self {
            verdict,
            comment: comment.into(),
            wrong_error: false,
        }
    }
}

/// Either an outcome to evaluate, or a verdict reached without one.
#[derive(Debug)]
pub enum Execution {
    Finished(TestOutcome),
    Decided(CaseResult),
}

pub const SERIALIZATION_DECLARED: &str = "*Serialization declared* ";
pub const SERIALIZATION_REQUIRED: &str = "*Serialization required* ";
pub const OPTIMIZATION_FAILED: &str = "Optimization assertion failed";

/// The result URI of the principal output, under the results directory.
pub fn base_output_uri(results_dir: &Path) -> String {
    let dir = std::path::absolute(results_dir).unwrap_or_else(|_| results_dir.to_path_buf());
    file_uri(&dir.join("results").join("output.xml"))
}

pub struct TestCaseExecutor<'a> {
    engine: &'a dyn Engine,
    provider: &'a dyn ResourceProvider,
    exceptions: &'a Exceptions,
    options: &'a RunOptions,
    base_output_uri: &'a str,
}

impl<'a> TestCaseExecutor<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        provider: &'a dyn ResourceProvider,
        exceptions: &'a Exceptions,
        options: &'a RunOptions,
        base_output_uri: &'a str,
    ) -> Self {
        Self {
            engine,
            provider,
            exceptions,
            options,
            base_output_uri,
        }
    }

    pub fn run(
        &self,
        case: &TestCase,
        set_name: &str,
        env: &Environment,
        language_version: &str,
    ) -> Execution {
        if env.failed_to_build {
            return Execution::Decided(CaseResult::new(
                Verdict::Fail,
                "unable to build environment",
            ));
        }
        if !env.usable {
            return Execution::Decided(CaseResult::new(
                Verdict::NotApplicable,
                format!("environment {} is not applicable", env.name),
            ));
        }

        let test = &case.test;
        let compiled = match self.compile(test, env, language_version) {
            Some(Ok(executable)) => Some(executable),
            Some(Err(error)) => {
                debug!("{} failed to compile: {}", case.name, error);
                return Execution::Finished(TestOutcome::from_error(error));
            }
            None => None,
        };
        let executable: &dyn Executable = match (&compiled, &env.stylesheet) {
            (Some(executable), _) => executable.as_ref(),
            (None, Some(stylesheet)) => stylesheet.as_ref(),
            (None, None) => {
                return Execution::Decided(CaseResult::new(Verdict::Fail, "no stylesheet"));
            }
        };

        let mut outcome = TestOutcome::new();
        if let Some(assertion) = self.exceptions.optimization_assertion(&case.name)
            && !self.optimization_holds(assertion, executable, env)
        {
            if self.options.strict {
                return Execution::Decided(CaseResult::new(Verdict::Fail, OPTIMIZATION_FAILED));
            }
            outcome.add_comment(OPTIMIZATION_FAILED);
            outcome.add_comment(" ");
        }
        if self.options.export && compiled.is_some() {
            outcome.add_comment("exported ");
        }

        let capture = self.capture_mode(case, env, &mut outcome);
        let entry = entry_point(test, env);

        let mut transformer = executable.load();
        let mut params: Vec<Param> = env.params.clone();
        params.extend(
            test.params
                .iter()
                .filter(|p| !p.is_static)
                .map(|p| to_param(p, self.provider)),
        );
        transformer.set_parameters(&params);

        let template_params = test
            .initial_template
            .as_ref()
            .map(|t| &t.params)
            .or_else(|| test.initial_mode.as_ref().map(|m| &m.params));
        if let Some(decls) = template_params {
            let (tunnel, plain): (Vec<_>, Vec<_>) = decls.iter().partition(|p| p.tunnel);
            let convert = |list: Vec<&ParamDecl>| -> Vec<Param> {
                list.into_iter().map(|p| to_param(p, self.provider)).collect()
            };
            transformer.set_initial_template_parameters(&convert(plain), false);
            transformer.set_initial_template_parameters(&convert(tunnel), true);
        }
        if let Some(item) = &env.context_item {
            transformer.set_global_context_item(item);
        }
        if let Some(mode) = test.initial_mode.as_ref().and_then(|m| m.name.as_ref()) {
            transformer.set_initial_mode(mode);
        }
        transformer.set_base_output_uri(self.base_output_uri);

        match transformer.run(&entry, env.source_input.as_ref(), capture) {
            Ok(output) => outcome.record_output(output, self.base_output_uri),
            Err(error) => {
                debug!("{} failed at run time: {}", case.name, error);
                outcome.set_error(error);
            }
        }
        drop(transformer);

        if self.options.save_results {
            self.save(&outcome, set_name, &case.name);
        }
        Execution::Finished(outcome)
    }

    /// `None` when the test names no unit of its own.
    fn compile(
        &self,
        test: &TestInput,
        env: &Environment,
        language_version: &str,
    ) -> Option<Result<Box<dyn Executable>, EngineError>> {
        let (kind, file) = if let Some(stylesheet) = test.stylesheets.first() {
            (UnitKind::Stylesheet, stylesheet)
        } else if let Some(package) = test.principal_package() {
            (UnitKind::Package, &package.file)
        } else if let Some(query) = &test.query {
            (UnitKind::Query, query)
        } else {
            return None;
        };

        let mut request = CompileRequest::new(kind, self.provider.locate(file), &env.config);
        request.language_version = language_version.to_string();
        request.base_uri = env.static_base_uri.clone();
        request.secondary_packages = test
            .secondary_packages()
            .map(|p| self.provider.locate(&p.file))
            .chain(env.secondary_packages.iter().cloned())
            .collect();
        request.static_params = env.static_params.clone();
        request.static_params.extend(
            test.params
                .iter()
                .filter(|p| p.is_static)
                .map(|p| to_param(p, self.provider)),
        );
        request.schema_imports = env.schema_imports.clone();
        request.collations = env.collations.clone();
        request.default_collation = env.default_collation.clone();
        Some(self.engine.compile(&request))
    }

    fn optimization_holds(
        &self,
        assertion: &str,
        executable: &dyn Executable,
        env: &Environment,
    ) -> bool {
        let Some(plan) = executable.explain() else {
            warn!("No explain plan available for optimization assertion {}", assertion);
            return false;
        };
        match self.engine.evaluate_boolean(assertion, Some(&plan), &env.config) {
            Ok(holds) => holds,
            Err(err) => {
                warn!("Optimization assertion {} failed to evaluate: {}", assertion, err);
                false
            }
        }
    }

    /// Explicit output settings win, then what the assertions need, then the
    /// environment's defaults.
    fn capture_mode(
        &self,
        case: &TestCase,
        env: &Environment,
        outcome: &mut TestOutcome,
    ) -> CaptureMode {
        let output = &case.test.output;
        let mut capture = CaptureMode {
            tree: env.output_tree,
            serialize: env.output_serialize,
        };
        if output.tree.is_some() || output.serialize.is_some() {
            capture.tree = output.tree.unwrap_or(capture.tree);
            capture.serialize = output.serialize.unwrap_or(capture.serialize);
            if output.serialize.is_some() {
                outcome.add_comment(SERIALIZATION_DECLARED);
            }
        } else if case.asserts_serialization() {
            capture.serialize = true;
            outcome.add_comment(SERIALIZATION_REQUIRED);
        }
        if !capture.tree && !capture.serialize {
            capture.tree = true;
        }
        capture
    }

    /// Best effort; failures are logged and do not affect the verdict.
    fn save(&self, outcome: &TestOutcome, set_name: &str, case_name: &str) {
        if let Some(text) = outcome.principal_text() {
            let path = self
                .options
                .results_dir
                .join("results")
                .join(set_name)
                .join(format!("{}.out", case_name));
            write_file(&path, text);
        }
        for (uri, document) in &outcome.secondary {
            match (file_path(uri), document.text()) {
                (Some(path), Some(text)) => write_file(&PathBuf::from(path), text),
                _ => debug!("Not saving result document {}", uri),
            }
        }
    }
}

fn write_file(path: &Path, text: &str) {
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(path, text));
    if let Err(err) = written {
        warn!("Failed to save result {}: {}", path.display(), err);
    }
}

/// Initial template, then initial function, then initial mode. With none of
/// these and no context, `xsl:initial-template` is called.
fn entry_point(test: &TestInput, env: &Environment) -> EntryPoint {
    if let Some(template) = &test.initial_template {
        let name = template
            .name
            .clone()
            .unwrap_or_else(|| QName::xsl("initial-template"));
        return EntryPoint::Template(name);
    }
    if let Some(function) = &test.initial_function {
        return EntryPoint::Function {
            name: function.name.clone(),
            arguments: function
                .params
                .iter()
                .map(|p| p.select.clone().unwrap_or_else(|| "()".to_string()))
                .collect(),
        };
    }
    if let Some(mode) = &test.initial_mode {
        return EntryPoint::ApplyTemplates {
            select: mode.select.clone(),
        };
    }
    if env.source_input.is_none() && env.context_item.is_none() {
        return EntryPoint::Template(QName::xsl("initial-template"));
    }
    EntryPoint::ApplyTemplates { select: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtdriver_catalog::{Assertion, InitialMode, InitialTemplate, OutputDecl, PackageRef};
    use xtdriver_traits::testing::{Script, ScriptedEngine};
    use xtdriver_traits::{
        ContextItem, Edition, EngineConfig, InMemoryResourceProvider, SourceInput,
    };

    const BASE: &str = "file:///r/results/output.xml";

    struct Fixture {
        engine: ScriptedEngine,
        provider: InMemoryResourceProvider,
        exceptions: Exceptions,
        options: RunOptions,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: ScriptedEngine::new(Edition::Ee),
                provider: InMemoryResourceProvider::new(),
                exceptions: Exceptions::new(),
                options: RunOptions::new("/suite", "/r"),
            }
        }

        fn run(&self, case: &TestCase, env: &Environment) -> Execution {
            TestCaseExecutor::new(
                &self.engine,
                &self.provider,
                &self.exceptions,
                &self.options,
                BASE,
            )
            .run(case, "s", env, "3.0")
        }
    }

    fn env() -> Environment {
        Environment::new("default", "tests/s/s.xml", EngineConfig::default())
    }

    fn case_with(test: TestInput) -> TestCase {
        TestCase {
            name: "c".to_string(),
            dependencies: Vec::new(),
            environment: None,
            test,
            result: Some(Assertion::AssertSerialization {
                expected: "<a/>".to_string(),
                normalize_space: false,
            }),
        }
    }

    fn stylesheet(file: &str) -> TestInput {
        TestInput {
            stylesheets: vec![file.to_string()],
            ..TestInput::default()
        }
    }

    fn param(name: &str, select: &str, is_static: bool, tunnel: bool) -> ParamDecl {
        ParamDecl {
            name: QName::local(name),
            select: Some(select.to_string()),
            source: None,
            is_static,
            tunnel,
        }
    }

    #[test]
    fn test_runs_and_captures_serialization() {
        let fixture = Fixture::new();
        fixture.engine.script("a.xsl", Script::output("<a/>"));
        let case = case_with(stylesheet("tests/s/a.xsl"));
        let Execution::Finished(outcome) = fixture.run(&case, &env()) else {
            panic!("expected an outcome");
        };
        assert_eq!(outcome.principal_text(), Some("<a/>"));
        assert_eq!(outcome.comment, SERIALIZATION_REQUIRED);
        let runs = fixture.engine.runs();
        assert!(runs[0].capture.serialize);
        assert_eq!(runs[0].base_output_uri.as_deref(), Some(BASE));
        assert_eq!(
            runs[0].entry,
            EntryPoint::Template(QName::xsl("initial-template"))
        );
    }

    #[test]
    fn test_compile_error_goes_into_outcome() {
        let fixture = Fixture::new();
        fixture
            .engine
            .script("bad.xsl", Script::StaticError("XTSE0010".to_string()));
        let case = case_with(stylesheet("tests/s/bad.xsl"));
        let Execution::Finished(outcome) = fixture.run(&case, &env()) else {
            panic!("expected an outcome");
        };
        assert_eq!(outcome.reported_codes(), vec!["XTSE0010"]);
        assert_eq!(fixture.engine.run_count(), 0);
    }

    #[test]
    fn test_dynamic_error_goes_into_outcome() {
        let fixture = Fixture::new();
        fixture
            .engine
            .script("dyn.xsl", Script::DynamicError("XTDE0640".to_string()));
        let case = case_with(stylesheet("tests/s/dyn.xsl"));
        let Execution::Finished(outcome) = fixture.run(&case, &env()) else {
            panic!("expected an outcome");
        };
        assert_eq!(outcome.reported_codes(), vec!["XTDE0640"]);
    }

    #[test]
    fn test_environment_state_decides() {
        let fixture = Fixture::new();
        let case = case_with(stylesheet("tests/s/a.xsl"));
        let mut broken = env();
        broken.failed_to_build = true;
        let Execution::Decided(result) = fixture.run(&case, &broken) else {
            panic!("expected a decision");
        };
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.comment, "unable to build environment");

        let mut unusable = env();
        unusable.usable = false;
        let Execution::Decided(result) = fixture.run(&case, &unusable) else {
            panic!("expected a decision");
        };
        assert_eq!(result.verdict, Verdict::NotApplicable);
        assert_eq!(fixture.engine.compile_count(), 0);
    }

    #[test]
    fn test_no_stylesheet_fails() {
        let fixture = Fixture::new();
        let case = case_with(TestInput::default());
        let Execution::Decided(result) = fixture.run(&case, &env()) else {
            panic!("expected a decision");
        };
        assert_eq!(result.comment, "no stylesheet");
    }

    #[test]
    fn test_environment_stylesheet_is_used() {
        let fixture = Fixture::new();
        fixture.engine.script("env.xsl", Script::output("<a/>"));
        let config = EngineConfig::default();
        let mut env = env();
        env.stylesheet = Some(
            fixture
                .engine
                .compile(&CompileRequest::new(UnitKind::Stylesheet, "env.xsl", &config))
                .unwrap(),
        );
        let result = fixture.run(&case_with(TestInput::default()), &env);
        assert!(matches!(result, Execution::Finished(_)));
        assert_eq!(fixture.engine.run_count(), 1);
    }

    #[test]
    fn test_package_with_secondaries_and_static_params() {
        let fixture = Fixture::new();
        fixture.engine.script("main.xsl", Script::output("<a/>"));
        let test = TestInput {
            packages: vec![
                PackageRef {
                    file: "tests/s/lib.xsl".to_string(),
                    secondary: true,
                },
                PackageRef {
                    file: "tests/s/main.xsl".to_string(),
                    secondary: false,
                },
            ],
            params: vec![param("s", "1", true, false), param("d", "2", false, false)],
            ..TestInput::default()
        };
        fixture.run(&case_with(test), &env());
        let compile = &fixture.engine.compiles()[0];
        assert_eq!(compile.location, "tests/s/main.xsl");
        assert_eq!(compile.static_params.len(), 1);
        assert_eq!(compile.static_params[0].name, QName::local("s"));
        let run = &fixture.engine.runs()[0];
        assert_eq!(run.params, vec![Param::new(QName::local("d"), "2")]);
    }

    #[test]
    fn test_entry_point_precedence() {
        let mut env = env();
        env.source_input = Some(SourceInput::File("in.xml".to_string()));
        env.context_item = Some(ContextItem::Document(SourceInput::File("in.xml".to_string())));

        let mut test = TestInput {
            initial_template: Some(InitialTemplate {
                name: Some(QName::local("main")),
                params: Vec::new(),
            }),
            initial_mode: Some(InitialMode {
                name: None,
                select: Some("//x".to_string()),
                params: Vec::new(),
            }),
            ..TestInput::default()
        };
        assert_eq!(entry_point(&test, &env), EntryPoint::Template(QName::local("main")));

        test.initial_template = None;
        assert_eq!(
            entry_point(&test, &env),
            EntryPoint::ApplyTemplates {
                select: Some("//x".to_string())
            }
        );

        test.initial_mode = None;
        assert_eq!(entry_point(&test, &env), EntryPoint::ApplyTemplates { select: None });
    }

    #[test]
    fn test_declared_output_overrides() {
        let fixture = Fixture::new();
        fixture.engine.script("a.xsl", Script::output("<a/>"));
        let mut test = stylesheet("tests/s/a.xsl");
        test.output = OutputDecl {
            file: None,
            tree: Some(false),
            serialize: Some(true),
        };
        let Execution::Finished(outcome) = fixture.run(&case_with(test), &env()) else {
            panic!("expected an outcome");
        };
        assert_eq!(outcome.comment, SERIALIZATION_DECLARED);
        let capture = fixture.engine.runs()[0].capture;
        assert!(!capture.tree && capture.serialize);
    }

    #[test]
    fn test_tunnel_params_and_mode() {
        let fixture = Fixture::new();
        fixture.engine.script("a.xsl", Script::output("<a/>"));
        let mut test = stylesheet("tests/s/a.xsl");
        test.initial_mode = Some(InitialMode {
            name: Some(QName::local("m")),
            select: None,
            params: vec![param("t", "1", false, true), param("p", "2", false, false)],
        });
        fixture.run(&case_with(test), &env());
        let run = &fixture.engine.runs()[0];
        assert_eq!(run.initial_mode, Some(QName::local("m")));
        assert_eq!(run.params.len(), 2);
    }

    #[test]
    fn test_optimization_assertion() {
        let mut fixture = Fixture::new();
        fixture.engine.script("a.xsl", Script::output("<a/>"));
        fixture.engine.with_plan("<plan/>");
        fixture.engine.answer("//sort", false);
        fixture.exceptions = Exceptions::parse(
            "exceptions.xml",
            r#"<exceptions><exception test-case="c" run="yes"><optimization assert="//sort"/></exception></exceptions>"#,
            Edition::Ee,
            false,
        )
        .unwrap();

        let case = case_with(stylesheet("tests/s/a.xsl"));
        let Execution::Finished(outcome) = fixture.run(&case, &env()) else {
            panic!("lenient mode should still run");
        };
        assert!(outcome.comment.starts_with(OPTIMIZATION_FAILED));

        fixture.options.strict = true;
        let case = case_with(stylesheet("tests/s/a.xsl"));
        let Execution::Decided(result) = fixture.run(&case, &env()) else {
            panic!("strict mode should stop");
        };
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(result.comment, OPTIMIZATION_FAILED);
    }

    #[test]
    fn test_save_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixture = Fixture::new();
        fixture.engine.script("a.xsl", Script::output("<a/>"));
        fixture.options = RunOptions::new("/suite", dir.path()).with_save_results(true);
        fixture.run(&case_with(stylesheet("tests/s/a.xsl")), &env());
        let saved = dir.path().join("results").join("s").join("c.out");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "<a/>");
    }

    #[test]
    fn test_base_output_uri() {
        assert_eq!(
            base_output_uri(Path::new("/tmp/res")),
            "file:///tmp/res/results/output.xml"
        );
    }
}
