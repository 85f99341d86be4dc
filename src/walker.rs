//! The catalog walker: suite, then test sets, then test cases.
//!
//! Everything is sequential. Engine configuration toggled while handling a case
//! is undone when the case ends, and toggles made by a test set's own
//! dependencies are undone when the set ends.

use crate::assertions::AssertionEvaluator;
use crate::config::RunOptions;
use crate::dependency::{DependencyResolver, not_run_message, test_set_message};
use crate::environment::{BuildContext, Environment, EnvironmentRegistry, Resolution};
use crate::error::DriverError;
use crate::executor::{CaseResult, Execution, TestCaseExecutor, base_output_uri};
use crate::results::{ProductInfo, ResultsDocument, RunSummary, SUMMARY_FILE, Verdict};
use log::{debug, error, info};
use regex::Regex;
use std::any::Any;
use std::fs;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use xtdriver_catalog::{
    CatalogLoader, Dependency, Exceptions, TestCase, TestSet, TestSetRef, load_exceptions,
};
use xtdriver_resource::FilesystemResourceProvider;
use xtdriver_traits::{ByteCodeLevel, Engine, EngineConfig, ResourceProvider};

/// Spec level assumed when no `spec` dependency is declared.
const DEFAULT_SPEC: &str = "XSLT10+";

pub struct TestDriver<'e> {
    engine: &'e dyn Engine,
    provider: Arc<dyn ResourceProvider>,
    loader: CatalogLoader,
    options: RunOptions,
    pattern: Option<Regex>,
    resolver: DependencyResolver,
    registry: EnvironmentRegistry,
    exceptions: Exceptions,
    /// Catalog-level dependencies, checked ahead of every test set's own.
    suite_dependencies: Vec<Dependency>,
    summary: RunSummary,
    base_output_uri: String,
}

impl<'e> TestDriver<'e> {
    /// Reads the suite from `options.suite_dir` on disk.
    pub fn new(engine: &'e dyn Engine, options: RunOptions) -> Result<Self, DriverError> {
        let provider = Arc::new(FilesystemResourceProvider::new(&options.suite_dir));
        Self::with_provider(engine, provider, options)
    }

    pub fn with_provider(
        engine: &'e dyn Engine,
        provider: Arc<dyn ResourceProvider>,
        options: RunOptions,
    ) -> Result<Self, DriverError> {
        let pattern = options.test_pattern.as_deref().map(Regex::new).transpose()?;
        let resolver = DependencyResolver::new(engine.edition(), options.spec);
        let base_config = EngineConfig {
            byte_code: options.byte_code,
            unfolded: options.unfolded,
            ..EngineConfig::default()
        };
        let registry = EnvironmentRegistry::new(base_config, options.unshared_environments.clone());
        if options.byte_code != ByteCodeLevel::Off {
            debug!("Byte code generation: {:?}", options.byte_code);
        }
        Ok(Self {
            engine,
            loader: CatalogLoader::new(Arc::clone(&provider)),
            provider,
            pattern,
            resolver,
            registry,
            exceptions: Exceptions::new(),
            suite_dependencies: Vec::new(),
            summary: RunSummary::default(),
            base_output_uri: base_output_uri(&options.results_dir),
            options,
        })
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn exceptions(&self) -> &Exceptions {
        &self.exceptions
    }

    /// Runs the suite, writing `results<version>.xml` and `summary.json` to
    /// the results directory.
    pub fn run(&mut self) -> Result<RunSummary, DriverError> {
        fs::create_dir_all(&self.options.results_dir)?;
        let mut sink =
            ResultsDocument::create(&self.options.results_dir, self.engine.product_version())?;
        let summary = self.run_with_sink(&mut sink)?;
        summary.write_json(&self.options.results_dir.join(SUMMARY_FILE))?;
        Ok(summary)
    }

    pub fn run_with_sink<W: Write>(
        &mut self,
        sink: &mut ResultsDocument<W>,
    ) -> Result<RunSummary, DriverError> {
        let catalog = self.loader.load_catalog()?;
        let sets: Vec<TestSetRef> = match &self.options.test_set {
            Some(name) => vec![
                catalog
                    .test_set(name)
                    .cloned()
                    .ok_or_else(|| DriverError::UnknownTestSet(name.clone()))?,
            ],
            None => catalog.test_sets.clone(),
        };

        let ctx = BuildContext {
            engine: self.engine,
            provider: self.provider.as_ref(),
            resolver: &self.resolver,
            language_version: "3.0",
        };
        self.registry.create_global_environments(&catalog, &ctx)?;
        self.suite_dependencies = catalog.dependencies.clone();
        self.exceptions = self.read_exceptions();

        sink.write_preamble(&ProductInfo {
            vendor: self.engine.product_name().to_string(),
            name: format!("{}-{}", self.engine.product_name(), self.engine.edition()),
            version: self.engine.product_version().to_string(),
            language: self.options.spec.version_name(),
        })?;
        for set in &sets {
            self.process_test_set(set, sink)?;
        }
        sink.write_postamble()?;

        info!("{}", self.summary);
        Ok(self.summary)
    }

    /// An unreadable exceptions file means no exceptions.
    fn read_exceptions(&self) -> Exceptions {
        let (dir, name) = self.options.exceptions_location();
        let provider = FilesystemResourceProvider::new(&dir);
        if !provider.exists(&name) {
            info!("No exceptions file {} in {}", name, dir.display());
            return Exceptions::new();
        }
        match load_exceptions(&provider, &name, self.engine.edition(), self.options.unfolded) {
            Ok(exceptions) => {
                info!("Loaded {} exceptions", exceptions.len());
                exceptions
            }
            Err(err) => {
                error!("*** Failed to process exceptions file {}: {}", name, err);
                Exceptions::new()
            }
        }
    }

    fn selected<'c>(&self, set: &'c TestSet) -> impl Iterator<Item = &'c TestCase> {
        set.test_cases
            .iter()
            .filter(|case| self.pattern.as_ref().is_none_or(|p| p.is_match(&case.name)))
    }

    fn process_test_set<W: Write>(
        &mut self,
        set_ref: &TestSetRef,
        sink: &mut ResultsDocument<W>,
    ) -> Result<(), DriverError> {
        let set = match self.loader.load_test_set(set_ref) {
            Ok(set) => set,
            Err(err) => {
                error!("Cannot load test set {}: {}", set_ref.name, err);
                return Ok(());
            }
        };
        if self.selected(&set).next().is_none() {
            return Ok(());
        }
        debug!("Test set {}", set.name);
        sink.start_test_set(&set.name)?;
        self.registry.create_local_environments(&set);

        let mark = self.registry.default_environment().reset_mark();
        let result = self.process_test_cases(&set, sink);
        self.registry.default_environment().reset_to(mark);

        sink.end_test_set()?;
        result
    }

    fn process_test_cases<W: Write>(
        &mut self,
        set: &TestSet,
        sink: &mut ResultsDocument<W>,
    ) -> Result<(), DriverError> {
        let mut unsatisfied = None;
        for dependency in self.suite_dependencies.iter().chain(&set.dependencies) {
            let env = self.registry.default_environment();
            if !self.resolver.satisfied(dependency, env)? {
                unsatisfied = Some(test_set_message(dependency));
                break;
            }
        }
        if let Some(message) = unsatisfied {
            info!("Skipping test set {}: {}", set.name, message);
            let cases: Vec<&TestCase> = self.selected(set).collect();
            for case in cases {
                self.record(sink, &set.name, case, CaseResult::new(Verdict::NotRun, &message))?;
            }
            return Ok(());
        }

        if self.pattern.is_none() {
            let ctx = BuildContext {
                engine: self.engine,
                provider: self.provider.as_ref(),
                resolver: &self.resolver,
                language_version: "3.0",
            };
            self.registry.preregister(set, &ctx)?;
        }

        let cases: Vec<&TestCase> = self.selected(set).collect();
        for case in cases {
            info!("-s:{} -t:{}", set.name, case.name);
            let result = self.run_test_case(set, case)?;
            self.record(sink, &set.name, case, result)?;
        }
        Ok(())
    }

    /// Exceptions, then the skip list, then the environment, then
    /// dependencies, then execution. `Err` only for a retired dependency type.
    fn run_test_case(&mut self, set: &TestSet, case: &TestCase) -> Result<CaseResult, DriverError> {
        if let Some(entry) = self.exceptions.lookup(&case.name, &set.name) {
            return Ok(CaseResult::new(Verdict::NotRun, entry.reason.clone()));
        }
        if self.options.skip_list.contains(&case.name) {
            return Ok(CaseResult::new(Verdict::NotRun, "requires excessive resources"));
        }

        let spec = effective_spec(set, case);
        // -xt30:off compiles everything at 2.0.
        let language_version = if self.options.xt30 {
            language_version(spec)
        } else {
            "2.0"
        };
        let ctx = BuildContext {
            engine: self.engine,
            provider: self.provider.as_ref(),
            resolver: &self.resolver,
            language_version,
        };

        let mut owned: Box<Environment>;
        let env: &mut Environment = match self.registry.resolve(case, set, &ctx)? {
            Resolution::Shared(env) => env,
            Resolution::Owned(env) => {
                owned = env;
                owned.as_mut()
            }
            Resolution::NotApplicable => {
                return Ok(CaseResult::new(
                    Verdict::NotApplicable,
                    "static base URI cannot be undefined",
                ));
            }
            Resolution::Unknown(name) => {
                error!("{}/{}: unknown environment {}", set.name, case.name, name);
                return Ok(CaseResult::new(Verdict::Fail, "test catalog error"));
            }
        };
        let mut env = env.scoped();

        for dependency in set.dependencies.iter().chain(&case.dependencies) {
            if dependency.kind == "spec" && !spec.is_some_and(|s| std::ptr::eq(s, dependency)) {
                continue;
            }
            if !self.resolver.satisfied(dependency, &mut env)? {
                return Ok(CaseResult::new(Verdict::NotRun, not_run_message(dependency)));
            }
        }

        let executor = TestCaseExecutor::new(
            self.engine,
            self.provider.as_ref(),
            &self.exceptions,
            &self.options,
            &self.base_output_uri,
        );
        let engine = self.engine;
        let base_output_uri = self.base_output_uri.as_str();
        let env: &Environment = &env;
        let evaluated = catch_unwind(AssertUnwindSafe(|| {
            match executor.run(case, &set.name, env, language_version) {
                Execution::Decided(result) => result,
                Execution::Finished(mut outcome) => {
                    let evaluator = AssertionEvaluator::new(engine, &env.config, base_output_uri);
                    let passed = evaluator.evaluate(case.result.as_ref(), &mut outcome);
                    CaseResult {
                        verdict: if passed { Verdict::Pass } else { Verdict::Fail },
                        comment: outcome.comment,
                        wrong_error: outcome.wrong_error.is_some(),
                    }
                }
            }
        }));
        Ok(evaluated.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!("{}/{} crashed: {}", set.name, case.name, message);
            CaseResult::new(Verdict::Fail, format!("*** crashed: {}", message))
        }))
    }

    fn record<W: Write>(
        &mut self,
        sink: &mut ResultsDocument<W>,
        set_name: &str,
        case: &TestCase,
        result: CaseResult,
    ) -> Result<(), DriverError> {
        if result.verdict != Verdict::Pass || result.wrong_error {
            debug!(
                "{}/{}: {} {}",
                set_name, case.name, result.verdict, result.comment
            );
        }
        self.summary.count(result.verdict, result.wrong_error);
        sink.write_test_case(&case.name, result.verdict, Some(result.comment.as_str()))
    }
}

/// The last `spec` dependency, looking at the set's dependencies and then the case's.
fn effective_spec<'a>(set: &'a TestSet, case: &'a TestCase) -> Option<&'a Dependency> {
    set.dependencies
        .iter()
        .chain(&case.dependencies)
        .filter(|d| d.kind == "spec")
        .last()
}

fn language_version(spec: Option<&Dependency>) -> &'static str {
    let value = spec.and_then(|d| d.value.as_deref()).unwrap_or(DEFAULT_SPEC);
    if value.contains("XSLT30") || value.contains("XSLT20+") {
        "3.0"
    } else {
        "2.0"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
