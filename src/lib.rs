//! A catalog-driven conformance test driver for XSLT processors.
//!
//! [`TestDriver`] walks a test-suite catalog, builds and shares the
//! environments test cases run in, decides which cases the processor under
//! test can attempt, runs them through the [`Engine`](xtdriver_traits::Engine)
//! boundary, judges the outcomes against each case's expected result, and
//! streams one verdict per case into a results document.
//!
//! ```no_run
//! use xtdriver::{RunOptions, TestDriver};
//! use xtdriver_engine_process::ProcessEngine;
//! use xtdriver_traits::Edition;
//!
//! let engine = ProcessEngine::new("saxon", Vec::new(), Edition::He);
//! let options = RunOptions::new("/path/to/xslt30-test", "/tmp/results");
//! let summary = TestDriver::new(&engine, options)?.run()?;
//! println!("{}", summary);
//! # Ok::<(), xtdriver::DriverError>(())
//! ```

pub mod assertions;
pub mod config;
pub mod dependency;
pub mod environment;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod results;
pub mod walker;

pub use assertions::AssertionEvaluator;
pub use config::{DriverSettings, EngineSettings, RunOptions, SkipList, Spec};
pub use dependency::DependencyResolver;
pub use environment::{Environment, EnvironmentRegistry};
pub use error::DriverError;
pub use executor::{CaseResult, TestCaseExecutor};
pub use outcome::TestOutcome;
pub use results::{ProductInfo, ResultsDocument, RunSummary, Verdict};
pub use walker::TestDriver;
