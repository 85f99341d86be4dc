//! Run options and layered driver settings.
//!
//! [`RunOptions`] carries what the command line decides for one run.
//! [`DriverSettings`] holds what rarely changes between runs (how to launch the
//! processor, which tests are too slow to attempt) and is read with the
//! `config` crate from built-in defaults, an optional `xtdriver.toml`, and
//! `XTDRIVER__*` environment variables, in that order.

use crate::error::DriverError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use xtdriver_traits::{ByteCodeLevel, Edition};

/// The language level the run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Spec {
    Xt10,
    Xt20,
    #[default]
    Xt30,
}

impl Spec {
    pub fn parse(text: &str) -> Result<Self, DriverError> {
        match text {
            "XT10" => Ok(Spec::Xt10),
            "XT20" => Ok(Spec::Xt20),
            "XT30" => Ok(Spec::Xt30),
            other => Err(DriverError::config(format!("Unknown spec {}", other))),
        }
    }

    /// The short name used on the command line.
    pub fn short_name(&self) -> &'static str {
        match self {
            Spec::Xt10 => "XT10",
            Spec::Xt20 => "XT20",
            Spec::Xt30 => "XT30",
        }
    }

    /// The name `spec` dependencies are compared against, e.g. `XSLT30`.
    pub fn version_name(&self) -> String {
        self.short_name().replace("XT", "XSLT")
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Tests known to need excessive resources, skipped without being attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SkipList {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl SkipList {
    pub fn contains(&self, test_name: &str) -> bool {
        self.names.iter().any(|n| n == test_name)
            || self.prefixes.iter().any(|p| test_name.starts_with(p.as_str()))
    }
}

/// Options for one run, normally built from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub suite_dir: PathBuf,
    pub results_dir: PathBuf,
    pub test_pattern: Option<String>,
    pub test_set: Option<String>,
    pub unfolded: bool,
    pub export: bool,
    pub strict: bool,
    pub save_results: bool,
    pub byte_code: ByteCodeLevel,
    pub spec: Spec,
    pub xt30: bool,
    /// File name relative to the results directory, or an absolute path.
    pub exceptions_file: String,
    pub skip_list: SkipList,
    pub unshared_environments: Vec<String>,
}

impl RunOptions {
    pub fn new(suite_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            suite_dir: suite_dir.into(),
            results_dir: results_dir.into(),
            test_pattern: None,
            test_set: None,
            unfolded: false,
            export: false,
            strict: false,
            save_results: false,
            byte_code: ByteCodeLevel::Off,
            spec: Spec::Xt30,
            xt30: true,
            exceptions_file: "exceptions.xml".to_string(),
            skip_list: SkipList::default(),
            unshared_environments: Vec::new(),
        }
    }

    pub fn with_test_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.test_pattern = Some(pattern.into());
        self
    }

    pub fn with_test_set(mut self, name: impl Into<String>) -> Self {
        self.test_set = Some(name.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_save_results(mut self, save: bool) -> Self {
        self.save_results = save;
        self
    }

    pub fn with_unfolded(mut self, unfolded: bool) -> Self {
        self.unfolded = unfolded;
        self
    }

    pub fn with_spec(mut self, spec: Spec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_skip_list(mut self, skip_list: SkipList) -> Self {
        self.skip_list = skip_list;
        self
    }

    pub fn with_exceptions_file(mut self, file: impl Into<String>) -> Self {
        self.exceptions_file = file.into();
        self
    }

    /// Splits the exceptions file setting into a directory and a file name.
    pub fn exceptions_location(&self) -> (PathBuf, String) {
        let path = Path::new(&self.exceptions_file);
        if path.is_absolute() {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (dir, name)
        } else {
            (self.results_dir.clone(), self.exceptions_file.clone())
        }
    }
}

/// How to launch an external processor.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub edition: String,
    pub product_name: String,
    pub product_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverSettings {
    pub engine: EngineSettings,
    #[serde(default)]
    pub skip: SkipList,
    #[serde(default)]
    pub unshared: Vec<String>,
}

impl DriverSettings {
    pub const FILE_NAME: &'static str = "xtdriver.toml";

    /// Layers defaults, then `file` (or `xtdriver.toml` in `fallback_dir`), then
    /// `XTDRIVER__*` environment variables.
    pub fn load(file: Option<&Path>, fallback_dir: &Path) -> Result<Self, DriverError> {
        let mut builder = config::Config::builder()
            .set_default("engine.program", "saxon")?
            .set_default("engine.args", Vec::<String>::new())?
            .set_default("engine.edition", "HE")?
            .set_default("engine.product_name", "Saxon")?
            .set_default("engine.product_version", "unknown")?
            .set_default("skip.prefixes", vec!["regex-classes"])?
            .set_default("skip.names", vec!["normalize-unicode-008"])?;

        let candidate = match file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let path = fallback_dir.join(Self::FILE_NAME);
                path.exists().then_some(path)
            }
        };
        if let Some(path) = candidate {
            log::info!("Loading driver settings from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("XTDRIVER")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("engine.args")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn edition(&self) -> Result<Edition, DriverError> {
        Edition::parse(&self.engine.edition).ok_or_else(|| {
            DriverError::config(format!("Unknown edition {}", self.engine.edition))
        })
    }
}
