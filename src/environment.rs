//! Test environments and the registry that scopes them.
//!
//! An [`Environment`] bundles everything a test case runs against: source
//! documents, parameters, an optional precompiled stylesheet, output controls and
//! the [`EngineConfig`] that dependency resolution may toggle. Toggles are
//! recorded as undo actions on the environment; [`ResetGuard`] applies them when
//! the owning scope ends.
//!
//! The [`EnvironmentRegistry`] keeps two scopes: global environments declared in
//! the catalog, and local ones for the current test set (always including
//! `default`). Named set-level environments are built on first use and memoized,
//! except names configured as unshared, which are rebuilt for every case.

use crate::dependency::DependencyResolver;
use crate::error::DriverError;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use xtdriver_catalog::{
    Catalog, CollectionDecl, EnvironmentDecl, EnvironmentRef, ParamDecl, ResourceDecl, TestCase,
    TestSet,
};
use xtdriver_traits::{
    CompileRequest, ContextItem, Engine, EngineConfig, Executable, Param, ResourceProvider,
    SourceInput, UnitKind,
};

/// Name of the per-set environment used when a case names none.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Static base URI value that requires an engine able to run without one.
const UNDEFINED_BASE_URI: &str = "#UNDEFINED";

type ResetAction = Box<dyn FnOnce(&mut EngineConfig)>;

pub struct Environment {
    pub name: String,
    /// Suite-relative file that declared the environment.
    pub base_uri: String,
    pub config: EngineConfig,
    reset_actions: Vec<ResetAction>,
    pub source_input: Option<SourceInput>,
    pub context_item: Option<ContextItem>,
    pub params: Vec<Param>,
    pub static_params: Vec<Param>,
    pub schema_imports: Vec<String>,
    pub collations: Vec<String>,
    pub default_collation: Option<String>,
    pub static_base_uri: Option<String>,
    pub namespaces: Vec<(String, String)>,
    pub resources: Vec<ResourceDecl>,
    pub collections: Vec<CollectionDecl>,
    pub stylesheet: Option<Box<dyn Executable>>,
    pub secondary_packages: Vec<String>,
    pub output_tree: bool,
    pub output_serialize: bool,
    pub streamed_path: Option<String>,
    pub streamed_content: Option<String>,
    /// False when an environment-level dependency is not met.
    pub usable: bool,
    pub failed_to_build: bool,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("base_uri", &self.base_uri)
            .field("config", &self.config)
            .field("pending_resets", &self.reset_actions.len())
            .field("source_input", &self.source_input)
            .field("params", &self.params.len())
            .field("has_stylesheet", &self.stylesheet.is_some())
            .field("usable", &self.usable)
            .field("failed_to_build", &self.failed_to_build)
            .finish_non_exhaustive()
    }
}

/// A parameter binding; a `source` document is bound as `doc('<location>')`.
pub(crate) fn to_param(decl: &ParamDecl, provider: &dyn ResourceProvider) -> Param {
    let select = match (&decl.source, &decl.select) {
        (Some(source), _) => format!("doc('{}')", provider.locate(source)),
        (None, Some(select)) => select.clone(),
        (None, None) => "()".to_string(),
    };
    Param::new(decl.name.clone(), select)
}

/// What building an environment needs from the rest of the driver.
pub struct BuildContext<'a> {
    pub engine: &'a dyn Engine,
    pub provider: &'a dyn ResourceProvider,
    pub resolver: &'a DependencyResolver,
    pub language_version: &'a str,
}

impl Environment {
    pub fn new(name: impl Into<String>, base_uri: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            name: name.into(),
            base_uri: base_uri.into(),
            config,
            reset_actions: Vec::new(),
            source_input: None,
            context_item: None,
            params: Vec::new(),
            static_params: Vec::new(),
            schema_imports: Vec::new(),
            collations: Vec::new(),
            default_collation: None,
            static_base_uri: None,
            namespaces: Vec::new(),
            resources: Vec::new(),
            collections: Vec::new(),
            stylesheet: None,
            secondary_packages: Vec::new(),
            output_tree: true,
            output_serialize: false,
            streamed_path: None,
            streamed_content: None,
            usable: true,
            failed_to_build: false,
        }
    }

    /// Builds an environment from its declaration, starting from `parent`'s
    /// engine configuration.
    ///
    /// Missing files and a stylesheet that does not compile leave the
    /// environment `failed_to_build`; unmet environment dependencies leave it
    /// unusable. Only a retired dependency type is an error.
    pub fn from_decl(
        decl: &EnvironmentDecl,
        parent: &EngineConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, DriverError> {
        let name = decl.name.as_deref().unwrap_or("inline");
        let mut env = Environment::new(name, decl.declared_in.clone(), parent.clone());

        for source in &decl.sources {
            let input = match (&source.file, &source.content) {
                (Some(file), _) => {
                    if !ctx.provider.exists(file) {
                        warn!("Environment {}: source file {} not found", name, file);
                        env.failed_to_build = true;
                        continue;
                    }
                    SourceInput::File(ctx.provider.locate(file))
                }
                (None, Some(content)) => SourceInput::Inline {
                    content: content.clone(),
                    base_uri: source.uri.clone(),
                },
                (None, None) => continue,
            };
            if source.streaming {
                if let SourceInput::File(path) = &input {
                    env.streamed_path = Some(path.clone());
                }
                env.streamed_content = source.content.clone();
            }
            if source.is_context() {
                env.context_item = Some(ContextItem::Document(input.clone()));
                env.source_input = Some(input);
            }
        }
        if let Some(select) = &decl.context_item {
            env.context_item = Some(ContextItem::Expression(select.clone()));
        }

        for schema in &decl.schemas {
            let Some(file) = &schema.file else {
                continue;
            };
            if !ctx.provider.exists(file) {
                warn!("Environment {}: schema {} not found", name, file);
                env.failed_to_build = true;
                continue;
            }
            if schema.role.as_deref() != Some("secondary") {
                env.schema_imports.push(ctx.provider.locate(file));
            }
        }

        for param in &decl.params {
            let value = to_param(param, ctx.provider);
            if param.is_static {
                env.static_params.push(value);
            } else {
                env.params.push(value);
            }
        }

        for collation in &decl.collations {
            env.collations.push(collation.uri.clone());
            if collation.default {
                env.default_collation = Some(collation.uri.clone());
            }
        }
        env.static_base_uri = decl.static_base_uri.clone();
        env.namespaces = decl.namespaces.clone();
        env.resources = decl.resources.clone();
        env.collections = decl.collections.clone();
        env.output_tree = decl.output.tree.unwrap_or(true);
        env.output_serialize = decl.output.serialize.unwrap_or(false);

        for dependency in &decl.dependencies {
            if !ctx.resolver.satisfied(dependency, &mut env)? {
                debug!(
                    "Environment {} unusable: {}",
                    name,
                    dependency.describe()
                );
                env.usable = false;
            }
        }

        if !decl.secondary_packages.is_empty() {
            if ctx.engine.edition() == xtdriver_traits::Edition::Ee {
                env.secondary_packages = decl
                    .secondary_packages
                    .iter()
                    .map(|p| ctx.provider.locate(p))
                    .collect();
            } else {
                env.usable = false;
            }
        }

        if let Some(stylesheet) = decl.stylesheets.first() {
            if ctx.provider.exists(stylesheet) {
                env.compile_stylesheet(stylesheet, ctx);
            } else {
                warn!("Environment {}: stylesheet {} not found", name, stylesheet);
                env.failed_to_build = true;
            }
        }

        Ok(env)
    }

    fn compile_stylesheet(&mut self, stylesheet: &str, ctx: &BuildContext<'_>) {
        let location = ctx.provider.locate(stylesheet);
        let mut request = CompileRequest::new(UnitKind::Stylesheet, location, &self.config);
        request.language_version = ctx.language_version.to_string();
        request.static_params = self.static_params.clone();
        request.schema_imports = self.schema_imports.clone();
        request.collations = self.collations.clone();
        request.default_collation = self.default_collation.clone();
        request.base_uri = self.static_base_uri.clone();
        match ctx.engine.compile(&request) {
            Ok(executable) => self.stylesheet = Some(executable),
            Err(err) => {
                warn!(
                    "Environment {}: stylesheet {} failed to compile: {}",
                    self.name, stylesheet, err
                );
                self.failed_to_build = true;
            }
        }
    }

    /// Replaces one configuration field and records how to put it back.
    pub fn change<T: 'static>(&mut self, field: fn(&mut EngineConfig) -> &mut T, value: T) {
        let previous = std::mem::replace(field(&mut self.config), value);
        self.reset_actions
            .push(Box::new(move |config| *field(config) = previous));
    }

    /// A position in the undo stack to return to with [`reset_to`](Self::reset_to).
    pub fn reset_mark(&self) -> usize {
        self.reset_actions.len()
    }

    /// Undoes, newest first, every change recorded after `mark`.
    pub fn reset_to(&mut self, mark: usize) {
        while self.reset_actions.len() > mark {
            if let Some(action) = self.reset_actions.pop() {
                action(&mut self.config);
            }
        }
    }

    pub fn reset(&mut self) {
        self.reset_to(0);
    }

    /// Opens a scope whose configuration changes are undone when it is dropped.
    pub fn scoped(&mut self) -> ResetGuard<'_> {
        let mark = self.reset_mark();
        ResetGuard { env: self, mark }
    }
}

/// Undoes the environment's configuration changes made while it was alive.
pub struct ResetGuard<'a> {
    env: &'a mut Environment,
    mark: usize,
}

impl Deref for ResetGuard<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &*self.env
    }
}

impl DerefMut for ResetGuard<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        &mut *self.env
    }
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.env.reset_to(self.mark);
    }
}

/// The environment a test case runs against.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// A registered environment, shared with other cases of the set.
    Shared(&'a mut Environment),
    /// Built for this case only.
    Owned(Box<Environment>),
    /// The inline environment needs a capability the engine lacks.
    NotApplicable,
    Unknown(String),
}

#[derive(Debug, Default)]
pub struct EnvironmentRegistry {
    base_config: EngineConfig,
    global: HashMap<String, Environment>,
    local: HashMap<String, Environment>,
    unshared: HashSet<String>,
    /// Catalog declarations kept for unshared global names.
    catalog_declarations: Vec<EnvironmentDecl>,
}

impl EnvironmentRegistry {
    pub fn new<I, S>(base_config: EngineConfig, unshared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_config,
            unshared: unshared.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_unshared(&self, name: &str) -> bool {
        self.unshared.contains(name)
    }

    /// Builds every named catalog environment that is not unshared.
    pub fn create_global_environments(
        &mut self,
        catalog: &Catalog,
        ctx: &BuildContext<'_>,
    ) -> Result<(), DriverError> {
        self.global.clear();
        self.catalog_declarations = catalog.environments.clone();
        for decl in &catalog.environments {
            let Some(name) = decl.name.as_deref() else {
                continue;
            };
            if self.is_unshared(name) {
                continue;
            }
            let env = Environment::from_decl(decl, &self.base_config, ctx)?;
            debug!("Registered global environment {}", name);
            self.global.insert(name.to_string(), env);
        }
        Ok(())
    }

    /// Clears the local scope and creates a fresh `default` for `set`.
    pub fn create_local_environments(&mut self, set: &TestSet) {
        self.local.clear();
        let default = Environment::new(
            DEFAULT_ENVIRONMENT,
            set.file.clone(),
            self.base_config.clone(),
        );
        self.local.insert(DEFAULT_ENVIRONMENT.to_string(), default);
    }

    /// Registers `env` under `name` unless the name is already taken locally.
    pub fn register_local(&mut self, name: &str, env: Environment) -> bool {
        if self.local.contains_key(name) {
            return false;
        }
        self.local.insert(name.to_string(), env);
        true
    }

    /// Eagerly builds the set's named environments that are not unshared.
    pub fn preregister(
        &mut self,
        set: &TestSet,
        ctx: &BuildContext<'_>,
    ) -> Result<(), DriverError> {
        for decl in &set.environments {
            let Some(name) = decl.name.as_deref() else {
                continue;
            };
            if self.is_unshared(name) || self.local.contains_key(name) {
                continue;
            }
            let env = Environment::from_decl(decl, &self.default_environment().config, ctx)?;
            self.register_local(name, env);
        }
        Ok(())
    }

    /// The set's `default` environment, created on demand.
    pub fn default_environment(&mut self) -> &mut Environment {
        let base = &self.base_config;
        self.local
            .entry(DEFAULT_ENVIRONMENT.to_string())
            .or_insert_with(|| Environment::new(DEFAULT_ENVIRONMENT, "", base.clone()))
    }

    pub fn local(&self, name: &str) -> Option<&Environment> {
        self.local.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&Environment> {
        self.global.get(name)
    }

    /// Finds the environment for `case`: none means `default`, inline
    /// declarations are built on the spot, and names are looked up locally,
    /// then globally, then among the set's and catalog's declarations.
    pub fn resolve(
        &mut self,
        case: &TestCase,
        set: &TestSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Resolution<'_>, DriverError> {
        let name = match &case.environment {
            None => return Ok(Resolution::Shared(self.default_environment())),
            Some(EnvironmentRef::Inline(decl)) => {
                if decl.static_base_uri.as_deref() == Some(UNDEFINED_BASE_URI) {
                    return Ok(Resolution::NotApplicable);
                }
                let parent = self.default_environment().config.clone();
                let env = Environment::from_decl(decl, &parent, ctx)?;
                return Ok(Resolution::Owned(Box::new(env)));
            }
            Some(EnvironmentRef::Named(name)) => name.as_str(),
        };

        if self.local.contains_key(name) {
            return Ok(Resolution::Shared(self.local_mut(name)?));
        }
        if self.global.contains_key(name) {
            return Ok(Resolution::Shared(self.global_mut(name)?));
        }

        let decl = set
            .environment(name)
            .or_else(|| {
                self.catalog_declarations
                    .iter()
                    .find(|d| d.name.as_deref() == Some(name))
            })
            .cloned();
        let Some(decl) = decl else {
            return Ok(Resolution::Unknown(name.to_string()));
        };
        let parent = self.default_environment().config.clone();
        let env = Environment::from_decl(&decl, &parent, ctx)?;
        if self.is_unshared(name) {
            return Ok(Resolution::Owned(Box::new(env)));
        }
        self.register_local(name, env);
        Ok(Resolution::Shared(self.local_mut(name)?))
    }

    fn local_mut(&mut self, name: &str) -> Result<&mut Environment, DriverError> {
        self.local
            .get_mut(name)
            .ok_or_else(|| DriverError::config(format!("environment {} vanished", name)))
    }

    fn global_mut(&mut self, name: &str) -> Result<&mut Environment, DriverError> {
        self.global
            .get_mut(name)
            .ok_or_else(|| DriverError::config(format!("environment {} vanished", name)))
    }
}
