//! The environment: syntax configuration, registries and the template
//! factory.
//!
//! One [`Environment`] holds everything shared between templates: the
//! delimiter syntax, the optimizer switch, the undefined policy, filter
//! and test registries, globals, and an optional loader. Templates
//! borrow the environment, so nothing here can change under a compiled
//! template's feet.
//!
//! Filters and tests bind late: a template may be compiled before the
//! filters it mentions exist, as long as they are registered by the time
//! the expression actually runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_syntax::{Parsed, Syntax, Tokenizer};

use crate::compiler;
use crate::error::{Result, WeftError};
use crate::instructions::ExecutableUnit;
use crate::loader::Loader;
use crate::optimizer;
use crate::template::Template;
use crate::undefined::UndefinedBehavior;
use crate::value::Value;

/// A filter: value in, extra arguments, value out.
pub type FilterFn = dyn Fn(Value, &[Value]) -> Result<Value> + Send + Sync;
/// A test: candidate value and arguments to a verdict.
pub type TestFn = dyn Fn(&Value, &[Value]) -> Result<bool> + Send + Sync;
/// Hook turning every emitted value into its output text.
pub type FinalizeFn = dyn Fn(&Value) -> String + Send + Sync;
/// Maps a requested template name plus the requesting template's name to
/// the name handed to the loader.
pub type JoinPathFn = dyn Fn(&str, &str) -> String + Send + Sync;

pub struct Environment {
    syntax: Syntax,
    optimized: bool,
    undefined: UndefinedBehavior,
    filters: HashMap<String, Box<FilterFn>>,
    tests: HashMap<String, Box<TestFn>>,
    globals: HashMap<String, Value>,
    loader: Option<Arc<dyn Loader>>,
    finalize: Option<Box<FinalizeFn>>,
    join_path_fn: Option<Box<JoinPathFn>>,
}

impl Environment {
    /// An environment with default delimiters, the optimizer enabled,
    /// the lenient undefined policy, and empty registries.
    pub fn new() -> Self {
        Self {
            syntax: Syntax::default(),
            optimized: true,
            undefined: UndefinedBehavior::default(),
            filters: HashMap::new(),
            tests: HashMap::new(),
            globals: HashMap::new(),
            loader: None,
            finalize: None,
            join_path_fn: None,
        }
    }

    // ==================== Configuration ====================

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// Replaces the delimiter syntax for templates compiled after this
    /// call. Already-compiled templates are unaffected.
    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.syntax = syntax;
    }

    pub fn optimized(&self) -> bool {
        self.optimized
    }

    pub fn set_optimized(&mut self, optimized: bool) {
        self.optimized = optimized;
    }

    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.undefined
    }

    pub fn set_undefined_behavior(&mut self, behavior: UndefinedBehavior) {
        self.undefined = behavior;
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Some(Arc::new(loader));
    }

    /// Installs a hook applied to every emitted value after the
    /// undefined policy, replacing default stringification.
    pub fn set_finalize(
        &mut self,
        finalize: impl Fn(&Value) -> String + Send + Sync + 'static,
    ) {
        self.finalize = Some(Box::new(finalize));
    }

    /// Installs the resolver used when one template names another, as
    /// `extends` does; it receives the requested name and the requesting
    /// template's name.
    pub fn set_join_path(
        &mut self,
        join_path: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) {
        self.join_path_fn = Some(Box::new(join_path));
    }

    // ==================== Registries ====================

    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        filter: impl Fn(Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.filters.insert(name.into(), Box::new(filter));
    }

    pub fn add_test(
        &mut self,
        name: impl Into<String>,
        test: impl Fn(&Value, &[Value]) -> Result<bool> + Send + Sync + 'static,
    ) {
        self.tests.insert(name.into(), Box::new(test));
    }

    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub(crate) fn filter(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name).map(Box::as_ref)
    }

    pub(crate) fn test(&self, name: &str) -> Option<&TestFn> {
        self.tests.get(name).map(Box::as_ref)
    }

    pub(crate) fn finalize_value(&self, value: &Value) -> String {
        match &self.finalize {
            Some(finalize) => finalize(value),
            None => value.to_string(),
        }
    }

    // ==================== Compilation ====================

    /// Tokenizes source under this environment's syntax.
    pub fn tokenize<'s>(&self, source: &'s str, name: Option<&'s str>) -> Tokenizer<'s> {
        Tokenizer::new(source, name, &self.syntax)
    }

    /// Parses source to a syntax tree under this environment's syntax.
    pub fn parse(&self, source: &str, name: Option<&str>) -> Result<Parsed> {
        Ok(weft_syntax::parse(source, name, &self.syntax)?)
    }

    /// Compiles source to an executable unit: parse, optionally fold,
    /// then lower to routines.
    pub fn compile(&self, source: &str, name: Option<&str>) -> Result<ExecutableUnit> {
        self.compile_with(source, name, &self.globals)
    }

    fn compile_with(
        &self,
        source: &str,
        name: Option<&str>,
        globals: &HashMap<String, Value>,
    ) -> Result<ExecutableUnit> {
        let mut parsed = self.parse(source, name)?;
        if self.optimized {
            optimizer::optimize(&mut parsed, globals);
        }
        let unit = compiler::generate(parsed, name)?;
        tracing::debug!(
            name = name.unwrap_or("<string>"),
            instructions = unit.root.len(),
            blocks = unit.blocks.len(),
            "compiled template"
        );
        Ok(unit)
    }

    // ==================== Template Factory ====================

    /// Compiles a template from a string.
    ///
    /// `name` is used in error messages and handed to `join_path` when
    /// this template extends another; `globals` overlays the
    /// environment globals for this template only. The merged globals
    /// are also what the optimizer folds against, so an overlay value
    /// wins over the environment's even in pre-evaluated expressions.
    pub fn from_string(
        &self,
        source: &str,
        name: Option<&str>,
        globals: Option<HashMap<String, Value>>,
    ) -> Result<Template<'_>> {
        let globals = self.make_globals(globals);
        let unit = self.compile_with(source, name, &globals)?;
        Ok(Template::new(self, Arc::new(unit), globals))
    }

    /// Loads a template by name through the configured loader.
    ///
    /// When `parent` names the requesting template, the name is first
    /// passed through `join_path`, so relative template references can
    /// be resolved per application.
    pub fn get_template(
        &self,
        name: &str,
        parent: Option<&str>,
        globals: Option<HashMap<String, Value>>,
    ) -> Result<Template<'_>> {
        let Some(loader) = self.loader.clone() else {
            return Err(WeftError::Configuration(
                "no loader for this environment specified".to_string(),
            ));
        };
        let name = match parent {
            Some(parent) => self.join_path(name, parent),
            None => name.to_string(),
        };
        tracing::trace!(template = %name, "loading template");
        loader.load(self, &name, self.make_globals(globals))
    }

    /// Resolves a template name requested by another template. Without
    /// a configured hook the name is used as-is.
    pub fn join_path(&self, template: &str, parent: &str) -> String {
        match &self.join_path_fn {
            Some(join) => join(template, parent),
            None => template.to_string(),
        }
    }

    /// The environment globals with an optional overlay merged in.
    pub fn make_globals(&self, overlay: Option<HashMap<String, Value>>) -> HashMap<String, Value> {
        let mut merged = self.globals.clone();
        if let Some(overlay) = overlay {
            merged.extend(overlay);
        }
        merged
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("syntax", &self.syntax)
            .field("optimized", &self.optimized)
            .field("undefined", &self.undefined)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("tests", &self.tests.keys().collect::<Vec<_>>())
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}
