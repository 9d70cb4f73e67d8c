//! Template handles.
//!
//! A [`Template`] ties a compiled unit to the environment it came from
//! and to its per-template globals. It stays borrowed from the
//! environment, so configuration cannot drift between compilation and
//! render.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::environment::Environment;
use crate::error::{Result, WeftError};
use crate::instructions::ExecutableUnit;
use crate::stream::TemplateStream;
use crate::value::Value;
use crate::vm::Render;

/// A compiled template, ready to render.
#[derive(Debug)]
pub struct Template<'env> {
    env: &'env Environment,
    unit: Arc<ExecutableUnit>,
    globals: HashMap<String, Value>,
}

impl<'env> Template<'env> {
    pub(crate) fn new(
        env: &'env Environment,
        unit: Arc<ExecutableUnit>,
        globals: HashMap<String, Value>,
    ) -> Self {
        Self { env, unit, globals }
    }

    /// The loader name this template was built under, if any.
    pub fn name(&self) -> Option<&str> {
        self.unit.name.as_deref()
    }

    /// The merged global namespace of this template.
    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub(crate) fn unit_arc(&self) -> Arc<ExecutableUnit> {
        self.unit.clone()
    }

    /// Renders to a single string.
    pub fn render<S: Serialize>(&self, context: S) -> Result<String> {
        let mut output = String::new();
        for fragment in self.generate(context)? {
            output.push_str(&fragment?);
        }
        Ok(output)
    }

    /// Starts a lazy render and returns the fragment iterator.
    ///
    /// The context must serialize to a map (or to nothing, for `()`);
    /// its entries overlay the template globals. When the optimizer is
    /// enabled a context key that shadows a global is rejected here,
    /// before any output is produced: the optimizer may have inlined
    /// that global, and a shadow would silently disagree with it.
    pub fn generate<S: Serialize>(&self, context: S) -> Result<Render<'env>> {
        let locals = context_to_map(context)?;
        if self.env.optimized() {
            let mut shadowed: Vec<&str> = locals
                .keys()
                .filter(|key| self.globals.contains_key(key.as_str()))
                .map(String::as_str)
                .collect();
            if !shadowed.is_empty() {
                shadowed.sort_unstable();
                return Err(WeftError::Configuration(format!(
                    "context overrides global variable(s) {} while the optimizer is enabled; \
                     disable optimization or rename the variable",
                    shadowed.join(", ")
                )));
            }
        }
        let mut merged = self.globals.clone();
        merged.extend(locals);
        Ok(Render::new(self.env, self.unit.clone(), merged))
    }

    /// Starts a lazy render wrapped in a [`TemplateStream`].
    pub fn stream<S: Serialize>(&self, context: S) -> Result<TemplateStream<Render<'env>>> {
        Ok(TemplateStream::new(self.generate(context)?))
    }
}

fn context_to_map<S: Serialize>(context: S) -> Result<HashMap<String, Value>> {
    let json = serde_json::to_value(context)
        .map_err(|err| WeftError::Configuration(format!("context is not serializable: {err}")))?;
    match json {
        serde_json::Value::Null => Ok(HashMap::new()),
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect()),
        other => Err(WeftError::Configuration(format!(
            "context must serialize to a map, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a map",
    }
}
