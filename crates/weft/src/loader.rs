//! Template loading.
//!
//! The engine does not prescribe where template source lives. Anything
//! that can turn a name into a [`Template`] can serve as a loader: a
//! directory tree, an in-memory map, a database, a cache in front of
//! another loader.

use std::collections::HashMap;

use crate::environment::Environment;
use crate::error::Result;
use crate::template::Template;
use crate::value::Value;

/// Source of templates, addressed by name.
///
/// `load` receives the environment so it can compile through
/// [`Environment::from_string`], and the already-merged global namespace
/// for the new template. Missing names should produce
/// [`WeftError::TemplateNotFound`].
///
/// Loaders are shared behind an `Arc` and must be usable from multiple
/// renders at once.
///
/// [`WeftError::TemplateNotFound`]: crate::WeftError::TemplateNotFound
pub trait Loader: Send + Sync {
    fn load<'env>(
        &self,
        env: &'env Environment,
        name: &str,
        globals: HashMap<String, Value>,
    ) -> Result<Template<'env>>;
}
