//! A lazily rendered template engine.
//!
//! Templates mix literal text with `{{ expression }}` prints and
//! `{% statement %}` blocks, compile to compact routine lists, and render
//! as an iterator of output fragments, so a caller can stream a response
//! without waiting for the whole document.
//!
//! # Example
//!
//! ```
//! use weft::Environment;
//!
//! let mut env = Environment::new();
//! env.add_global("site", "weft");
//! let template = env
//!     .from_string("Hello {{ name }} from {{ site }}!", None, None)
//!     .unwrap();
//! let rendered = template
//!     .render(serde_json::json!({ "name": "Ada" }))
//!     .unwrap();
//! assert_eq!(rendered, "Hello Ada from weft!");
//! ```
//!
//! # Inheritance
//!
//! Templates extend one another through named blocks. A child template
//! starts with `{% extends 'base' %}` and overrides any block of its
//! parent; inside an override, `super()` expands to the parent's version
//! of the block. Parents are fetched by name through the
//! [`Loader`] configured on the environment.
//!
//! # Undefined values
//!
//! A failed lookup is not an error; it produces an undefined value, and
//! the environment's [`UndefinedBehavior`] decides what happens when
//! that value is printed, tested or iterated. The default renders it as
//! nothing.

mod compiler;
mod environment;
mod error;
mod instructions;
mod loader;
mod optimizer;
mod stream;
mod template;
mod undefined;
mod value;
mod vm;

pub use environment::{Environment, FilterFn, FinalizeFn, JoinPathFn, TestFn};
pub use error::{Result, WeftError};
pub use instructions::{ExecutableUnit, Instr};
pub use loader::Loader;
pub use stream::TemplateStream;
pub use template::Template;
pub use undefined::UndefinedBehavior;
pub use value::{UndefinedValue, Value};
pub use vm::{Fragment, Render};

pub use weft_syntax::{Syntax, SyntaxError};
