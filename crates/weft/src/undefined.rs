//! Policies for undefined values.
//!
//! Lookups never fail on their own; they produce [`Value::Undefined`]
//! carrying the failed key. The behavior chosen on the environment decides
//! what happens when such a value is actually used.
//!
//! [`Value::Undefined`]: crate::Value::Undefined

use crate::error::{Result, WeftError};
use crate::value::{UndefinedValue, Value};

/// How an undefined value behaves when output, tested or iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndefinedBehavior {
    /// Prints nothing, is false, iterates as empty. The default.
    #[default]
    Lenient,
    /// Any use of an undefined value fails the render.
    Strict,
    /// Like lenient, but prints a marker naming the missing key so the
    /// hole is visible in the output.
    Debug,
}

impl UndefinedBehavior {
    /// Output form of an undefined value.
    pub(crate) fn textualize(self, undefined: &UndefinedValue) -> Result<String> {
        match self {
            UndefinedBehavior::Lenient => Ok(String::new()),
            UndefinedBehavior::Strict => Err(WeftError::Undefined {
                key: undefined.key().to_string(),
            }),
            UndefinedBehavior::Debug => Ok(match undefined.source() {
                None => format!("{{{{ {} }}}}", undefined.key()),
                Some(_) => format!("{{{{ no such element: {} }}}}", undefined.key()),
            }),
        }
    }

    /// Truth value of an undefined in a conditional.
    pub(crate) fn truthiness(self, undefined: &UndefinedValue) -> Result<bool> {
        match self {
            UndefinedBehavior::Strict => Err(WeftError::Undefined {
                key: undefined.key().to_string(),
            }),
            _ => Ok(false),
        }
    }

    /// Items produced when a loop runs over an undefined.
    pub(crate) fn iterate(self, undefined: &UndefinedValue) -> Result<Vec<Value>> {
        match self {
            UndefinedBehavior::Strict => Err(WeftError::Undefined {
                key: undefined.key().to_string(),
            }),
            _ => Ok(Vec::new()),
        }
    }

    /// Called before an undefined takes part in a comparison. Equality
    /// between two undefineds is fine under the lenient policies; strict
    /// rejects the use outright.
    pub(crate) fn on_compare(self, undefined: &UndefinedValue) -> Result<()> {
        match self {
            UndefinedBehavior::Strict => Err(WeftError::Undefined {
                key: undefined.key().to_string(),
            }),
            _ => Ok(()),
        }
    }
}
