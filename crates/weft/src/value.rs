//! The runtime value model.
//!
//! Every piece of data a template touches is a [`Value`]. Context maps,
//! globals, loop items, filter arguments and filter results all share this
//! one representation, so filters and tests compose without caring where
//! their input came from.
//!
//! Missing data is a value too: [`Value::Undefined`] records which key
//! failed to resolve and on what, and flows through expressions until an
//! undefined policy decides what to do with it.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, WeftError};

/// A value as seen by the template runtime.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Undefined(UndefinedValue),
}

/// Record of a failed lookup.
///
/// `source` is the container the lookup ran against, or `None` when a bare
/// name was missing from the context. `key` is the textual form of the key
/// that failed.
#[derive(Debug, Clone)]
pub struct UndefinedValue {
    source: Option<Box<Value>>,
    key: String,
}

impl UndefinedValue {
    /// An undefined from a bare name missing in the context.
    pub fn unresolved(key: impl Into<String>) -> Self {
        Self {
            source: None,
            key: key.into(),
        }
    }

    /// An undefined from a key missing on a container.
    pub fn missing_on(source: Value, key: impl Into<String>) -> Self {
        Self {
            source: Some(Box::new(source)),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> Option<&Value> {
        self.source.as_deref()
    }
}

impl Value {
    /// Converts anything serializable into a [`Value`].
    ///
    /// Structs become maps, sequences become [`Value::Seq`], and numbers
    /// keep integer form when they fit in an `i64`.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)
            .map_err(|err| WeftError::Configuration(format!("value is not serializable: {err}")))?;
        Ok(Value::from(json))
    }

    /// Looks up `key` on this value.
    ///
    /// The same two-step rule applies everywhere: a string key reads a map
    /// field; an integer key indexes a sequence or a string, counting from
    /// the end when negative. Any miss yields [`Value::Undefined`] carrying
    /// this value as the source. Resolution itself never fails; only a
    /// policy applied later can turn the result into an error.
    pub fn resolve(&self, key: &Value) -> Value {
        if let (Value::Map(map), Value::String(name)) = (self, key) {
            if let Some(found) = map.get(name) {
                return found.clone();
            }
        }
        if let Value::Int(index) = key {
            match self {
                Value::Seq(items) => {
                    if let Some(found) = wrap_index(items.len(), *index).and_then(|i| items.get(i))
                    {
                        return found.clone();
                    }
                }
                Value::String(text) => {
                    if let Some(found) =
                        wrap_index(text.chars().count(), *index).and_then(|i| text.chars().nth(i))
                    {
                        return Value::String(found.to_string());
                    }
                }
                _ => {}
            }
        }
        Value::Undefined(UndefinedValue::missing_on(self.clone(), key_repr(key)))
    }

    /// Truthiness for conditionals, before any undefined policy applies.
    ///
    /// Empty containers, empty strings, zero and `none` are false; an
    /// undefined is false here and the strict policy intercepts it earlier.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Undefined(_) => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short noun for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            Value::Undefined(_) => "undefined",
        }
    }

    pub(crate) fn from_const(constant: &weft_syntax::Const) -> Value {
        match constant {
            weft_syntax::Const::None => Value::None,
            weft_syntax::Const::Bool(b) => Value::Bool(*b),
            weft_syntax::Const::Int(v) => Value::Int(*v),
            weft_syntax::Const::Float(v) => Value::Float(*v),
            weft_syntax::Const::Str(s) => Value::String(s.clone()),
        }
    }

    /// The literal form of a scalar, or `None` for aggregates and
    /// undefineds, which must keep their runtime identity.
    pub(crate) fn to_const(&self) -> Option<weft_syntax::Const> {
        match self {
            Value::None => Some(weft_syntax::Const::None),
            Value::Bool(b) => Some(weft_syntax::Const::Bool(*b)),
            Value::Int(v) => Some(weft_syntax::Const::Int(*v)),
            Value::Float(v) => Some(weft_syntax::Const::Float(*v)),
            Value::String(s) => Some(weft_syntax::Const::Str(s.clone())),
            _ => None,
        }
    }
}

fn wrap_index(len: usize, index: i64) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    }
}

fn key_repr(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PartialEq for Value {
    /// Numeric values compare across integer and float forms, so
    /// `1 == 1.0`. An undefined equals any other undefined and nothing
    /// else.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Undefined(_), Value::Undefined(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(true) => f.write_str("true"),
            Value::Bool(false) => f.write_str("false"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::String(s) => f.write_str(s),
            Value::Seq(_) | Value::Map(_) => match serde_json::to_string(self) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
            // The undefined policy decides the visible form before any
            // value reaches output; bare display stays silent.
            Value::Undefined(_) => Ok(()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::None | Value::Undefined(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Seq(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Seq(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::None
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Expression operators over values.
///
/// Arithmetic follows floored division and modulo, `/` always produces a
/// float, and integer overflow is an error rather than a wrap.
pub(crate) mod ops {
    use weft_syntax::{BinOp, UnaryOpKind};

    use super::Value;
    use crate::error::{Result, WeftError};

    pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
        match op {
            BinOp::Add => add(left, right),
            BinOp::Sub => arith(op, left, right, i64::checked_sub, |a, b| a - b),
            BinOp::Mul => arith(op, left, right, i64::checked_mul, |a, b| a * b),
            BinOp::Div => div(left, right),
            BinOp::FloorDiv => floor_div(left, right),
            BinOp::Mod => modulo(left, right),
            BinOp::Eq => Ok(Value::Bool(left == right)),
            BinOp::Ne => Ok(Value::Bool(left != right)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => ordering(op, left, right),
            BinOp::And => Ok(if left.is_truthy() {
                right.clone()
            } else {
                left.clone()
            }),
            BinOp::Or => Ok(if left.is_truthy() {
                left.clone()
            } else {
                right.clone()
            }),
        }
    }

    pub fn unary(op: UnaryOpKind, operand: &Value) -> Result<Value> {
        match (op, operand) {
            (UnaryOpKind::Not, _) => Ok(Value::Bool(!operand.is_truthy())),
            (UnaryOpKind::Neg, Value::Int(v)) => v
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| WeftError::InvalidOperation("integer overflow".to_string())),
            (UnaryOpKind::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
            (UnaryOpKind::Pos, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
            (UnaryOpKind::Neg | UnaryOpKind::Pos, _) => Err(unsupported_unary(op, operand)),
        }
    }

    fn add(left: &Value, right: &Value) -> Result<Value> {
        if let (Value::String(a), Value::String(b)) = (left, right) {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            return Ok(Value::String(joined));
        }
        arith(BinOp::Add, left, right, i64::checked_add, |a, b| a + b)
    }

    fn arith(
        op: BinOp,
        left: &Value,
        right: &Value,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
                .map(Value::Int)
                .ok_or_else(|| WeftError::InvalidOperation("integer overflow".to_string())),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
                _ => Err(unsupported(op, left, right)),
            },
        }
    }

    fn div(left: &Value, right: &Value) -> Result<Value> {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => {
                if b == 0.0 {
                    Err(WeftError::InvalidOperation("division by zero".to_string()))
                } else {
                    Ok(Value::Float(a / b))
                }
            }
            _ => Err(unsupported(BinOp::Div, left, right)),
        }
    }

    fn floor_div(left: &Value, right: &Value) -> Result<Value> {
        match (left, right) {
            (Value::Int(_), Value::Int(0)) => {
                Err(WeftError::InvalidOperation("division by zero".to_string()))
            }
            (Value::Int(a), Value::Int(b)) => floored_div_i64(*a, *b)
                .map(Value::Int)
                .ok_or_else(|| WeftError::InvalidOperation("integer overflow".to_string())),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        Err(WeftError::InvalidOperation("division by zero".to_string()))
                    } else {
                        Ok(Value::Float((a / b).floor()))
                    }
                }
                _ => Err(unsupported(BinOp::FloorDiv, left, right)),
            },
        }
    }

    fn modulo(left: &Value, right: &Value) -> Result<Value> {
        match (left, right) {
            (Value::Int(_), Value::Int(0)) => {
                Err(WeftError::InvalidOperation("division by zero".to_string()))
            }
            (Value::Int(a), Value::Int(b)) => {
                // Floored modulo: the result takes the sign of the divisor.
                match a.checked_rem(*b) {
                    Some(r) if r != 0 && (r < 0) != (*b < 0) => Ok(Value::Int(r + b)),
                    Some(r) => Ok(Value::Int(r)),
                    None => Err(WeftError::InvalidOperation("integer overflow".to_string())),
                }
            }
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        return Err(WeftError::InvalidOperation("division by zero".to_string()));
                    }
                    let r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        Ok(Value::Float(r + b))
                    } else {
                        Ok(Value::Float(r))
                    }
                }
                _ => Err(unsupported(BinOp::Mod, left, right)),
            },
        }
    }

    fn floored_div_i64(a: i64, b: i64) -> Option<i64> {
        let q = a.checked_div(b)?;
        let r = a.checked_rem(b)?;
        if r != 0 && (r < 0) != (b < 0) {
            Some(q - 1)
        } else {
            Some(q)
        }
    }

    fn ordering(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
        let ord = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        let Some(ord) = ord else {
            return Err(unsupported(op, left, right));
        };
        let result = match op {
            BinOp::Lt => ord.is_lt(),
            BinOp::Le => ord.is_le(),
            BinOp::Gt => ord.is_gt(),
            BinOp::Ge => ord.is_ge(),
            _ => false,
        };
        Ok(Value::Bool(result))
    }

    fn unsupported(op: BinOp, left: &Value, right: &Value) -> WeftError {
        WeftError::InvalidOperation(format!(
            "unsupported operands for '{}': {} and {}",
            symbol(op),
            left.kind_name(),
            right.kind_name()
        ))
    }

    fn unsupported_unary(op: UnaryOpKind, operand: &Value) -> WeftError {
        let symbol = match op {
            UnaryOpKind::Not => "not",
            UnaryOpKind::Neg => "-",
            UnaryOpKind::Pos => "+",
        };
        WeftError::InvalidOperation(format!(
            "unsupported operand for unary '{}': {}",
            symbol,
            operand.kind_name()
        ))
    }

    fn symbol(op: BinOp) -> &'static str {
        match op {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use weft_syntax::BinOp;

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::None),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1.0e12f64..1.0e12).prop_map(Value::Float),
            "[a-z]{0,12}".prop_map(Value::from),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn resolve_never_panics(base in scalar(), key in scalar()) {
            let _ = base.resolve(&key);
        }

        #[test]
        fn binary_ops_never_panic(op in prop_oneof![
            Just(BinOp::Add), Just(BinOp::Sub), Just(BinOp::Mul),
            Just(BinOp::Div), Just(BinOp::FloorDiv), Just(BinOp::Mod),
            Just(BinOp::Eq), Just(BinOp::Lt),
        ], left in scalar(), right in scalar()) {
            let _ = ops::binary(op, &left, &right);
        }

        #[test]
        fn negative_index_matches_reversed_position(items in prop::collection::vec(any::<i64>(), 1..8)) {
            let seq = Value::Seq(items.iter().copied().map(Value::Int).collect());
            for (offset, expected) in items.iter().rev().enumerate() {
                let index = -(offset as i64) - 1;
                prop_assert_eq!(seq.resolve(&Value::Int(index)), Value::Int(*expected));
            }
        }

        #[test]
        fn equality_is_symmetric(left in scalar(), right in scalar()) {
            prop_assert_eq!(left == right, right == left);
        }
    }
}
