//! Dynamic element type flowing through pipelines.
//!
//! Stages are heterogeneous: a join emits tuples, `count` emits integers,
//! `to_list` emits lists. `Value` carries all of them with a total order so
//! windowed operators and grouping keys work on any element.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipeError, PipeResult};

/// A single pipeline element
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Arrays in configs and JSON always come back as lists
    List(Vec<Value>),
    /// Fixed-arity record, e.g. a joined fan tuple
    Tuple(Vec<Value>),
}

impl Value {
    /// Build a 2-tuple
    pub fn pair(a: impl Into<Value>, b: impl Into<Value>) -> Self {
        Self::Tuple(vec![a.into(), b.into()])
    }

    /// Kind name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Numeric view (bools count as 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a tuple or list
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::Tuple(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Indexed access into a tuple or list
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.as_slice().and_then(|items| items.get(index))
    }

    /// Truthiness, used by predicates built from plain values
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(items) | Self::List(items) => !items.is_empty(),
        }
    }

    /// `self + other`
    ///
    /// Integers stay integers unless the sum overflows. Strings, tuples and
    /// lists concatenate.
    pub fn try_add(&self, other: &Value) -> PipeResult<Value> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_add(*b)
                .map(Self::Int)
                .unwrap_or(Self::Float(*a as f64 + *b as f64))),
            (Self::Str(a), Self::Str(b)) => Ok(Self::Str(format!("{a}{b}"))),
            (Self::Tuple(a), Self::Tuple(b)) => Ok(Self::Tuple([a.as_slice(), b].concat())),
            (Self::List(a), Self::List(b)) => Ok(Self::List([a.as_slice(), b].concat())),
            _ => self.float_op("+", other, |a, b| a + b),
        }
    }

    /// `self - other`
    pub fn try_sub(&self, other: &Value) -> PipeResult<Value> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_sub(*b)
                .map(Self::Int)
                .unwrap_or(Self::Float(*a as f64 - *b as f64))),
            _ => self.float_op("-", other, |a, b| a - b),
        }
    }

    /// `self * other`
    pub fn try_mul(&self, other: &Value) -> PipeResult<Value> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_mul(*b)
                .map(Self::Int)
                .unwrap_or(Self::Float(*a as f64 * *b as f64))),
            _ => self.float_op("*", other, |a, b| a * b),
        }
    }

    /// `self / other`, always a float
    pub fn try_div(&self, other: &Value) -> PipeResult<Value> {
        self.float_op("/", other, |a, b| a / b)
    }

    fn float_op(&self, op: &str, other: &Value, f: impl Fn(f64, f64) -> f64) -> PipeResult<Value> {
        match (self, other) {
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(0.0), other.as_f64().unwrap_or(0.0));
                Ok(Self::Float(f(a, b)))
            }
            _ => Err(PipeError::type_mismatch(op, self, other)),
        }
    }

    /// Numeric value required, named after the operation that needs it
    pub fn expect_f64(&self, op: &str) -> PipeResult<f64> {
        self.as_f64()
            .ok_or_else(|| PipeError::type_mismatch(op, self, &Value::Float(0.0)))
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Str(_) => 3,
            Self::Tuple(_) => 4,
            Self::List(_) => 5,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Tuple(a), Self::Tuple(b)) | (Self::List(a), Self::List(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

/// Exact `i` vs `f`, with NaN placed by sign at either end
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, exactly representable
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= BOUND {
        return Ordering::Less;
    }
    if f < -BOUND {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        other => other,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match item {
            Value::Str(s) => write!(f, "'{s}'")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v)
            .map(Self::Int)
            .unwrap_or(Self::Float(v as f64))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_float_order_is_exact_beyond_f64_precision() {
        let big = 1i64 << 53;
        assert!(Value::Int(big + 1) > Value::Float(big as f64));
        assert_eq!(Value::Int(big), Value::Float(big as f64));
        assert!(Value::Int(i64::MAX) < Value::Float(9.3e18));
        assert!(Value::Int(i64::MIN) == Value::Float(-9_223_372_036_854_775_808.0));
        assert!(Value::Int(-3) > Value::Float(-3.5));
        assert!(Value::Float(f64::NAN) > Value::Int(i64::MAX));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
        assert_eq!(Value::Int(0), Value::Float(-0.0));

        let mut keys = std::collections::BTreeMap::new();
        for v in [Value::Int(big), Value::Float(big as f64), Value::Int(big + 1)] {
            *keys.entry(v).or_insert(0) += 1;
        }
        assert_eq!(keys.len(), 2, "got: {keys:?}");
    }

    #[test]
    fn test_numeric_order_crosses_int_and_float() {
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(2.5) > Value::Int(2));
        assert_eq!(Value::Int(3), Value::Float(3.0));
    }

    #[test]
    fn test_kind_rank_order() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Int(100) < Value::from("a"));
        assert!(Value::from("z") < Value::pair(0, 0));
    }

    #[test]
    fn test_try_add() {
        assert_eq!(Value::Int(2).try_add(&Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            Value::Int(2).try_add(&Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            Value::from("1").try_add(&Value::from("2")).unwrap(),
            Value::from("12")
        );

        let err = Value::Int(1).try_add(&Value::from("d")).unwrap_err();
        assert!(
            matches!(err, PipeError::TypeMismatch { .. }),
            "got: {err}"
        );
        assert!(err.to_string().contains("int"), "got: {err}");
    }

    #[test]
    fn test_add_overflow_falls_back_to_float() {
        let v = Value::Int(i64::MAX).try_add(&Value::Int(1)).unwrap();
        assert!(matches!(v, Value::Float(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::pair(4, 4).to_string(), "(4, 4)");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_string(),
            "[1, 'a']"
        );
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).to_string(), "(1,)");
    }

    #[test]
    fn test_deserialize_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[1, 2.5, "x", [1, 2], null, true]"#).unwrap();
        assert_eq!(values[0], Value::Int(1));
        assert!(matches!(values[1], Value::Float(_)));
        assert_eq!(values[2], Value::from("x"));
        assert!(matches!(values[3], Value::List(_)));
        assert!(values[4].is_null());
        assert_eq!(values[5], Value::Bool(true));
    }
}
