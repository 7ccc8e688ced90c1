//! Runtime payload values.
//!
//! Every message on the bus carries a [`Value`]: a tagged union wide
//! enough to represent everything the manifest type grammar can
//! declare, including the container forms the coercion rules need to
//! tell apart (`bytes` vs `list<int>`, `set` vs `list`, `tuple` vs
//! `list`).
//!
//! Sets preserve insertion order of the first occurrence of each
//! element; dict entries keep a deterministic order within one run.
//! The coercion rules rely on both invariants.

use crate::TypeExpr;
use std::fmt;

/// A runtime payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null payload; satisfies `optional<T>` targets.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered collection.
    List(Vec<Value>),
    /// Deduplicated collection, insertion-ordered by first occurrence.
    Set(Vec<Value>),
    /// Key/value entries in deterministic order.
    Dict(Vec<(Value, Value)>),
    /// Fixed-arity sequence.
    Tuple(Vec<Value>),
}

impl Value {
    /// Builds a set from elements, keeping the first occurrence of each
    /// distinct element and preserving that order.
    #[must_use]
    pub fn set_of(elems: Vec<Value>) -> Value {
        let mut out: Vec<Value> = Vec::with_capacity(elems.len());
        for e in elems {
            if !out.contains(&e) {
                out.push(e);
            }
        }
        Value::Set(out)
    }

    /// Returns the observed runtime type of this value.
    ///
    /// Container element types unify to the common element type when
    /// all elements agree, otherwise to `any`; empty containers report
    /// `any` elements. This is the source-type key the translation
    /// cache memoises on, so it must be deterministic for a given
    /// value.
    #[must_use]
    pub fn runtime_type(&self) -> TypeExpr {
        match self {
            Value::Null => TypeExpr::Null,
            Value::Bool(_) => TypeExpr::Bool,
            Value::Int(_) => TypeExpr::Int,
            Value::Float(_) => TypeExpr::Float,
            Value::Str(_) => TypeExpr::Str,
            Value::Bytes(_) => TypeExpr::Bytes,
            Value::List(elems) => TypeExpr::List(Box::new(unify(elems.iter()))),
            Value::Set(elems) => TypeExpr::Set(Box::new(unify(elems.iter()))),
            Value::Dict(entries) => TypeExpr::Dict(
                Box::new(unify(entries.iter().map(|(k, _)| k))),
                Box::new(unify(entries.iter().map(|(_, v)| v))),
            ),
            Value::Tuple(elems) => {
                TypeExpr::Tuple(elems.iter().map(Value::runtime_type).collect())
            }
        }
    }

    /// Returns `true` for the null payload.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Unifies element types: the common type if all agree, `any` otherwise.
fn unify<'a>(mut elems: impl Iterator<Item = &'a Value>) -> TypeExpr {
    let Some(first) = elems.next() else {
        return TypeExpr::Any;
    };
    let first_ty = first.runtime_type();
    for e in elems {
        if e.runtime_type() != first_ty {
            return TypeExpr::Any;
        }
    }
    first_ty
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b[{} bytes]", b.len()),
            Value::List(elems) => write_seq(f, "[", elems, "]"),
            Value::Set(elems) => write_seq(f, "{", elems, "}"),
            Value::Tuple(elems) => write_seq(f, "(", elems, ")"),
            Value::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, elems: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, e) in elems.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{e}")?;
    }
    f.write_str(close)
}

impl From<serde_json::Value> for Value {
    /// Converts an opaque JSON payload (e.g. a slot configuration
    /// value) into a runtime value. Integral numbers become `Int`,
    /// other numbers `Float`; objects become string-keyed dicts in
    /// document order.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(elems) => {
                Value::List(elems.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_type_of_primitives() {
        assert_eq!(Value::Null.runtime_type(), TypeExpr::Null);
        assert_eq!(Value::Int(1).runtime_type(), TypeExpr::Int);
        assert_eq!(Value::Float(1.0).runtime_type(), TypeExpr::Float);
        assert_eq!(Value::Str("x".into()).runtime_type(), TypeExpr::Str);
        assert_eq!(Value::Bytes(vec![1]).runtime_type(), TypeExpr::Bytes);
    }

    #[test]
    fn runtime_type_unifies_homogeneous_lists() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(v.runtime_type(), TypeExpr::List(Box::new(TypeExpr::Int)));
    }

    #[test]
    fn runtime_type_heterogeneous_falls_back_to_any() {
        let v = Value::List(vec![Value::Int(1), Value::Str("x".into())]);
        assert_eq!(v.runtime_type(), TypeExpr::List(Box::new(TypeExpr::Any)));

        let empty = Value::List(vec![]);
        assert_eq!(
            empty.runtime_type(),
            TypeExpr::List(Box::new(TypeExpr::Any))
        );
    }

    #[test]
    fn runtime_type_of_dict_and_tuple() {
        let d = Value::Dict(vec![(Value::Str("a".into()), Value::Int(1))]);
        assert_eq!(
            d.runtime_type(),
            TypeExpr::Dict(Box::new(TypeExpr::Str), Box::new(TypeExpr::Int))
        );

        let t = Value::Tuple(vec![Value::Str("a".into()), Value::Int(1)]);
        assert_eq!(
            t.runtime_type(),
            TypeExpr::Tuple(vec![TypeExpr::Str, TypeExpr::Int])
        );
    }

    #[test]
    fn set_of_dedups_preserving_first_occurrence() {
        let s = Value::set_of(vec![
            Value::Int(3),
            Value::Int(1),
            Value::Int(3),
            Value::Int(2),
            Value::Int(1),
        ]);
        assert_eq!(
            s,
            Value::Set(vec![Value::Int(3), Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": [true, 2.5], "c": null}"#).unwrap();
        let v = Value::from(json);
        assert_eq!(
            v,
            Value::Dict(vec![
                (Value::Str("a".into()), Value::Int(1)),
                (
                    Value::Str("b".into()),
                    Value::List(vec![Value::Bool(true), Value::Float(2.5)])
                ),
                (Value::Str("c".into()), Value::Null),
            ])
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::Bytes(vec![0, 1, 2]).to_string(), "b[3 bytes]");
    }
}
