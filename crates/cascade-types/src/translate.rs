//! Coercion rules between declared types.
//!
//! The translation layer bridges small type mismatches between a
//! producer's declared output type and a consumer's declared input
//! type, without the producer knowing the consumer's shape.
//!
//! Planning and application are split: [`plan`] is a pure function
//! from a `(source, destination)` type pair to a [`Strategy`], and
//! `Strategy::apply` executes that strategy against a runtime
//! [`Value`]. The bus memoises plans in an LRU cache keyed by the
//! observed source type, so `plan` stays allocation-light and
//! deterministic.
//!
//! # Rule table
//!
//! | Source | Destination | Strategy |
//! |--------|-------------|----------|
//! | `T` | `any` | identity |
//! | `T` | `T` | identity |
//! | `int` | `float` | numeric widening |
//! | `str` | `bytes` | UTF-8 encode |
//! | `bytes` | `str` | UTF-8 decode (fails on invalid bytes) |
//! | `list<T>` | `set<U>` | re-container + element coercion |
//! | `set<T>` | `list<U>` | re-container (first-occurrence order kept) |
//! | `dict<K,V>` | `list<tuple<K,V>>` | entry pairs |
//! | `tuple<T,…,T>` | `list<U>` | element-wise, uniform tuples only |
//! | `list<T>` | `list<U>` | element-wise when `T → U` is coercible |
//! | `T` | `list<U>` / `set<U>` | wrap-singleton when `T → U` is coercible |
//! | `T` | `U1\|U2\|…` | first member for which a rule holds |
//!
//! Transitivity is realised through the recursive element coercions
//! (`int → list<any>` plans as wrap + identity); arbitrary rule
//! chaining beyond container nesting is not searched.
//!
//! When both an element-wise and a wrap-singleton derivation exist,
//! element-wise wins: it preserves length.

use crate::{ErrorCode, Severity, TypeExpr, Value};
use thiserror::Error;

/// A pre-selected translation strategy for a `(source, destination)`
/// type pair.
///
/// Strategies are cheap to clone and are shared through the bus's
/// memoisation cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Pass the payload through unchanged.
    Identity,
    /// `int → float` widening.
    IntToFloat,
    /// `str → bytes` UTF-8 encode.
    Utf8Encode,
    /// `bytes → str` UTF-8 decode; fails on invalid bytes.
    Utf8Decode,
    /// `list<T> → set<U>`: coerce elements, then dedup keeping the
    /// first occurrence of each element.
    ListToSet(Box<Strategy>),
    /// `set<T> → list<U>`: coerce elements, keeping insertion order.
    SetToList(Box<Strategy>),
    /// `dict<K,V> → list<tuple<K,V>>`.
    DictToPairs,
    /// Uniform `tuple<T,…,T> → list<U>` element-wise.
    TupleToList(Box<Strategy>),
    /// `list<T> → list<U>` element-wise.
    MapElements(Box<Strategy>),
    /// `T → list<U>` wrap-singleton.
    WrapList(Box<Strategy>),
    /// `T → set<U>` wrap-singleton.
    WrapSet(Box<Strategy>),
}

/// Error raised when applying a strategy to a value fails.
///
/// Carries only the failure reason; the bus attaches the offending
/// `(source, destination)` type pair where the diagnostic is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("translation failed: {reason}")]
pub struct TranslationError {
    /// What went wrong, e.g. `invalid UTF-8 at byte 3`.
    pub reason: String,
}

impl TranslationError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for TranslationError {
    fn code(&self) -> &'static str {
        "TYPE_TRANSLATION_FAILED"
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Pipeline
    }
}

impl Strategy {
    /// Returns `true` if this strategy passes payloads through
    /// unchanged, letting the caller skip the copy entirely.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Strategy::Identity)
    }

    /// Applies the strategy to a value, producing the translated value.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError`] when the value does not have the
    /// shape the strategy was planned for, or when a lossy step fails
    /// (invalid UTF-8 on `bytes → str`).
    pub fn apply(&self, value: &Value) -> Result<Value, TranslationError> {
        match self {
            Strategy::Identity => Ok(value.clone()),
            Strategy::IntToFloat => match value {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                other => Err(shape_error("int", other)),
            },
            Strategy::Utf8Encode => match value {
                Value::Str(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
                other => Err(shape_error("str", other)),
            },
            Strategy::Utf8Decode => match value {
                Value::Bytes(b) => String::from_utf8(b.clone()).map(Value::Str).map_err(|e| {
                    TranslationError::new(format!(
                        "invalid UTF-8 at byte {}",
                        e.utf8_error().valid_up_to()
                    ))
                }),
                other => Err(shape_error("bytes", other)),
            },
            Strategy::ListToSet(inner) => match value {
                Value::List(elems) => Ok(Value::set_of(apply_each(inner, elems)?)),
                other => Err(shape_error("list", other)),
            },
            Strategy::SetToList(inner) => match value {
                Value::Set(elems) => Ok(Value::List(apply_each(inner, elems)?)),
                other => Err(shape_error("set", other)),
            },
            Strategy::DictToPairs => match value {
                Value::Dict(entries) => Ok(Value::List(
                    entries
                        .iter()
                        .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                        .collect(),
                )),
                other => Err(shape_error("dict", other)),
            },
            Strategy::TupleToList(inner) => match value {
                Value::Tuple(elems) => Ok(Value::List(apply_each(inner, elems)?)),
                other => Err(shape_error("tuple", other)),
            },
            Strategy::MapElements(inner) => match value {
                Value::List(elems) => Ok(Value::List(apply_each(inner, elems)?)),
                other => Err(shape_error("list", other)),
            },
            Strategy::WrapList(inner) => Ok(Value::List(vec![inner.apply(value)?])),
            Strategy::WrapSet(inner) => Ok(Value::Set(vec![inner.apply(value)?])),
        }
    }
}

fn apply_each(inner: &Strategy, elems: &[Value]) -> Result<Vec<Value>, TranslationError> {
    elems.iter().map(|e| inner.apply(e)).collect()
}

fn shape_error(expected: &str, got: &Value) -> TranslationError {
    TranslationError::new(format!(
        "expected {expected} payload, got {}",
        got.runtime_type()
    ))
}

/// Selects a translation strategy for a `(source, destination)` type
/// pair, or `None` when no coercion rule covers the pair.
///
/// The source type must be concrete (not a union): at delivery time
/// the bus plans against the runtime-observed type of the payload,
/// which is always concrete. For static wiring checks over declared
/// union sources use [`types_compatible`].
#[must_use]
pub fn plan(src: &TypeExpr, dst: &TypeExpr) -> Option<Strategy> {
    // Destination `any` and structural equality are identity.
    if *dst == TypeExpr::Any || src == dst {
        return Some(Strategy::Identity);
    }

    // Union destination: first member a rule covers.
    if let TypeExpr::Union(members) = dst {
        return members.iter().find_map(|m| plan(src, m));
    }

    if let TypeExpr::Union(_) = src {
        return None;
    }

    match (src, dst) {
        (TypeExpr::Int, TypeExpr::Float) => Some(Strategy::IntToFloat),
        (TypeExpr::Str, TypeExpr::Bytes) => Some(Strategy::Utf8Encode),
        (TypeExpr::Bytes, TypeExpr::Str) => Some(Strategy::Utf8Decode),

        (TypeExpr::List(s), TypeExpr::Set(d)) => {
            plan(s, d).map(|inner| Strategy::ListToSet(Box::new(inner)))
        }
        (TypeExpr::Set(s), TypeExpr::List(d)) => {
            plan(s, d).map(|inner| Strategy::SetToList(Box::new(inner)))
        }

        (TypeExpr::Dict(k, v), TypeExpr::List(elem)) if pairs_match(k, v, elem) => {
            Some(Strategy::DictToPairs)
        }

        (TypeExpr::Tuple(elems), TypeExpr::List(d)) if uniform(elems) => elems
            .first()
            .and_then(|t| plan(t, d))
            .map(|inner| Strategy::TupleToList(Box::new(inner))),

        (TypeExpr::List(s), TypeExpr::List(d)) => {
            plan(s, d).map(|inner| Strategy::MapElements(Box::new(inner)))
        }

        // Wrap-singleton last: element-wise derivations take precedence.
        (_, TypeExpr::List(d)) => plan(src, d).map(|inner| Strategy::WrapList(Box::new(inner))),
        (_, TypeExpr::Set(d)) => plan(src, d).map(|inner| Strategy::WrapSet(Box::new(inner))),

        _ => None,
    }
}

/// The wiring-time compatibility relation, evaluated against declared
/// types on both sides.
///
/// A union source is compatible only when every member is: any payload
/// the producer may legally publish must have a translation path.
#[must_use]
pub fn types_compatible(src: &TypeExpr, dst: &TypeExpr) -> bool {
    match src {
        TypeExpr::Union(members) => members.iter().all(|m| plan(m, dst).is_some()),
        _ => plan(src, dst).is_some(),
    }
}

fn pairs_match(k: &TypeExpr, v: &TypeExpr, elem: &TypeExpr) -> bool {
    matches!(elem, TypeExpr::Tuple(pair)
        if pair.len() == 2 && pair[0] == *k && pair[1] == *v)
}

fn uniform(elems: &[TypeExpr]) -> bool {
    elems
        .split_first()
        .is_some_and(|(first, rest)| rest.iter().all(|t| t == first))
}
