//! The declared-type grammar for module manifests.
//!
//! Manifests describe every input and output with a textual type
//! expression. The grammar:
//!
//! ```text
//! type     := union
//! union    := single ("|" single)*
//! single   := "str" | "int" | "float" | "bool" | "bytes" | "any" | "null"
//!           | "list" "<" type ">"
//!           | "set" "<" type ">"
//!           | "dict" "<" type "," type ">"
//!           | "tuple" "<" type ("," type)* ">"
//!           | "optional" "<" type ">"        // sugar for T|null
//! ```
//!
//! `optional<T>` desugars to the union `T|null`, so downstream code
//! only ever deals with unions. Whitespace is insignificant.
//!
//! # Example
//!
//! ```
//! use cascade_types::TypeExpr;
//!
//! let t: TypeExpr = "dict<str, list<int>>".parse().unwrap();
//! assert_eq!(t.to_string(), "dict<str,list<int>>");
//!
//! let opt: TypeExpr = "optional<str>".parse().unwrap();
//! assert_eq!(opt, "str|null".parse().unwrap());
//! ```

use crate::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parsed type expression.
///
/// Structural equality (`==`) is what the coercion rules treat as "no
/// translation needed"; `optional<T>` compares equal to `T|null`
/// because it is desugared at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeExpr {
    /// UTF-8 string.
    Str,
    /// Signed integer.
    Int,
    /// Double-precision float.
    Float,
    /// Boolean.
    Bool,
    /// Raw byte string.
    Bytes,
    /// Matches any payload; translation to `any` is identity.
    Any,
    /// The null payload; appears in unions desugared from `optional`.
    Null,
    /// Homogeneous ordered collection.
    List(Box<TypeExpr>),
    /// Homogeneous collection with first-occurrence deduplication.
    Set(Box<TypeExpr>),
    /// Key/value mapping.
    Dict(Box<TypeExpr>, Box<TypeExpr>),
    /// Fixed-arity heterogeneous sequence.
    Tuple(Vec<TypeExpr>),
    /// Alternative types; at least two members, flattened, no nesting.
    Union(Vec<TypeExpr>),
}

impl TypeExpr {
    /// Returns `optional<T>` as the desugared union `T|null`.
    #[must_use]
    pub fn optional(inner: TypeExpr) -> TypeExpr {
        TypeExpr::union_of(vec![inner, TypeExpr::Null])
    }

    /// Builds a union, flattening nested unions and deduplicating
    /// members while preserving first-occurrence order.
    ///
    /// A single surviving member collapses to that member.
    #[must_use]
    pub fn union_of(members: Vec<TypeExpr>) -> TypeExpr {
        let mut flat: Vec<TypeExpr> = Vec::with_capacity(members.len());
        for m in members {
            match m {
                TypeExpr::Union(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(TypeExpr::Any)
        } else {
            TypeExpr::Union(flat)
        }
    }

    /// Returns the union members, or a one-element slice view of self.
    #[must_use]
    pub fn union_members(&self) -> &[TypeExpr] {
        match self {
            TypeExpr::Union(members) => members,
            _ => std::slice::from_ref(self),
        }
    }

    /// Returns `true` if this type admits the null payload.
    #[must_use]
    pub fn admits_null(&self) -> bool {
        match self {
            TypeExpr::Null | TypeExpr::Any => true,
            TypeExpr::Union(members) => members.iter().any(TypeExpr::admits_null),
            _ => false,
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Str => f.write_str("str"),
            TypeExpr::Int => f.write_str("int"),
            TypeExpr::Float => f.write_str("float"),
            TypeExpr::Bool => f.write_str("bool"),
            TypeExpr::Bytes => f.write_str("bytes"),
            TypeExpr::Any => f.write_str("any"),
            TypeExpr::Null => f.write_str("null"),
            TypeExpr::List(t) => write!(f, "list<{t}>"),
            TypeExpr::Set(t) => write!(f, "set<{t}>"),
            TypeExpr::Dict(k, v) => write!(f, "dict<{k},{v}>"),
            TypeExpr::Tuple(ts) => {
                f.write_str("tuple<")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(">")
            }
            TypeExpr::Union(ts) => {
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
        }
    }
}

/// Error produced when a type expression fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type expression '{input}' at offset {offset}: {reason}")]
pub struct TypeParseError {
    /// The full input string.
    pub input: String,
    /// Byte offset where parsing failed.
    pub offset: usize,
    /// Human-readable reason.
    pub reason: String,
}

impl ErrorCode for TypeParseError {
    fn code(&self) -> &'static str {
        "TYPE_PARSE_FAILED"
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Config
    }
}

impl FromStr for TypeExpr {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(s);
        let expr = parser.parse_union()?;
        parser.skip_ws();
        if parser.pos < parser.bytes.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(expr)
    }
}

impl TryFrom<String> for TypeExpr {
    type Error = TypeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TypeExpr> for String {
    fn from(t: TypeExpr) -> String {
        t.to_string()
    }
}

/// Recursive-descent parser over the grammar above.
struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> TypeParseError {
        TypeParseError {
            input: self.input.to_string(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), TypeParseError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c as char)))
        }
    }

    fn ident(&mut self) -> Result<&'a str, TypeParseError> {
        self.skip_ws();
        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected type name"));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_union(&mut self) -> Result<TypeExpr, TypeParseError> {
        let mut members = vec![self.parse_single()?];
        while self.peek() == Some(b'|') {
            self.pos += 1;
            members.push(self.parse_single()?);
        }
        Ok(TypeExpr::union_of(members))
    }

    fn parse_single(&mut self) -> Result<TypeExpr, TypeParseError> {
        let name_start = self.pos;
        let name = self.ident()?;
        match name {
            "str" => Ok(TypeExpr::Str),
            "int" => Ok(TypeExpr::Int),
            "float" => Ok(TypeExpr::Float),
            "bool" => Ok(TypeExpr::Bool),
            "bytes" => Ok(TypeExpr::Bytes),
            "any" => Ok(TypeExpr::Any),
            "null" | "none" => Ok(TypeExpr::Null),
            "list" => {
                let inner = self.parse_one_param()?;
                Ok(TypeExpr::List(Box::new(inner)))
            }
            "set" => {
                let inner = self.parse_one_param()?;
                Ok(TypeExpr::Set(Box::new(inner)))
            }
            "optional" => {
                let inner = self.parse_one_param()?;
                Ok(TypeExpr::optional(inner))
            }
            "dict" => {
                self.expect(b'<')?;
                let key = self.parse_union()?;
                self.expect(b',')?;
                let value = self.parse_union()?;
                self.expect(b'>')?;
                Ok(TypeExpr::Dict(Box::new(key), Box::new(value)))
            }
            "tuple" => {
                self.expect(b'<')?;
                let mut elems = vec![self.parse_union()?];
                while self.peek() == Some(b',') {
                    self.pos += 1;
                    elems.push(self.parse_union()?);
                }
                self.expect(b'>')?;
                Ok(TypeExpr::Tuple(elems))
            }
            other => {
                self.pos = name_start;
                Err(self.error(format!("unknown type name '{other}'")))
            }
        }
    }

    fn parse_one_param(&mut self) -> Result<TypeExpr, TypeParseError> {
        self.expect(b'<')?;
        let inner = self.parse_union()?;
        self.expect(b'>')?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> TypeExpr {
        s.parse().unwrap()
    }

    #[test]
    fn primitives() {
        assert_eq!(parse("str"), TypeExpr::Str);
        assert_eq!(parse("int"), TypeExpr::Int);
        assert_eq!(parse("float"), TypeExpr::Float);
        assert_eq!(parse("bool"), TypeExpr::Bool);
        assert_eq!(parse("bytes"), TypeExpr::Bytes);
        assert_eq!(parse("any"), TypeExpr::Any);
        assert_eq!(parse("null"), TypeExpr::Null);
    }

    #[test]
    fn parametric_types() {
        assert_eq!(parse("list<str>"), TypeExpr::List(Box::new(TypeExpr::Str)));
        assert_eq!(parse("set<int>"), TypeExpr::Set(Box::new(TypeExpr::Int)));
        assert_eq!(
            parse("dict<str,int>"),
            TypeExpr::Dict(Box::new(TypeExpr::Str), Box::new(TypeExpr::Int))
        );
        assert_eq!(
            parse("tuple<str,int,bool>"),
            TypeExpr::Tuple(vec![TypeExpr::Str, TypeExpr::Int, TypeExpr::Bool])
        );
    }

    #[test]
    fn nesting() {
        assert_eq!(
            parse("dict<str, list<int>>"),
            TypeExpr::Dict(
                Box::new(TypeExpr::Str),
                Box::new(TypeExpr::List(Box::new(TypeExpr::Int)))
            )
        );
        assert_eq!(
            parse("list<list<list<str>>>").to_string(),
            "list<list<list<str>>>"
        );
    }

    #[test]
    fn unions_flatten_and_dedup() {
        assert_eq!(
            parse("str|int"),
            TypeExpr::Union(vec![TypeExpr::Str, TypeExpr::Int])
        );
        // Nested unions flatten; duplicates collapse.
        assert_eq!(parse("str|str"), TypeExpr::Str);
        assert_eq!(
            parse("str|int|str|null"),
            TypeExpr::Union(vec![TypeExpr::Str, TypeExpr::Int, TypeExpr::Null])
        );
    }

    #[test]
    fn optional_desugars_to_union_with_null() {
        assert_eq!(parse("optional<str>"), parse("str|null"));
        assert!(parse("optional<int>").admits_null());
        assert!(!parse("int").admits_null());
        assert!(parse("any").admits_null());
    }

    #[test]
    fn whitespace_insignificant() {
        assert_eq!(parse(" dict< str , int > "), parse("dict<str,int>"));
        assert_eq!(parse("str | int"), parse("str|int"));
    }

    #[test]
    fn display_round_trip() {
        for s in [
            "str",
            "list<int>",
            "set<str>",
            "dict<str,list<int>>",
            "tuple<str,int>",
            "str|null",
            "list<str|int>",
        ] {
            let t = parse(s);
            assert_eq!(parse(&t.to_string()), t, "round-trip failed for {s}");
        }
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<TypeExpr>().is_err());
        assert!("frob".parse::<TypeExpr>().is_err());
        assert!("list<".parse::<TypeExpr>().is_err());
        assert!("list<str".parse::<TypeExpr>().is_err());
        assert!("dict<str>".parse::<TypeExpr>().is_err());
        assert!("str junk".parse::<TypeExpr>().is_err());
        assert!("list<>".parse::<TypeExpr>().is_err());
    }

    #[test]
    fn parse_error_reports_offset() {
        let err = "list<frob>".parse::<TypeExpr>().unwrap_err();
        assert_eq!(err.offset, 5);
        assert!(err.reason.contains("frob"));
    }

    #[test]
    fn serde_as_string() {
        let t: TypeExpr = serde_json::from_str("\"list<str>\"").unwrap();
        assert_eq!(t, parse("list<str>"));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"list<str>\"");
        assert!(serde_json::from_str::<TypeExpr>("\"nope\"").is_err());
    }

    #[test]
    fn union_members_view() {
        let u = parse("str|int");
        assert_eq!(u.union_members().len(), 2);
        assert_eq!(TypeExpr::Str.union_members(), &[TypeExpr::Str]);
    }
}
