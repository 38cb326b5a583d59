//! Runtime values: known, unknown, null and sensitive.

mod convert;
mod types;

pub use convert::{convert, unify, ConvertError};
pub(crate) use convert::parse_number;
pub use types::{type_constraint, Type, TypeDefaults};

use hcl::Number;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(Type),
    /// Not known until apply time. Propagates through every operation.
    Unknown(Type),
    Bool(bool),
    Number(Number),
    String(String),
    List(Type, Vec<Value>),
    Set(Type, Vec<Value>),
    Map(Type, BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Sensitivity taint. Never nested directly inside another `Sensitive`.
    Sensitive(Box<Value>),
}

impl Value {
    pub fn null() -> Self {
        Value::Null(Type::Dynamic)
    }

    pub fn unknown(ty: Type) -> Self {
        Value::Unknown(ty)
    }

    /// Unknown value of unknown type.
    pub fn dynamic() -> Self {
        Value::Unknown(Type::Dynamic)
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) | Value::Unknown(t) => t.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(t, _) => Type::list(t.clone()),
            Value::Set(t, _) => Type::set(t.clone()),
            Value::Map(t, _) => Type::map(t.clone()),
            Value::Tuple(elems) => Type::Tuple(elems.iter().map(Value::ty).collect()),
            Value::Object(attrs) => {
                Type::object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())).collect())
            }
            Value::Sensitive(inner) => inner.ty(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null(_) => true,
            Value::Sensitive(inner) => inner.is_null(),
            _ => false,
        }
    }

    pub fn is_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::Sensitive(inner) => inner.is_known(),
            _ => true,
        }
    }

    /// Known all the way down.
    pub fn is_whole_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::Sensitive(inner) => inner.is_whole_known(),
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                elems.iter().all(Value::is_whole_known)
            }
            Value::Map(_, elems) | Value::Object(elems) => elems.values().all(Value::is_whole_known),
            _ => true,
        }
    }

    pub fn is_marked(&self) -> bool {
        matches!(self, Value::Sensitive(_))
    }

    pub fn contains_marked(&self) -> bool {
        match self {
            Value::Sensitive(_) => true,
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                elems.iter().any(Value::contains_marked)
            }
            Value::Map(_, elems) | Value::Object(elems) => elems.values().any(Value::contains_marked),
            _ => false,
        }
    }

    pub fn mark(self) -> Value {
        match self {
            Value::Sensitive(_) => self,
            other => Value::Sensitive(Box::new(other)),
        }
    }

    /// Marks `self` if `marked` is set.
    pub fn mark_if(self, marked: bool) -> Value {
        if marked {
            self.mark()
        } else {
            self
        }
    }

    /// Strips a top-level mark, reporting whether there was one.
    pub fn unmark(self) -> (Value, bool) {
        match self {
            Value::Sensitive(inner) => (*inner, true),
            other => (other, false),
        }
    }

    /// Strips marks at every depth, reporting whether any was found.
    pub fn unmark_deep(self) -> (Value, bool) {
        fn strip(v: Value, found: &mut bool) -> Value {
            match v {
                Value::Sensitive(inner) => {
                    *found = true;
                    strip(*inner, found)
                }
                Value::List(t, elems) => Value::List(t, elems.into_iter().map(|e| strip(e, found)).collect()),
                Value::Set(t, elems) => Value::Set(t, elems.into_iter().map(|e| strip(e, found)).collect()),
                Value::Tuple(elems) => Value::Tuple(elems.into_iter().map(|e| strip(e, found)).collect()),
                Value::Map(t, elems) => {
                    Value::Map(t, elems.into_iter().map(|(k, e)| (k, strip(e, found))).collect())
                }
                Value::Object(elems) => {
                    Value::Object(elems.into_iter().map(|(k, e)| (k, strip(e, found))).collect())
                }
                other => other,
            }
        }
        let mut found = false;
        let v = strip(self, &mut found);
        (v, found)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the `(key, value)` pairs a `for_each` or `for` expression
    /// iterates over: indexes for sequences, the element itself for sets and
    /// attribute names for maps and objects. `None` if not iterable.
    pub fn elements(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::List(_, elems) | Value::Tuple(elems) => Some(
                elems
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Value::from(i as i64), v.clone()))
                    .collect(),
            ),
            Value::Set(_, elems) => Some(elems.iter().map(|v| (v.clone(), v.clone())).collect()),
            Value::Map(_, elems) | Value::Object(elems) => Some(
                elems
                    .iter()
                    .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn is_iterable(&self) -> bool {
        match self {
            Value::List(..) | Value::Set(..) | Value::Map(..) | Value::Tuple(_) | Value::Object(_) => true,
            Value::Unknown(t) | Value::Null(t) => matches!(
                t,
                Type::Dynamic | Type::List(_) | Type::Set(_) | Type::Map(_) | Type::Tuple(_) | Type::Object(..)
            ),
            Value::Sensitive(inner) => inner.is_iterable(),
            _ => false,
        }
    }

    /// Converts to an `hcl::Value`. Unknown values have no counterpart and
    /// become null; callers check `is_whole_known` first.
    pub fn to_hcl(&self) -> hcl::Value {
        match self {
            Value::Null(_) | Value::Unknown(_) => hcl::Value::Null,
            Value::Bool(b) => hcl::Value::Bool(*b),
            Value::Number(n) => hcl::Value::Number(n.clone()),
            Value::String(s) => hcl::Value::String(s.clone()),
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                hcl::Value::Array(elems.iter().map(Value::to_hcl).collect())
            }
            Value::Map(_, elems) | Value::Object(elems) => hcl::Value::Object(
                elems.iter().map(|(k, v)| (k.clone(), v.to_hcl())).collect(),
            ),
            Value::Sensitive(inner) => inner.to_hcl(),
        }
    }

    pub fn from_hcl(value: hcl::Value) -> Value {
        match value {
            hcl::Value::Null => Value::null(),
            hcl::Value::Bool(b) => Value::Bool(b),
            hcl::Value::Number(n) => Value::Number(n),
            hcl::Value::String(s) => Value::String(s),
            hcl::Value::Array(elems) => Value::Tuple(elems.into_iter().map(Value::from_hcl).collect()),
            hcl::Value::Object(attrs) => Value::Object(
                attrs.into_iter().map(|(k, v)| (k, Value::from_hcl(v))).collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null(_) | Value::Unknown(_) => serde_json::Value::Null,
            Value::Sensitive(_) => serde_json::Value::String("(sensitive value)".into()),
            other => serde_json::to_value(other.to_hcl()).unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => f.write_str("null"),
            Value::Unknown(_) => f.write_str("(known after apply)"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                f.write_str("[")?;
                for (i, v) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Map(_, elems) | Value::Object(elems) => {
                f.write_str("{")?;
                for (i, (k, v)) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {k} = {v}")?;
                }
                f.write_str(if elems.is_empty() { "}" } else { " }" })
            }
            Value::Sensitive(_) => f.write_str("(sensitive value)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_and_unknowns() {
        let v = Value::Tuple(vec![Value::from("a"), Value::from("b").mark()]);
        assert!(v.contains_marked());
        assert!(!v.is_marked());
        let (plain, found) = v.unmark_deep();
        assert!(found);
        assert!(!plain.contains_marked());

        let partly = Value::Tuple(vec![Value::from(1), Value::dynamic()]);
        assert!(partly.is_known());
        assert!(!partly.is_whole_known());
    }

    #[test]
    fn set_elements_iterate_by_value() {
        let set = Value::Set(Type::String, vec![Value::from("x"), Value::from("y")]);
        let pairs = set.elements().unwrap();
        assert_eq!(pairs[1], (Value::from("y"), Value::from("y")));
        assert!(Value::from(true).elements().is_none());
    }

    #[test]
    fn display() {
        let v = Value::Object(BTreeMap::from([
            ("a".to_string(), Value::from(1)),
            ("b".to_string(), Value::Tuple(vec![Value::from("x")])),
        ]));
        assert_eq!(v.to_string(), r#"{ a = 1, b = ["x"] }"#);
    }
}
