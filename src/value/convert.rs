use super::{Type, Value};
use hcl::Number;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}{}", path_prefix(.path), .message)]
pub struct ConvertError {
    pub path: Vec<String>,
    pub message: String,
}

fn path_prefix(path: &[String]) -> String {
    path.iter().map(|step| format!("{step}: ")).collect()
}

impl ConvertError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    fn at(mut self, step: String) -> Self {
        self.path.insert(0, step);
        self
    }
}

/// Converts `value` to the type constraint `want`.
///
/// Unknown and null values keep their state and take the wanted type; marks
/// survive conversion. Object conversion drops extra attributes and fills
/// missing optional ones with null.
pub fn convert(value: Value, want: &Type) -> Result<Value, ConvertError> {
    if want.is_dynamic() {
        return Ok(value);
    }
    match value {
        Value::Sensitive(inner) => Ok(convert(*inner, want)?.mark()),
        Value::Unknown(_) => Ok(Value::Unknown(want.without_optional_attributes())),
        Value::Null(_) => Ok(Value::Null(want.without_optional_attributes())),
        value => convert_known(value, want),
    }
}

fn convert_known(value: Value, want: &Type) -> Result<Value, ConvertError> {
    match want {
        Type::Dynamic => Ok(value),
        Type::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(ConvertError::new("string required")),
        },
        Type::Number => match value {
            Value::Number(_) => Ok(value),
            Value::String(s) => parse_number(&s)
                .map(Value::Number)
                .ok_or_else(|| ConvertError::new("a number is required")),
            _ => Err(ConvertError::new("number required")),
        },
        Type::Bool => match value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            Value::String(_) => Err(ConvertError::new("a bool is required")),
            _ => Err(ConvertError::new("bool required")),
        },
        Type::List(elem) | Type::Set(elem) => {
            let elems = match value {
                Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => elems,
                _ => return Err(ConvertError::new(format!("{} required", want.friendly_name()))),
            };
            let (elem_ty, mut elems) = convert_elements(elems, elem)?;
            if matches!(want, Type::Set(_)) {
                let mut unique: Vec<Value> = Vec::with_capacity(elems.len());
                for v in elems.drain(..) {
                    if !unique.contains(&v) {
                        unique.push(v);
                    }
                }
                Ok(Value::Set(elem_ty, unique))
            } else {
                Ok(Value::List(elem_ty, elems))
            }
        }
        Type::Map(elem) => {
            let attrs = match value {
                Value::Map(_, attrs) | Value::Object(attrs) => attrs,
                _ => return Err(ConvertError::new(format!("{} required", want.friendly_name()))),
            };
            if elem.is_dynamic() {
                let (keys, values): (Vec<String>, Vec<Value>) = attrs.into_iter().unzip();
                let (elem_ty, values) = unify(values)?;
                return Ok(Value::Map(elem_ty, keys.into_iter().zip(values).collect()));
            }
            let mut out = BTreeMap::new();
            for (key, v) in attrs {
                let v = convert(v, elem).map_err(|e| e.at(format!("element {key:?}")))?;
                out.insert(key, v);
            }
            Ok(Value::Map(elem.without_optional_attributes(), out))
        }
        Type::Tuple(types) => {
            let elems = match value {
                Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => elems,
                _ => return Err(ConvertError::new("tuple required")),
            };
            if elems.len() != types.len() {
                return Err(ConvertError::new(format!(
                    "tuple required with exactly {} elements",
                    types.len()
                )));
            }
            let converted = elems
                .into_iter()
                .zip(types)
                .enumerate()
                .map(|(i, (v, t))| convert(v, t).map_err(|e| e.at(format!("element {i}"))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(converted))
        }
        Type::Object(attr_types, optional) => {
            let mut attrs = match value {
                Value::Map(_, attrs) | Value::Object(attrs) => attrs,
                _ => return Err(ConvertError::new("object required")),
            };
            let mut out = BTreeMap::new();
            for (name, ty) in attr_types {
                match attrs.remove(name) {
                    Some(v) => {
                        let v = convert(v, ty).map_err(|e| e.at(format!("attribute {name:?}")))?;
                        out.insert(name.clone(), v);
                    }
                    None if optional.contains(name) => {
                        out.insert(name.clone(), Value::Null(ty.without_optional_attributes()));
                    }
                    None => {
                        return Err(ConvertError::new(format!("attribute {name:?} is required")));
                    }
                }
            }
            Ok(Value::Object(out))
        }
    }
}

fn convert_elements(elems: Vec<Value>, elem: &Type) -> Result<(Type, Vec<Value>), ConvertError> {
    if elem.is_dynamic() {
        return unify(elems);
    }
    let converted = elems
        .into_iter()
        .enumerate()
        .map(|(i, v)| convert(v, elem).map_err(|e| e.at(format!("element {i}"))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((elem.without_optional_attributes(), converted))
}

/// Finds one element type for a homogeneous collection of `any` elements.
pub fn unify(elems: Vec<Value>) -> Result<(Type, Vec<Value>), ConvertError> {
    let mut common: Option<Type> = None;
    let mut mixed_primitives = false;
    for v in &elems {
        if !v.is_known() || v.is_null() {
            continue;
        }
        let ty = v.ty();
        match &common {
            None => common = Some(ty),
            Some(c) if *c == ty => {}
            Some(c) if c.is_primitive() && ty.is_primitive() => mixed_primitives = true,
            Some(_) => {
                return Err(ConvertError::new("all elements must have the same type"));
            }
        }
    }
    let target = if mixed_primitives {
        Type::String
    } else {
        common.unwrap_or(Type::Dynamic)
    };
    let converted = elems
        .into_iter()
        .enumerate()
        .map(|(i, v)| convert(v, &target).map_err(|e| e.at(format!("element {i}"))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((target, converted))
}

pub(crate) fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}
