use super::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Type of a value, or a type constraint when `Dynamic` appears inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// "any": accepts every value and is never converted.
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Tuple(Vec<Type>),
    /// Attribute types plus the names of attributes declared `optional(...)`.
    Object(BTreeMap<String, Type>, BTreeSet<String>),
}

impl Type {
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn set(elem: Type) -> Self {
        Type::Set(Box::new(elem))
    }

    pub fn map(elem: Type) -> Self {
        Type::Map(Box::new(elem))
    }

    pub fn object(attrs: BTreeMap<String, Type>) -> Self {
        Type::Object(attrs, BTreeSet::new())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    pub fn without_optional_attributes(&self) -> Type {
        match self {
            Type::List(t) => Type::list(t.without_optional_attributes()),
            Type::Set(t) => Type::set(t.without_optional_attributes()),
            Type::Map(t) => Type::map(t.without_optional_attributes()),
            Type::Tuple(ts) => Type::Tuple(ts.iter().map(Type::without_optional_attributes).collect()),
            Type::Object(attrs, _) => Type::object(
                attrs
                    .iter()
                    .map(|(k, t)| (k.clone(), t.without_optional_attributes()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn friendly_name(&self) -> String {
        match self {
            Type::Dynamic => "dynamic".into(),
            Type::Bool => "bool".into(),
            Type::Number => "number".into(),
            Type::String => "string".into(),
            Type::List(t) => format!("list of {}", t.friendly_name()),
            Type::Set(t) => format!("set of {}", t.friendly_name()),
            Type::Map(t) => format!("map of {}", t.friendly_name()),
            Type::Tuple(_) => "tuple".into(),
            Type::Object(..) => "object".into(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name())
    }
}

/// Defaults declared with `optional(type, default)` in an object type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDefaults {
    pub defaults: BTreeMap<String, Value>,
    pub children: BTreeMap<String, TypeDefaults>,
}

impl TypeDefaults {
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.children.is_empty()
    }

    /// Fills null attributes with their defaults. Collections are walked
    /// transparently so defaults declared on an element object type apply to
    /// every element.
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Sensitive(inner) => Value::Sensitive(Box::new(self.apply(*inner))),
            Value::Object(mut attrs) => {
                for (name, default) in &self.defaults {
                    let missing = attrs.get(name).map(Value::is_null).unwrap_or(true);
                    if missing {
                        attrs.insert(name.clone(), default.clone());
                    }
                }
                for (name, child) in &self.children {
                    if let Some(v) = attrs.remove(name) {
                        attrs.insert(name.clone(), child.apply(v));
                    }
                }
                Value::Object(attrs)
            }
            Value::List(ty, elems) => Value::List(ty, elems.into_iter().map(|v| self.apply(v)).collect()),
            Value::Set(ty, elems) => Value::Set(ty, elems.into_iter().map(|v| self.apply(v)).collect()),
            Value::Tuple(elems) => Value::Tuple(elems.into_iter().map(|v| self.apply(v)).collect()),
            Value::Map(ty, elems) => Value::Map(
                ty,
                elems.into_iter().map(|(k, v)| (k, self.apply(v))).collect(),
            ),
            other => other,
        }
    }
}

/// Reads a type constraint expression such as `list(object({ a = string }))`.
pub fn type_constraint(expr: &hcl::Expression) -> Result<(Type, TypeDefaults), String> {
    let mut defaults = TypeDefaults::default();
    let ty = parse_type(expr, &mut defaults, false)?;
    Ok((ty, defaults))
}

const TYPE_SPEC_HELP: &str = "A type specification is either a primitive type keyword (bool, number, string) or a complex type constructor call, like list(string).";

fn parse_type(
    expr: &hcl::Expression,
    defaults: &mut TypeDefaults,
    in_object_attr: bool,
) -> Result<Type, String> {
    match expr {
        hcl::Expression::Variable(v) => match v.as_str() {
            "bool" => Ok(Type::Bool),
            "number" => Ok(Type::Number),
            "string" => Ok(Type::String),
            "any" => Ok(Type::Dynamic),
            kw @ ("list" | "set" | "map") => Err(format!(
                "The {kw} type constructor requires one argument specifying the element type."
            )),
            kw @ ("object" | "tuple") => Err(format!(
                "The {kw} type constructor requires one argument specifying the element types as a {}.",
                if kw == "object" { "map" } else { "list" }
            )),
            other => Err(format!("The keyword \"{other}\" is not a valid type specification.")),
        },
        hcl::Expression::Parenthesis(inner) => parse_type(inner, defaults, in_object_attr),
        hcl::Expression::FuncCall(call) => {
            let name = call.name.to_string();
            match name.as_str() {
                "list" | "set" | "map" => {
                    let [arg] = call.args.as_slice() else {
                        return Err(format!(
                            "The {name} type constructor requires one argument specifying the element type."
                        ));
                    };
                    let mut elem_defaults = TypeDefaults::default();
                    let elem = parse_type(arg, &mut elem_defaults, false)?;
                    merge_defaults(defaults, elem_defaults);
                    Ok(match name.as_str() {
                        "list" => Type::list(elem),
                        "set" => Type::set(elem),
                        _ => Type::map(elem),
                    })
                }
                "tuple" => {
                    let [hcl::Expression::Array(elems)] = call.args.as_slice() else {
                        return Err("The tuple type constructor requires one argument specifying the element types as a list.".into());
                    };
                    let mut types = Vec::with_capacity(elems.len());
                    for elem in elems {
                        let mut ignored = TypeDefaults::default();
                        types.push(parse_type(elem, &mut ignored, false)?);
                    }
                    Ok(Type::Tuple(types))
                }
                "object" => {
                    let [hcl::Expression::Object(attrs)] = call.args.as_slice() else {
                        return Err("The object type constructor requires one argument specifying the attribute types as a map.".into());
                    };
                    let mut types = BTreeMap::new();
                    let mut optional = BTreeSet::new();
                    for (key, value) in attrs.iter() {
                        let attr_name = object_key_name(key)?;
                        let mut child = TypeDefaults::default();
                        if let hcl::Expression::FuncCall(inner) = value {
                            if inner.name.to_string() == "optional" {
                                optional.insert(attr_name.clone());
                            }
                        }
                        let ty = parse_attr_type(value, &attr_name, defaults, &mut child)?;
                        if !child.is_empty() {
                            defaults.children.insert(attr_name.clone(), child);
                        }
                        types.insert(attr_name, ty);
                    }
                    Ok(Type::Object(types, optional))
                }
                "optional" if !in_object_attr => {
                    Err("Keyword \"optional\" is valid only as a modifier for object type attributes.".into())
                }
                other => Err(format!("Keyword \"{other}\" is not a valid type constructor.")),
            }
        }
        _ => Err(TYPE_SPEC_HELP.into()),
    }
}

fn parse_attr_type(
    expr: &hcl::Expression,
    attr_name: &str,
    defaults: &mut TypeDefaults,
    child: &mut TypeDefaults,
) -> Result<Type, String> {
    if let hcl::Expression::FuncCall(call) = expr {
        if call.name.to_string() == "optional" {
            let (ty_expr, default_expr) = match call.args.as_slice() {
                [ty] => (ty, None),
                [ty, default] => (ty, Some(default)),
                _ => {
                    return Err("Optional attribute modifier expects at most two arguments: the attribute type, and a default value.".into())
                }
            };
            let ty = parse_type(ty_expr, child, false)?;
            if let Some(default_expr) = default_expr {
                let raw = crate::lang::evaluate_constant(default_expr)
                    .map_err(|e| format!("Invalid default value for optional attribute: {}", e.detail()))?;
                let default = super::convert(raw, &ty)
                    .map_err(|e| format!("Invalid default value for optional attribute: {e}"))?;
                defaults.defaults.insert(attr_name.to_string(), default);
            }
            return Ok(ty);
        }
    }
    parse_type(expr, child, true)
}

fn merge_defaults(into: &mut TypeDefaults, from: TypeDefaults) {
    into.defaults.extend(from.defaults);
    into.children.extend(from.children);
}

fn object_key_name(key: &hcl::ObjectKey) -> Result<String, String> {
    match key {
        hcl::ObjectKey::Identifier(id) => Ok(id.to_string()),
        hcl::ObjectKey::Expression(hcl::Expression::String(s)) => Ok(s.clone()),
        hcl::ObjectKey::Expression(hcl::Expression::Variable(v)) => Ok(v.as_str().to_string()),
        _ => Err("Object constructor map keys must be attribute names.".into()),
    }
}
