use super::{arg, primitive_string};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Convert a primitive value to a string
pub fn create_tostring_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::nullable(ParamType::Any))
        .build(|args: FuncArgs| match arg(&args, 0)? {
            Value::Null => Ok(Value::Null),
            v => primitive_string(v)
                .map(Value::from)
                .ok_or_else(|| "cannot convert a collection or structural value to string".to_string()),
        })
}

/// Convert a value to a number
pub fn create_tonumber_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::nullable(ParamType::Any))
        .build(|args: FuncArgs| match arg(&args, 0)? {
            Value::Null => Ok(Value::Null),
            v @ Value::Number(_) => Ok(v.clone()),
            Value::String(s) => crate::value::parse_number(s)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert {s:?} to number")),
            _ => Err("cannot convert value to number".to_string()),
        })
}

/// Convert a value to a boolean
pub fn create_tobool_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::nullable(ParamType::Any))
        .build(|args: FuncArgs| match arg(&args, 0)? {
            Value::Null => Ok(Value::Null),
            v @ Value::Bool(_) => Ok(v.clone()),
            Value::String(s) if s == "true" => Ok(Value::from(true)),
            Value::String(s) if s == "false" => Ok(Value::from(false)),
            Value::String(s) => Err(format!("cannot convert {s:?} to bool; only the strings \"true\" or \"false\" are allowed")),
            _ => Err("cannot convert value to bool".to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::super::{eval, FunctionTable};
    use crate::value::Value;

    fn call(src: &str) -> Result<Value, crate::lang::EvalError> {
        eval(&FunctionTable::new(), src)
    }

    #[test]
    fn test_tostring_function() {
        assert_eq!(call("tostring(5)").unwrap(), Value::from("5"));
        assert_eq!(call("tostring(true)").unwrap(), Value::from("true"));
        assert_eq!(call("tostring(null)").unwrap(), Value::null());
        assert!(call("tostring([1])").is_err());
    }

    #[test]
    fn test_tonumber_function() {
        assert_eq!(call(r#"tonumber("42")"#).unwrap(), Value::from(42));
        assert!(call(r#"tonumber("forty")"#).is_err());
    }

    #[test]
    fn test_tobool_function() {
        assert_eq!(call(r#"tobool("true")"#).unwrap(), Value::from(true));
        assert!(call(r#"tobool("yes")"#).is_err());
    }
}
