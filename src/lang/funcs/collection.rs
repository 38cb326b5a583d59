use super::{arg, array_arg, int_arg, number_value, object_arg, primitive_string, str_arg};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Number of characters in a string, elements in a list or attributes in an
/// object.
pub fn create_length_func() -> FuncDef {
    FuncDef::builder().param(ParamType::Any).build(|args: FuncArgs| {
        let len = match arg(&args, 0)? {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            _ => return Err("argument must be a string, collection or structural type".to_string()),
        };
        Ok(Value::from(len as i64))
    })
}

/// Concatenate multiple arrays into a single array
pub fn create_concat_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .variadic_param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for i in 0..args.len() {
                result.extend(array_arg(&args, i)?.iter().cloned());
            }
            Ok(Value::from(result))
        })
}

/// Flatten a nested array into a single level array
pub fn create_flatten_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            fn flatten(values: &[Value], out: &mut Vec<Value>) {
                for v in values {
                    match v.as_array() {
                        Some(arr) => flatten(arr, out),
                        None => out.push(v.clone()),
                    }
                }
            }

            let mut result = Vec::new();
            flatten(array_arg(&args, 0)?, &mut result);
            Ok(Value::from(result))
        })
}

/// Remove duplicate values from an array preserving the first occurrence
pub fn create_distinct_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for v in array_arg(&args, 0)? {
                if !result.contains(v) {
                    result.push(v.clone());
                }
            }
            Ok(Value::from(result))
        })
}

/// Elements from start (inclusive) to end (exclusive).
pub fn create_slice_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            let start = int_arg(&args, 1)?;
            let end = int_arg(&args, 2)?;
            if start < 0 || end > arr.len() as i64 || start > end {
                return Err(format!(
                    "invalid slice indices {start}..{end} for a list of {} elements",
                    arr.len()
                ));
            }
            Ok(Value::from(arr[start as usize..end as usize].to_vec()))
        })
}

/// Sorts strings lexically. Numbers sort as their string form.
pub fn create_sort_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut strings = array_arg(&args, 0)?
                .iter()
                .map(|v| primitive_string(v).ok_or_else(|| "sort requires a list of strings".to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            strings.sort();
            Ok(Value::from(strings.into_iter().map(Value::from).collect::<Vec<_>>()))
        })
}

pub fn create_reverse_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?.iter().cloned().rev().collect();
            Ok(Value::from(result))
        })
}

/// Index of the first element equal to the value, or an error if absent.
pub fn create_index_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let needle = arg(&args, 1)?;
            array_arg(&args, 0)?
                .iter()
                .position(|v| v == needle)
                .map(|i| Value::from(i as i64))
                .ok_or_else(|| "item not found".to_string())
        })
}

pub fn create_contains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let needle = arg(&args, 1)?;
            Ok(Value::from(array_arg(&args, 0)?.contains(needle)))
        })
}

/// Element at an index, wrapping around past the end.
pub fn create_element_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            let index = int_arg(&args, 1)?;
            if arr.is_empty() {
                return Err("cannot use element function with an empty list".to_string());
            }
            if index < 0 {
                return Err("cannot use element function with a negative index".to_string());
            }
            Ok(arr[index as usize % arr.len()].clone())
        })
}

pub fn create_keys_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut keys: Vec<&String> = object_arg(&args, 0)?.keys().collect();
            keys.sort();
            Ok(Value::from(keys.into_iter().map(|k| Value::from(k.as_str())).collect::<Vec<_>>()))
        })
}

/// Values ordered by their keys.
pub fn create_values_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut entries: Vec<(&String, &Value)> = object_arg(&args, 0)?.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Ok(Value::from(entries.into_iter().map(|(_, v)| v.clone()).collect::<Vec<_>>()))
        })
}

pub fn create_lookup_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let key = str_arg(&args, 1)?;
            match (object_arg(&args, 0)?.get(key), args.get(2)) {
                (Some(v), _) => Ok(v.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(format!("lookup failed to find key {key:?}")),
            }
        })
}

/// Shallow merge; later arguments win. Null arguments are skipped.
pub fn create_merge_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::nullable(ParamType::object_of(ParamType::Any)))
        .build(|args: FuncArgs| {
            let mut merged = hcl::Map::new();
            for v in args.iter() {
                if let Some(obj) = v.as_object() {
                    for (k, v) in obj {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(Value::Object(merged))
        })
}

/// First argument that is neither null nor an empty string.
pub fn create_coalesce_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            args.iter()
                .find(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .ok_or_else(|| "no non-null, non-empty-string arguments".to_string())
        })
}

/// Drops null and empty string elements.
pub fn create_compact_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let result: Vec<Value> = array_arg(&args, 0)?
                .iter()
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .collect();
            Ok(Value::from(result))
        })
}

/// `range(limit)`, `range(start, limit)` or `range(start, limit, step)`.
pub fn create_range_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let nums = (0..args.len())
                .map(|i| super::num_arg(&args, i))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, limit, step) = match nums.as_slice() {
                [limit] => (0.0, *limit, 1.0),
                [start, limit] => (*start, *limit, if start <= limit { 1.0 } else { -1.0 }),
                [start, limit, step] => (*start, *limit, *step),
                _ => return Err("range expects one to three arguments".to_string()),
            };
            if step == 0.0 {
                return Err("step must not be zero".to_string());
            }
            if (step > 0.0 && start > limit) || (step < 0.0 && start < limit) {
                return Err("step has the wrong sign for the given start and limit".to_string());
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0.0 && i < limit) || (step < 0.0 && i > limit) {
                out.push(number_value(i)?);
                if out.len() > 1024 {
                    return Err("more than 1024 values were generated".to_string());
                }
                i += step;
            }
            Ok(Value::from(out))
        })
}

pub fn create_zipmap_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::String))
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let keys = array_arg(&args, 0)?;
            let values = array_arg(&args, 1)?;
            if keys.len() != values.len() {
                return Err(format!(
                    "number of keys ({}) does not match number of values ({})",
                    keys.len(),
                    values.len()
                ));
            }
            let mut out = hcl::Map::new();
            for (k, v) in keys.iter().zip(values) {
                let k = k.as_str().ok_or("keys must be strings")?;
                out.insert(k.to_string(), v.clone());
            }
            Ok(Value::Object(out))
        })
}

/// The single element of a zero- or one-element list.
pub fn create_one_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| match array_arg(&args, 0)?.as_slice() {
            [] => Ok(Value::Null),
            [v] => Ok(v.clone()),
            _ => Err("must be a list, set, or tuple value with either zero or one elements".to_string()),
        })
}

pub fn create_alltrue_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            Ok(Value::from(
                array_arg(&args, 0)?
                    .iter()
                    .all(|v| v.as_bool() == Some(true) || v.as_str() == Some("true")),
            ))
        })
}

pub fn create_anytrue_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            Ok(Value::from(
                array_arg(&args, 0)?
                    .iter()
                    .any(|v| v.as_bool() == Some(true) || v.as_str() == Some("true")),
            ))
        })
}

pub fn create_sum_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Number))
        .build(|args: FuncArgs| {
            let arr = array_arg(&args, 0)?;
            if arr.is_empty() {
                return Err("cannot sum an empty list".to_string());
            }
            let total: f64 = arr.iter().filter_map(Value::as_f64).sum();
            number_value(total)
        })
}
