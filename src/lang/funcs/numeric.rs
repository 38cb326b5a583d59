use super::{num_arg, number_value, str_arg};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Numeric functions
pub fn create_min_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let mut min = num_arg(&args, 0)?;
            for i in 1..args.len() {
                min = min.min(num_arg(&args, i)?);
            }
            number_value(min)
        })
}

pub fn create_max_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let mut max = num_arg(&args, 0)?;
            for i in 1..args.len() {
                max = max.max(num_arg(&args, i)?);
            }
            number_value(max)
        })
}

pub fn create_abs_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(num_arg(&args, 0)?.abs()))
}

pub fn create_ceil_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(num_arg(&args, 0)?.ceil()))
}

pub fn create_floor_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(num_arg(&args, 0)?.floor()))
}

pub fn create_pow_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| number_value(num_arg(&args, 0)?.powf(num_arg(&args, 1)?)))
}

pub fn create_signum_func() -> FuncDef {
    FuncDef::builder().param(ParamType::Number).build(|args: FuncArgs| {
        let n = num_arg(&args, 0)?;
        Ok(Value::from(if n > 0.0 {
            1
        } else if n < 0.0 {
            -1
        } else {
            0
        }))
    })
}

/// Parses a string of digits in the given base (2 to 62).
pub fn create_parseint_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let base = num_arg(&args, 1)? as u32;
            if !(2..=62).contains(&base) {
                return Err(format!("base must be between 2 and 62, got {base}"));
            }
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.strip_prefix('+').unwrap_or(s)),
            };
            if digits.is_empty() {
                return Err(format!("cannot parse {s:?} as a base {base} integer"));
            }
            let mut n: i64 = 0;
            for c in digits.chars() {
                let d = match c {
                    '0'..='9' => c as u32 - '0' as u32,
                    'a'..='z' => c as u32 - 'a' as u32 + 10,
                    'A'..='Z' if base <= 36 => c as u32 - 'A' as u32 + 10,
                    'A'..='Z' => c as u32 - 'A' as u32 + 36,
                    _ => base,
                };
                if d >= base {
                    return Err(format!("cannot parse {s:?} as a base {base} integer"));
                }
                n = n
                    .checked_mul(base as i64)
                    .and_then(|n| n.checked_add(d as i64))
                    .ok_or("integer overflow")?;
            }
            Ok(Value::from(if negative { -n } else { n }))
        })
}
