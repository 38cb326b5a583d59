use super::{array_arg, int_arg, primitive_string, str_arg};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use regex::Regex;

/// String manipulation functions
pub fn create_upper_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_uppercase())))
}

pub fn create_lower_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_lowercase())))
}

pub fn create_title_func() -> FuncDef {
    FuncDef::builder().param(ParamType::String).build(|args: FuncArgs| {
        let mut out = String::new();
        let mut at_word_start = true;
        for c in str_arg(&args, 0)?.chars() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            at_word_start = !c.is_alphanumeric();
        }
        Ok(Value::from(out))
    })
}

pub fn create_substr_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let chars: Vec<char> = str_arg(&args, 0)?.chars().collect();
            let len = chars.len() as i64;
            let mut offset = int_arg(&args, 1)?;
            let length = int_arg(&args, 2)?;

            if offset < 0 {
                offset += len;
            }
            if offset < 0 || offset > len {
                return Err("offset out of range".to_string());
            }
            let end = if length < 0 { len } else { (offset + length).min(len) };
            Ok(Value::from(
                chars[offset as usize..end as usize].iter().collect::<String>(),
            ))
        })
}

pub fn create_strcontains_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let haystack = str_arg(&args, 0)?;
            let needle = str_arg(&args, 1)?;
            Ok(Value::from(haystack.contains(needle)))
        })
}

pub fn create_startswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.starts_with(str_arg(&args, 1)?))))
}

pub fn create_endswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.ends_with(str_arg(&args, 1)?))))
}

/// Removes any of the characters in the second argument from both ends.
pub fn create_trim_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let cutset: Vec<char> = str_arg(&args, 1)?.chars().collect();
            Ok(Value::from(str_arg(&args, 0)?.trim_matches(cutset.as_slice())))
        })
}

pub fn create_trimspace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.trim())))
}

pub fn create_trimprefix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            Ok(Value::from(s.strip_prefix(str_arg(&args, 1)?).unwrap_or(s)))
        })
}

pub fn create_trimsuffix_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            Ok(Value::from(s.strip_suffix(str_arg(&args, 1)?).unwrap_or(s)))
        })
}

pub fn create_chomp_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.trim_end_matches(['\n', '\r']))))
}

pub fn create_strrev_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.chars().rev().collect::<String>())))
}

/// Indents every line but the first by the given number of spaces.
pub fn create_indent_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let pad = " ".repeat(int_arg(&args, 0)?.max(0) as usize);
            let s = str_arg(&args, 1)?;
            Ok(Value::from(s.replace('\n', &format!("\n{pad}"))))
        })
}

/// Plain substring replacement, or a regular expression when the search
/// string is wrapped in slashes.
pub fn create_replace_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let from = str_arg(&args, 1)?;
            let to = str_arg(&args, 2)?;
            if from.len() > 1 && from.starts_with('/') && from.ends_with('/') {
                let re = Regex::new(&from[1..from.len() - 1]).map_err(|e| e.to_string())?;
                return Ok(Value::from(re.replace_all(s, to).into_owned()));
            }
            Ok(Value::from(s.replace(from, to)))
        })
}

pub fn create_split_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let s = str_arg(&args, 1)?;
            if s.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            Ok(Value::from(s.split(separator).map(Value::from).collect::<Vec<_>>()))
        })
}

pub fn create_join_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let mut parts = Vec::new();
            for i in 1..args.len() {
                for v in array_arg(&args, i)? {
                    parts.push(
                        primitive_string(v).ok_or_else(|| "join requires a list of strings".to_string())?,
                    );
                }
            }
            Ok(Value::from(parts.join(separator)))
        })
}

/// printf-style formatting supporting `%s`, `%d`, `%f`, `%t`, `%q`, `%v`
/// and `%%`.
pub fn create_format_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            let spec = str_arg(&args, 0)?;
            let mut values = args.iter().skip(1);
            let mut out = String::new();
            let mut chars = spec.chars().peekable();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                let mut precision = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        precision.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let verb = chars.next().ok_or("format string ends with an incomplete verb")?;
                if verb == '%' {
                    out.push('%');
                    continue;
                }
                let v = values
                    .next()
                    .ok_or_else(|| format!("not enough arguments for %{verb}"))?;
                match verb {
                    's' | 'v' => match primitive_string(v) {
                        Some(s) => out.push_str(&s),
                        None => out.push_str(&serde_json::to_string(v).map_err(|e| e.to_string())?),
                    },
                    'q' => out.push_str(&format!("{:?}", primitive_string(v).unwrap_or_default())),
                    'd' => match v.as_i64() {
                        Some(n) => out.push_str(&n.to_string()),
                        None => return Err("%d requires a whole number".to_string()),
                    },
                    'f' => {
                        let f = v.as_f64().ok_or("%f requires a number")?;
                        let digits = precision
                            .strip_prefix('.')
                            .and_then(|p| p.parse::<usize>().ok())
                            .unwrap_or(6);
                        out.push_str(&format!("{f:.digits$}"));
                    }
                    't' => out.push_str(&v.as_bool().ok_or("%t requires a bool")?.to_string()),
                    other => return Err(format!("unsupported format verb %{other}")),
                }
            }
            Ok(Value::from(out))
        })
}

fn regex_match(re: &Regex, caps: &regex::Captures<'_>) -> Value {
    let group = |i: usize| {
        caps.get(i)
            .map(|m| Value::from(m.as_str()))
            .unwrap_or(Value::Null)
    };
    if re.captures_len() == 1 {
        return group(0);
    }
    let names: Vec<(usize, &str)> = re
        .capture_names()
        .enumerate()
        .filter_map(|(i, n)| n.map(|n| (i, n)))
        .collect();
    if names.is_empty() {
        Value::from((1..re.captures_len()).map(group).collect::<Vec<_>>())
    } else {
        Value::Object(names.into_iter().map(|(i, n)| (n.to_string(), group(i))).collect())
    }
}

pub fn create_regex_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let re = Regex::new(str_arg(&args, 0)?).map_err(|e| e.to_string())?;
            let caps = re
                .captures(str_arg(&args, 1)?)
                .ok_or("pattern did not match any part of the given string")?;
            Ok(regex_match(&re, &caps))
        })
}

pub fn create_regexall_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let re = Regex::new(str_arg(&args, 0)?).map_err(|e| e.to_string())?;
            let all = re
                .captures_iter(str_arg(&args, 1)?)
                .map(|caps| regex_match(&re, &caps))
                .collect::<Vec<_>>();
            Ok(Value::from(all))
        })
}

#[cfg(test)]
mod tests {
    use super::super::{eval, FunctionTable};
    use crate::value::Value;

    fn call(src: &str) -> Value {
        eval(&FunctionTable::new(), src).unwrap()
    }

    #[test]
    fn test_case_functions() {
        assert_eq!(call(r#"upper("hello")"#), Value::from("HELLO"));
        assert_eq!(call(r#"lower("HELLO")"#), Value::from("hello"));
        assert_eq!(call(r#"title("hello world")"#), Value::from("Hello World"));
    }

    #[test]
    fn test_substr_function() {
        assert_eq!(call(r#"substr("hello world", 6, 5)"#), Value::from("world"));
        assert_eq!(call(r#"substr("hello world", -5, -1)"#), Value::from("world"));
    }

    #[test]
    fn test_trim_functions() {
        assert_eq!(call(r#"trim("?!hello?!", "!?")"#), Value::from("hello"));
        assert_eq!(call(r#"trimspace("  hello  ")"#), Value::from("hello"));
        assert_eq!(call(r#"trimprefix("helloworld", "hello")"#), Value::from("world"));
        assert_eq!(call(r#"trimsuffix("helloworld", "world")"#), Value::from("hello"));
        assert_eq!(call(r#"chomp("hello\n\n")"#), Value::from("hello"));
    }

    #[test]
    fn test_replace_function() {
        assert_eq!(
            call(r#"replace("hello world", "world", "universe")"#),
            Value::from("hello universe")
        );
        assert_eq!(call(r##"replace("a1b22", "/[0-9]+/", "#")"##), Value::from("a#b#"));
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(
            call(r#"split(",", "a,b")"#),
            Value::Tuple(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(call(r#"join("-", ["a", "b"], ["c"])"#), Value::from("a-b-c"));
    }

    #[test]
    fn test_format_function() {
        assert_eq!(
            call(r#"format("%s-%d-%.2f-%%", "web", 3, 1.5)"#),
            Value::from("web-3-1.50-%")
        );
        assert!(eval(&FunctionTable::new(), r#"format("%d")"#).is_err());
    }

    #[test]
    fn test_regex_functions() {
        assert_eq!(call(r#"regex("[a-z]+", "123abc456")"#), Value::from("abc"));
        assert_eq!(
            call(r#"regexall("[0-9]", "a1b2")"#),
            Value::Tuple(vec![Value::from("1"), Value::from("2")])
        );
        assert!(eval(&FunctionTable::new(), r#"regex("x", "abc")"#).is_err());
    }
}
