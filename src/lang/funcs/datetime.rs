use super::str_arg;
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

fn parse_timestamp(ts: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(ts).map_err(|e| format!("not a valid RFC3339 timestamp: {e}"))
}

fn render(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Return the current timestamp in RFC3339 format. Impure.
pub fn create_timestamp_func() -> FuncDef {
    FuncDef::builder().build(|_: FuncArgs| Ok(Value::from(render(Utc::now()))))
}

/// Parses a duration such as `1h30m`, `-10s` or `1.5h`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {s:?}");
    let (sign, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut nanos = 0.0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {s:?}"))?;
        let n: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit {unit:?} in duration {s:?}")),
        };
        nanos += n * scale;
        rest = &rest[unit_len..];
    }
    Ok(Duration::nanoseconds((sign * nanos) as i64))
}

/// Add a duration to a timestamp
pub fn create_timeadd_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let dt = parse_timestamp(str_arg(&args, 0)?)?.with_timezone(&Utc);
            let duration = parse_duration(str_arg(&args, 1)?)?;
            Ok(Value::from(render(dt + duration)))
        })
}

/// Compare two timestamps returning -1, 0, or 1
pub fn create_timecmp_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let a = parse_timestamp(str_arg(&args, 0)?)?;
            let b = parse_timestamp(str_arg(&args, 1)?)?;
            Ok(Value::from(match a.cmp(&b) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }))
        })
}

/// Translates a `formatdate` specification (`YYYY-MM-DD hh:mm`) into a
/// chrono format string.
fn chrono_format(spec: &str, dt: &DateTime<FixedOffset>) -> Result<String, String> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => return Err("unterminated literal in format string".to_string()),
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                        out.push('\'');
                        j += 2;
                    }
                    Some('\'') => break,
                    Some(&ch) => {
                        push_literal(&mut out, ch);
                        j += 1;
                    }
                }
            }
            if j == i + 1 {
                out.push('\'');
            }
            i = j + 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        let token: String = chars[i..i + run].iter().collect();
        let directive = match token.as_str() {
            "YYYY" => "%Y",
            "YY" => "%y",
            "MMMM" => "%B",
            "MMM" => "%b",
            "MM" => "%m",
            "M" => "%-m",
            "DD" => "%d",
            "D" => "%-d",
            "EEEE" => "%A",
            "EEE" => "%a",
            "hh" => "%H",
            "h" => "%-H",
            "HH" => "%I",
            "H" => "%-I",
            "AA" => "%p",
            "aa" => "%P",
            "mm" => "%M",
            "m" => "%-M",
            "ss" => "%S",
            "s" => "%-S",
            "ZZZZZ" => "%:z",
            "ZZZZ" => "%z",
            "ZZZ" | "Z" if dt.offset().local_minus_utc() == 0 => {
                if token == "Z" {
                    "Z"
                } else {
                    "UTC"
                }
            }
            "ZZZ" | "Z" => "%:z",
            other => return Err(format!("invalid date format verb {other:?}")),
        };
        out.push_str(directive);
        i += run;
    }
    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

pub fn create_formatdate_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let dt = parse_timestamp(str_arg(&args, 1)?)?;
            let fmt = chrono_format(str_arg(&args, 0)?, &dt)?;
            Ok(Value::from(dt.format(&fmt).to_string()))
        })
}
