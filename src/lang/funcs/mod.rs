// Built-in functions organized by category

mod collection;
mod conversion;
mod crypto;
mod datetime;
mod encoding;
mod filesystem;
mod numeric;
mod string;

use super::EvalError;
use crate::value::{Type, Value};
use hcl::eval::{Context, Evaluate, FuncDef};
use hcl::expr::{Expression, FuncCall};
use std::collections::BTreeSet;
use std::fmt;

/// Functions whose result differs between calls.
const IMPURE: [&str; 2] = ["timestamp", "uuid"];

/// The registry of named built-in functions.
///
/// Functions are plain `hcl-rs` function definitions over literal values; the
/// table takes care of unknown and sensitive arguments around each call.
pub struct FunctionTable {
    ctx: Context<'static>,
    names: BTreeSet<&'static str>,
}

impl FunctionTable {
    pub fn new() -> Self {
        let mut table = Self {
            ctx: Context::new(),
            names: BTreeSet::new(),
        };

        // String functions
        table.declare("chomp", string::create_chomp_func());
        table.declare("endswith", string::create_endswith_func());
        table.declare("format", string::create_format_func());
        table.declare("indent", string::create_indent_func());
        table.declare("join", string::create_join_func());
        table.declare("lower", string::create_lower_func());
        table.declare("regex", string::create_regex_func());
        table.declare("regexall", string::create_regexall_func());
        table.declare("replace", string::create_replace_func());
        table.declare("split", string::create_split_func());
        table.declare("startswith", string::create_startswith_func());
        table.declare("strcontains", string::create_strcontains_func());
        table.declare("strrev", string::create_strrev_func());
        table.declare("substr", string::create_substr_func());
        table.declare("title", string::create_title_func());
        table.declare("trim", string::create_trim_func());
        table.declare("trimprefix", string::create_trimprefix_func());
        table.declare("trimspace", string::create_trimspace_func());
        table.declare("trimsuffix", string::create_trimsuffix_func());
        table.declare("upper", string::create_upper_func());

        // Collection functions
        table.declare("alltrue", collection::create_alltrue_func());
        table.declare("anytrue", collection::create_anytrue_func());
        table.declare("coalesce", collection::create_coalesce_func());
        table.declare("compact", collection::create_compact_func());
        table.declare("concat", collection::create_concat_func());
        table.declare("contains", collection::create_contains_func());
        table.declare("distinct", collection::create_distinct_func());
        table.declare("element", collection::create_element_func());
        table.declare("flatten", collection::create_flatten_func());
        table.declare("index", collection::create_index_func());
        table.declare("keys", collection::create_keys_func());
        table.declare("length", collection::create_length_func());
        table.declare("lookup", collection::create_lookup_func());
        table.declare("merge", collection::create_merge_func());
        table.declare("one", collection::create_one_func());
        table.declare("range", collection::create_range_func());
        table.declare("reverse", collection::create_reverse_func());
        table.declare("slice", collection::create_slice_func());
        table.declare("sort", collection::create_sort_func());
        table.declare("sum", collection::create_sum_func());
        table.declare("values", collection::create_values_func());
        table.declare("zipmap", collection::create_zipmap_func());

        // Numeric functions
        table.declare("abs", numeric::create_abs_func());
        table.declare("ceil", numeric::create_ceil_func());
        table.declare("floor", numeric::create_floor_func());
        table.declare("max", numeric::create_max_func());
        table.declare("min", numeric::create_min_func());
        table.declare("parseint", numeric::create_parseint_func());
        table.declare("pow", numeric::create_pow_func());
        table.declare("signum", numeric::create_signum_func());

        // Encoding functions
        table.declare("base64decode", encoding::create_base64decode_func());
        table.declare("base64encode", encoding::create_base64encode_func());
        table.declare("jsondecode", encoding::create_jsondecode_func());
        table.declare("jsonencode", encoding::create_jsonencode_func());

        // Cryptographic functions
        table.declare("base64sha256", crypto::create_base64sha256_func());
        table.declare("base64sha512", crypto::create_base64sha512_func());
        table.declare("md5", crypto::create_md5_func());
        table.declare("sha256", crypto::create_sha256_func());
        table.declare("sha512", crypto::create_sha512_func());
        table.declare("uuid", crypto::create_uuid_func());

        // Date and time functions
        table.declare("formatdate", datetime::create_formatdate_func());
        table.declare("timeadd", datetime::create_timeadd_func());
        table.declare("timecmp", datetime::create_timecmp_func());
        table.declare("timestamp", datetime::create_timestamp_func());

        // Filesystem path functions
        table.declare("abspath", filesystem::create_abspath_func());
        table.declare("basename", filesystem::create_basename_func());
        table.declare("dirname", filesystem::create_dirname_func());
        table.declare("pathexpand", filesystem::create_pathexpand_func());

        // Type conversion functions
        table.declare("tobool", conversion::create_tobool_func());
        table.declare("tonumber", conversion::create_tonumber_func());
        table.declare("tostring", conversion::create_tostring_func());

        table
    }

    fn declare(&mut self, name: &'static str, func: FuncDef) {
        self.ctx.declare_func(name, func);
        self.names.insert(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.iter().copied()
    }

    pub fn is_impure(name: &str) -> bool {
        IMPURE.contains(&name)
    }

    /// Calls `name` with already evaluated arguments.
    ///
    /// Any argument that is not wholly known makes the result unknown, any
    /// sensitive argument makes it sensitive. Impure functions return an
    /// unknown string when `pure_only` is set.
    pub fn call(&self, name: &str, args: Vec<Value>, pure_only: bool) -> Result<Value, EvalError> {
        if !self.contains(name) {
            return Err(EvalError::UnknownFunction(name.to_string()));
        }
        if pure_only && Self::is_impure(name) {
            return Ok(Value::unknown(Type::String));
        }
        if !args.iter().all(Value::is_whole_known) {
            return Ok(Value::dynamic());
        }

        let mut marked = false;
        let call = args
            .into_iter()
            .fold(FuncCall::builder(name), |builder, arg| {
                let (arg, found) = arg.unmark_deep();
                marked |= found;
                builder.arg(Expression::from(arg.to_hcl()))
            })
            .build();
        let result = Expression::from(call)
            .evaluate(&self.ctx)
            .map_err(|e| EvalError::FunctionCall {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Value::from_hcl(result).mark_if(marked))
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable").field("names", &self.names).finish()
    }
}

fn arg(args: &[hcl::Value], i: usize) -> Result<&hcl::Value, String> {
    args.get(i).ok_or_else(|| format!("missing argument {}", i + 1))
}

fn str_arg(args: &[hcl::Value], i: usize) -> Result<&str, String> {
    arg(args, i)?
        .as_str()
        .ok_or_else(|| format!("argument {} must be a string", i + 1))
}

fn num_arg(args: &[hcl::Value], i: usize) -> Result<f64, String> {
    arg(args, i)?
        .as_f64()
        .ok_or_else(|| format!("argument {} must be a number", i + 1))
}

fn int_arg(args: &[hcl::Value], i: usize) -> Result<i64, String> {
    let v = arg(args, i)?;
    if let Some(n) = v.as_i64() {
        return Ok(n);
    }
    match v.as_f64() {
        Some(f) if f.fract() == 0.0 => Ok(f as i64),
        _ => Err(format!("argument {} must be a whole number", i + 1)),
    }
}

fn array_arg(args: &[hcl::Value], i: usize) -> Result<&Vec<hcl::Value>, String> {
    arg(args, i)?
        .as_array()
        .ok_or_else(|| format!("argument {} must be a list", i + 1))
}

fn object_arg(args: &[hcl::Value], i: usize) -> Result<&hcl::Map<String, hcl::Value>, String> {
    arg(args, i)?
        .as_object()
        .ok_or_else(|| format!("argument {} must be a map", i + 1))
}

/// Whole floats become integers so `10 / 2` renders as `5`.
fn number_value(f: f64) -> Result<hcl::Value, String> {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Ok(hcl::Value::from(f as i64));
    }
    hcl::Number::from_f64(f)
        .map(hcl::Value::Number)
        .ok_or_else(|| "result is not a finite number".to_string())
}

/// Renders a primitive the way string templates do.
fn primitive_string(v: &hcl::Value) -> Option<String> {
    match v {
        hcl::Value::String(s) => Some(s.clone()),
        hcl::Value::Number(n) => Some(n.to_string()),
        hcl::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
fn eval(table: &FunctionTable, src: &str) -> Result<Value, EvalError> {
    let expr: hcl::Expression = src.parse().expect("valid expression");
    let hcl::Expression::FuncCall(call) = expr else {
        panic!("not a function call: {src}");
    };
    let args = call
        .args
        .iter()
        .map(crate::lang::evaluate_constant)
        .collect::<Result<Vec<_>, _>>()?;
    table.call(&call.name.to_string(), args, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_arguments_give_unknown_result() {
        let table = FunctionTable::new();
        let result = table
            .call("upper", vec![Value::unknown(Type::String)], false)
            .unwrap();
        assert_eq!(result, Value::dynamic());
    }

    #[test]
    fn sensitive_arguments_mark_the_result() {
        let table = FunctionTable::new();
        let result = table.call("upper", vec![Value::from("a").mark()], false).unwrap();
        assert_eq!(result, Value::from("A").mark());
    }

    #[test]
    fn impure_functions_in_pure_mode() {
        let table = FunctionTable::new();
        assert_eq!(
            table.call("timestamp", vec![], true).unwrap(),
            Value::unknown(Type::String)
        );
        assert!(table.call("uuid", vec![], false).unwrap().is_known());
    }

    #[test]
    fn unknown_function() {
        let table = FunctionTable::new();
        let err = table.call("nope", vec![], false).unwrap_err();
        assert_eq!(err, EvalError::UnknownFunction("nope".into()));
    }

    #[test]
    fn all_functions_registered() {
        let table = FunctionTable::new();
        for name in ["upper", "concat", "max", "jsonencode", "sha256", "timeadd", "basename", "tostring"] {
            assert!(table.contains(name), "{name}");
        }
    }
}
