//! Checks on evaluated `count` and `for_each` values, shared by block
//! expansion and the expanding body.

use crate::hclext::{Diagnostic, SourceRange};
use crate::value::{convert, Type, Value};

/// Number of instances a `count` value asks for. `Ok(None)` while the value
/// is not known yet.
pub fn count_instances(value: Value, range: &SourceRange) -> Result<Option<i64>, Diagnostic> {
    let (value, _) = value.unmark();
    let invalid = |detail: String| Diagnostic::error("Invalid count argument", detail).with_subject(range);

    if value.is_null() {
        return Err(invalid(
            "The given \"count\" argument value is null. An integer is required.".into(),
        ));
    }
    if !value.is_known() {
        return Ok(None);
    }
    let count = match convert(value, &Type::Number) {
        Ok(Value::Number(n)) => n,
        Ok(other) => {
            return Err(invalid(format!(
                "The given \"count\" argument value is unsuitable: a number is required, not {}.",
                other.ty().friendly_name()
            )))
        }
        Err(e) => return Err(invalid(format!("The given \"count\" argument value is unsuitable: {e}."))),
    };
    let Some(count) = count.as_i64() else {
        return Err(invalid(format!(
            "The given \"count\" argument value is unsuitable: {count} is not a whole number."
        )));
    };
    if count < 0 {
        return Err(invalid(
            "The given \"count\" argument value is unsuitable: negative numbers are not supported.".into(),
        ));
    }
    Ok(Some(count))
}

/// Key/value pairs a `for_each` value iterates. Marks on the collection
/// carry over to every value. `Ok(None)` while the value is not known yet.
pub fn for_each_instances(value: Value, range: &SourceRange) -> Result<Option<Vec<(Value, Value)>>, Diagnostic> {
    let (value, marked) = value.unmark();

    if value.is_null() {
        return Err(Diagnostic::error(
            "Invalid for_each argument",
            "The given \"for_each\" argument value is unsuitable: the given \"for_each\" argument value is null. A map, or set of strings is allowed.",
        )
        .with_subject(range));
    }
    if !value.is_known() {
        return Ok(None);
    }
    let Some(elements) = value.elements() else {
        return Err(Diagnostic::error(
            "The `for_each` value is not iterable",
            format!("`{}` is not iterable", value.ty().friendly_name()),
        )
        .with_subject(range));
    };
    Ok(Some(
        elements
            .into_iter()
            .map(|(key, value)| (key, value.mark_if(marked)))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_values() {
        let range = SourceRange::file_start("main.tf");
        assert_eq!(count_instances(Value::from(2), &range), Ok(Some(2)));
        assert_eq!(count_instances(Value::from("3"), &range), Ok(Some(3)));
        assert_eq!(count_instances(Value::unknown(Type::Number), &range), Ok(None));
        assert_eq!(count_instances(Value::from(1).mark(), &range), Ok(Some(1)));
        let fraction = Value::from(hcl::Number::from_f64(1.5).unwrap());
        for bad in [Value::null(), Value::from(-1), fraction, Value::from("x")] {
            let diag = count_instances(bad, &range).unwrap_err();
            assert_eq!(diag.summary, "Invalid count argument");
        }
    }

    #[test]
    fn for_each_values() {
        let range = SourceRange::file_start("main.tf");
        assert_eq!(for_each_instances(Value::unknown(Type::Dynamic), &range), Ok(None));
        let pairs = for_each_instances(Value::Tuple(vec![Value::from("a")]).mark(), &range)
            .unwrap()
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].1.is_marked());

        let diag = for_each_instances(Value::null(), &range).unwrap_err();
        assert_eq!(diag.summary, "Invalid for_each argument");
        let diag = for_each_instances(Value::from(1), &range).unwrap_err();
        assert_eq!(diag.summary, "The `for_each` value is not iterable");
        assert_eq!(diag.detail, "`number` is not iterable");
    }
}
