use crate::lang::EvalContext;
use crate::value::Value;
use std::collections::BTreeMap;

/// The iterator variables visible inside a `dynamic` block's content: its
/// own and those of enclosing `dynamic` blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DynamicIteration {
    iterators: BTreeMap<String, Value>,
}

impl DynamicIteration {
    /// A nested iteration. An inner iterator shadows an outer one of the same
    /// name.
    pub(crate) fn child(parent: Option<&DynamicIteration>, name: &str, key: Value, value: Value) -> Self {
        let mut iterators = parent.map(|p| p.iterators.clone()).unwrap_or_default();
        iterators.insert(
            name.to_string(),
            Value::Object(BTreeMap::from([("key".to_string(), key), ("value".to_string(), value)])),
        );
        Self { iterators }
    }

    fn declare(&self, ctx: &mut EvalContext<'_>) {
        for (name, value) in &self.iterators {
            ctx.declare_var(name.clone(), value.clone());
        }
    }
}

/// The instance of a `count` or `for_each` block being expanded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetaArgIteration {
    Count(i64),
    ForEach { key: Value, value: Value },
}

impl MetaArgIteration {
    fn declare(&self, ctx: &mut EvalContext<'_>) {
        match self {
            MetaArgIteration::Count(index) => ctx.declare_var(
                "count",
                Value::Object(BTreeMap::from([("index".to_string(), Value::from(*index))])),
            ),
            MetaArgIteration::ForEach { key, value } => ctx.declare_var(
                "each",
                Value::Object(BTreeMap::from([
                    ("key".to_string(), key.clone()),
                    ("value".to_string(), value.clone()),
                ])),
            ),
        }
    }
}

/// Runs `f` in a child of `base` that also sees the given iterations.
pub(crate) fn with_iterations<R>(
    base: &EvalContext<'_>,
    dynamic: Option<&DynamicIteration>,
    meta_arg: Option<&MetaArgIteration>,
    f: impl FnOnce(&EvalContext<'_>) -> R,
) -> R {
    if dynamic.is_none() && meta_arg.is_none() {
        return f(base);
    }
    let mut ctx = base.child();
    if let Some(iteration) = dynamic {
        iteration.declare(&mut ctx);
    }
    if let Some(iteration) = meta_arg {
        iteration.declare(&mut ctx);
    }
    f(&ctx)
}
