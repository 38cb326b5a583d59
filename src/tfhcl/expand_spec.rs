use super::iteration::{with_iterations, DynamicIteration, MetaArgIteration};
use crate::hclext::{Block, BlockSchema, Body, BodySchema, Diagnostic, Diagnostics, Expression, SourceRange};
use crate::lang::{evaluate_expression, EvalContext};
use crate::value::{convert, Type, Value};

/// A decoded `dynamic` block, ready to produce one block per element of
/// its `for_each` value.
#[derive(Debug)]
pub(crate) struct ExpandSpec<'b> {
    pub(crate) block_type: String,
    pub(crate) block_type_range: SourceRange,
    pub(crate) def_range: SourceRange,
    pub(crate) for_each: Value,
    pub(crate) iterator_name: String,
    pub(crate) label_exprs: Vec<Expression>,
    pub(crate) content: &'b Body,
}

fn dynamic_body_schema(with_labels: bool) -> BodySchema {
    let schema = BodySchema::new().required_attribute("for_each").attribute("iterator");
    let schema = if with_labels {
        schema.required_attribute("labels")
    } else {
        schema
    };
    schema.block(BlockSchema::new("content", &[]))
}

/// Decodes the arguments of a `dynamic` block generating blocks of
/// `block_schema`'s type.
pub(crate) fn decode_dynamic_spec<'b>(
    block_schema: &BlockSchema,
    raw: &'b Block,
    ctx: &EvalContext<'_>,
    dynamic: Option<&DynamicIteration>,
    meta_arg: Option<&MetaArgIteration>,
) -> (Option<ExpandSpec<'b>>, Diagnostics) {
    let (content, mut diags) = raw
        .body
        .content(&dynamic_body_schema(!block_schema.label_names.is_empty()));
    if diags.has_errors() {
        return (None, diags);
    }

    let Some(each_attr) = content.find_attr("for_each") else {
        return (None, diags);
    };
    let for_each = match with_iterations(ctx, dynamic, meta_arg, |ctx| evaluate_expression(&each_attr.expr, ctx)) {
        Ok(v) => v,
        Err(e) => {
            diags.push(e.to_diagnostic(each_attr.expr.range()));
            return (None, diags);
        }
    };
    if !for_each.is_iterable() {
        diags.push(
            Diagnostic::error(
                "Invalid dynamic for_each value",
                format!(
                    "Cannot use a {} value in for_each. An iterable collection is required.",
                    for_each.ty().friendly_name()
                ),
            )
            .with_subject(each_attr.expr.range()),
        );
        return (None, diags);
    }
    if for_each.is_null() {
        diags.push(
            Diagnostic::error("Invalid dynamic for_each value", "Cannot use a null value in for_each.")
                .with_subject(each_attr.expr.range()),
        );
        return (None, diags);
    }

    let mut iterator_name = block_schema.ty.clone();
    if let Some(attr) = content.find_attr("iterator") {
        match attr.expr.hcl() {
            hcl::Expression::Variable(name) => iterator_name = name.to_string(),
            _ => {
                diags.push(
                    Diagnostic::error(
                        "Invalid dynamic iterator name",
                        "Dynamic iterator must be a single variable name.",
                    )
                    .with_subject(attr.expr.range()),
                );
                return (None, diags);
            }
        }
    }

    let mut label_exprs = Vec::new();
    if let Some(attr) = content.find_attr("labels") {
        let hcl::Expression::Array(elems) = attr.expr.hcl() else {
            diags.push(
                Diagnostic::error("Invalid expression", "A static list expression is required.")
                    .with_subject(attr.expr.range()),
            );
            return (None, diags);
        };
        label_exprs = elems
            .iter()
            .map(|e| Expression::new(e.clone(), attr.expr.range().clone()))
            .collect();
        let want = block_schema.label_names.len();
        if label_exprs.len() != want {
            let summary = if label_exprs.len() > want {
                "Extraneous dynamic block label"
            } else {
                "Insufficient dynamic block labels"
            };
            diags.push(
                Diagnostic::error(summary, format!("Blocks of type {:?} require {want} label(s).", block_schema.ty))
                    .with_subject(attr.expr.range()),
            );
            return (None, diags);
        }
    }

    let mut content_blocks = content.blocks.iter();
    if content_blocks.next().is_none() {
        diags.push(
            Diagnostic::error(
                "Missing dynamic content block",
                "A dynamic block must have a nested block of type \"content\" to describe the body of each generated block.",
            )
            .with_subject(&raw.def_range),
        );
        return (None, diags);
    }
    if let Some(extra) = content_blocks.next() {
        diags.push(
            Diagnostic::error(
                "Extraneous dynamic content block",
                "Only one nested content block is allowed for each dynamic block.",
            )
            .with_subject(&extra.def_range),
        );
        return (None, diags);
    }

    // `content` was read through a schema, so go back to the raw block for
    // the full body.
    let Some(raw_content) = raw.body.blocks_of_type("content").next() else {
        return (None, diags);
    };

    let spec = ExpandSpec {
        block_type: block_schema.ty.clone(),
        block_type_range: raw.label_ranges.first().cloned().unwrap_or_else(|| raw.type_range.clone()),
        def_range: raw.def_range.clone(),
        for_each,
        iterator_name,
        label_exprs,
        content: &raw_content.body,
    };
    (Some(spec), diags)
}

impl<'b> ExpandSpec<'b> {
    /// The header of the block generated for `iteration`; the body is the
    /// content block's, still unexpanded. `None` when a label is not known
    /// yet or is invalid.
    pub(crate) fn new_block(
        &self,
        ctx: &EvalContext<'_>,
        iteration: &DynamicIteration,
        meta_arg: Option<&MetaArgIteration>,
    ) -> (Option<Block>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut labels = Vec::with_capacity(self.label_exprs.len());
        let mut label_ranges = Vec::with_capacity(self.label_exprs.len());

        for expr in &self.label_exprs {
            let value = match with_iterations(ctx, Some(iteration), meta_arg, |ctx| evaluate_expression(expr, ctx)) {
                Ok(v) => v,
                Err(e) => {
                    diags.push(e.to_diagnostic(expr.range()));
                    return (None, diags);
                }
            };
            let invalid = |detail: String| {
                Diagnostic::error("Invalid dynamic block label", detail).with_subject(expr.range())
            };
            if value.is_marked() {
                diags.push(invalid("Cannot use a marked value as a dynamic block label.".into()));
                return (None, diags);
            }
            let value = match convert(value, &Type::String) {
                Ok(v) => v,
                Err(e) => {
                    diags.push(invalid(format!("Cannot use this value as a dynamic block label: {e}.")));
                    return (None, diags);
                }
            };
            if value.is_null() {
                diags.push(invalid("Cannot use a null value as a dynamic block label.".into()));
                return (None, diags);
            }
            let Value::String(label) = value else {
                return (None, diags);
            };
            labels.push(label);
            label_ranges.push(expr.range().clone());
        }

        let block = Block {
            ty: self.block_type.clone(),
            labels,
            body: self.content.clone(),
            def_range: self.def_range.clone(),
            type_range: self.block_type_range.clone(),
            label_ranges,
        };
        (Some(block), diags)
    }
}
