use super::expand_body::META_ARG_BLOCKS;
use crate::addrs::Traversal;
use crate::hclext::{Body, BodySchema, Expression, SchemaMode, SourceRange};
use crate::lang::traversals;

/// The traversals an expansion of `body` under `schema` needs values for.
///
/// Only parts `schema` selects are visited, plus the `for_each`/`labels` of
/// `dynamic` blocks and the `count`/`for_each` of resource and module
/// blocks. Iterator variables of enclosing `dynamic` blocks are left out.
pub fn expand_variables(body: &Body, schema: &BodySchema) -> Vec<(Traversal, SourceRange)> {
    let mut out = Vec::new();
    walk(body, schema, &mut Vec::new(), &mut out);
    out
}

fn collect(expr: &Expression, iterators: &[String], out: &mut Vec<(Traversal, SourceRange)>) {
    if expr.is_bound() {
        return;
    }
    for traversal in traversals(expr.hcl()) {
        if !iterators.contains(&traversal.root) {
            out.push((traversal, expr.range().clone()));
        }
    }
}

fn walk(body: &Body, schema: &BodySchema, iterators: &mut Vec<String>, out: &mut Vec<(Traversal, SourceRange)>) {
    if schema.mode == SchemaMode::JustAttributes {
        for attr in body.attributes.values() {
            collect(&attr.expr, iterators, out);
        }
        return;
    }
    for attr_schema in &schema.attributes {
        if let Some(attr) = body.find_attr(&attr_schema.name) {
            collect(&attr.expr, iterators, out);
        }
    }

    for block in &body.blocks {
        if block.ty == "dynamic" {
            let Some(block_schema) = block.labels.first().and_then(|ty| schema.block_schema(ty)) else {
                continue;
            };
            for name in ["for_each", "labels"] {
                if let Some(attr) = block.body.find_attr(name) {
                    collect(&attr.expr, iterators, out);
                }
            }
            let iterator = match block.body.find_attr("iterator").map(|a| a.expr.hcl()) {
                Some(hcl::Expression::Variable(name)) => name.to_string(),
                _ => block_schema.ty.clone(),
            };
            iterators.push(iterator);
            for content in block.body.blocks_of_type("content") {
                walk(&content.body, &block_schema.body, iterators, out);
            }
            iterators.pop();
            continue;
        }

        let Some(block_schema) = schema.block_schema(&block.ty) else {
            continue;
        };
        if META_ARG_BLOCKS.contains(&block.ty.as_str()) {
            for name in ["count", "for_each"] {
                if let Some(attr) = block.body.find_attr(name) {
                    collect(&attr.expr, iterators, out);
                }
            }
        }
        walk(&block.body, &block_schema.body, iterators, out);
    }
}
