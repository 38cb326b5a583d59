use super::expand_spec::decode_dynamic_spec;
use super::iteration::{with_iterations, DynamicIteration, MetaArgIteration};
use super::meta_args::{count_instances, for_each_instances};
use crate::hclext::{
    check_labels, Attribute, Block, BlockSchema, Body, BodySchema, Diagnostic, Diagnostics, SchemaMode,
};
use crate::lang::{evaluate_expression, EvalContext};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Block types whose `count` and `for_each` arguments multiply the block.
pub(crate) const META_ARG_BLOCKS: [&str; 3] = ["resource", "data", "module"];

/// A view of a body in which `dynamic` blocks and `count`/`for_each` blocks
/// are expanded when content is requested.
///
/// The original body is never modified. Each query produces concrete content
/// plus a remainder view that hides what the query took.
#[derive(Debug, Clone)]
pub struct ExpandBody<'b, 'c> {
    original: &'b Body,
    ctx: &'c EvalContext<'c>,
    dynamic_iteration: Option<DynamicIteration>,
    meta_arg_iteration: Option<MetaArgIteration>,
    hidden_attrs: BTreeSet<String>,
    hidden_blocks: BTreeSet<String>,
}

/// Expands `body` as `schema` asks, evaluating in `ctx`.
pub fn expand(body: &Body, ctx: &EvalContext<'_>, schema: &BodySchema) -> (Body, Diagnostics) {
    let (content, _, diags) = ExpandBody::new(body, ctx).partial_content(schema);
    (content, diags)
}

impl<'b, 'c> ExpandBody<'b, 'c> {
    pub fn new(original: &'b Body, ctx: &'c EvalContext<'c>) -> Self {
        Self {
            original,
            ctx,
            dynamic_iteration: None,
            meta_arg_iteration: None,
            hidden_attrs: BTreeSet::new(),
            hidden_blocks: BTreeSet::new(),
        }
    }

    /// A view of a nested body that keeps the iterations in scope.
    fn child<'n>(
        &self,
        original: &'n Body,
        dynamic_iteration: Option<DynamicIteration>,
        meta_arg_iteration: Option<MetaArgIteration>,
    ) -> ExpandBody<'n, 'c> {
        ExpandBody {
            original,
            ctx: self.ctx,
            dynamic_iteration,
            meta_arg_iteration,
            hidden_attrs: BTreeSet::new(),
            hidden_blocks: BTreeSet::new(),
        }
    }

    fn evaluate(&self, expr: &crate::hclext::Expression) -> Result<Value, Diagnostic> {
        with_iterations(
            self.ctx,
            self.dynamic_iteration.as_ref(),
            self.meta_arg_iteration.as_ref(),
            |ctx| evaluate_expression(expr, ctx),
        )
        .map_err(|e| e.to_diagnostic(expr.range()))
    }

    fn in_iteration(&self) -> bool {
        self.dynamic_iteration.is_some() || self.meta_arg_iteration.is_some()
    }

    /// Extracts `schema`'s content; the remainder hides everything `schema`
    /// names.
    pub fn partial_content(&self, schema: &BodySchema) -> (Body, ExpandBody<'b, 'c>, Diagnostics) {
        self.extract(schema, true)
    }

    fn extract(&self, schema: &BodySchema, partial: bool) -> (Body, ExpandBody<'b, 'c>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut out = Body::empty(self.original.missing_item_range.clone());

        if schema.mode == SchemaMode::JustAttributes {
            let (attrs, d) = self.just_attributes();
            diags.extend(d);
            out.attributes = attrs;
            return (out, self.clone(), diags);
        }

        let mut raw_attrs = BTreeMap::new();
        for attr_schema in &schema.attributes {
            if self.hidden_attrs.contains(&attr_schema.name) {
                continue;
            }
            match self.original.find_attr(&attr_schema.name) {
                Some(attr) => {
                    raw_attrs.insert(attr.name.clone(), attr);
                }
                None if attr_schema.required => diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            attr_schema.name
                        ),
                    )
                    .with_subject(&self.original.missing_item_range),
                ),
                None => {}
            }
        }
        let (attrs, d) = self.prepare_attributes(raw_attrs);
        diags.extend(d);
        out.attributes = attrs;

        let (blocks, d) = self.expand_blocks(schema, partial);
        diags.extend(d);
        out.blocks = blocks;

        let mut remain = self.clone();
        remain
            .hidden_attrs
            .extend(schema.attributes.iter().map(|a| a.name.clone()));
        remain
            .hidden_blocks
            .extend(schema.blocks.iter().map(|b| b.ty.clone()));

        (out, remain, diags)
    }

    /// Like `partial_content`, but arguments and blocks outside `schema`
    /// are errors.
    pub fn content(&self, schema: &BodySchema) -> (Body, Diagnostics) {
        let (out, _, mut diags) = self.extract(schema, false);
        if schema.mode == SchemaMode::JustAttributes {
            return (out, diags);
        }
        for attr in self.original.attributes.values() {
            if !self.hidden_attrs.contains(&attr.name) && !schema.has_attribute(&attr.name) {
                diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named \"{}\" is not expected here.", attr.name),
                    )
                    .with_subject(&attr.name_range),
                );
            }
        }
        for block in &self.original.blocks {
            if block.ty != "dynamic"
                && !self.hidden_blocks.contains(&block.ty)
                && schema.block_schema(&block.ty).is_none()
            {
                diags.push(
                    Diagnostic::error(
                        "Unsupported block type",
                        format!("Blocks of type \"{}\" are not expected here.", block.ty),
                    )
                    .with_subject(&block.type_range),
                );
            }
        }
        (out, diags)
    }

    /// Every visible attribute, evaluated when inside an iteration.
    pub fn just_attributes(&self) -> (BTreeMap<String, Attribute>, Diagnostics) {
        let mut diags = Diagnostics::new();
        for block in &self.original.blocks {
            if !self.hidden_blocks.contains(&block.ty) {
                diags.push(
                    Diagnostic::error(
                        format!("Unexpected \"{}\" block", block.ty),
                        "Blocks are not allowed here.",
                    )
                    .with_subject(&block.type_range),
                );
            }
        }
        let raw = self
            .original
            .attributes
            .iter()
            .filter(|(name, _)| !self.hidden_attrs.contains(*name))
            .map(|(name, attr)| (name.clone(), attr))
            .collect();
        let (attrs, d) = self.prepare_attributes(raw);
        diags.extend(d);
        (attrs, diags)
    }

    /// Inside an iteration, attributes are evaluated right away so that
    /// the iterator values are captured. Values containing marks stay
    /// unbound.
    fn prepare_attributes(&self, raw: BTreeMap<String, &Attribute>) -> (BTreeMap<String, Attribute>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut out = BTreeMap::new();
        for (name, attr) in raw {
            let mut attr = attr.clone();
            if self.in_iteration() {
                match self.evaluate(&attr.expr) {
                    Ok(value) => {
                        if !value.contains_marked() {
                            attr.expr.bind(value);
                        }
                    }
                    Err(diag) => {
                        diags.push(diag);
                        continue;
                    }
                }
            }
            out.insert(name, attr);
        }
        (out, diags)
    }

    fn expand_blocks(&self, schema: &BodySchema, partial: bool) -> (Vec<Block>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut blocks = Vec::new();

        for raw in &self.original.blocks {
            if raw.ty == "dynamic" {
                let (expanded, d) = self.expand_dynamic_block(schema, raw, partial);
                diags.extend(d);
                blocks.extend(expanded);
                continue;
            }
            if self.hidden_blocks.contains(&raw.ty) {
                continue;
            }
            let Some(block_schema) = schema.block_schema(&raw.ty) else {
                continue;
            };
            if let Some(diag) = check_labels(raw, &block_schema.label_names) {
                diags.push(diag);
                continue;
            }
            let (expanded, d) = if META_ARG_BLOCKS.contains(&raw.ty.as_str()) {
                self.expand_meta_arg_block(block_schema, raw)
            } else {
                let (block, d) = self.expand_child(
                    block_schema,
                    raw,
                    self.dynamic_iteration.clone(),
                    self.meta_arg_iteration.clone(),
                );
                (vec![block], d)
            };
            diags.extend(d);
            blocks.extend(expanded);
        }

        (blocks, diags)
    }

    /// `block` with its body expanded under the given iterations.
    fn expand_child(
        &self,
        block_schema: &BlockSchema,
        block: &Block,
        dynamic_iteration: Option<DynamicIteration>,
        meta_arg_iteration: Option<MetaArgIteration>,
    ) -> (Block, Diagnostics) {
        let child = self.child(&block.body, dynamic_iteration, meta_arg_iteration);
        let (body, _, diags) = child.partial_content(&block_schema.body);
        (
            Block {
                body,
                ..block.clone()
            },
            diags,
        )
    }

    fn expand_dynamic_block(&self, schema: &BodySchema, raw: &Block, partial: bool) -> (Vec<Block>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let Some(real_type) = raw.labels.first() else {
            return (Vec::new(), diags);
        };
        if self.hidden_blocks.contains(real_type) {
            return (Vec::new(), diags);
        }
        let Some(block_schema) = schema.block_schema(real_type) else {
            if !partial {
                diags.push(
                    Diagnostic::error(
                        "Unsupported block type",
                        format!("Blocks of type {real_type:?} are not expected here."),
                    )
                    .with_subject(raw.label_ranges.first().unwrap_or(&raw.type_range)),
                );
            }
            return (Vec::new(), diags);
        };

        let (spec, d) = decode_dynamic_spec(
            block_schema,
            raw,
            self.ctx,
            self.dynamic_iteration.as_ref(),
            self.meta_arg_iteration.as_ref(),
        );
        diags.extend(d);
        let Some(spec) = spec else {
            return (Vec::new(), diags);
        };
        if !spec.for_each.is_known() {
            return (Vec::new(), diags);
        }

        let (for_each, marked) = spec.for_each.clone().unmark();
        let mut blocks = Vec::new();
        for (key, value) in for_each.elements().unwrap_or_default() {
            let iteration = DynamicIteration::child(
                self.dynamic_iteration.as_ref(),
                &spec.iterator_name,
                key,
                value.mark_if(marked),
            );
            let (block, d) = spec.new_block(self.ctx, &iteration, self.meta_arg_iteration.as_ref());
            diags.extend(d);
            let Some(block) = block else {
                continue;
            };
            let (block, d) = self.expand_child(block_schema, &block, Some(iteration), self.meta_arg_iteration.clone());
            diags.extend(d);
            blocks.push(block);
        }
        (blocks, diags)
    }

    fn expand_meta_arg_block(&self, block_schema: &BlockSchema, raw: &Block) -> (Vec<Block>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut blocks = Vec::new();

        if let Some(attr) = raw.body.find_attr("count") {
            let value = match self.evaluate(&attr.expr) {
                Ok(v) => v,
                Err(diag) => return (blocks, diag.into()),
            };
            let count = match count_instances(value, attr.expr.range()) {
                Ok(Some(count)) => count,
                Ok(None) => {
                    log::debug!("count of {} is not known yet, skipping", raw.def_range);
                    return (blocks, diags);
                }
                Err(diag) => return (blocks, diag.into()),
            };
            for index in 0..count {
                let (block, d) = self.expand_child(
                    block_schema,
                    raw,
                    self.dynamic_iteration.clone(),
                    Some(MetaArgIteration::Count(index)),
                );
                diags.extend(d);
                blocks.push(block);
            }
            return (blocks, diags);
        }

        if let Some(attr) = raw.body.find_attr("for_each") {
            let value = match self.evaluate(&attr.expr) {
                Ok(v) => v,
                Err(diag) => return (blocks, diag.into()),
            };
            let elements = match for_each_instances(value, attr.expr.range()) {
                Ok(Some(elements)) => elements,
                Ok(None) => {
                    log::debug!("for_each of {} is not known yet, skipping", raw.def_range);
                    return (blocks, diags);
                }
                Err(diag) => return (blocks, diag.into()),
            };
            for (key, value) in elements {
                let (block, d) = self.expand_child(
                    block_schema,
                    raw,
                    self.dynamic_iteration.clone(),
                    Some(MetaArgIteration::ForEach { key, value }),
                );
                diags.extend(d);
                blocks.push(block);
            }
            return (blocks, diags);
        }

        let (block, d) = self.expand_child(
            block_schema,
            raw,
            self.dynamic_iteration.clone(),
            self.meta_arg_iteration.clone(),
        );
        diags.extend(d);
        blocks.push(block);
        (blocks, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::parse_file;
    use crate::value::Type;

    fn body(src: &str) -> Body {
        parse_file(src, "main.tf").unwrap()
    }

    fn bound(block: &Block, name: &str) -> Value {
        block.body.find_attr(name).unwrap().expr.bound_value().cloned().unwrap()
    }

    fn resource_schema(inner: BodySchema) -> BodySchema {
        BodySchema::new().block(BlockSchema::new("resource", &["type", "name"]).body(inner))
    }

    #[test]
    fn count_expands_with_index() {
        let b = body("resource \"null\" \"a\" {\n  count = 3\n  name = \"n-${count.index}\"\n}\n");
        let ctx = EvalContext::new();
        let (content, diags) = expand(&b, &ctx, &resource_schema(BodySchema::new().attribute("name")));
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(content.blocks.len(), 3);
        assert_eq!(bound(&content.blocks[2], "name"), Value::from("n-2"));
        assert!(b.blocks[0].body.find_attr("name").unwrap().expr.bound_value().is_none());
    }

    #[test]
    fn empty_and_unknown_meta_arguments_yield_nothing() {
        let mut ctx = EvalContext::new();
        ctx.declare_var(
            "var",
            Value::Object(BTreeMap::from([("n".to_string(), Value::unknown(Type::Number))])),
        );
        for src in [
            "resource \"a\" \"b\" {\n  count = 0\n}\n",
            "resource \"a\" \"b\" {\n  for_each = []\n}\n",
            "resource \"a\" \"b\" {\n  count = var.n\n}\n",
        ] {
            let (content, diags) = expand(&body(src), &ctx, &resource_schema(BodySchema::new()));
            assert!(content.blocks.is_empty(), "{src}");
            assert!(diags.is_empty(), "{src}: {diags}");
        }
    }

    #[test]
    fn invalid_meta_arguments() {
        let ctx = EvalContext::new();
        let cases = [
            ("count = null", "The given \"count\" argument value is null. An integer is required."),
            (
                "count = -1",
                "The given \"count\" argument value is unsuitable: negative numbers are not supported.",
            ),
            (
                "for_each = null",
                "The given \"for_each\" argument value is unsuitable: the given \"for_each\" argument value is null. A map, or set of strings is allowed.",
            ),
            ("for_each = 1", "`number` is not iterable"),
        ];
        for (arg, detail) in cases {
            let src = format!("resource \"a\" \"b\" {{\n  {arg}\n}}\n");
            let (content, diags) = expand(&body(&src), &ctx, &resource_schema(BodySchema::new()));
            assert!(content.blocks.is_empty());
            assert_eq!(diags[0].detail, detail);
        }
    }

    #[test]
    fn for_each_exposes_key_and_value() {
        let b = body("resource \"a\" \"b\" {\n  for_each = { x = 1, y = 2 }\n  v = \"${each.key}=${each.value}\"\n}\n");
        let ctx = EvalContext::new();
        let (content, diags) = expand(&b, &ctx, &resource_schema(BodySchema::new().attribute("v")));
        assert!(diags.is_empty());
        let values: Vec<Value> = content.blocks.iter().map(|blk| bound(blk, "v")).collect();
        assert_eq!(values, vec![Value::from("x=1"), Value::from("y=2")]);
    }

    #[test]
    fn nested_dynamic_blocks_see_both_iterators() {
        let b = body(
            r#"
            resource "aws_security_group" "sg" {
              dynamic "rule" {
                for_each = ["a"]
                content {
                  dynamic "port" {
                    for_each = ["x", "y"]
                    iterator = item
                    content {
                      name = "${rule.value}-${item.value}"
                    }
                  }
                }
              }
            }
            "#,
        );
        let schema = resource_schema(BodySchema::new().block(
            BlockSchema::new("rule", &[]).body(
                BodySchema::new().block(BlockSchema::new("port", &[]).body(BodySchema::new().attribute("name"))),
            ),
        ));
        let ctx = EvalContext::new();
        let (content, diags) = expand(&b, &ctx, &schema);
        assert!(diags.is_empty(), "{diags}");
        let rules = &content.blocks[0].body.blocks;
        assert_eq!(rules.len(), 1);
        let ports = &rules[0].body.blocks;
        assert_eq!(ports.len(), 2);
        assert_eq!(bound(&ports[0], "name"), Value::from("a-x"));
        assert_eq!(bound(&ports[1], "name"), Value::from("a-y"));
    }

    #[test]
    fn dynamic_block_errors() {
        let schema = BodySchema::new().block(BlockSchema::new("setting", &["name"]));
        let ctx = EvalContext::new();
        let cases = [
            ("for_each = 1\n labels = [\"a\"]\n content {}", "Invalid dynamic for_each value"),
            ("for_each = null\n labels = [\"a\"]\n content {}", "Invalid dynamic for_each value"),
            ("for_each = [1]\n iterator = a.b\n labels = [\"a\"]\n content {}", "Invalid dynamic iterator name"),
            ("for_each = [1]\n labels = [\"a\", \"b\"]\n content {}", "Extraneous dynamic block label"),
            ("for_each = [1]\n labels = []\n content {}", "Insufficient dynamic block labels"),
            ("for_each = [1]\n labels = [\"a\"]", "Missing dynamic content block"),
            ("for_each = [1]\n labels = [\"a\"]\n content {}\n content {}", "Extraneous dynamic content block"),
            ("for_each = [1]\n labels = [null]\n content {}", "Invalid dynamic block label"),
        ];
        for (inner, summary) in cases {
            let src = format!("dynamic \"setting\" {{\n {inner}\n}}\n");
            let (content, diags) = expand(&body(&src), &ctx, &schema);
            assert!(content.blocks.is_empty(), "{inner}");
            assert_eq!(diags[0].summary, summary, "{inner}");
        }
    }

    #[test]
    fn dynamic_blocks_with_pending_or_sensitive_values() {
        let schema = BodySchema::new().block(BlockSchema::new("setting", &["name"]));
        let mut ctx = EvalContext::new();
        ctx.declare_var(
            "var",
            Value::Object(BTreeMap::from([
                ("items".to_string(), Value::unknown(Type::List(Box::new(Type::String)))),
                ("name".to_string(), Value::unknown(Type::String)),
                ("secret".to_string(), Value::from("s").mark()),
            ])),
        );

        for inner in [
            "for_each = var.items\n labels = [\"a\"]\n content {}",
            "for_each = [1]\n labels = [var.name]\n content {}",
        ] {
            let src = format!("dynamic \"setting\" {{\n {inner}\n}}\n");
            let (content, diags) = expand(&body(&src), &ctx, &schema);
            assert!(content.blocks.is_empty(), "{inner}");
            assert!(diags.is_empty(), "{inner}: {diags}");
        }

        let src = "dynamic \"setting\" {\n for_each = [1]\n labels = [var.secret]\n content {}\n}\n";
        let (content, diags) = expand(&body(src), &ctx, &schema);
        assert!(content.blocks.is_empty());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Invalid dynamic block label");
        assert_eq!(diags[0].detail, "Cannot use a marked value as a dynamic block label.");
    }

    #[test]
    fn dynamic_labels_are_evaluated() {
        let b = body("dynamic \"setting\" {\n  for_each = { a = 1 }\n  labels = [setting.key]\n  content {\n    v = setting.value\n  }\n}\n");
        let schema = BodySchema::new().block(BlockSchema::new("setting", &["name"]).body(BodySchema::new().attribute("v")));
        let ctx = EvalContext::new();
        let (content, diags) = expand(&b, &ctx, &schema);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(content.blocks[0].labels, vec!["a".to_string()]);
        assert_eq!(bound(&content.blocks[0], "v"), Value::from(1));
    }

    #[test]
    fn remainder_hides_taken_content() {
        let b = body("a = 1\nb = 2\nx {}\ny {}\n");
        let ctx = EvalContext::new();
        let view = ExpandBody::new(&b, &ctx);
        let (first, remain, _) = view.partial_content(&BodySchema::new().attribute("a").block(BlockSchema::new("x", &[])));
        assert_eq!(first.attributes.len(), 1);
        assert_eq!(first.blocks.len(), 1);

        let (rest, diags) = remain.content(
            &BodySchema::new()
                .attribute("b")
                .block(BlockSchema::new("y", &[])),
        );
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(rest.attributes.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(rest.blocks.len(), 1);
        assert_eq!(rest.blocks[0].ty, "y");
    }
}
