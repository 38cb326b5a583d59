use super::evaluator::Evaluator;
use super::variable::{decode_variable_block, variable_block_schema, Variable};
use crate::addrs::{ModuleSource, ResourceMode};
use crate::hclext::{check_labels, Block, BlockSchema, Body, BodySchema, Diagnostic, Diagnostics, Expression, SchemaMode, SourceRange};
use crate::lang::evaluate_constant;
use crate::value::Value;
use std::collections::BTreeMap;

/// One parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub path: String,
    pub body: Body,
}

/// A `resource` or `data` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub mode: ResourceMode,
    pub ty: String,
    pub name: String,
    pub count: Option<Expression>,
    pub for_each: Option<Expression>,
    pub decl_range: SourceRange,
}

/// One entry of a `locals` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub expr: Expression,
    pub decl_range: SourceRange,
}

/// A `module` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
    pub name: String,
    pub source_addr: Option<ModuleSource>,
    pub source_addr_raw: String,
    pub version: Option<String>,
    pub count: Option<Expression>,
    pub for_each: Option<Expression>,
    /// The block as written, arguments included.
    pub block: Block,
    pub decl_range: SourceRange,
}

/// The declarations of one module directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Keyed by type, then name.
    pub managed_resources: BTreeMap<String, BTreeMap<String, Resource>>,
    pub data_resources: BTreeMap<String, BTreeMap<String, Resource>>,
    pub variables: BTreeMap<String, Variable>,
    pub locals: BTreeMap<String, Local>,
    pub module_calls: BTreeMap<String, ModuleCall>,
    pub source_dir: String,
    pub sources: BTreeMap<String, String>,
    primaries: Vec<File>,
    overrides: Vec<File>,
}

impl Module {
    pub fn new(source_dir: impl Into<String>, primaries: Vec<File>, overrides: Vec<File>) -> Self {
        Self {
            source_dir: source_dir.into(),
            primaries,
            overrides,
            ..Self::default()
        }
    }

    pub fn primaries(&self) -> &[File] {
        &self.primaries
    }

    pub fn overrides(&self) -> &[File] {
        &self.overrides
    }

    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.primaries.iter().chain(&self.overrides)
    }

    /// Decodes the declarations of all files, overrides applied.
    pub fn build(&mut self) -> Diagnostics {
        let (body, mut diags) = self.partial_content(&module_schema(), None);
        if diags.has_errors() {
            return diags;
        }
        let raw_calls = self.raw_blocks("module");

        for block in &body.blocks {
            match block.ty.as_str() {
                "resource" | "data" => {
                    let (resource, d) = decode_resource_block(block);
                    diags.extend(d);
                    let (group, kind) = match resource.mode {
                        ResourceMode::Managed => (&mut self.managed_resources, "resource"),
                        ResourceMode::Data => (&mut self.data_resources, "data"),
                    };
                    let by_name = group.entry(resource.ty.clone()).or_default();
                    if let Some(existing) = by_name.get(&resource.name) {
                        diags.push(
                            Diagnostic::error(
                                format!("Duplicate {kind} \"{}\" configuration", resource.ty),
                                format!(
                                    "A {kind} {} \"{}\" was already declared at {}. Resource names must be unique per type in each module.",
                                    resource.ty, resource.name, existing.decl_range
                                ),
                            )
                            .with_subject(&resource.decl_range),
                        );
                        continue;
                    }
                    by_name.insert(resource.name.clone(), resource);
                }
                "variable" => {
                    let (variable, d) = decode_variable_block(block);
                    diags.extend(d);
                    if let Some(existing) = self.variables.get(&variable.name) {
                        diags.push(
                            Diagnostic::error(
                                "Duplicate variable declaration",
                                format!(
                                    "A variable named \"{}\" was already declared at {}. Variable names must be unique within a module.",
                                    variable.name, existing.decl_range
                                ),
                            )
                            .with_subject(&variable.decl_range),
                        );
                        continue;
                    }
                    self.variables.insert(variable.name.clone(), variable);
                }
                "locals" => {
                    for attr in block.body.attributes.values() {
                        if let Some(existing) = self.locals.get(&attr.name) {
                            diags.push(
                                Diagnostic::error(
                                    "Duplicate local value definition",
                                    format!(
                                        "A local value named \"{}\" was already defined at {}. Local value names must be unique within a module.",
                                        attr.name, existing.decl_range
                                    ),
                                )
                                .with_subject(&attr.name_range),
                            );
                            continue;
                        }
                        self.locals.insert(
                            attr.name.clone(),
                            Local {
                                name: attr.name.clone(),
                                expr: attr.expr.clone(),
                                decl_range: attr.range.clone(),
                            },
                        );
                    }
                }
                "module" => {
                    let raw = raw_calls.iter().find(|b| b.labels == block.labels).unwrap_or(block);
                    let (call, d) = decode_module_block(block, raw);
                    diags.extend(d);
                    if let Some(existing) = self.module_calls.get(&call.name) {
                        diags.push(
                            Diagnostic::error(
                                "Duplicate module call",
                                format!(
                                    "A module call named \"{}\" was already defined at {}. Module calls must have unique names within a module.",
                                    call.name, existing.decl_range
                                ),
                            )
                            .with_subject(&call.decl_range),
                        );
                        continue;
                    }
                    self.module_calls.insert(call.name.clone(), call);
                }
                _ => {}
            }
        }

        diags
    }

    /// Blocks of type `ty` as written, every argument kept, overrides applied.
    fn raw_blocks(&self, ty: &str) -> Vec<Block> {
        self.merged_body()
            .blocks
            .into_iter()
            .filter(|b| b.ty == ty)
            .collect()
    }

    /// All files folded into one body as written: attributes of later files
    /// replace earlier ones, blocks accumulate, then override files patch
    /// the matching blocks.
    fn merged_body(&self) -> Body {
        let mut merged = Body::empty(
            self.primaries
                .first()
                .map(|f| f.body.missing_item_range.clone())
                .unwrap_or_default(),
        );
        for file in &self.primaries {
            merged.attributes.extend(file.body.attributes.clone());
            merged.blocks.extend(file.body.blocks.iter().cloned());
        }
        for file in &self.overrides {
            merged.attributes.extend(file.body.attributes.clone());
            override_blocks(&mut merged.blocks, file.body.blocks.clone());
        }
        merged
    }

    /// Extracts the content `schema` asks for from every file.
    ///
    /// Overrides are merged into the primary bodies first. With an
    /// evaluator, `dynamic` blocks and `count`/`for_each` are then expanded
    /// on the merged body, so every instance sees the overridden arguments;
    /// without one, `dynamic` blocks are read structurally and never
    /// evaluated.
    pub fn partial_content(&self, schema: &BodySchema, evaluator: Option<&Evaluator>) -> (Body, Diagnostics) {
        let merged = self.merged_body();
        match evaluator {
            Some(evaluator) => evaluator.expand_body(&merged, schema),
            None => structural_content(&merged, schema),
        }
    }
}

/// Patches `primaries` with `overrides` matched by type and labels. An
/// override without a primary counterpart is dropped.
pub fn override_blocks(primaries: &mut [Block], overrides: Vec<Block>) {
    for over in overrides {
        let Some(primary) = primaries
            .iter_mut()
            .rev()
            .find(|p| p.ty == over.ty && p.labels == over.labels)
        else {
            continue;
        };
        primary.body.attributes.extend(over.body.attributes);
        override_blocks(&mut primary.body.blocks, over.body.blocks);
    }
}

/// Extracts `schema` from `body` without evaluating anything. A
/// `dynamic "X"` block contributes its `content` blocks as blocks of type `X`
/// when `X` is requested, at every depth.
pub fn structural_content(body: &Body, schema: &BodySchema) -> (Body, Diagnostics) {
    let shallow = BodySchema {
        mode: schema.mode,
        attributes: schema.attributes.clone(),
        blocks: Vec::new(),
    };
    let (mut out, mut diags) = body.partial_content(&shallow);
    if schema.mode == SchemaMode::JustAttributes {
        return (out, diags);
    }

    for block in &body.blocks {
        if block.ty == "dynamic" {
            let [real_type] = block.labels.as_slice() else {
                continue;
            };
            let Some(block_schema) = schema.block_schema(real_type) else {
                continue;
            };
            for content in block.body.blocks_of_type("content") {
                let (inner, d) = structural_content(&content.body, &block_schema.body);
                diags.extend(d);
                out.blocks.push(Block {
                    ty: real_type.clone(),
                    labels: Vec::new(),
                    body: inner,
                    def_range: content.def_range.clone(),
                    type_range: block.type_range.clone(),
                    label_ranges: Vec::new(),
                });
            }
            continue;
        }

        let Some(block_schema) = schema.block_schema(&block.ty) else {
            continue;
        };
        if let Some(diag) = check_labels(block, &block_schema.label_names) {
            diags.push(diag);
            continue;
        }
        let (inner, d) = structural_content(&block.body, &block_schema.body);
        diags.extend(d);
        out.blocks.push(Block {
            body: inner,
            ..block.clone()
        });
    }

    (out, diags)
}

pub(crate) fn module_schema() -> BodySchema {
    BodySchema::new()
        .block(BlockSchema::new("resource", &["type", "name"]).body(expandable_schema()))
        .block(BlockSchema::new("data", &["type", "name"]).body(expandable_schema()))
        .block(BlockSchema::new("variable", &["name"]).body(variable_block_schema()))
        .block(BlockSchema::new("locals", &[]).body(BodySchema::just_attributes()))
        .block(
            BlockSchema::new("module", &["name"]).body(
                expandable_schema()
                    .attribute("source")
                    .attribute("version"),
            ),
        )
}

fn expandable_schema() -> BodySchema {
    BodySchema::new().attribute("count").attribute("for_each")
}

fn decode_resource_block(block: &Block) -> (Resource, Diagnostics) {
    let mode = if block.ty == "data" {
        ResourceMode::Data
    } else {
        ResourceMode::Managed
    };
    let count = block.body.find_attr("count").map(|a| a.expr.clone());
    let for_each = block.body.find_attr("for_each").map(|a| a.expr.clone());
    let diags = exclusive_meta_arguments(block);
    (
        Resource {
            mode,
            ty: block.labels[0].clone(),
            name: block.labels[1].clone(),
            count,
            for_each,
            decl_range: block.def_range.clone(),
        },
        diags,
    )
}

fn exclusive_meta_arguments(block: &Block) -> Diagnostics {
    match (block.body.find_attr("count"), block.body.find_attr("for_each")) {
        (Some(_), Some(for_each)) => Diagnostic::error(
            "Invalid combination of \"count\" and \"for_each\"",
            "The \"count\" and \"for_each\" meta-arguments are mutually-exclusive, only one should be used to be explicit about the number of resources to be created.",
        )
        .with_subject(&for_each.name_range)
        .into(),
        _ => Diagnostics::new(),
    }
}

fn decode_module_block(block: &Block, raw: &Block) -> (ModuleCall, Diagnostics) {
    let mut diags = exclusive_meta_arguments(block);
    let mut call = ModuleCall {
        name: block.labels[0].clone(),
        source_addr: None,
        source_addr_raw: String::new(),
        version: None,
        count: block.body.find_attr("count").map(|a| a.expr.clone()),
        for_each: block.body.find_attr("for_each").map(|a| a.expr.clone()),
        block: raw.clone(),
        decl_range: block.def_range.clone(),
    };

    if let Some(attr) = block.body.find_attr("source") {
        match evaluate_constant(attr.expr.hcl()) {
            Ok(Value::String(raw)) => {
                call.source_addr = Some(ModuleSource::parse(&raw));
                call.source_addr_raw = raw;
            }
            _ => diags.push(
                Diagnostic::error(
                    "Invalid module source address",
                    "The module source address must be a literal string.",
                )
                .with_subject(attr.expr.range()),
            ),
        }
    }
    if let Some(attr) = block.body.find_attr("version") {
        match evaluate_constant(attr.expr.hcl()) {
            Ok(Value::String(v)) => call.version = Some(v),
            _ => diags.push(
                Diagnostic::error(
                    "Invalid version constraint",
                    "This string does not use correct version constraint syntax.",
                )
                .with_subject(attr.expr.range()),
            ),
        }
    }

    (call, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::parse_file;

    fn file(path: &str, src: &str) -> File {
        File {
            path: path.to_string(),
            body: parse_file(src, path).unwrap(),
        }
    }

    fn attr_value(body: &Body, name: &str) -> Value {
        evaluate_constant(body.find_attr(name).unwrap().expr.hcl()).unwrap()
    }

    #[test]
    fn build_decodes_declarations() {
        let mut module = Module::new(
            ".",
            vec![file(
                "main.tf",
                r#"
                variable "region" {
                  default = "us-east-1"
                }
                locals {
                  name = "web"
                }
                resource "aws_instance" "web" {
                  count = 2
                }
                data "aws_ami" "ubuntu" {}
                module "vpc" {
                  source  = "./modules/vpc"
                  version = "1.0"
                }
                "#,
            )],
            vec![],
        );
        let diags = module.build();
        assert!(diags.is_empty(), "{diags}");
        assert!(module.variables.contains_key("region"));
        assert!(module.locals.contains_key("name"));
        assert!(module.managed_resources["aws_instance"]["web"].count.is_some());
        assert!(module.data_resources["aws_ami"].contains_key("ubuntu"));
        let call = &module.module_calls["vpc"];
        assert_eq!(call.source_addr, Some(ModuleSource::Local("./modules/vpc".into())));
        assert_eq!(call.version.as_deref(), Some("1.0"));
        assert!(call.block.body.find_attr("source").is_some());
    }

    #[test]
    fn module_call_keeps_inputs() {
        let mut module = Module::new(
            ".",
            vec![file("main.tf", "module \"app\" {\n  source = \"./app\"\n  name = \"a\"\n}\n")],
            vec![file("override.tf", "module \"app\" {\n  name = \"b\"\n}\n")],
        );
        assert!(module.build().is_empty());
        let block = &module.module_calls["app"].block;
        assert_eq!(attr_value(&block.body, "name"), Value::from("b"));
    }

    #[test]
    fn duplicates_are_reported() {
        let mut module = Module::new(
            ".",
            vec![
                file("a.tf", "variable \"x\" {}\nlocals {\n  y = 1\n}\n"),
                file("b.tf", "variable \"x\" {}\nlocals {\n  y = 2\n}\n"),
            ],
            vec![],
        );
        let diags = module.build();
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Duplicate variable declaration", "Duplicate local value definition"]
        );
    }

    #[test]
    fn count_and_for_each_are_exclusive() {
        let mut module = Module::new(
            ".",
            vec![file("main.tf", "resource \"a\" \"b\" {\n  count = 1\n  for_each = {}\n}\n")],
            vec![],
        );
        let diags = module.build();
        assert_eq!(diags[0].summary, "Invalid combination of \"count\" and \"for_each\"");
    }

    #[test]
    fn overrides_patch_matching_blocks() {
        let module = Module::new(
            ".",
            vec![file(
                "main.tf",
                r#"
                resource "aws_instance" "web" {
                  ami           = "ami-1"
                  instance_type = "t2.micro"
                  ebs {
                    size = 10
                  }
                }
                "#,
            )],
            vec![file(
                "override.tf",
                r#"
                resource "aws_instance" "web" {
                  instance_type = "m5.large"
                  ebs {
                    size = 20
                  }
                }
                resource "aws_instance" "missing" {
                  ami = "ami-2"
                }
                "#,
            )],
        );
        let schema = BodySchema::new().block(
            BlockSchema::new("resource", &["type", "name"]).body(
                BodySchema::new()
                    .attribute("ami")
                    .attribute("instance_type")
                    .block(BlockSchema::new("ebs", &[]).body(BodySchema::new().attribute("size"))),
            ),
        );
        let (content, diags) = module.partial_content(&schema, None);
        assert!(diags.is_empty());
        assert_eq!(content.blocks.len(), 1);
        let web = &content.blocks[0].body;
        assert_eq!(attr_value(web, "ami"), Value::from("ami-1"));
        assert_eq!(attr_value(web, "instance_type"), Value::from("m5.large"));
        assert_eq!(attr_value(&web.blocks[0].body, "size"), Value::from(20));
    }

    #[test]
    fn override_is_idempotent() {
        let base = file("main.tf", "resource \"a\" \"b\" {\n  x = 1\n  y = 2\n}\n").body.blocks;
        let over = file("override.tf", "resource \"a\" \"b\" {\n  y = 3\n}\n").body.blocks;
        let mut once = base.clone();
        override_blocks(&mut once, over.clone());
        let mut twice = once.clone();
        override_blocks(&mut twice, over);
        assert_eq!(once[0].body.attributes, twice[0].body.attributes);
    }

    #[test]
    fn dynamic_blocks_read_structurally() {
        let module = Module::new(
            ".",
            vec![file(
                "main.tf",
                r#"
                resource "aws_security_group" "sg" {
                  ingress {
                    from_port = 22
                  }
                  dynamic "ingress" {
                    for_each = var.ports
                    content {
                      from_port = ingress.value
                    }
                  }
                }
                "#,
            )],
            vec![],
        );
        let schema = BodySchema::new().block(
            BlockSchema::new("resource", &["type", "name"]).body(
                BodySchema::new().block(BlockSchema::new("ingress", &[]).body(BodySchema::new().attribute("from_port"))),
            ),
        );
        let (content, diags) = module.partial_content(&schema, None);
        assert!(diags.is_empty(), "{diags}");
        let blocks = &content.blocks[0].body.blocks;
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.ty == "ingress"));
        assert!(blocks[1].body.find_attr("from_port").is_some());
    }
}
