use super::diagnostic::{Diagnostic, Diagnostics};
use super::range::SourceRange;
use super::schema::{BodySchema, SchemaMode};
use crate::value::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// An attribute expression together with where it came from.
///
/// Expansion may bind a concrete value to a copy of the expression; a bound
/// expression evaluates to that value regardless of its syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    expr: hcl::Expression,
    range: SourceRange,
    bound: Option<Value>,
}

impl Expression {
    pub fn new(expr: hcl::Expression, range: SourceRange) -> Self {
        Self {
            expr,
            range,
            bound: None,
        }
    }

    /// Parses a standalone expression, e.g. a variable value given on the
    /// command line. Positions are relative to the expression text.
    pub fn parse(src: &str, filename: &str) -> Result<Self, Diagnostic> {
        let expr = hcl::Expression::from_str(src).map_err(|e| {
            Diagnostic::error("Invalid expression", e.to_string())
                .with_subject(&SourceRange::file_start(filename))
        })?;
        let index = super::range::LineIndex::new(filename, src);
        Ok(Self::new(expr, index.range(0..src.len())))
    }

    pub fn hcl(&self) -> &hcl::Expression {
        &self.expr
    }

    pub fn range(&self) -> &SourceRange {
        &self.range
    }

    pub fn bound_value(&self) -> Option<&Value> {
        self.bound.as_ref()
    }

    pub fn bind(&mut self, value: Value) {
        self.bound = Some(value);
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expression,
    pub range: SourceRange,
    pub name_range: SourceRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub ty: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub def_range: SourceRange,
    pub type_range: SourceRange,
    pub label_ranges: Vec<SourceRange>,
}

/// A configuration body. The same shape serves parsed files and the content
/// extracted from them with a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub attributes: BTreeMap<String, Attribute>,
    pub blocks: Vec<Block>,
    pub missing_item_range: SourceRange,
}

impl Body {
    pub fn empty(missing_item_range: SourceRange) -> Self {
        Self {
            missing_item_range,
            ..Self::default()
        }
    }

    pub fn find_attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn blocks_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks.iter().filter(move |b| b.ty == ty)
    }

    /// Extracts what `schema` asks for and ignores everything else.
    pub fn partial_content(&self, schema: &BodySchema) -> (Body, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut out = Body::empty(self.missing_item_range.clone());

        if schema.mode == SchemaMode::JustAttributes {
            let (attrs, d) = self.just_attributes();
            diags.extend(d);
            out.attributes = attrs;
            return (out, diags);
        }

        for attr_schema in &schema.attributes {
            match self.attributes.get(&attr_schema.name) {
                Some(attr) => {
                    out.attributes.insert(attr.name.clone(), attr.clone());
                }
                None if attr_schema.required => diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            attr_schema.name
                        ),
                    )
                    .with_subject(&self.missing_item_range),
                ),
                None => {}
            }
        }

        for block in &self.blocks {
            let Some(block_schema) = schema.block_schema(&block.ty) else {
                continue;
            };
            if let Some(diag) = check_labels(block, &block_schema.label_names) {
                diags.push(diag);
                continue;
            }
            let (body, d) = block.body.partial_content(&block_schema.body);
            diags.extend(d);
            out.blocks.push(Block {
                body,
                ..block.clone()
            });
        }

        (out, diags)
    }

    /// Like `partial_content`, but anything the schema does not mention is an
    /// error.
    pub fn content(&self, schema: &BodySchema) -> (Body, Diagnostics) {
        let (out, mut diags) = self.partial_content(schema);
        if schema.mode == SchemaMode::JustAttributes {
            return (out, diags);
        }
        for attr in self.attributes.values() {
            if !schema.has_attribute(&attr.name) {
                diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named \"{}\" is not expected here.", attr.name),
                    )
                    .with_subject(&attr.name_range),
                );
            }
        }
        for block in &self.blocks {
            if schema.block_schema(&block.ty).is_none() {
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

    pub fn just_attributes(&self) -> (BTreeMap<String, Attribute>, Diagnostics) {
        let diags = self
            .blocks
            .iter()
            .map(|block| {
                Diagnostic::error(
                    format!("Unexpected \"{}\" block", block.ty),
                    "Blocks are not allowed here.",
                )
                .with_subject(&block.type_range)
            })
            .collect();
        (self.attributes.clone(), diags)
    }

    /// Every expression in this body, depth first.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut out: Vec<&Expression> = self.attributes.values().map(|a| &a.expr).collect();
        for block in &self.blocks {
            out.extend(block.body.expressions());
        }
        out
    }

    /// Visits every attribute of this body and of nested blocks.
    pub fn walk_attributes_mut(&mut self, f: &mut dyn FnMut(&mut Attribute)) {
        for attr in self.attributes.values_mut() {
            f(attr);
        }
        for block in &mut self.blocks {
            block.body.walk_attributes_mut(f);
        }
    }
}

pub(crate) fn check_labels(block: &Block, label_names: &[String]) -> Option<Diagnostic> {
    use std::cmp::Ordering;

    match block.labels.len().cmp(&label_names.len()) {
        Ordering::Equal => None,
        Ordering::Less => {
            let missing = &label_names[block.labels.len()];
            Some(
                Diagnostic::error(
                    format!("Missing {} for {}", missing, block.ty),
                    format!(
                        "All {} blocks must have {} labels ({}).",
                        block.ty,
                        label_names.len(),
                        label_names.join(", ")
                    ),
                )
                .with_subject(&block.def_range),
            )
        }
        Ordering::Greater => {
            let detail = if label_names.is_empty() {
                format!("No labels are expected for {} blocks.", block.ty)
            } else {
                format!(
                    "Only {} labels ({}) are expected for {} blocks.",
                    label_names.len(),
                    label_names.join(", "),
                    block.ty
                )
            };
            let subject = block
                .label_ranges
                .get(label_names.len())
                .unwrap_or(&block.def_range);
            Some(
                Diagnostic::error(format!("Extraneous label for {}", block.ty), detail)
                    .with_subject(subject),
            )
        }
    }
}
