use crate::hclext::{Block, BodySchema, Diagnostic, Diagnostics, Expression, SourceRange};
use crate::lang::evaluate_constant;
use crate::value::{convert, type_constraint, Type, TypeDefaults, Value};

/// How a variable value given as a raw string (environment, command line) is
/// read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableParsingMode {
    /// The string itself is the value.
    Literal,
    /// The string is an expression.
    Hcl,
}

impl VariableParsingMode {
    /// Parses `raw` as the value of the variable `name`. Diagnostics point
    /// into a synthetic file named after the variable.
    pub fn parse(self, name: &str, raw: &str) -> (Value, Diagnostics) {
        match self {
            VariableParsingMode::Literal => (Value::from(raw), Diagnostics::new()),
            VariableParsingMode::Hcl => {
                let filename = format!("<value for var.{name}>");
                let expr = match Expression::parse(raw, &filename) {
                    Ok(expr) => expr,
                    Err(diag) => return (Value::dynamic(), diag.into()),
                };
                match evaluate_constant(expr.hcl()) {
                    Ok(v) => (v, Diagnostics::new()),
                    Err(e) => (Value::dynamic(), e.to_diagnostic(expr.range()).into()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub default: Option<Value>,
    /// `constraint_type` without optional attribute markers.
    pub ty: Type,
    pub constraint_type: Type,
    pub type_defaults: TypeDefaults,
    pub parsing_mode: VariableParsingMode,
    pub sensitive: bool,
    pub nullable: bool,
    pub description: Option<String>,
    pub decl_range: SourceRange,
}

pub(crate) fn variable_block_schema() -> BodySchema {
    ["default", "type", "sensitive", "nullable", "description"]
        .into_iter()
        .fold(BodySchema::new(), |schema, name| schema.attribute(name))
}

pub(crate) fn decode_variable_block(block: &Block) -> (Variable, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut v = Variable {
        name: block.labels[0].clone(),
        default: None,
        ty: Type::Dynamic,
        constraint_type: Type::Dynamic,
        type_defaults: TypeDefaults::default(),
        parsing_mode: VariableParsingMode::Literal,
        sensitive: false,
        nullable: true,
        description: None,
        decl_range: block.def_range.clone(),
    };
    let body = &block.body;

    if let Some(attr) = body.find_attr("type") {
        let (ty, defaults, mode, d) = decode_variable_type(&attr.expr);
        diags.extend(d);
        v.ty = ty.without_optional_attributes();
        v.constraint_type = ty;
        v.type_defaults = defaults;
        v.parsing_mode = mode;
    }

    if let Some(attr) = body.find_attr("sensitive") {
        v.sensitive = decode_bool(&attr.expr, &mut diags).unwrap_or(false);
    }
    if let Some(attr) = body.find_attr("nullable") {
        v.nullable = decode_bool(&attr.expr, &mut diags).unwrap_or(true);
    }
    if let Some(attr) = body.find_attr("description") {
        if let Ok(Value::String(s)) = evaluate_constant(attr.expr.hcl()) {
            v.description = Some(s);
        }
    }

    if let Some(attr) = body.find_attr("default") {
        let value = match evaluate_constant(attr.expr.hcl()) {
            Ok(value) => value,
            Err(e) => {
                diags.push(e.to_diagnostic(attr.expr.range()));
                Value::dynamic()
            }
        };
        let value = match convert(value, &v.constraint_type) {
            Ok(value) => value,
            Err(e) => {
                diags.push(
                    Diagnostic::error(
                        "Invalid default value for variable",
                        format!("This default value is not compatible with the variable's type constraint: {e}."),
                    )
                    .with_subject(attr.expr.range()),
                );
                Value::dynamic()
            }
        };
        v.default = Some(value);
    }

    (v, diags)
}

fn decode_bool(expr: &Expression, diags: &mut Diagnostics) -> Option<bool> {
    match evaluate_constant(expr.hcl()).map(|v| convert(v, &Type::Bool)) {
        Ok(Ok(Value::Bool(b))) => Some(b),
        Ok(_) => {
            diags.push(
                Diagnostic::error("Unsuitable value type", "Unsuitable value: a bool is required.")
                    .with_subject(expr.range()),
            );
            None
        }
        Err(e) => {
            diags.push(e.to_diagnostic(expr.range()));
            None
        }
    }
}

const QUOTED_TYPE_DETAIL: &str = "Terraform 0.11 and earlier required type constraints to be given in quotes, but that form is now deprecated and will be removed in a future version of Terraform.";

fn decode_variable_type(expr: &Expression) -> (Type, TypeDefaults, VariableParsingMode, Diagnostics) {
    let range = expr.range();
    let fail = |mode, diag: Diagnostic| (Type::Dynamic, TypeDefaults::default(), mode, Diagnostics::from(diag));

    if let hcl::Expression::String(quoted) = expr.hcl() {
        let quoted_error = |extra: &str| {
            Diagnostic::error(
                "Invalid quoted type constraints",
                format!("{QUOTED_TYPE_DETAIL} Remove the quotes around \"{quoted}\"{extra}."),
            )
            .with_subject(range)
        };
        return match quoted.as_str() {
            "string" => fail(VariableParsingMode::Literal, quoted_error("")),
            "list" | "map" => fail(
                VariableParsingMode::Hcl,
                quoted_error(&format!(
                    " and write {quoted}(string) instead to explicitly indicate that the {quoted} elements are strings"
                )),
            ),
            _ => fail(
                VariableParsingMode::Hcl,
                Diagnostic::error(
                    "Invalid legacy variable type hint",
                    "To provide a full type expression, remove the surrounding quotes and give the type expression directly.",
                )
                .with_subject(range),
            ),
        };
    }

    // Bare `list` and `map` accept any element type, as long as the elements
    // agree with each other.
    if let hcl::Expression::Variable(keyword) = expr.hcl() {
        match keyword.as_str() {
            "list" => {
                return (
                    Type::list(Type::Dynamic),
                    TypeDefaults::default(),
                    VariableParsingMode::Hcl,
                    Diagnostics::new(),
                )
            }
            "map" => {
                return (
                    Type::map(Type::Dynamic),
                    TypeDefaults::default(),
                    VariableParsingMode::Hcl,
                    Diagnostics::new(),
                )
            }
            _ => {}
        }
    }

    match type_constraint(expr.hcl()) {
        Ok((ty, defaults)) => {
            let mode = if ty.is_primitive() {
                VariableParsingMode::Literal
            } else {
                VariableParsingMode::Hcl
            };
            (ty, defaults, mode, Diagnostics::new())
        }
        Err(detail) => fail(
            VariableParsingMode::Hcl,
            Diagnostic::error("Invalid type specification", detail).with_subject(range),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::{parse_file, BlockSchema};

    fn decode(src: &str) -> (Variable, Diagnostics) {
        let body = parse_file(src, "variables.tf").unwrap();
        let schema = BodySchema::new().block(BlockSchema::new("variable", &["name"]).body(variable_block_schema()));
        let (content, diags) = body.partial_content(&schema);
        assert!(diags.is_empty(), "{diags}");
        decode_variable_block(&content.blocks[0])
    }

    #[test]
    fn untyped_variable() {
        let (v, diags) = decode("variable \"x\" {\n  default = \"v\"\n}\n");
        assert!(diags.is_empty());
        assert_eq!(v.name, "x");
        assert_eq!(v.default, Some(Value::from("v")));
        assert_eq!(v.parsing_mode, VariableParsingMode::Literal);
        assert!(v.nullable);
    }

    #[test]
    fn typed_variable_converts_default() {
        let (v, diags) = decode("variable \"ids\" {\n  type = list(string)\n  default = [1, 2]\n  sensitive = true\n}\n");
        assert!(diags.is_empty());
        assert_eq!(v.ty, Type::list(Type::String));
        assert_eq!(v.parsing_mode, VariableParsingMode::Hcl);
        assert!(v.sensitive);
        assert_eq!(
            v.default,
            Some(Value::List(Type::String, vec![Value::from("1"), Value::from("2")]))
        );
    }

    #[test]
    fn bare_collection_keywords() {
        let (v, diags) = decode("variable \"m\" {\n  type = map\n}\n");
        assert!(diags.is_empty());
        assert_eq!(v.ty, Type::map(Type::Dynamic));
    }

    #[test]
    fn incompatible_default() {
        let (v, diags) = decode("variable \"n\" {\n  type = number\n  default = \"abc\"\n}\n");
        assert_eq!(diags[0].summary, "Invalid default value for variable");
        assert_eq!(v.default, Some(Value::dynamic()));
    }

    #[test]
    fn quoted_types_are_rejected() {
        let (_, diags) = decode("variable \"s\" {\n  type = \"string\"\n}\n");
        assert_eq!(diags[0].summary, "Invalid quoted type constraints");
        let (_, diags) = decode("variable \"s\" {\n  type = \"foo\"\n}\n");
        assert_eq!(diags[0].summary, "Invalid legacy variable type hint");
    }

    #[test]
    fn parsing_modes() {
        let (v, diags) = VariableParsingMode::Literal.parse("x", "[1]");
        assert!(diags.is_empty());
        assert_eq!(v, Value::from("[1]"));
        let (v, diags) = VariableParsingMode::Hcl.parse("x", "[1, \"a\"]");
        assert!(diags.is_empty());
        assert_eq!(v, Value::Tuple(vec![Value::from(1), Value::from("a")]));
        let (_, diags) = VariableParsingMode::Hcl.parse("x", "var.y");
        assert!(diags.has_errors());
    }
}
