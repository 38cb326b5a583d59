use super::{LintCheck, LintSeverity};
use crate::hclext::{BlockSchema, BodySchema, Diagnostics};
use crate::runner::{ExpandMode, Runner};
use crate::value::{Type, Value};

/// Variables need a non-empty `description`.
pub struct DocumentedVariables;

impl LintCheck for DocumentedVariables {
    fn name(&self) -> &'static str {
        "terraform_documented_variables"
    }

    fn default_severity(&self) -> LintSeverity {
        LintSeverity::Allow
    }

    fn check(&self, runner: &Runner) -> Diagnostics {
        let schema =
            BodySchema::new().block(BlockSchema::new("variable", &["name"]).body(BodySchema::new().attribute("description")));
        let (content, mut diags) = runner.get_module_content(&schema, ExpandMode::None);
        for block in &content.blocks {
            let name = &block.labels[0];
            let Some(attr) = block.body.find_attr("description") else {
                runner.emit_issue(self.name(), format!("`{name}` variable has no description"), &block.def_range);
                continue;
            };
            let (value, d) = runner.evaluate_expr(&attr.expr, &Type::String);
            diags.extend(d);
            if value == Value::from("") {
                runner.emit_issue(self.name(), format!("`{name}` variable has no description"), attr.expr.range());
            }
        }
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::tests::issues_of;

    #[test]
    fn missing_and_empty_descriptions() {
        let issues = issues_of(
            &DocumentedVariables,
            r#"
variable "a" {}
variable "b" {
  description = ""
}
variable "c" {
  description = "The region"
}
"#,
        );
        assert_eq!(
            issues,
            vec!["`a` variable has no description", "`b` variable has no description"]
        );
    }
}
