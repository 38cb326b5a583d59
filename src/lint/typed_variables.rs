use super::LintCheck;
use crate::hclext::{BlockSchema, BodySchema, Diagnostics};
use crate::runner::{ExpandMode, Runner};

pub struct TypedVariables;

impl LintCheck for TypedVariables {
    fn name(&self) -> &'static str {
        "terraform_typed_variables"
    }

    fn check(&self, runner: &Runner) -> Diagnostics {
        let schema = BodySchema::new().block(BlockSchema::new("variable", &["name"]).body(BodySchema::new().attribute("type")));
        let (content, diags) = runner.get_module_content(&schema, ExpandMode::None);
        for block in &content.blocks {
            if block.body.find_attr("type").is_none() {
                runner.emit_issue(
                    self.name(),
                    format!("`{}` variable has no type", block.labels[0]),
                    &block.def_range,
                );
            }
        }
        diags
    }
}
