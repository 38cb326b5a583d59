use super::{is_snake_case, LintCheck, LintSeverity};
use crate::hclext::{BlockSchema, BodySchema, Diagnostics};
use crate::runner::{ExpandMode, Runner};

/// Block and local value names must be snake_case.
pub struct NamingConvention;

fn schema() -> BodySchema {
    BodySchema::new()
        .block(BlockSchema::new("resource", &["type", "name"]))
        .block(BlockSchema::new("data", &["type", "name"]))
        .block(BlockSchema::new("variable", &["name"]))
        .block(BlockSchema::new("output", &["name"]))
        .block(BlockSchema::new("module", &["name"]))
        .block(BlockSchema::new("locals", &[]).body(BodySchema::just_attributes()))
}

impl LintCheck for NamingConvention {
    fn name(&self) -> &'static str {
        "terraform_naming_convention"
    }

    fn default_severity(&self) -> LintSeverity {
        LintSeverity::Allow
    }

    fn check(&self, runner: &Runner) -> Diagnostics {
        let (content, diags) = runner.get_module_content(&schema(), ExpandMode::None);
        for block in &content.blocks {
            if block.ty == "locals" {
                for attr in block.body.attributes.values() {
                    if !is_snake_case(&attr.name) {
                        runner.emit_issue(
                            self.name(),
                            format!("local value name `{}` must match the following format: snake_case", attr.name),
                            &attr.name_range,
                        );
                    }
                }
                continue;
            }
            let Some(name) = block.labels.last() else {
                continue;
            };
            if !is_snake_case(name) {
                runner.emit_issue(
                    self.name(),
                    format!("{} name `{name}` must match the following format: snake_case", block.ty),
                    &block.def_range,
                );
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
    fn reports_each_kind() {
        let issues = issues_of(
            &NamingConvention,
            r#"
resource "aws_instance" "WebServer" {}
data "aws_ami" "ubuntu_2204" {}
variable "instanceType" {}
output "public-ip" {
  value = 1
}
module "Net" {
  source = "./net"
}
locals {
  good_name = 1
  BadName   = 2
}
"#,
        );
        assert_eq!(
            issues,
            vec![
                "resource name `WebServer` must match the following format: snake_case",
                "variable name `instanceType` must match the following format: snake_case",
                "output name `public-ip` must match the following format: snake_case",
                "module name `Net` must match the following format: snake_case",
                "local value name `BadName` must match the following format: snake_case",
            ]
        );
    }

    #[test]
    fn dynamic_blocks_are_not_names() {
        let issues = issues_of(
            &NamingConvention,
            "resource \"a\" \"b\" {\n  dynamic \"Setting\" {\n    for_each = []\n    content {}\n  }\n}\n",
        );
        assert!(issues.is_empty());
    }
}
