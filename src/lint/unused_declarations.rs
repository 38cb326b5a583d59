use super::LintCheck;
use crate::addrs::Referenceable;
use crate::hclext::Diagnostics;
use crate::lang::references_in_body;
use crate::runner::Runner;
use std::collections::BTreeSet;

/// Variables and local values nothing in the module refers to.
pub struct UnusedDeclarations;

impl LintCheck for UnusedDeclarations {
    fn name(&self) -> &'static str {
        "terraform_unused_declarations"
    }

    fn check(&self, runner: &Runner) -> Diagnostics {
        let module = runner.module();
        let mut used_vars = BTreeSet::new();
        let mut used_locals = BTreeSet::new();
        for file in module.files() {
            // Traversals that are not references are reported by evaluation.
            let (refs, _) = references_in_body(&file.body);
            for r in refs {
                match r.subject {
                    Referenceable::InputVariable(name) => {
                        used_vars.insert(name);
                    }
                    Referenceable::LocalValue(name) => {
                        used_locals.insert(name);
                    }
                    _ => {}
                }
            }
        }

        for (name, variable) in &module.variables {
            if !used_vars.contains(name) {
                runner.emit_issue(
                    self.name(),
                    format!("variable {name:?} is declared but not used"),
                    &variable.decl_range,
                );
            }
        }
        for (name, local) in &module.locals {
            if !used_locals.contains(name) {
                runner.emit_issue(self.name(), format!("local.{name} is declared but not used"), &local.decl_range);
            }
        }
        Diagnostics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::tests::issues_of;

    #[test]
    fn unreferenced_declarations() {
        let issues = issues_of(
            &UnusedDeclarations,
            r#"
variable "used" {}
variable "unused" {}
locals {
  a = var.used
  b = "${local.a}-x"
  c = [for v in ["x"] : v]
}
resource "aws_instance" "web" {
  tags = { Name = local.b }
}
"#,
        );
        assert_eq!(
            issues,
            vec!["variable \"unused\" is declared but not used", "local.c is declared but not used"]
        );
    }
}
