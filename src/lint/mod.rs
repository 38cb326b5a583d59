use crate::hclext::{Diagnostics, SourceRange};
use crate::runner::Runner;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

mod documented_variables;
mod naming_convention;
mod typed_variables;
mod unused_declarations;

pub use documented_variables::DocumentedVariables;
pub use naming_convention::NamingConvention;
pub use typed_variables::TypedVariables;
pub use unused_declarations::UnusedDeclarations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Allow,
    Warn,
    Error,
}

impl fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LintSeverity::Allow => "allow",
            LintSeverity::Warn => "warning",
            LintSeverity::Error => "error",
        })
    }
}

/// A problem a rule found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub rule: String,
    pub message: String,
    pub severity: LintSeverity,
    pub range: SourceRange,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({}) [{}]", self.range, self.message, self.rule, self.severity)
    }
}

/// Per-rule severities from the `[rules]` table. Rules not listed keep
/// their default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintSettings {
    #[serde(default)]
    pub severity: HashMap<String, LintSeverity>,
}

pub trait LintCheck {
    fn name(&self) -> &'static str;

    /// Severity when the configuration does not mention the rule.
    fn default_severity(&self) -> LintSeverity {
        LintSeverity::Warn
    }

    /// Inspects the module of `runner`, reporting through
    /// [`Runner::emit_issue`].
    fn check(&self, runner: &Runner) -> Diagnostics;
}

pub fn builtin_checks() -> Vec<Box<dyn LintCheck>> {
    vec![
        Box::new(NamingConvention),
        Box::new(TypedVariables),
        Box::new(DocumentedVariables),
        Box::new(UnusedDeclarations),
    ]
}

pub fn run(runner: &Runner, settings: &LintSettings) -> (Vec<Issue>, Diagnostics) {
    run_with_checks(runner, &builtin_checks(), settings)
}

/// Runs every enabled check against the root module of `runner` and
/// collects the evaluation errors of all module call instances below it.
pub fn run_with_checks(
    runner: &Runner,
    checks: &[Box<dyn LintCheck>],
    settings: &LintSettings,
) -> (Vec<Issue>, Diagnostics) {
    let mut issues = Vec::new();
    let mut diags = Diagnostics::new();

    for check in checks {
        let severity = settings
            .severity
            .get(check.name())
            .copied()
            .unwrap_or_else(|| check.default_severity());
        if severity == LintSeverity::Allow {
            continue;
        }
        log::debug!("running {}", check.name());
        diags.extend(check.check(runner));
        for mut issue in runner.take_issues() {
            issue.severity = severity;
            issues.push(issue);
        }
    }

    walk_module_calls(runner, &mut diags);

    issues.sort_by(|a, b| {
        (&a.range.filename, a.range.start.byte, &a.rule).cmp(&(&b.range.filename, b.range.start.byte, &b.rule))
    });
    issues.dedup();
    (issues, diags)
}

fn walk_module_calls(runner: &Runner, diags: &mut Diagnostics) {
    let (children, d) = runner.module_runners();
    diags.extend(d);
    for child in &children {
        walk_module_calls(child, diags);
    }
}

/// Names made of lowercase words joined by single underscores.
pub(crate) fn is_snake_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.ends_with('_')
        && !name.contains("__")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hclext::parse_file;
    use crate::terraform::{build_config, variable_values, ContextMeta, File, Module, NoModules};

    pub(crate) fn runner(src: &str) -> Runner {
        let mut module = Module::new(
            "/work",
            vec![File {
                path: "main.tf".into(),
                body: parse_file(src, "main.tf").unwrap(),
            }],
            vec![],
        );
        let diags = module.build();
        assert!(diags.is_empty(), "{diags}");
        let (config, _) = build_config(module, &NoModules);
        let (values, _) = variable_values(&config, Vec::new(), &[]);
        Runner::new(config, ContextMeta::default(), values)
    }

    pub(crate) fn issues_of(check: &dyn LintCheck, src: &str) -> Vec<String> {
        let r = runner(src);
        let diags = check.check(&r);
        assert!(diags.is_empty(), "{diags}");
        r.take_issues().into_iter().map(|i| i.message).collect()
    }

    #[test]
    fn snake_case() {
        assert!(is_snake_case("web_server_1"));
        assert!(!is_snake_case("WebServer"));
        assert!(!is_snake_case("web__server"));
        assert!(!is_snake_case("_web"));
        assert!(!is_snake_case("web-server"));
    }

    const SRC: &str = r#"
variable "Region" {}
resource "aws_instance" "web" {}
"#;

    #[test]
    fn default_severities_apply() {
        let r = runner(SRC);
        let (issues, diags) = run(&r, &LintSettings::default());
        assert!(diags.is_empty(), "{diags}");
        let rules: Vec<_> = issues.iter().map(|i| i.rule.as_str()).collect();
        assert_eq!(rules, vec!["terraform_typed_variables", "terraform_unused_declarations"]);
        assert!(issues.iter().all(|i| i.severity == LintSeverity::Warn));
    }

    #[test]
    fn settings_enable_and_silence_rules() {
        let r = runner(SRC);
        let mut settings = LintSettings::default();
        settings
            .severity
            .insert("terraform_naming_convention".into(), LintSeverity::Error);
        settings
            .severity
            .insert("terraform_unused_declarations".into(), LintSeverity::Allow);
        let (issues, _) = run(&r, &settings);
        let found: Vec<_> = issues.iter().map(|i| (i.rule.as_str(), i.severity)).collect();
        assert_eq!(
            found,
            vec![
                ("terraform_naming_convention", LintSeverity::Error),
                ("terraform_typed_variables", LintSeverity::Warn),
            ]
        );
    }
}
