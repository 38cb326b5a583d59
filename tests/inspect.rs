use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tflint::hclext::{BlockSchema, BodySchema};
use tflint::terraform::{variable_values, CallModuleType, ContextMeta, ModuleLoader};
use tflint::value::Value;
use tflint::{inspect, ExpandMode, FsLoader, LintSeverity, Options, Runner};

fn write(dir: &Path, rel: &str, src: &str) -> Result<()> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, src)?;
    Ok(())
}

fn project(dir: &Path) -> Result<()> {
    write(
        dir,
        "main.tf",
        r#"
variable "region" {
  type = string
}

variable "unused_thing" {
  type    = string
  default = "x"
}

locals {
  name = "app-${var.region}"
}

module "net" {
  source = "./modules/net"
  label  = local.name
}
"#,
    )?;
    write(dir, "terraform.tfvars", "region = \"eu\"\n")?;
    write(
        dir,
        "modules/net/main.tf",
        r#"
variable "label" {
  type = string
}

module "sub" {
  source = "../sub"
  count  = var.label == "app-eu" ? 1 : -1
}
"#,
    )?;
    write(dir, "modules/sub/main.tf", "")?;
    Ok(())
}

#[test]
fn inspects_a_directory_tree() -> Result<()> {
    let dir = tempdir()?;
    project(dir.path())?;

    let inspection = inspect(dir.path(), &FsLoader, &Options::default())?;
    assert!(inspection.diagnostics.is_empty(), "{}", inspection.diagnostics);
    assert_eq!(inspection.issues.len(), 1);
    let issue = &inspection.issues[0];
    assert_eq!(issue.rule, "terraform_unused_declarations");
    assert_eq!(issue.message, "variable \"unused_thing\" is declared but not used");
    assert_eq!(issue.severity, LintSeverity::Warn);
    assert!(issue.range.filename.ends_with("main.tf"));

    let json = serde_json::to_value(issue)?;
    assert_eq!(json["severity"], "warn");
    assert_eq!(json["range"]["start"]["line"], 6);
    Ok(())
}

#[test]
fn module_inputs_follow_variables() -> Result<()> {
    let dir = tempdir()?;
    project(dir.path())?;

    let opts = Options {
        variables: vec!["region=us".into()],
        ..Options::default()
    };
    let inspection = inspect(dir.path(), &FsLoader, &opts)?;
    let summaries: Vec<_> = inspection.diagnostics.iter().map(|d| d.summary.as_str()).collect();
    assert_eq!(summaries, vec!["Invalid count argument"]);

    let opts = Options {
        call_module_type: CallModuleType::None,
        variables: vec!["region=us".into()],
        ..Options::default()
    };
    let inspection = inspect(dir.path(), &FsLoader, &opts)?;
    assert!(inspection.diagnostics.is_empty(), "{}", inspection.diagnostics);
    Ok(())
}

#[test]
fn missing_local_module_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "main.tf", "module \"gone\" {\n  source = \"./gone\"\n}\n")?;

    let inspection = inspect(dir.path(), &FsLoader, &Options::default())?;
    assert_eq!(inspection.diagnostics[0].summary, "\"gone\" module is not found");
    assert!(inspection.issues.is_empty());
    Ok(())
}

#[test]
fn runner_expands_content_from_files() -> Result<()> {
    let dir = tempdir()?;
    write(
        dir.path(),
        "main.tf",
        r#"
variable "ports" {
  default = [80, 443]
}

resource "aws_security_group" "web" {
  count = 2
  name  = "web-${count.index}"

  dynamic "ingress" {
    for_each = var.ports
    content {
      from_port   = ingress.value
      description = "port ${ingress.key} of ${count.index}"
    }
  }
}
"#,
    )?;

    let modules = ModuleLoader::new(&FsLoader, dir.path(), CallModuleType::Local)?;
    let (config, diags) = modules.load_config(Path::new("."));
    assert!(diags.is_empty(), "{diags}");
    let config = config.expect("root module");
    let (values, _) = variable_values(&config, Vec::new(), &[]);
    let runner = Runner::new(config, ContextMeta::default(), values);

    let schema = BodySchema::new().block(
        BlockSchema::new("resource", &["type", "name"]).body(
            BodySchema::new().attribute("name").block(
                BlockSchema::new("ingress", &[])
                    .body(BodySchema::new().attribute("from_port").attribute("description")),
            ),
        ),
    );

    let (content, diags) = runner.get_module_content(&schema, ExpandMode::Expand);
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(content.blocks.len(), 2);
    let second = &content.blocks[1];
    assert_eq!(
        second.body.find_attr("name").unwrap().expr.bound_value(),
        Some(&Value::from("web-1"))
    );
    assert_eq!(second.body.blocks.len(), 2);
    let ingress = &second.body.blocks[1].body;
    assert_eq!(ingress.find_attr("from_port").unwrap().expr.bound_value(), Some(&Value::from(443)));
    assert_eq!(
        ingress.find_attr("description").unwrap().expr.bound_value(),
        Some(&Value::from("port 1 of 1"))
    );

    let (content, diags) = runner.get_module_content(&schema, ExpandMode::None);
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(content.blocks.len(), 1);
    assert_eq!(content.blocks[0].body.blocks.len(), 1);
    assert_eq!(content.blocks[0].body.blocks[0].ty, "ingress");
    Ok(())
}

#[test]
fn overrides_apply_to_every_instance() -> Result<()> {
    let dir = tempdir()?;
    write(
        dir.path(),
        "main.tf",
        "resource \"aws_instance\" \"web\" {\n  count = 3\n  name  = \"primary\"\n}\n",
    )?;
    write(
        dir.path(),
        "override.tf",
        "resource \"aws_instance\" \"web\" {\n  name = \"override\"\n}\n",
    )?;
    write(
        dir.path(),
        "count_override.tf",
        "resource \"aws_instance\" \"web\" {\n  count = 2\n}\n",
    )?;

    let modules = ModuleLoader::new(&FsLoader, dir.path(), CallModuleType::Local)?;
    let (config, diags) = modules.load_config(Path::new("."));
    assert!(diags.is_empty(), "{diags}");
    let config = config.expect("root module");
    let (values, _) = variable_values(&config, Vec::new(), &[]);
    let runner = Runner::new(config, ContextMeta::default(), values);

    let schema = BodySchema::new()
        .block(BlockSchema::new("resource", &["type", "name"]).body(BodySchema::new().attribute("name")));
    let (content, diags) = runner.get_module_content(&schema, ExpandMode::Expand);
    assert!(diags.is_empty(), "{diags}");
    let names: Vec<_> = content
        .blocks
        .iter()
        .map(|b| b.body.find_attr("name").unwrap().expr.clone())
        .map(|e| tflint::lang::evaluate_constant(e.hcl()).unwrap())
        .collect();
    assert_eq!(names, vec![Value::from("override"), Value::from("override")]);
    Ok(())
}
