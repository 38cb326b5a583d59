pub mod addrs;
pub mod config;
pub mod hclext;
pub mod lang;
pub mod lint;
pub mod runner;
pub mod terraform;
pub mod tfhcl;
pub mod value;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use hclext::{Diagnostic, Diagnostics};
pub use lint::{Issue, LintSettings, LintSeverity};
pub use runner::{ExpandMode, Runner};
use terraform::{
    current_workspace, parse_variable_values, variable_values, CallModuleType, ContextMeta, ModuleLoader,
};

// Loader abstraction: lets callers control how files are read.
pub trait Loader {
    fn load(&self, path: &Path) -> Result<String>;
    /// Files directly inside `dir`, in no particular order.
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;
    fn exists(&self, path: &Path) -> bool;
}

pub struct FsLoader;

impl Loader for FsLoader {
    fn load(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Everything an inspection run needs besides the files themselves.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub call_module_type: CallModuleType,
    /// Values files read after `terraform.tfvars` and `*.auto.tfvars`.
    pub var_files: Vec<PathBuf>,
    /// `key=value` assignments, applied last.
    pub variables: Vec<String>,
    /// Module sources never loaded.
    pub ignored_modules: Vec<String>,
    pub lint: LintSettings,
    /// `TF_WORKSPACE`, if set.
    pub workspace: Option<String>,
    /// Process environment, scanned for `TF_VAR_` values.
    pub env: Vec<(String, String)>,
    pub original_working_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Inspection {
    pub issues: Vec<Issue>,
    pub diagnostics: Diagnostics,
}

// Pure API: load the module tree rooted at `dir`, resolve variables and run
// the lint rules. Configuration problems come back as diagnostics; only I/O
// failures outside the configuration itself are errors.
pub fn inspect(dir: &Path, loader: &dyn Loader, opts: &Options) -> Result<Inspection> {
    let mut diagnostics = Diagnostics::new();

    let modules = ModuleLoader::new(loader, dir, opts.call_module_type)?
        .with_ignored_sources(opts.ignored_modules.iter().map(String::as_str));
    let (config, d) = modules.load_config(Path::new("."));
    diagnostics.extend(d);
    let Some(config) = config else {
        return Ok(Inspection {
            issues: Vec::new(),
            diagnostics,
        });
    };
    if diagnostics.has_errors() {
        return Ok(Inspection {
            issues: Vec::new(),
            diagnostics,
        });
    }

    let (mut layers, d) = modules.load_values_files(Path::new("."), &opts.var_files);
    diagnostics.extend(d);
    let (cli_values, d) = parse_variable_values(&config.module.variables, &opts.variables);
    diagnostics.extend(d);
    layers.push(cli_values);
    let (values, d) = variable_values(&config, opts.env.iter().cloned(), &layers);
    diagnostics.extend(d);

    let meta = ContextMeta {
        env: current_workspace(loader, dir, opts.workspace.clone()),
        original_working_dir: opts.original_working_dir.clone(),
        pure_only: false,
    };
    log::debug!("inspecting {} in workspace {:?}", dir.display(), meta.env);

    let runner = Runner::new(config, meta, values);
    let (issues, d) = lint::run(&runner, &opts.lint);
    diagnostics.extend(d);
    Ok(Inspection { issues, diagnostics })
}

#[cfg(test)]
pub(crate) struct MapLoader {
    files: std::collections::HashMap<PathBuf, String>,
}

#[cfg(test)]
impl MapLoader {
    pub(crate) fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(path, src)| (PathBuf::from(path), src.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
impl Loader for MapLoader {
    fn load(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing file: {}", path.display()))
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !self.exists(dir) {
            anyhow::bail!("missing directory: {}", dir.display());
        }
        Ok(self
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.keys().any(|p| p.starts_with(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect_map(files: &[(&str, &str)], opts: &Options) -> Inspection {
        let loader = MapLoader::new(files.iter().copied());
        inspect(Path::new("/work"), &loader, opts).unwrap()
    }

    #[test]
    fn values_layer_in_order() {
        let files = [
            (
                "/work/main.tf",
                r#"
                variable "a" {
                  type = string
                }
                variable "b" {
                  type = string
                }
                variable "c" {
                  type = string
                }
                module "m" {
                  source = "./m"
                  count  = var.a == "cli" && var.b == "file" && var.c == "auto" ? 1 : -1
                }
                "#,
            ),
            ("/work/m/main.tf", ""),
            ("/work/terraform.tfvars", "a = \"tfvars\"\nb = \"tfvars\"\nc = \"tfvars\"\n"),
            ("/work/x.auto.tfvars", "a = \"auto\"\nb = \"auto\"\nc = \"auto\"\n"),
            ("/work/extra.tfvars", "a = \"file\"\nb = \"file\"\n"),
        ];
        let opts = Options {
            var_files: vec![PathBuf::from("extra.tfvars")],
            variables: vec!["a=cli".into()],
            env: vec![("TF_VAR_a".into(), "env".into())],
            ..Options::default()
        };
        let inspection = inspect_map(&files, &opts);
        assert!(inspection.diagnostics.is_empty(), "{}", inspection.diagnostics);

        let inspection = inspect_map(&files, &Options::default());
        assert_eq!(inspection.diagnostics[0].summary, "Invalid count argument");
    }

    #[test]
    fn load_errors_stop_before_linting() {
        let files = [("/work/main.tf", "module \"m\" {\n  source = \"./missing\"\n}\nvariable \"Unused\" {}\n")];
        let inspection = inspect_map(&files, &Options::default());
        assert!(inspection.issues.is_empty());
        assert_eq!(inspection.diagnostics[0].summary, "\"m\" module is not found");
    }

    #[test]
    fn workspace_reaches_expressions() {
        let files = [
            (
                "/work/main.tf",
                "module \"m\" {\n  source = \"./m\"\n  count  = terraform.workspace == \"prod\" ? 1 : -1\n}\n",
            ),
            ("/work/m/main.tf", ""),
            ("/work/.terraform/environment", "prod"),
        ];
        let inspection = inspect_map(&files, &Options::default());
        assert!(inspection.diagnostics.is_empty(), "{}", inspection.diagnostics);

        let opts = Options {
            workspace: Some("dev".into()),
            ..Options::default()
        };
        let inspection = inspect_map(&files, &opts);
        assert_eq!(inspection.diagnostics[0].summary, "Invalid count argument");
    }
}
