use super::config::{build_config, Config, ModuleRequest, ModuleWalker};
use super::input_value::{InputValue, InputValues};
use super::module::Module;
use super::parser::Parser;
use crate::addrs::ModuleSource;
use crate::hclext::{Diagnostic, Diagnostics};
use crate::Loader;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

const MANIFEST_PATH: &str = ".terraform/modules/modules.json";
const ENVIRONMENT_PATH: &str = ".terraform/environment";

/// Which module calls are followed when loading the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallModuleType {
    All,
    #[default]
    Local,
    None,
}

impl FromStr for CallModuleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(CallModuleType::All),
            "local" => Ok(CallModuleType::Local),
            "none" => Ok(CallModuleType::None),
            other => bail!("{other} is invalid call module type. Allowed values are: all, local, none"),
        }
    }
}

impl fmt::Display for CallModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallModuleType::All => "all",
            CallModuleType::Local => "local",
            CallModuleType::None => "none",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleRecord {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Dir")]
    dir: String,
}

/// `.terraform/modules/modules.json`, written by `terraform init`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ModuleManifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<ModuleRecord>,
}

/// Loads a root module and the modules it calls.
pub struct ModuleLoader<'l> {
    parser: Parser<'l>,
    base_dir: PathBuf,
    call_module_type: CallModuleType,
    manifest: BTreeMap<String, PathBuf>,
    ignored_sources: BTreeSet<String>,
}

/// `base` joined with `rel`, with `.` and `..` resolved lexically.
pub(crate) fn clean_join(base: &Path, rel: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(rel).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

impl<'l> ModuleLoader<'l> {
    /// Reads the module manifest under `base_dir` when remote modules are
    /// followed.
    pub fn new(loader: &'l dyn Loader, base_dir: impl Into<PathBuf>, call_module_type: CallModuleType) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut manifest = BTreeMap::new();
        let manifest_path = base_dir.join(MANIFEST_PATH);
        if call_module_type == CallModuleType::All && loader.exists(&manifest_path) {
            let raw = loader
                .load(&manifest_path)
                .with_context(|| format!("reading module manifest {}", manifest_path.display()))?;
            let parsed: ModuleManifest = serde_json::from_str(&raw)
                .with_context(|| format!("parsing module manifest {}", manifest_path.display()))?;
            for record in parsed.modules {
                manifest.insert(record.key, base_dir.join(record.dir));
            }
            log::debug!("{} modules in manifest", manifest.len());
        }
        Ok(Self {
            parser: Parser::new(loader),
            base_dir,
            call_module_type,
            manifest,
            ignored_sources: BTreeSet::new(),
        })
    }

    /// Calls whose source address is one of `sources` are not loaded.
    pub fn with_ignored_sources<'s>(mut self, sources: impl IntoIterator<Item = &'s str>) -> Self {
        self.ignored_sources.extend(sources.into_iter().map(str::to_string));
        self
    }

    /// Loads the module tree rooted at `dir`.
    pub fn load_config(&self, dir: &Path) -> (Option<Rc<Config>>, Diagnostics) {
        let (root, mut diags) = self.parser.load_config_dir(&clean_join(&self.base_dir, dir));
        let Some(root) = root else {
            return (None, diags);
        };
        if diags.has_errors() {
            return (None, diags);
        }
        let (config, d) = build_config(root, self);
        diags.extend(d);
        (Some(config), diags)
    }

    /// Values from `terraform.tfvars`, `*.auto.tfvars` and then `extra`, one
    /// layer per file.
    pub fn load_values_files(&self, dir: &Path, extra: &[PathBuf]) -> (Vec<InputValues>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let dir = clean_join(&self.base_dir, dir);
        let files = self
            .parser
            .auto_values_files(&dir)
            .into_iter()
            .chain(extra.iter().map(|p| clean_join(&self.base_dir, p)));

        let mut layers = Vec::new();
        for path in files {
            let (values, d) = self.parser.load_values_file(&path);
            diags.extend(d);
            layers.push(
                values
                    .into_iter()
                    .map(|(name, (value, range))| {
                        (
                            name,
                            InputValue {
                                value,
                                range: Some(range),
                            },
                        )
                    })
                    .collect(),
            );
        }
        (layers, diags)
    }
}

impl ModuleWalker for ModuleLoader<'_> {
    fn load_module(&self, req: &ModuleRequest<'_>) -> (Option<Module>, Diagnostics) {
        if self.ignored_sources.contains(&req.source_addr.to_string()) {
            log::info!("ignoring module {:?}: source {} is ignored", req.name, req.source_addr);
            return (None, Diagnostics::new());
        }
        let dir = match (self.call_module_type, req.source_addr) {
            (CallModuleType::None, _) => {
                log::info!("ignoring module {:?}: module calls are disabled", req.name);
                return (None, Diagnostics::new());
            }
            (CallModuleType::Local, ModuleSource::Remote(source)) => {
                log::info!("ignoring remote module {:?} ({source})", req.name);
                return (None, Diagnostics::new());
            }
            (_, ModuleSource::Local(source)) => {
                let dir = clean_join(Path::new(&req.parent.source_dir), Path::new(source));
                if !self.parser.loader().exists(&dir) {
                    let diag = Diagnostic::error(
                        format!("{:?} module is not found", req.name),
                        format!("The module directory {:?} does not exist or cannot be read.", dir.display().to_string()),
                    )
                    .with_subject(req.call_range);
                    return (None, diag.into());
                }
                dir
            }
            (_, ModuleSource::Remote(_)) => {
                let key = req.path.0.join(".");
                match self.manifest.get(&key) {
                    Some(dir) => dir.clone(),
                    None => {
                        let diag = Diagnostic::error(
                            format!("{:?} module is not found. Did you run \"terraform init\"?", req.name),
                            format!("No entry for module {key:?} in {MANIFEST_PATH}."),
                        )
                        .with_subject(req.call_range);
                        return (None, diag.into());
                    }
                }
            }
        };

        log::info!("loading module {:?} from {}", req.name, dir.display());
        self.parser.load_config_dir(&dir)
    }
}

/// The selected workspace: `TF_WORKSPACE`, then `.terraform/environment`,
/// then `default`.
pub fn current_workspace(loader: &dyn Loader, base_dir: &Path, env_workspace: Option<String>) -> String {
    if let Some(ws) = env_workspace.filter(|ws| !ws.is_empty()) {
        return ws;
    }
    loader
        .load(&base_dir.join(ENVIRONMENT_PATH))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapLoader;

    #[test]
    fn parses_call_module_type() {
        assert_eq!("all".parse::<CallModuleType>().unwrap(), CallModuleType::All);
        let err = "remote".parse::<CallModuleType>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote is invalid call module type. Allowed values are: all, local, none"
        );
    }

    #[test]
    fn cleans_joined_paths() {
        assert_eq!(clean_join(Path::new("/work"), Path::new("./modules/vpc")), PathBuf::from("/work/modules/vpc"));
        assert_eq!(clean_join(Path::new("/work/app"), Path::new("../shared")), PathBuf::from("/work/shared"));
        assert_eq!(clean_join(Path::new("."), Path::new(".")), PathBuf::from("."));
    }

    fn project() -> MapLoader {
        MapLoader::new([
            (
                "/work/main.tf",
                r#"
                module "local" {
                  source = "./modules/local"
                }
                module "remote" {
                  source  = "terraform-aws-modules/vpc/aws"
                  version = "5.0.0"
                }
                "#,
            ),
            ("/work/modules/local/main.tf", "module \"nested\" {\n  source = \"../nested\"\n}\n"),
            ("/work/modules/nested/main.tf", "variable \"x\" {}\n"),
            ("/work/.terraform/modules/remote/main.tf", "variable \"cidr\" {}\n"),
            (
                "/work/.terraform/modules/modules.json",
                r#"{"Modules":[{"Key":"","Source":"","Dir":"."},{"Key":"remote","Source":"registry.terraform.io/terraform-aws-modules/vpc/aws","Version":"5.0.0","Dir":".terraform/modules/remote"}]}"#,
            ),
            ("/work/.terraform/environment", "staging\n"),
        ])
    }

    fn module_paths(config: &Config) -> Vec<String> {
        config.all_modules().iter().map(|c| c.path.to_string()).collect()
    }

    #[test]
    fn follows_calls_per_call_module_type() {
        let loader = project();

        let all = ModuleLoader::new(&loader, "/work", CallModuleType::All).unwrap();
        let (config, diags) = all.load_config(Path::new("."));
        assert!(diags.is_empty(), "{diags}");
        let config = config.unwrap();
        assert_eq!(
            module_paths(&config),
            vec!["", "module.local", "module.local.module.nested", "module.remote"]
        );
        assert_eq!(config.children["remote"].version.as_deref(), Some("5.0.0"));

        let local = ModuleLoader::new(&loader, "/work", CallModuleType::Local).unwrap();
        let (config, diags) = local.load_config(Path::new("."));
        assert!(diags.is_empty());
        assert_eq!(
            module_paths(&config.unwrap()),
            vec!["", "module.local", "module.local.module.nested"]
        );

        let none = ModuleLoader::new(&loader, "/work", CallModuleType::None).unwrap();
        let (config, _) = none.load_config(Path::new("."));
        assert_eq!(module_paths(&config.unwrap()), vec![""]);
    }

    #[test]
    fn ignored_sources_are_skipped() {
        let loader = project();
        let modules = ModuleLoader::new(&loader, "/work", CallModuleType::All)
            .unwrap()
            .with_ignored_sources(["terraform-aws-modules/vpc/aws"]);
        let (config, diags) = modules.load_config(Path::new("."));
        assert!(diags.is_empty(), "{diags}");
        assert!(!config.unwrap().children.contains_key("remote"));
    }

    #[test]
    fn missing_modules_are_reported() {
        let loader = MapLoader::new([(
            "/work/main.tf",
            "module \"gone\" {\n  source = \"./gone\"\n}\nmodule \"remote\" {\n  source = \"hashicorp/consul/aws\"\n}\n",
        )]);
        let modules = ModuleLoader::new(&loader, "/work", CallModuleType::All).unwrap();
        let (config, diags) = modules.load_config(Path::new("."));
        assert!(config.unwrap().children.is_empty());
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec![
                "\"gone\" module is not found",
                "\"remote\" module is not found. Did you run \"terraform init\"?",
            ]
        );
    }

    #[test]
    fn workspace_selection() {
        let loader = project();
        assert_eq!(current_workspace(&loader, Path::new("/work"), Some("prod".into())), "prod");
        assert_eq!(current_workspace(&loader, Path::new("/work"), None), "staging");
        assert_eq!(current_workspace(&loader, Path::new("/elsewhere"), None), "default");
    }
}
