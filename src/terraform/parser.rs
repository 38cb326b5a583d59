use super::module::{File, Module};
use crate::hclext::{parse_file, Diagnostic, Diagnostics, SourceRange};
use crate::lang::evaluate_constant;
use crate::value::Value;
use crate::Loader;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reads configuration and values files through a [`Loader`].
pub struct Parser<'l> {
    loader: &'l dyn Loader,
}

/// Editor leftovers and hidden files are never configuration.
fn is_ignored_file(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~') || (name.starts_with('#') && name.ends_with('#'))
}

fn is_override_file(name: &str) -> bool {
    let stem = name.strip_suffix(".tf").unwrap_or(name);
    stem == "override" || stem.ends_with("_override")
}

impl<'l> Parser<'l> {
    pub fn new(loader: &'l dyn Loader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &'l dyn Loader {
        self.loader
    }

    /// `.tf` files of `dir` in name order, split into primaries and
    /// overrides.
    fn config_files(&self, dir: &Path) -> anyhow::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut entries = self.loader.list_dir(dir)?;
        entries.sort();
        let mut primaries = Vec::new();
        let mut overrides = Vec::new();
        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_ignored_file(name) || !name.ends_with(".tf") {
                continue;
            }
            if is_override_file(name) {
                overrides.push(path);
            } else {
                primaries.push(path);
            }
        }
        Ok((primaries, overrides))
    }

    /// Parses every configuration file of `dir` into a built [`Module`].
    pub fn load_config_dir(&self, dir: &Path) -> (Option<Module>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let (primary_paths, override_paths) = match self.config_files(dir) {
            Ok(files) => files,
            Err(e) => {
                diags.push(Diagnostic::error(
                    "Failed to read module directory",
                    format!("Module directory {} does not exist or cannot be read: {e:#}", dir.display()),
                ));
                return (None, diags);
            }
        };

        let mut sources = BTreeMap::new();
        let mut read_all = |paths: Vec<PathBuf>, diags: &mut Diagnostics| {
            let mut files = Vec::with_capacity(paths.len());
            for path in paths {
                let filename = path.to_string_lossy().into_owned();
                let src = match self.loader.load(&path) {
                    Ok(src) => src,
                    Err(e) => {
                        diags.push(
                            Diagnostic::error(
                                "Failed to read file",
                                format!("The configuration file {filename:?} could not be read: {e:#}"),
                            )
                            .with_subject(&SourceRange::file_start(&filename)),
                        );
                        continue;
                    }
                };
                match parse_file(&src, &filename) {
                    Ok(body) => files.push(File {
                        path: filename.clone(),
                        body,
                    }),
                    Err(d) => diags.extend(d),
                }
                sources.insert(filename, src);
            }
            files
        };
        let primaries = read_all(primary_paths, &mut diags);
        let overrides = read_all(override_paths, &mut diags);

        let mut module = Module::new(dir.to_string_lossy(), primaries, overrides);
        module.sources = sources;
        log::debug!(
            "loaded {} primary and {} override files from {}",
            module.primaries().len(),
            module.overrides().len(),
            dir.display()
        );
        diags.extend(module.build());
        (Some(module), diags)
    }

    /// Values files loaded automatically from `dir`: `terraform.tfvars`,
    /// then `*.auto.tfvars` in name order.
    pub fn auto_values_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut entries = self.loader.list_dir(dir).unwrap_or_default();
        entries.sort();
        let mut files = Vec::new();
        let default = dir.join("terraform.tfvars");
        if entries.contains(&default) {
            files.push(default);
        }
        files.extend(entries.into_iter().filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".auto.tfvars") && !is_ignored_file(n))
        }));
        files
    }

    /// Reads a values file. Only constant attributes are allowed.
    pub fn load_values_file(&self, path: &Path) -> (BTreeMap<String, (Value, SourceRange)>, Diagnostics) {
        let mut values = BTreeMap::new();
        let mut diags = Diagnostics::new();
        let filename = path.to_string_lossy().into_owned();

        let src = match self.loader.load(path) {
            Ok(src) => src,
            Err(e) => {
                diags.push(Diagnostic::error(
                    "Failed to read file",
                    format!("The file {filename:?} could not be read: {e:#}"),
                ));
                return (values, diags);
            }
        };
        let body = match parse_file(&src, &filename) {
            Ok(body) => body,
            Err(d) => return (values, d),
        };
        let (attrs, d) = body.just_attributes();
        diags.extend(d);
        for (name, attr) in attrs {
            match evaluate_constant(attr.expr.hcl()) {
                Ok(v) => {
                    values.insert(name, (v, attr.expr.range().clone()));
                }
                Err(e) => diags.push(e.to_diagnostic(attr.expr.range())),
            }
        }
        (values, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapLoader;

    #[test]
    fn classifies_files() {
        assert!(is_ignored_file(".hidden.tf"));
        assert!(is_ignored_file("main.tf~"));
        assert!(is_ignored_file("#main.tf#"));
        assert!(!is_ignored_file("main.tf"));
        assert!(is_override_file("override.tf"));
        assert!(is_override_file("db_override.tf"));
        assert!(!is_override_file("overrides.tf"));
    }

    #[test]
    fn loads_directory_with_overrides() {
        let loader = MapLoader::new([
            ("/work/main.tf", "variable \"a\" {\n  default = 1\n}\n"),
            ("/work/override.tf", "variable \"a\" {\n  default = 2\n}\n"),
            ("/work/.skip.tf", "this is not hcl {"),
            ("/work/README.md", "docs"),
            ("/work/sub/other.tf", "variable \"b\" {}\n"),
        ]);
        let parser = Parser::new(&loader);
        let (module, diags) = parser.load_config_dir(Path::new("/work"));
        assert!(diags.is_empty(), "{diags}");
        let module = module.unwrap();
        assert_eq!(module.primaries().len(), 1);
        assert_eq!(module.overrides().len(), 1);
        assert_eq!(module.variables.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(module.variables["a"].default, Some(Value::from(2)));
        assert_eq!(module.source_dir, "/work");
    }

    #[test]
    fn missing_directory_is_reported() {
        let loader = MapLoader::new([("/work/main.tf", "")]);
        let (module, diags) = Parser::new(&loader).load_config_dir(Path::new("/nowhere"));
        assert!(module.is_none());
        assert_eq!(diags[0].summary, "Failed to read module directory");
    }

    #[test]
    fn values_files() {
        let loader = MapLoader::new([
            ("/work/b.auto.tfvars", "x = 2\n"),
            ("/work/a.auto.tfvars", "x = 1\n"),
            ("/work/terraform.tfvars", "x = 0\ny = [1, 2]\n"),
            ("/work/bad.tfvars", "z = var.a\n"),
        ]);
        let parser = Parser::new(&loader);
        let files = parser.auto_values_files(Path::new("/work"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/work/terraform.tfvars"),
                PathBuf::from("/work/a.auto.tfvars"),
                PathBuf::from("/work/b.auto.tfvars"),
            ]
        );
        let (values, diags) = parser.load_values_file(Path::new("/work/terraform.tfvars"));
        assert!(diags.is_empty());
        assert_eq!(values["y"].0, Value::Tuple(vec![Value::from(1), Value::from(2)]));

        let (values, diags) = parser.load_values_file(Path::new("/work/bad.tfvars"));
        assert!(values.is_empty());
        assert!(diags.has_errors());
    }
}
