use super::module::Module;
use crate::addrs::{self, ModuleInstance, ModuleSource};
use crate::hclext::{Diagnostic, Diagnostics, SourceRange};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Modules nested deeper than this are assumed to be a call cycle.
const MAX_MODULE_DEPTH: usize = 10;

/// A node of the static module tree. The root node has an empty path and is
/// its own root.
#[derive(Debug)]
pub struct Config {
    root: Weak<Config>,
    parent: Weak<Config>,
    pub path: addrs::Module,
    pub children: BTreeMap<String, Rc<Config>>,
    pub module: Rc<Module>,
    /// Where the parent calls this module. `None` at the root.
    pub call_range: Option<SourceRange>,
    pub source_addr: Option<ModuleSource>,
    pub version: Option<String>,
}

/// What a [`ModuleWalker`] is asked to load.
#[derive(Debug)]
pub struct ModuleRequest<'a> {
    pub name: &'a str,
    pub path: addrs::Module,
    pub source_addr: &'a ModuleSource,
    pub parent: &'a Module,
    pub call_range: &'a SourceRange,
}

/// Loads the module a call refers to.
pub trait ModuleWalker {
    /// Returns `None` when the module is not available; the call is then left
    /// out of the tree.
    fn load_module(&self, req: &ModuleRequest<'_>) -> (Option<Module>, Diagnostics);
}

impl<F> ModuleWalker for F
where
    F: Fn(&ModuleRequest<'_>) -> (Option<Module>, Diagnostics),
{
    fn load_module(&self, req: &ModuleRequest<'_>) -> (Option<Module>, Diagnostics) {
        self(req)
    }
}

/// A walker that never loads anything, for a root-only tree.
pub struct NoModules;

impl ModuleWalker for NoModules {
    fn load_module(&self, _: &ModuleRequest<'_>) -> (Option<Module>, Diagnostics) {
        (None, Diagnostics::new())
    }
}

/// Builds the module tree below `root`, visiting calls in name order.
pub fn build_config(root: Module, walker: &dyn ModuleWalker) -> (Rc<Config>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let config = Rc::new_cyclic(|me: &Weak<Config>| {
        let module = Rc::new(root);
        let children = build_children(me, me, &addrs::Module::default(), &module, walker, &mut diags);
        Config {
            root: me.clone(),
            parent: Weak::new(),
            path: addrs::Module::default(),
            children,
            module,
            call_range: None,
            source_addr: None,
            version: None,
        }
    });
    (config, diags)
}

fn build_children(
    root: &Weak<Config>,
    parent: &Weak<Config>,
    parent_path: &addrs::Module,
    parent_module: &Module,
    walker: &dyn ModuleWalker,
    diags: &mut Diagnostics,
) -> BTreeMap<String, Rc<Config>> {
    let mut children = BTreeMap::new();

    for (name, call) in &parent_module.module_calls {
        let path = parent_path.child(name);
        if path.0.len() > MAX_MODULE_DEPTH {
            diags.push(
                Diagnostic::error(
                    "Module stack level too deep",
                    format!(
                        "This configuration has nested modules more than {MAX_MODULE_DEPTH} levels deep. This is mainly caused by circular references. current path: {path}"
                    ),
                )
                .with_subject(&call.decl_range),
            );
            return children;
        }
        let Some(source_addr) = &call.source_addr else {
            continue;
        };

        let req = ModuleRequest {
            name,
            path: path.clone(),
            source_addr,
            parent: parent_module,
            call_range: &call.decl_range,
        };
        let (module, d) = walker.load_module(&req);
        diags.extend(d);
        let Some(module) = module else {
            continue;
        };

        let child = Rc::new_cyclic(|me: &Weak<Config>| {
            let module = Rc::new(module);
            let grandchildren = build_children(root, me, &path, &module, walker, diags);
            Config {
                root: root.clone(),
                parent: parent.clone(),
                path: path.clone(),
                children: grandchildren,
                module,
                call_range: Some(call.decl_range.clone()),
                source_addr: Some(source_addr.clone()),
                version: call.version.clone(),
            }
        });
        children.insert(name.clone(), child);
    }

    children
}

impl Config {
    /// The root of the tree. `None` only once the root has been dropped.
    pub fn root(&self) -> Option<Rc<Config>> {
        self.root.upgrade()
    }

    pub fn parent(&self) -> Option<Rc<Config>> {
        self.parent.upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// True when `self` and `other` belong to the same tree.
    pub fn same_root(&self, other: &Config) -> bool {
        Weak::ptr_eq(&self.root, &other.root)
    }

    /// Follows `path` down from this node.
    pub fn descendent(&self, path: &addrs::Module) -> Option<&Config> {
        let mut current = self;
        for name in &path.0 {
            current = current.children.get(name)?;
        }
        Some(current)
    }

    /// Like [`Config::descendent`], ignoring instance keys.
    pub fn descendent_for_instance(&self, path: &ModuleInstance) -> Option<&Config> {
        self.descendent(&path.module())
    }

    /// Every node of the tree in depth-first, name order.
    pub fn all_modules(&self) -> Vec<&Config> {
        let mut out = vec![self];
        for child in self.children.values() {
            out.extend(child.all_modules());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::parse_file;
    use crate::terraform::module::File;

    fn module(src: &str) -> Module {
        let mut m = Module::new(
            ".",
            vec![File {
                path: "main.tf".into(),
                body: parse_file(src, "main.tf").unwrap(),
            }],
            vec![],
        );
        assert!(m.build().is_empty());
        m
    }

    #[test]
    fn builds_tree_in_name_order() {
        let root = module("module \"b\" {\n  source = \"./b\"\n}\nmodule \"a\" {\n  source = \"./a\"\n}\n");
        let walker = |req: &ModuleRequest<'_>| {
            let src = if req.name == "a" {
                "module \"inner\" {\n  source = \"./inner\"\n}\n"
            } else {
                ""
            };
            (Some(module(src)), Diagnostics::new())
        };
        let (config, diags) = build_config(root, &walker);
        assert!(diags.is_empty());
        assert_eq!(config.children.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        let paths: Vec<String> = config.all_modules().iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["", "module.a", "module.a.module.inner", "module.b"]);

        for node in config.all_modules() {
            assert!(node.same_root(&config));
            assert!(Rc::ptr_eq(&node.root().unwrap(), &config));
            if let Some(parent) = node.parent() {
                assert_eq!(node.path.0.len(), parent.path.0.len() + 1);
            }
        }

        let inner = ModuleInstance::root()
            .child("a", addrs::InstanceKey::Int(1))
            .child("inner", addrs::InstanceKey::NoKey);
        assert_eq!(config.descendent_for_instance(&inner).unwrap().path.to_string(), "module.a.module.inner");
        assert!(config
            .descendent_for_instance(&ModuleInstance::root().child("c", addrs::InstanceKey::NoKey))
            .is_none());
    }

    #[test]
    fn missing_modules_are_skipped() {
        let root = module("module \"a\" {\n  source = \"./a\"\n}\nmodule \"b\" {\n  source = \"./b\"\n}\n");
        let walker = |req: &ModuleRequest<'_>| {
            if req.name == "a" {
                (None, Diagnostics::from(Diagnostic::error("\"a\" module is not found", "")))
            } else {
                (Some(module("")), Diagnostics::new())
            }
        };
        let (config, diags) = build_config(root, &walker);
        assert_eq!(diags.len(), 1);
        assert_eq!(config.children.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn recursive_modules_stop_at_depth_limit() {
        let src = "module \"self\" {\n  source = \"./\"\n}\n";
        let walker = |_: &ModuleRequest<'_>| (Some(module(src)), Diagnostics::new());
        let (config, diags) = build_config(module(src), &walker);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Module stack level too deep");
        assert!(diags[0].detail.ends_with(&["module.self"; 11].join(".")));
        assert_eq!(config.all_modules().len(), 11);
    }
}
