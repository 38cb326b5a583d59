use super::config::Config;
use crate::addrs::{parse_ref, ModuleInstance, Referenceable};
use crate::hclext::{Body, BodySchema, Diagnostic, Diagnostics, Expression, SourceRange};
use crate::lang::{Data, FunctionTable, Scope};
use crate::tfhcl;
use crate::value::{convert, Type, Value};
use path_absolutize::Absolutize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;

/// Facts about the run that expressions can observe.
#[derive(Debug, Clone, Default)]
pub struct ContextMeta {
    /// The selected workspace, exposed as `terraform.workspace`.
    pub env: String,
    /// Reported as `path.cwd`; the process working directory when unset.
    pub original_working_dir: Option<PathBuf>,
    /// When set, impure functions (`timestamp`, `uuid`) yield unknown values.
    pub pure_only: bool,
}

/// Values for `count.index`, `each.key` and `each.value` while evaluating
/// one instance of a multiplied block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceKeyEvalData {
    pub count_index: Option<Value>,
    pub each_key: Option<Value>,
    pub each_value: Option<Value>,
}

impl InstanceKeyEvalData {
    pub fn count(index: i64) -> Self {
        Self {
            count_index: Some(Value::from(index)),
            ..Self::default()
        }
    }

    pub fn for_each(key: Value, value: Value) -> Self {
        Self {
            each_key: Some(key),
            each_value: Some(value),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count_index.is_none() && self.each_key.is_none() && self.each_value.is_none()
    }
}

/// Locals being evaluated, innermost last.
#[derive(Debug, Default)]
pub struct CallStack {
    stack: Vec<String>,
    seen: BTreeSet<String>,
}

impl CallStack {
    /// Fails without changing the stack if `subject` is already on it.
    pub fn push(&mut self, subject: &Referenceable, range: &SourceRange) -> Result<(), Diagnostic> {
        let key = subject.to_string();
        if self.seen.contains(&key) {
            let mut chain = self.stack.clone();
            chain.push(key);
            return Err(Diagnostic::error("circular reference found", chain.join(" -> ")).with_subject(range));
        }
        self.seen.insert(key.clone());
        self.stack.push(key);
        Ok(())
    }

    pub fn pop(&mut self) {
        if let Some(key) = self.stack.pop() {
            self.seen.remove(&key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Pops its entry when dropped.
struct CallGuard<'a> {
    stack: &'a RefCell<CallStack>,
}

impl<'a> CallGuard<'a> {
    fn push(stack: &'a RefCell<CallStack>, subject: &Referenceable, range: &SourceRange) -> Result<Self, Diagnostic> {
        stack.borrow_mut().push(subject, range)?;
        Ok(Self { stack })
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

/// Evaluates expressions of one module instance.
pub struct Evaluator {
    pub meta: ContextMeta,
    pub module_path: ModuleInstance,
    /// The root of the module tree.
    pub config: Rc<Config>,
    /// Variable values keyed by module instance path, then name.
    pub variable_values: BTreeMap<String, BTreeMap<String, Value>>,
    call_stack: RefCell<CallStack>,
    functions: FunctionTable,
}

impl Evaluator {
    pub fn new(
        meta: ContextMeta,
        config: Rc<Config>,
        module_path: ModuleInstance,
        variable_values: BTreeMap<String, BTreeMap<String, Value>>,
    ) -> Self {
        Self {
            meta,
            module_path,
            config,
            variable_values,
            call_stack: RefCell::new(CallStack::default()),
            functions: FunctionTable::new(),
        }
    }

    /// Evaluates `expr` and converts it to `want`, unless `want` is
    /// `Type::Dynamic`.
    pub fn evaluate_expr(&self, expr: &Expression, want: &Type, key_data: &InstanceKeyEvalData) -> (Value, Diagnostics) {
        let data = EvaluationData {
            evaluator: self,
            key_data,
        };
        Scope::new(&data, &self.functions)
            .pure_only(self.meta.pure_only)
            .eval_expr(expr, want)
    }

    /// Extracts `schema` from `body` with `dynamic` blocks and multiplied
    /// blocks expanded.
    pub fn expand_body(&self, body: &Body, schema: &BodySchema) -> (Body, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut refs = Vec::new();
        for (traversal, range) in tfhcl::expand_variables(body, schema) {
            match parse_ref(&traversal, &range) {
                Ok(r) => refs.push(r),
                Err(e) => diags.push(e.to_diagnostic(&range)),
            }
        }

        let key_data = InstanceKeyEvalData::default();
        let data = EvaluationData {
            evaluator: self,
            key_data: &key_data,
        };
        let scope = Scope::new(&data, &self.functions).pure_only(self.meta.pure_only);
        let (ctx, d) = scope.eval_context(&refs);
        diags.extend(d);

        let (content, d) = tfhcl::expand(body, &ctx, schema);
        diags.extend(d);
        (content, diags)
    }

    pub fn call_stack_is_empty(&self) -> bool {
        self.call_stack.borrow().is_empty()
    }

    fn module_config(&self) -> Option<&Config> {
        self.config.descendent_for_instance(&self.module_path)
    }
}

fn missing_module(path: &ModuleInstance, range: &SourceRange) -> Diagnostic {
    debug_assert!(false, "no configuration for module instance {path}");
    Diagnostic::error(
        "Module configuration not found",
        format!("Internal error: no configuration is loaded for module instance {path:?}."),
    )
    .with_subject(range)
}

/// [`Data`] for one evaluation: the evaluator's module plus the instance
/// being evaluated.
struct EvaluationData<'a> {
    evaluator: &'a Evaluator,
    key_data: &'a InstanceKeyEvalData,
}

impl Data for EvaluationData<'_> {
    fn get_count_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        // Nothing to go on outside an instance: let the caller carry on with
        // an unknown.
        if self.key_data.is_empty() {
            return (Value::unknown(Type::Number), Diagnostics::new());
        }
        match name {
            "index" => match &self.key_data.count_index {
                Some(index) => (index.clone(), Diagnostics::new()),
                None => (
                    Value::unknown(Type::Number),
                    Diagnostic::error(
                        "Reference to \"count\" in non-counted context",
                        "The \"count\" object can only be used in \"module\", \"resource\", and \"data\" blocks, and only when the \"count\" argument is set.",
                    )
                    .with_subject(range)
                    .into(),
                ),
            },
            _ => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"count\" attribute",
                    format!("The \"count\" object does not have an attribute named {name:?}. The only supported attribute is count.index, which is the index of each instance of a resource block that has the \"count\" argument set."),
                )
                .with_subject(range)
                .into(),
            ),
        }
    }

    fn get_for_each_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        if self.key_data.is_empty() {
            return (Value::dynamic(), Diagnostics::new());
        }
        let value = match name {
            "key" => &self.key_data.each_key,
            "value" => &self.key_data.each_value,
            _ => {
                return (
                    Value::dynamic(),
                    Diagnostic::error(
                        "Invalid \"each\" attribute",
                        format!("The \"each\" object does not have an attribute named {name:?}. The supported attributes are each.key and each.value, the current key and value pair of the \"for_each\" attribute set."),
                    )
                    .with_subject(range)
                    .into(),
                )
            }
        };
        match value {
            Some(v) => (v.clone(), Diagnostics::new()),
            None => (
                Value::dynamic(),
                Diagnostic::error(
                    "Reference to \"each\" in context without for_each",
                    "The \"each\" object can be used only in \"module\" or \"resource\" blocks, and only when the \"for_each\" argument is set.",
                )
                .with_subject(range)
                .into(),
            ),
        }
    }

    fn get_input_variable(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        let evaluator = self.evaluator;
        let Some(module_config) = evaluator.module_config() else {
            return (Value::dynamic(), missing_module(&evaluator.module_path, range).into());
        };
        let Some(config) = module_config.module.variables.get(name) else {
            let suggestion = name_suggestion(name, module_config.module.variables.keys().map(String::as_str));
            let hint = match suggestion {
                Some(s) => format!(" Did you mean {s:?}?"),
                None => format!(" This variable can be declared with a variable {name:?} {{}} block."),
            };
            return (
                Value::dynamic(),
                Diagnostic::error(
                    "Reference to undeclared input variable",
                    format!("An input variable with the name {name:?} has not been declared.{hint}"),
                )
                .with_subject(range)
                .into(),
            );
        };

        let module_key = evaluator.module_path.to_string();
        let Some(values) = evaluator.variable_values.get(&module_key) else {
            return (Value::unknown(config.ty.clone()), Diagnostics::new());
        };

        let mut value = match (values.get(name), &config.default) {
            (None, Some(default)) => default.clone(),
            (None, None) => Value::null(),
            (Some(v), Some(default)) if v.is_null() && !config.nullable => default.clone(),
            (Some(v), _) => v.clone(),
        };

        value = match convert(value, &config.constraint_type) {
            Ok(v) => v,
            Err(e) => {
                return (
                    Value::unknown(config.ty.clone()),
                    Diagnostic::error(
                        "Incorrect variable type",
                        format!("The resolved value of variable {name:?} is not appropriate: {e}."),
                    )
                    .with_subject(&config.decl_range)
                    .into(),
                )
            }
        };

        if !config.type_defaults.is_empty() && !value.is_null() {
            value = config.type_defaults.apply(value);
        }
        (value.mark_if(config.sensitive), Diagnostics::new())
    }

    fn get_local_value(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        let evaluator = self.evaluator;
        let Some(module_config) = evaluator.module_config() else {
            return (Value::dynamic(), missing_module(&evaluator.module_path, range).into());
        };
        let Some(local) = module_config.module.locals.get(name) else {
            let hint = name_suggestion(name, module_config.module.locals.keys().map(String::as_str))
                .map(|s| format!(" Did you mean {s:?}?"))
                .unwrap_or_default();
            return (
                Value::dynamic(),
                Diagnostic::error(
                    "Reference to undeclared local value",
                    format!("A local value with the name {name:?} has not been declared.{hint}"),
                )
                .with_subject(range)
                .into(),
            );
        };

        let subject = Referenceable::LocalValue(name.to_string());
        let _guard = match CallGuard::push(&evaluator.call_stack, &subject, range) {
            Ok(guard) => guard,
            Err(diag) => return (Value::dynamic(), diag.into()),
        };
        evaluator.evaluate_expr(&local.expr, &Type::Dynamic, &InstanceKeyEvalData::default())
    }

    fn get_path_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        let evaluator = self.evaluator;
        match name {
            "cwd" => {
                let dir = match &evaluator.meta.original_working_dir {
                    Some(dir) => Ok(dir.clone()),
                    None => std::env::current_dir(),
                };
                let absolute = dir.and_then(|d| d.absolutize().map(|p| p.into_owned()));
                match absolute {
                    Ok(path) => (
                        Value::from(path.to_string_lossy().replace('\\', "/")),
                        Diagnostics::new(),
                    ),
                    Err(e) => (
                        Value::unknown(Type::String),
                        Diagnostic::error(
                            "Failed to get working directory",
                            format!("The value for path.cwd cannot be determined due to a system error: {e}"),
                        )
                        .with_subject(range)
                        .into(),
                    ),
                }
            }
            "module" => match evaluator.module_config() {
                Some(config) => (Value::from(config.module.source_dir.clone()), Diagnostics::new()),
                None => (Value::dynamic(), missing_module(&evaluator.module_path, range).into()),
            },
            "root" => (
                Value::from(evaluator.config.module.source_dir.clone()),
                Diagnostics::new(),
            ),
            _ => {
                let hint = name_suggestion(name, ["cwd", "module", "root"].into_iter())
                    .map(|s| format!(" Did you mean {s:?}?"))
                    .unwrap_or_default();
                (
                    Value::dynamic(),
                    Diagnostic::error(
                        "Invalid \"path\" attribute",
                        format!("The \"path\" object does not have an attribute named {name:?}.{hint}"),
                    )
                    .with_subject(range)
                    .into(),
                )
            }
        }
    }

    fn get_terraform_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics) {
        match name {
            "workspace" => (Value::from(self.evaluator.meta.env.clone()), Diagnostics::new()),
            "env" => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"terraform\" attribute",
                    "The terraform.env attribute was deprecated in v0.10 and removed in v0.12. The \"state environment\" concept was renamed to \"workspace\" in v0.12, and so the workspace name can now be accessed using the terraform.workspace attribute.",
                )
                .with_subject(range)
                .into(),
            ),
            _ => (
                Value::dynamic(),
                Diagnostic::error(
                    "Invalid \"terraform\" attribute",
                    format!("The \"terraform\" object does not have an attribute named {name:?}. The only supported attribute is terraform.workspace, the name of the currently-selected workspace."),
                )
                .with_subject(range)
                .into(),
            ),
        }
    }
}

/// The first candidate within edit distance 2 of `given`.
pub fn name_suggestion<'s>(given: &str, candidates: impl Iterator<Item = &'s str>) -> Option<&'s str> {
    candidates.into_iter().find(|c| levenshtein(given, c) < 3)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = Vec::with_capacity(b.len() + 1);
        row.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row.push((prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1));
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::parse_file;
    use crate::terraform::config::{build_config, NoModules};
    use crate::terraform::input_value::variable_values;
    use crate::terraform::module::{File, Module};

    fn evaluator(src: &str) -> Evaluator {
        let mut module = Module::new(
            "/work/app",
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
        let meta = ContextMeta {
            env: "staging".into(),
            original_working_dir: Some(PathBuf::from("/work")),
            pure_only: false,
        };
        Evaluator::new(meta, config, ModuleInstance::root(), values)
    }

    fn eval(e: &Evaluator, src: &str) -> (Value, Diagnostics) {
        let expr = Expression::parse(src, "test.tf").unwrap();
        e.evaluate_expr(&expr, &Type::Dynamic, &InstanceKeyEvalData::default())
    }

    #[test]
    fn resolves_variables_and_locals() {
        let e = evaluator(
            r#"
            variable "name" {
              default = "web"
            }
            variable "secret" {
              default   = "hunter2"
              sensitive = true
            }
            locals {
              full = "${var.name}-${terraform.workspace}"
            }
            "#,
        );
        let (v, diags) = eval(&e, "local.full");
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(v, Value::from("web-staging"));
        let (v, _) = eval(&e, "var.secret");
        assert!(v.is_marked());
        assert!(e.call_stack_is_empty());
    }

    #[test]
    fn pure_only_hides_impure_functions() {
        let mut e = evaluator("");
        let (v, diags) = eval(&e, "timestamp()");
        assert!(diags.is_empty(), "{diags}");
        assert!(v.is_known());

        e.meta.pure_only = true;
        let (v, diags) = eval(&e, "timestamp()");
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(v, Value::unknown(Type::String));
        let (v, _) = eval(&e, "upper(\"a\")");
        assert_eq!(v, Value::from("A"));
    }

    #[test]
    fn self_referencing_local_is_a_cycle() {
        let e = evaluator("locals {\n  foo = local.foo\n}\n");
        let (v, diags) = eval(&e, "local.foo");
        assert!(!v.is_known());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "circular reference found");
        assert_eq!(diags[0].detail, "local.foo -> local.foo");
        assert!(e.call_stack_is_empty());
    }

    #[test]
    fn longer_cycles_report_the_chain() {
        let e = evaluator("locals {\n  a = local.b\n  b = local.c\n  c = local.a\n}\n");
        let (_, diags) = eval(&e, "local.a");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].detail, "local.a -> local.b -> local.c -> local.a");
        assert!(e.call_stack_is_empty());
    }

    #[test]
    fn undeclared_names_get_suggestions() {
        let e = evaluator("variable \"instance_type\" {}\nlocals {\n  region = \"eu\"\n}\n");
        let (v, diags) = eval(&e, "var.instance_typo");
        assert_eq!(v, Value::dynamic());
        assert_eq!(diags[0].summary, "Reference to undeclared input variable");
        assert_eq!(
            diags[0].detail,
            "An input variable with the name \"instance_typo\" has not been declared. Did you mean \"instance_type\"?"
        );
        let (_, diags) = eval(&e, "var.zone");
        assert_eq!(
            diags[0].detail,
            "An input variable with the name \"zone\" has not been declared. This variable can be declared with a variable \"zone\" {} block."
        );
        let (_, diags) = eval(&e, "local.regoin");
        assert!(diags[0].detail.ends_with(" Did you mean \"region\"?"));
        let (_, diags) = eval(&e, "path.modul");
        assert_eq!(
            diags[0].detail,
            "The \"path\" object does not have an attribute named \"modul\". Did you mean \"module\"?"
        );
    }

    #[test]
    fn variable_values_follow_declaration() {
        let e = evaluator(
            r#"
            variable "replicas" {
              type     = number
              default  = 2
              nullable = false
            }
            variable "obj" {
              type = object({ a = string, b = optional(string, "x") })
              default = { a = "1" }
            }
            "#,
        );
        let (v, diags) = eval(&e, "var.replicas");
        assert!(diags.is_empty());
        assert_eq!(v, Value::from(2));
        let (v, diags) = eval(&e, "var.obj.b");
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(v, Value::from("x"));
    }

    #[test]
    fn count_and_each_outside_instances() {
        let e = evaluator("");
        let (v, diags) = eval(&e, "count.index");
        assert!(diags.is_empty());
        assert_eq!(v, Value::unknown(Type::Number));

        let key_data = InstanceKeyEvalData::for_each(Value::from("a"), Value::from(1));
        let expr = Expression::parse("count.index", "test.tf").unwrap();
        let (_, diags) = e.evaluate_expr(&expr, &Type::Dynamic, &key_data);
        assert_eq!(diags[0].summary, "Reference to \"count\" in non-counted context");

        let expr = Expression::parse("\"${each.key}=${each.value}\"", "test.tf").unwrap();
        let (v, diags) = e.evaluate_expr(&expr, &Type::Dynamic, &key_data);
        assert!(diags.is_empty());
        assert_eq!(v, Value::from("a=1"));

        let expr = Expression::parse("each.key", "test.tf").unwrap();
        let (_, diags) = e.evaluate_expr(&expr, &Type::Dynamic, &InstanceKeyEvalData::count(0));
        assert_eq!(diags[0].summary, "Reference to \"each\" in context without for_each");
    }

    #[test]
    fn path_and_terraform_attributes() {
        let e = evaluator("");
        assert_eq!(eval(&e, "path.cwd").0, Value::from("/work"));
        assert_eq!(eval(&e, "path.module").0, Value::from("/work/app"));
        assert_eq!(eval(&e, "path.root").0, Value::from("/work/app"));
        let (_, diags) = eval(&e, "terraform.env");
        assert_eq!(diags[0].summary, "Invalid \"terraform\" attribute");
    }

    #[test]
    fn expand_body_resolves_references() {
        let e = evaluator("variable \"n\" {\n  default = 2\n}\nresource \"a\" \"b\" {\n  count = var.n\n  v = count.index\n}\n");
        let module = Rc::clone(&e.config.module);
        let schema = BodySchema::new().block(
            crate::hclext::BlockSchema::new("resource", &["type", "name"]).body(BodySchema::new().attribute("v")),
        );
        let (content, diags) = module.partial_content(&schema, Some(&e));
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(content.blocks.len(), 2);
        let v = content.blocks[1].body.find_attr("v").unwrap().expr.bound_value().cloned();
        assert_eq!(v, Some(Value::from(1)));
    }

    #[test]
    fn suggestion_distance() {
        assert_eq!(levenshtein("instance_typo", "instance_type"), 1);
        assert_eq!(name_suggestion("abc", ["xyz"].into_iter()), None);
        assert_eq!(name_suggestion("ab", ["abcde", "abc"].into_iter()), Some("abc"));
    }
}
