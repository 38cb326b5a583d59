//! The query surface lint rules work against: module content, expression
//! values and issue emission for one module instance.

use crate::addrs::ModuleInstance;
use crate::hclext::{Body, BodySchema, Diagnostic, Diagnostics, Expression, SourceRange};
use crate::lint::{Issue, LintSeverity};
use crate::terraform::{
    default_variable_values, expand_block, override_values, BlockInstance, Config, ContextMeta, Evaluator,
    InputValue, InputValues, InstanceKeyEvalData, Module,
};
use crate::value::{Type, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Arguments of a `module` block that are not inputs of the called module.
const MODULE_CALL_META_ARGS: &[&str] = &["source", "version", "count", "for_each", "providers", "depends_on"];

/// How [`Runner::get_module_content`] treats multiplied and `dynamic` blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpandMode {
    /// Expand `count`, `for_each` and `dynamic` into instances.
    #[default]
    Expand,
    /// Return blocks as written; `dynamic` content is relabeled only.
    None,
}

pub struct Runner {
    evaluator: Evaluator,
    module: Rc<Module>,
    /// Inputs passed by the module call; empty for the root module.
    inputs: InputValues,
    issues: RefCell<Vec<Issue>>,
}

impl Runner {
    /// A runner for the root module of `config`.
    pub fn new(
        config: Rc<Config>,
        meta: ContextMeta,
        variable_values: BTreeMap<String, BTreeMap<String, Value>>,
    ) -> Self {
        let module = config.module.clone();
        Self {
            evaluator: Evaluator::new(meta, config, ModuleInstance::root(), variable_values),
            module,
            inputs: InputValues::new(),
            issues: RefCell::new(Vec::new()),
        }
    }

    pub fn module_path(&self) -> &ModuleInstance {
        &self.evaluator.module_path
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Values passed to this module instance by its call, with the range of
    /// the argument that set each.
    pub fn inputs(&self) -> &InputValues {
        &self.inputs
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Extracts `schema` from every file of the module, overrides applied.
    pub fn get_module_content(&self, schema: &BodySchema, mode: ExpandMode) -> (Body, Diagnostics) {
        match mode {
            ExpandMode::Expand => self.module.partial_content(schema, Some(&self.evaluator)),
            ExpandMode::None => self.module.partial_content(schema, None),
        }
    }

    /// Evaluates `expr` in this module instance and converts it to `want`.
    pub fn evaluate_expr(&self, expr: &Expression, want: &Type) -> (Value, Diagnostics) {
        let (value, diags) = self.evaluator.evaluate_expr(expr, want, &InstanceKeyEvalData::default());
        debug_assert!(self.evaluator.call_stack_is_empty());
        (value, diags)
    }

    /// Records an issue. The severity is settled by the rule configuration
    /// once the rule finishes.
    pub fn emit_issue(&self, rule: &str, message: impl Into<String>, range: &SourceRange) {
        self.issues.borrow_mut().push(Issue {
            rule: rule.to_string(),
            message: message.into(),
            severity: LintSeverity::Warn,
            range: range.clone(),
        });
    }

    /// Drains the issues emitted so far.
    pub fn take_issues(&self) -> Vec<Issue> {
        self.issues.take()
    }

    /// A runner per instance of every loaded module call of this module.
    /// Call arguments are evaluated here and become the child's inputs.
    pub fn module_runners(&self) -> (Vec<Runner>, Diagnostics) {
        let mut runners = Vec::new();
        let mut diags = Diagnostics::new();

        let root = &self.evaluator.config;
        let Some(node) = root.descendent_for_instance(&self.evaluator.module_path) else {
            debug_assert!(false, "no configuration for {}", self.evaluator.module_path);
            return (runners, diags);
        };

        for (name, call) in &self.module.module_calls {
            let Some(child) = node.children.get(name) else {
                log::debug!("module {name:?} is not loaded, no runner created");
                continue;
            };
            let (instances, d) = expand_block(&self.evaluator, &call.block);
            diags.extend(d);

            for instance in instances {
                let path = self.evaluator.module_path.child(name, instance.key.clone());
                let (inputs, d) = self.module_call_inputs(&child.module, &instance);
                diags.extend(d);

                let values = override_values([&default_variable_values(&child.module.variables), &inputs])
                    .into_iter()
                    .map(|(k, v)| (k, v.value))
                    .collect();
                log::debug!("created runner for {path}");
                runners.push(Runner {
                    evaluator: Evaluator::new(
                        self.evaluator.meta.clone(),
                        root.clone(),
                        path.clone(),
                        BTreeMap::from([(path.to_string(), values)]),
                    ),
                    module: child.module.clone(),
                    inputs,
                    issues: RefCell::new(Vec::new()),
                });
            }
        }
        (runners, diags)
    }

    fn module_call_inputs(&self, child: &Module, instance: &BlockInstance) -> (InputValues, Diagnostics) {
        let mut inputs = InputValues::new();
        let mut diags = Diagnostics::new();
        for (name, attr) in &instance.block.body.attributes {
            if MODULE_CALL_META_ARGS.contains(&name.as_str()) {
                continue;
            }
            if !child.variables.contains_key(name) {
                diags.push(
                    Diagnostic::error(
                        "Unsupported argument",
                        format!("An argument named {name:?} is not expected here."),
                    )
                    .with_subject(&attr.name_range),
                );
                continue;
            }
            let (value, d) = self
                .evaluator
                .evaluate_expr(&attr.expr, &Type::Dynamic, &instance.key_data);
            diags.extend(d);
            inputs.insert(
                name.clone(),
                InputValue {
                    value,
                    range: Some(attr.expr.range().clone()),
                },
            );
        }
        (inputs, diags)
    }
}
