use super::eval::{evaluate, EvalContext};
use super::funcs::FunctionTable;
use super::references::references;
use crate::addrs::{Reference, Referenceable, ResourceInstance, ResourceMode};
use crate::hclext::{Diagnostic, Diagnostics, Expression, SourceRange};
use crate::value::{convert, Type, Value};
use std::collections::BTreeMap;

/// The source of values for the objects an expression can refer to.
///
/// Every lookup returns a value even when it fails; failures also produce
/// error diagnostics and the returned value is then only a placeholder.
pub trait Data {
    fn get_count_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
    fn get_for_each_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
    fn get_input_variable(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
    fn get_local_value(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
    fn get_path_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
    fn get_terraform_attr(&self, name: &str, range: &SourceRange) -> (Value, Diagnostics);
}

/// Evaluates expressions against a [`Data`] source.
pub struct Scope<'a> {
    data: &'a dyn Data,
    functions: &'a FunctionTable,
    pure_only: bool,
}

impl<'a> Scope<'a> {
    pub fn new(data: &'a dyn Data, functions: &'a FunctionTable) -> Self {
        Self {
            data,
            functions,
            pure_only: false,
        }
    }

    pub fn pure_only(mut self, pure_only: bool) -> Self {
        self.pure_only = pure_only;
        self
    }

    /// Evaluates `expr` and converts the result to `want`. `Type::Dynamic`
    /// skips conversion.
    ///
    /// If any reference fails to resolve, the result is an unknown value of
    /// `want` and the expression itself is not evaluated.
    pub fn eval_expr(&self, expr: &Expression, want: &Type) -> (Value, Diagnostics) {
        if let Some(v) = expr.bound_value() {
            return convert_result(v.clone(), want, expr.range(), Diagnostics::new());
        }

        let (refs, mut diags) = references(expr);
        let (ctx, ctx_diags) = self.eval_context(&refs);
        diags.extend(ctx_diags);
        if diags.has_errors() {
            return (Value::unknown(want.clone()), diags);
        }

        match evaluate(expr.hcl(), &ctx) {
            Ok(v) => convert_result(v, want, expr.range(), diags),
            Err(e) => {
                diags.push(e.to_diagnostic(expr.range()));
                (Value::unknown(want.clone()), diags)
            }
        }
    }

    /// Resolves `refs` into an evaluation context.
    pub fn eval_context(&self, refs: &[Reference]) -> (EvalContext<'a>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut namespaces: BTreeMap<&'static str, BTreeMap<String, Value>> = BTreeMap::new();
        let mut resources: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        let mut data_sources: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

        for r in refs {
            let range = &r.source_range;
            let (namespace, name, lookup) = match &r.subject {
                Referenceable::InputVariable(name) => ("var", name, self.data.get_input_variable(name, range)),
                Referenceable::LocalValue(name) => ("local", name, self.data.get_local_value(name, range)),
                Referenceable::PathAttr(name) => ("path", name, self.data.get_path_attr(name, range)),
                Referenceable::TerraformAttr(name) => {
                    ("terraform", name, self.data.get_terraform_attr(name, range))
                }
                Referenceable::CountAttr(name) => ("count", name, self.data.get_count_attr(name, range)),
                Referenceable::ForEachAttr(name) => ("each", name, self.data.get_for_each_attr(name, range)),
                Referenceable::ModuleCall(name) => ("module", name, (Value::dynamic(), Diagnostics::new())),
                Referenceable::Resource(res)
                | Referenceable::ResourceInstance(ResourceInstance { resource: res, .. }) => {
                    let group = match res.mode {
                        ResourceMode::Managed => &mut resources,
                        ResourceMode::Data => &mut data_sources,
                    };
                    group
                        .entry(res.ty.clone())
                        .or_default()
                        .insert(res.name.clone(), Value::dynamic());
                    continue;
                }
            };
            let (value, d) = lookup;
            let value = if d.has_errors() { Value::unknown(value.ty()) } else { value };
            diags.extend(d);
            namespaces.entry(namespace).or_default().insert(name.clone(), value);
        }

        let mut ctx = EvalContext::with_functions(self.functions).pure_only(self.pure_only);
        for (namespace, attrs) in namespaces {
            ctx.declare_var(namespace, Value::Object(attrs));
        }
        for (ty, names) in resources {
            ctx.declare_var(ty, Value::Object(names));
        }
        if !data_sources.is_empty() {
            let types = data_sources
                .into_iter()
                .map(|(ty, names)| (ty, Value::Object(names)))
                .collect();
            ctx.declare_var("data", Value::Object(types));
        }
        (ctx, diags)
    }
}

fn convert_result(value: Value, want: &Type, range: &SourceRange, mut diags: Diagnostics) -> (Value, Diagnostics) {
    if want.is_dynamic() {
        return (value, diags);
    }
    match convert(value, want) {
        Ok(v) => (v, diags),
        Err(e) => {
            diags.push(
                Diagnostic::error("Incorrect value type", format!("Invalid expression value: {e}."))
                    .with_subject(range),
            );
            (Value::unknown(want.clone()), diags)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Variables resolve from a fixed map, everything else is an error.
    struct StaticData(BTreeMap<String, Value>);

    impl StaticData {
        fn fail(what: &str, name: &str) -> (Value, Diagnostics) {
            let diag = Diagnostic::error(format!("Unknown {what}"), format!("No {what} named {name:?}."));
            (Value::dynamic(), diag.into())
        }
    }

    impl Data for StaticData {
        fn get_count_attr(&self, _: &str, _: &SourceRange) -> (Value, Diagnostics) {
            (Value::unknown(Type::Number), Diagnostics::new())
        }
        fn get_for_each_attr(&self, name: &str, _: &SourceRange) -> (Value, Diagnostics) {
            Self::fail("each", name)
        }
        fn get_input_variable(&self, name: &str, _: &SourceRange) -> (Value, Diagnostics) {
            match self.0.get(name) {
                Some(v) => (v.clone(), Diagnostics::new()),
                None => Self::fail("variable", name),
            }
        }
        fn get_local_value(&self, name: &str, _: &SourceRange) -> (Value, Diagnostics) {
            Self::fail("local", name)
        }
        fn get_path_attr(&self, _: &str, _: &SourceRange) -> (Value, Diagnostics) {
            (Value::from("/work"), Diagnostics::new())
        }
        fn get_terraform_attr(&self, _: &str, _: &SourceRange) -> (Value, Diagnostics) {
            (Value::from("default"), Diagnostics::new())
        }
    }

    fn eval(src: &str, want: &Type) -> (Value, Diagnostics) {
        let data = StaticData(BTreeMap::from([
            ("name".to_string(), Value::from("web")),
            ("n".to_string(), Value::from(3)),
        ]));
        let functions = FunctionTable::new();
        let expr = Expression::parse(src, "main.tf").unwrap();
        Scope::new(&data, &functions).eval_expr(&expr, want)
    }

    #[test]
    fn resolves_references() {
        let (v, diags) = eval("\"${upper(var.name)}-${var.n}-${path.cwd}\"", &Type::String);
        assert!(diags.is_empty());
        assert_eq!(v, Value::from("WEB-3-/work"));
    }

    #[test]
    fn converts_to_wanted_type() {
        let (v, diags) = eval("var.n", &Type::String);
        assert!(diags.is_empty());
        assert_eq!(v, Value::from("3"));

        let (v, diags) = eval("[var.n]", &Type::Number);
        assert_eq!(v, Value::unknown(Type::Number));
        assert_eq!(diags[0].summary, "Incorrect value type");
        assert_eq!(diags[0].detail, "Invalid expression value: number required.");
    }

    #[test]
    fn reference_errors_give_unknown_of_wanted_type() {
        let (v, diags) = eval("var.missing + var.n", &Type::Number);
        assert_eq!(v, Value::unknown(Type::Number));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Unknown variable");
    }

    #[test]
    fn resources_are_unknown() {
        let (v, diags) = eval("aws_instance.web[0].id", &Type::Dynamic);
        assert!(diags.is_empty());
        assert_eq!(v, Value::dynamic());
        let (v, _) = eval("data.aws_ami.ubuntu.id", &Type::String);
        assert_eq!(v, Value::unknown(Type::String));
        let (v, _) = eval("count.index", &Type::Dynamic);
        assert_eq!(v, Value::unknown(Type::Number));
    }

    #[test]
    fn bound_expressions_skip_evaluation() {
        let data = StaticData(BTreeMap::new());
        let functions = FunctionTable::new();
        let mut expr = Expression::parse("var.missing", "main.tf").unwrap();
        expr.bind(Value::from(2));
        let (v, diags) = Scope::new(&data, &functions).eval_expr(&expr, &Type::String);
        assert!(diags.is_empty());
        assert_eq!(v, Value::from("2"));
    }
}
