use crate::addrs::{parse_ref, Reference, Traversal, TraverseStep};
use crate::hclext::{Body, Diagnostics, Expression};
use crate::value::Value;
use hcl::expr::{Expression as Expr, ObjectKey, Operation, TraversalOperator};
use hcl::template::{Directive, Element, Template};

/// Collects the reference-shaped traversals of `expr`.
///
/// Names bound by `for` expressions and template `for` directives are local
/// to the expression and are not reported.
pub fn traversals(expr: &Expr) -> Vec<Traversal> {
    let mut out = Vec::new();
    Collector {
        bound: Vec::new(),
        out: &mut out,
    }
    .expr(expr);
    out
}

/// Parses every traversal of `expr` as a reference. A bound expression has
/// already been evaluated and refers to nothing.
pub fn references(expr: &Expression) -> (Vec<Reference>, Diagnostics) {
    let mut refs = Vec::new();
    let mut diags = Diagnostics::new();
    if expr.is_bound() {
        return (refs, diags);
    }
    for traversal in traversals(expr.hcl()) {
        match parse_ref(&traversal, expr.range()) {
            Ok(r) => refs.push(r),
            Err(e) => diags.push(e.to_diagnostic(expr.range())),
        }
    }
    (refs, diags)
}

/// References of every attribute in `body` and its nested blocks.
pub fn references_in_body(body: &Body) -> (Vec<Reference>, Diagnostics) {
    let mut refs = Vec::new();
    let mut diags = Diagnostics::new();
    for expr in body.expressions() {
        let (r, d) = references(expr);
        refs.extend(r);
        diags.extend(d);
    }
    (refs, diags)
}

struct Collector<'a> {
    bound: Vec<String>,
    out: &'a mut Vec<Traversal>,
}

impl Collector<'_> {
    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|b| b == name)
    }

    /// Runs `f` with `names` bound, then unbinds them.
    fn scoped(&mut self, names: &[&str], f: impl FnOnce(&mut Self)) {
        let depth = self.bound.len();
        self.bound.extend(names.iter().map(|n| n.to_string()));
        f(self);
        self.bound.truncate(depth);
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable(v) => {
                if !self.is_bound(v.as_str()) {
                    self.out.push(Traversal::new(v.as_str(), Vec::new()));
                }
            }
            Expr::Traversal(t) => {
                let mut steps = Vec::with_capacity(t.operators.len());
                for op in &t.operators {
                    steps.push(match op {
                        TraversalOperator::GetAttr(name) => TraverseStep::Attr(name.to_string()),
                        TraversalOperator::LegacyIndex(i) => TraverseStep::Index(Value::from(*i as i64)),
                        TraversalOperator::Index(index) => match index {
                            Expr::Number(n) => TraverseStep::Index(Value::Number(n.clone())),
                            Expr::String(s) => TraverseStep::Index(Value::String(s.clone())),
                            other => {
                                self.expr(other);
                                TraverseStep::DynamicIndex
                            }
                        },
                        _ => TraverseStep::Splat,
                    });
                }
                match &t.expr {
                    Expr::Variable(v) if self.is_bound(v.as_str()) => {}
                    Expr::Variable(v) => self.out.push(Traversal::new(v.as_str(), steps)),
                    other => self.expr(other),
                }
            }
            Expr::Array(elems) => elems.iter().for_each(|e| self.expr(e)),
            Expr::Object(obj) => {
                for (key, value) in obj.iter() {
                    if let ObjectKey::Expression(k) = key {
                        self.expr(k);
                    }
                    self.expr(value);
                }
            }
            Expr::TemplateExpr(t) => {
                if let Ok(template) = Template::from_expr(t) {
                    self.template(&template);
                }
            }
            Expr::FuncCall(call) => call.args.iter().for_each(|a| self.expr(a)),
            Expr::Parenthesis(inner) => self.expr(inner),
            Expr::Conditional(c) => {
                self.expr(&c.cond_expr);
                self.expr(&c.true_expr);
                self.expr(&c.false_expr);
            }
            Expr::Operation(op) => match op.as_ref() {
                Operation::Unary(u) => self.expr(&u.expr),
                Operation::Binary(b) => {
                    self.expr(&b.lhs_expr);
                    self.expr(&b.rhs_expr);
                }
            },
            Expr::ForExpr(f) => {
                self.expr(&f.collection_expr);
                let mut names = vec![f.value_var.as_str()];
                if let Some(k) = &f.key_var {
                    names.push(k.as_str());
                }
                self.scoped(&names, |c| {
                    if let Some(k) = &f.key_expr {
                        c.expr(k);
                    }
                    c.expr(&f.value_expr);
                    if let Some(cond) = &f.cond_expr {
                        c.expr(cond);
                    }
                });
            }
            _ => {}
        }
    }

    fn template(&mut self, template: &Template) {
        for element in template.elements() {
            match element {
                Element::Literal(_) => {}
                Element::Interpolation(interp) => self.expr(&interp.expr),
                Element::Directive(directive) => {
                    let directive: &Directive = directive;
                    match directive {
                        Directive::If(dir) => {
                            self.expr(&dir.cond_expr);
                            self.template(&dir.true_template);
                            if let Some(f) = &dir.false_template {
                                self.template(f);
                            }
                        }
                        Directive::For(dir) => {
                            self.expr(&dir.collection_expr);
                            let mut names = vec![dir.value_var.as_str()];
                            if let Some(k) = &dir.key_var {
                                names.push(k.as_str());
                            }
                            self.scoped(&names, |c| c.template(&dir.template));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Referenceable;

    fn roots(src: &str) -> Vec<String> {
        traversals(&src.parse().unwrap())
            .into_iter()
            .map(|t| t.root)
            .collect()
    }

    #[test]
    fn collects_nested_traversals() {
        assert_eq!(
            roots("\"${var.a}-${upper(local.b)}\" == (count.index > 0 ? each.key : path.module)"),
            vec!["var", "local", "count", "each", "path"]
        );
        assert_eq!(roots("aws_instance.web[var.i].id"), vec!["var", "aws_instance"]);
    }

    #[test]
    fn for_bound_names_are_not_references() {
        assert_eq!(roots("[for k, v in var.m : \"${k}=${v.name}\" if v != local.x]"), vec!["var", "local"]);
        assert_eq!(roots("\"%{ for s in var.list }${s}%{ endfor }\""), vec!["var"]);
        // Bindings end with their expression.
        assert_eq!(roots("concat([for v in var.a : v], [v])"), vec!["var", "v"]);
    }

    #[test]
    fn constant_indexes_are_kept() {
        let t = &traversals(&"aws_instance.web[0].id".parse().unwrap())[0];
        assert_eq!(
            t.steps,
            vec![
                TraverseStep::Attr("web".into()),
                TraverseStep::Index(Value::from(0)),
                TraverseStep::Attr("id".into()),
            ]
        );
    }

    #[test]
    fn parses_references_and_reports_invalid() {
        let expr = Expression::parse("var.a + self.b", "test.tf").unwrap();
        let (refs, diags) = references(&expr);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].subject, Referenceable::InputVariable("a".into()));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Invalid reference");

        let mut bound = Expression::parse("var.a", "test.tf").unwrap();
        bound.bind(Value::from(1));
        assert!(references(&bound).0.is_empty());
    }
}
