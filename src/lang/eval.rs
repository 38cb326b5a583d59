use super::funcs::FunctionTable;
use crate::hclext::{Diagnostic, SourceRange};
use crate::value::{convert, Type, Value};
use hcl::expr::{
    BinaryOp, BinaryOperator, Conditional, Expression, ForExpr, FuncCall, ObjectKey, Operation, TemplateExpr,
    Traversal, TraversalOperator, UnaryOp, UnaryOperator,
};
use hcl::template::{Directive, Element, Template};
use hcl::Number;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("There is no variable named \"{0}\".")]
    UnknownVariable(String),
    #[error("{0}")]
    UnsupportedAttribute(String),
    #[error("{0}")]
    InvalidIndex(String),
    #[error("{0}")]
    NullAccess(String),
    #[error("There is no function named \"{0}\".")]
    UnknownFunction(String),
    #[error("Call to function \"{name}\" failed: {message}")]
    FunctionCall { name: String, message: String },
    #[error("{0}")]
    InvalidOperand(String),
    #[error("{0}")]
    InvalidCondition(String),
    #[error("{0}")]
    InvalidFor(String),
    #[error("{0}")]
    InvalidTemplate(String),
    #[error("{0}")]
    Unsupported(String),
}

impl EvalError {
    pub fn summary(&self) -> &'static str {
        match self {
            EvalError::UnknownVariable(_) => "Unknown variable",
            EvalError::UnsupportedAttribute(_) => "Unsupported attribute",
            EvalError::InvalidIndex(_) => "Invalid index",
            EvalError::NullAccess(_) => "Attempt to get attribute from null value",
            EvalError::UnknownFunction(_) => "Call to unknown function",
            EvalError::FunctionCall { .. } => "Error in function call",
            EvalError::InvalidOperand(_) => "Invalid operand",
            EvalError::InvalidCondition(_) => "Incorrect condition type",
            EvalError::InvalidFor(_) => "Invalid 'for' expression",
            EvalError::InvalidTemplate(_) => "Invalid template interpolation value",
            EvalError::Unsupported(_) => "Unsupported expression",
        }
    }

    pub fn detail(&self) -> String {
        self.to_string()
    }

    pub fn to_diagnostic(&self, range: &SourceRange) -> Diagnostic {
        Diagnostic::error(self.summary(), self.detail()).with_subject(range)
    }
}

/// Variables and functions visible to an expression.
///
/// Child contexts shadow their parent's variables; `for` expressions and
/// dynamic block iterators are evaluated in children.
#[derive(Debug, Default)]
pub struct EvalContext<'a> {
    variables: BTreeMap<String, Value>,
    functions: Option<&'a FunctionTable>,
    pure_only: bool,
    parent: Option<&'a EvalContext<'a>>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_functions(functions: &'a FunctionTable) -> Self {
        Self {
            functions: Some(functions),
            ..Self::default()
        }
    }

    /// Impure functions return unknown values.
    pub fn pure_only(mut self, pure_only: bool) -> Self {
        self.pure_only = pure_only;
        self
    }

    pub fn child(&self) -> EvalContext<'_> {
        EvalContext {
            variables: BTreeMap::new(),
            functions: self.functions,
            pure_only: self.pure_only,
            parent: Some(self),
        }
    }

    pub fn declare_var(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        match self.variables.get(name) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.var(name)),
        }
    }

    pub fn functions(&self) -> Option<&'a FunctionTable> {
        self.functions
    }

    pub fn is_pure_only(&self) -> bool {
        self.pure_only
    }
}

/// Evaluates a configuration expression.
pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expression::Null => Ok(Value::null()),
        Expression::Bool(b) => Ok(Value::Bool(*b)),
        Expression::Number(n) => Ok(Value::Number(n.clone())),
        Expression::String(s) => Ok(Value::String(s.clone())),
        Expression::Array(elems) => elems
            .iter()
            .map(|e| evaluate(e, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        Expression::Object(obj) => {
            let mut attrs = BTreeMap::new();
            let mut marked = false;
            let mut unknown = false;
            for (key, value) in obj.iter() {
                let key = match key {
                    ObjectKey::Identifier(id) => id.to_string(),
                    ObjectKey::Expression(key_expr) => {
                        let (key, m) = evaluate(key_expr, ctx)?.unmark();
                        marked |= m;
                        if !key.is_known() {
                            unknown = true;
                            continue;
                        }
                        string_key(key, "Object key")?
                    }
                    _ => return Err(EvalError::Unsupported("Unsupported object key.".into())),
                };
                attrs.insert(key, evaluate(value, ctx)?);
            }
            let result = if unknown { Value::dynamic() } else { Value::Object(attrs) };
            Ok(result.mark_if(marked))
        }
        Expression::TemplateExpr(t) => eval_template_expr(t, ctx),
        Expression::Variable(v) => ctx
            .var(v.as_str())
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(v.to_string())),
        Expression::Traversal(t) => eval_traversal(t, ctx),
        Expression::FuncCall(call) => eval_call(call, ctx),
        Expression::Parenthesis(inner) => evaluate(inner, ctx),
        Expression::Conditional(c) => eval_conditional(c, ctx),
        Expression::Operation(op) => eval_operation(op, ctx),
        Expression::ForExpr(f) => eval_for(f, ctx),
        _ => Err(EvalError::Unsupported(
            "This kind of expression is not supported here.".into(),
        )),
    }
}

/// Evaluates an expression that may not refer to anything.
pub fn evaluate_constant(expr: &Expression) -> Result<Value, EvalError> {
    evaluate(expr, &EvalContext::new())
}

/// Evaluates an attribute expression, honoring a value bound by expansion.
pub fn evaluate_expression(expr: &crate::hclext::Expression, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr.bound_value() {
        Some(v) => Ok(v.clone()),
        None => evaluate(expr.hcl(), ctx),
    }
}

fn string_key(key: Value, what: &str) -> Result<String, EvalError> {
    if key.is_null() {
        return Err(EvalError::InvalidIndex(format!("{what} must not be null.")));
    }
    match convert(key, &Type::String) {
        Ok(Value::String(s)) => Ok(s),
        _ => Err(EvalError::InvalidIndex(format!("{what} must be a string."))),
    }
}

fn to_bool(v: Value, null_msg: &str, type_msg: &str) -> Result<bool, EvalError> {
    if v.is_null() {
        return Err(EvalError::InvalidCondition(null_msg.to_string()));
    }
    match convert(v, &Type::Bool) {
        Ok(Value::Bool(b)) => Ok(b),
        _ => Err(EvalError::InvalidCondition(type_msg.to_string())),
    }
}

#[derive(Default)]
struct TemplateOut {
    text: String,
    unknown: bool,
    marked: bool,
}

impl TemplateOut {
    fn append(&mut self, v: Value) -> Result<(), EvalError> {
        let (v, marked) = v.unmark_deep();
        self.marked |= marked;
        if !v.is_known() {
            self.unknown = true;
            return Ok(());
        }
        if v.is_null() {
            return Err(EvalError::InvalidTemplate(
                "The expression result is null. Cannot include a null value in a string template.".into(),
            ));
        }
        match convert(v, &Type::String) {
            Ok(Value::String(s)) => self.text.push_str(&s),
            Ok(_) => self.unknown = true,
            Err(e) => {
                return Err(EvalError::InvalidTemplate(format!(
                    "Cannot include the given value in a string template: {e}."
                )))
            }
        }
        Ok(())
    }
}

fn eval_template_expr(t: &TemplateExpr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let template = Template::from_expr(t).map_err(|e| EvalError::InvalidTemplate(e.to_string()))?;
    // A lone interpolation yields its value unchanged.
    if let [Element::Interpolation(interp)] = template.elements() {
        return evaluate(&interp.expr, ctx);
    }
    let mut out = TemplateOut::default();
    render_template(&template, ctx, &mut out)?;
    let result = if out.unknown {
        Value::unknown(Type::String)
    } else {
        Value::String(out.text)
    };
    Ok(result.mark_if(out.marked))
}

fn render_template(template: &Template, ctx: &EvalContext<'_>, out: &mut TemplateOut) -> Result<(), EvalError> {
    for element in template.elements() {
        match element {
            Element::Literal(s) => out.text.push_str(s),
            Element::Interpolation(interp) => out.append(evaluate(&interp.expr, ctx)?)?,
            Element::Directive(directive) => {
                let directive: &Directive = directive;
                match directive {
                    Directive::If(dir) => {
                        let (cond, marked) = evaluate(&dir.cond_expr, ctx)?.unmark();
                        out.marked |= marked;
                        if !cond.is_known() {
                            out.unknown = true;
                            continue;
                        }
                        let cond = to_bool(
                            cond,
                            "The condition value is null. Conditions must either be true or false.",
                            "The condition expression must be of type bool.",
                        )?;
                        if cond {
                            render_template(&dir.true_template, ctx, out)?;
                        } else if let Some(false_template) = &dir.false_template {
                            render_template(false_template, ctx, out)?;
                        }
                    }
                    Directive::For(dir) => {
                        let (collection, marked) = evaluate(&dir.collection_expr, ctx)?.unmark();
                        out.marked |= marked;
                        if !collection.is_known() {
                            out.unknown = true;
                            continue;
                        }
                        for (key, value) in iteration_pairs(&collection)? {
                            let mut child = ctx.child();
                            if let Some(key_var) = &dir.key_var {
                                child.declare_var(key_var.as_str(), key);
                            }
                            child.declare_var(dir.value_var.as_str(), value);
                            render_template(&dir.template, &child, out)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn iteration_pairs(collection: &Value) -> Result<Vec<(Value, Value)>, EvalError> {
    if collection.is_null() {
        return Err(EvalError::InvalidFor(
            "A null value cannot be used as the collection in a 'for' expression.".into(),
        ));
    }
    collection.elements().ok_or_else(|| {
        EvalError::InvalidFor(format!(
            "A value of type {} cannot be used as the collection in a 'for' expression.",
            collection.ty()
        ))
    })
}

fn eval_traversal(t: &Traversal, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let base = evaluate(&t.expr, ctx)?;
    apply_operators(base, &t.operators, ctx)
}

fn apply_operators(mut value: Value, ops: &[TraversalOperator], ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    for (i, op) in ops.iter().enumerate() {
        value = match op {
            TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
                return splat(value, &ops[i + 1..], ctx);
            }
            TraversalOperator::GetAttr(name) => get_attr(value, name.as_str())?,
            TraversalOperator::Index(key_expr) => index(value, evaluate(key_expr, ctx)?)?,
            TraversalOperator::LegacyIndex(i) => index(value, Value::from(*i as i64))?,
        };
    }
    Ok(value)
}

/// Applies the remaining operators to every element. A null value splats to
/// an empty tuple and a non-collection to a one-element tuple.
fn splat(value: Value, rest: &[TraversalOperator], ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let (value, marked) = value.unmark();
    let result = match value {
        Value::Unknown(_) => Value::dynamic(),
        Value::Null(_) => Value::Tuple(Vec::new()),
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => Value::Tuple(
            elems
                .into_iter()
                .map(|e| apply_operators(e, rest, ctx))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => Value::Tuple(vec![apply_operators(other, rest, ctx)?]),
    };
    Ok(result.mark_if(marked))
}

fn get_attr(value: Value, name: &str) -> Result<Value, EvalError> {
    let (value, marked) = value.unmark();
    let result = match value {
        Value::Unknown(Type::Object(attrs, _)) => match attrs.get(name) {
            Some(ty) => Value::unknown(ty.clone()),
            None => return Err(unsupported_attribute(name)),
        },
        Value::Unknown(Type::Map(elem)) => Value::unknown(*elem),
        Value::Unknown(_) => Value::dynamic(),
        Value::Null(_) => {
            return Err(EvalError::NullAccess(format!(
                "Can't access attribute \"{name}\" on a null value."
            )))
        }
        Value::Object(mut attrs) => attrs.remove(name).ok_or_else(|| unsupported_attribute(name))?,
        Value::Map(_, mut elems) => elems.remove(name).ok_or_else(|| {
            EvalError::InvalidIndex(format!("The given key \"{name}\" does not identify an element in this collection value."))
        })?,
        other => {
            return Err(EvalError::UnsupportedAttribute(format!(
                "Can't access attributes on a value of type {}.",
                other.ty()
            )))
        }
    };
    Ok(result.mark_if(marked))
}

fn unsupported_attribute(name: &str) -> EvalError {
    EvalError::UnsupportedAttribute(format!("This object does not have an attribute named \"{name}\"."))
}

fn index(value: Value, key: Value) -> Result<Value, EvalError> {
    let (value, value_marked) = value.unmark();
    let (key, key_marked) = key.unmark();
    let marked = value_marked || key_marked;
    let missing = || {
        EvalError::InvalidIndex("The given key does not identify an element in this collection value.".into())
    };

    if !key.is_known() {
        return Ok(Value::unknown(element_type(&value.ty())).mark_if(marked));
    }
    if key.is_null() {
        return Err(EvalError::InvalidIndex("Can't use a null value as an indexing key.".into()));
    }
    let result = match value {
        Value::Unknown(ty) => Value::unknown(element_type(&ty)),
        Value::Null(_) => return Err(EvalError::InvalidIndex("Can't index a null value.".into())),
        Value::List(_, elems) | Value::Tuple(elems) => {
            let i = match convert(key, &Type::Number) {
                Ok(Value::Number(n)) => whole_index(&n).ok_or_else(missing)?,
                _ => return Err(missing()),
            };
            elems.into_iter().nth(i).ok_or_else(missing)?
        }
        Value::Map(_, mut elems) | Value::Object(mut elems) => {
            let key = string_key(key, "Index key")?;
            elems.remove(&key).ok_or_else(missing)?
        }
        Value::Set(..) => {
            return Err(EvalError::InvalidIndex(
                "Elements of a set are identified only by their value and don't have any separate index or key to select with, so it is only possible to perform operations across all elements of the set.".into(),
            ))
        }
        _ => return Err(EvalError::InvalidIndex("This value does not have any indices.".into())),
    };
    Ok(result.mark_if(marked))
}

fn whole_index(n: &Number) -> Option<usize> {
    if let Some(i) = n.as_i64() {
        return usize::try_from(i).ok();
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
        .map(|f| f as usize)
}

fn element_type(ty: &Type) -> Type {
    match ty {
        Type::List(elem) | Type::Set(elem) | Type::Map(elem) => (**elem).clone(),
        _ => Type::Dynamic,
    }
}

fn eval_call(call: &FuncCall, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let name = call.name.to_string();
    match name.as_str() {
        "try" => return eval_try(&call.args, ctx),
        "can" => {
            let [arg] = call.args.as_slice() else {
                return Err(arity_error(&name));
            };
            return Ok(match evaluate(arg, ctx) {
                Ok(v) if !v.is_whole_known() => Value::unknown(Type::Bool),
                Ok(_) => Value::Bool(true),
                Err(_) => Value::Bool(false),
            });
        }
        _ => {}
    }

    let mut args = call
        .args
        .iter()
        .map(|a| evaluate(a, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    if call.expand_final {
        if let Some(last) = args.pop() {
            let (last, marked) = last.unmark();
            match last {
                Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                    args.extend(elems.into_iter().map(|e| e.mark_if(marked)));
                }
                Value::Unknown(_) => return Ok(Value::dynamic()),
                _ => {
                    return Err(EvalError::InvalidOperand(
                        "The expanding argument (indicated by ...) must be of a tuple, list, or set type.".into(),
                    ))
                }
            }
        }
    }

    match name.as_str() {
        "sensitive" => Ok(single(&name, args)?.mark()),
        "nonsensitive" => Ok(single(&name, args)?.unmark_deep().0),
        "tolist" | "toset" | "tomap" => {
            let want = match name.as_str() {
                "tolist" => Type::list(Type::Dynamic),
                "toset" => Type::set(Type::Dynamic),
                _ => Type::map(Type::Dynamic),
            };
            convert(single(&name, args)?, &want).map_err(|e| EvalError::FunctionCall {
                name: name.clone(),
                message: e.to_string(),
            })
        }
        _ => {
            let functions = ctx
                .functions()
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            functions.call(&name, args, ctx.is_pure_only())
        }
    }
}

fn arity_error(name: &str) -> EvalError {
    EvalError::FunctionCall {
        name: name.to_string(),
        message: "exactly one argument is required".into(),
    }
}

fn single(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(arity_error(name)),
    }
}

/// First argument that evaluates without error. A result that is not
/// wholly known might still fail later, so it makes the whole call unknown.
fn eval_try(args: &[Expression], ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    for arg in args {
        match evaluate(arg, ctx) {
            Ok(v) if !v.is_whole_known() => return Ok(Value::dynamic()),
            Ok(v) => return Ok(v),
            Err(_) => continue,
        }
    }
    Err(EvalError::FunctionCall {
        name: "try".into(),
        message: "no expression succeeded".into(),
    })
}

fn eval_conditional(c: &Conditional, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let (cond, marked) = evaluate(&c.cond_expr, ctx)?.unmark();
    if !cond.is_known() {
        return Ok(Value::dynamic().mark_if(marked));
    }
    let cond = to_bool(
        cond,
        "The condition value is null. Conditions must either be true or false.",
        "The condition expression must be of type bool.",
    )?;
    let result = if cond {
        evaluate(&c.true_expr, ctx)?
    } else {
        evaluate(&c.false_expr, ctx)?
    };
    Ok(result.mark_if(marked))
}

fn eval_operation(op: &Operation, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match op {
        Operation::Unary(unary) => eval_unary(unary, ctx),
        Operation::Binary(binary) => eval_binary(binary, ctx),
    }
}

fn eval_unary(op: &UnaryOp, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let (v, marked) = evaluate(&op.expr, ctx)?.unmark();
    let result = match op.operator {
        UnaryOperator::Not => match operand_bool(v)? {
            Some(b) => Value::Bool(!b),
            None => Value::unknown(Type::Bool),
        },
        UnaryOperator::Neg => match operand_number(v)? {
            Some(n) => match n.as_i64().and_then(i64::checked_neg) {
                Some(i) => Value::from(i),
                None => number_from_f64(-n.as_f64().unwrap_or(f64::NAN))?,
            },
            None => Value::unknown(Type::Number),
        },
    };
    Ok(result.mark_if(marked))
}

fn eval_binary(op: &BinaryOp, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let (lhs, lhs_marked) = evaluate(&op.lhs_expr, ctx)?.unmark_deep();
    let (rhs, rhs_marked) = evaluate(&op.rhs_expr, ctx)?.unmark_deep();
    let marked = lhs_marked || rhs_marked;

    let result = match op.operator {
        BinaryOperator::Eq | BinaryOperator::NotEq => {
            if !lhs.is_whole_known() || !rhs.is_whole_known() {
                Value::unknown(Type::Bool)
            } else {
                let eq = values_equal(&lhs, &rhs);
                Value::Bool(if op.operator == BinaryOperator::Eq { eq } else { !eq })
            }
        }
        BinaryOperator::And | BinaryOperator::Or => match (operand_bool(lhs)?, operand_bool(rhs)?) {
            (Some(a), Some(b)) => Value::Bool(if op.operator == BinaryOperator::And {
                a && b
            } else {
                a || b
            }),
            _ => Value::unknown(Type::Bool),
        },
        BinaryOperator::Less | BinaryOperator::LessEq | BinaryOperator::Greater | BinaryOperator::GreaterEq => {
            match (operand_number(lhs)?, operand_number(rhs)?) {
                (Some(a), Some(b)) => {
                    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                    Value::Bool(match op.operator {
                        BinaryOperator::Less => a < b,
                        BinaryOperator::LessEq => a <= b,
                        BinaryOperator::Greater => a > b,
                        _ => a >= b,
                    })
                }
                _ => Value::unknown(Type::Bool),
            }
        }
        operator => match (operand_number(lhs)?, operand_number(rhs)?) {
            (Some(a), Some(b)) => arithmetic(operator, &a, &b)?,
            _ => Value::unknown(Type::Number),
        },
    };
    Ok(result.mark_if(marked))
}

fn operand_bool(v: Value) -> Result<Option<bool>, EvalError> {
    if !v.is_known() {
        return Ok(None);
    }
    if v.is_null() {
        return Err(EvalError::InvalidOperand(
            "Unsuitable value for operand: a bool is required, but the value is null.".into(),
        ));
    }
    match convert(v, &Type::Bool) {
        Ok(Value::Bool(b)) => Ok(Some(b)),
        _ => Err(EvalError::InvalidOperand("Unsuitable value for operand: a bool is required.".into())),
    }
}

fn operand_number(v: Value) -> Result<Option<Number>, EvalError> {
    if !v.is_known() {
        return Ok(None);
    }
    if v.is_null() {
        return Err(EvalError::InvalidOperand(
            "Unsuitable value for operand: a number is required, but the value is null.".into(),
        ));
    }
    match convert(v, &Type::Number) {
        Ok(Value::Number(n)) => Ok(Some(n)),
        _ => Err(EvalError::InvalidOperand("Unsuitable value for operand: a number is required.".into())),
    }
}

fn arithmetic(operator: BinaryOperator, a: &Number, b: &Number) -> Result<Value, EvalError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match operator {
            BinaryOperator::Plus => x.checked_add(y),
            BinaryOperator::Minus => x.checked_sub(y),
            BinaryOperator::Mul => x.checked_mul(y),
            BinaryOperator::Mod if y != 0 => x.checked_rem(y),
            _ => None,
        };
        if let Some(r) = exact {
            return Ok(Value::from(r));
        }
    }
    let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    let r = match operator {
        BinaryOperator::Plus => x + y,
        BinaryOperator::Minus => x - y,
        BinaryOperator::Mul => x * y,
        BinaryOperator::Div if y == 0.0 => {
            return Err(EvalError::InvalidOperand("Can't divide by zero.".into()))
        }
        BinaryOperator::Div => x / y,
        BinaryOperator::Mod if y == 0.0 => {
            return Err(EvalError::InvalidOperand("Can't use modulo by zero.".into()))
        }
        BinaryOperator::Mod => x % y,
        _ => return Err(EvalError::Unsupported("Unsupported operator.".into())),
    };
    number_from_f64(r)
}

fn number_from_f64(f: f64) -> Result<Value, EvalError> {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::InvalidOperand("The result is not a finite number.".into()))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Null(_), Value::Null(_)) => true,
        (Value::Null(_), _) | (_, Value::Null(_)) => false,
        _ => a.to_hcl() == b.to_hcl(),
    }
}

fn eval_for(f: &ForExpr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let (collection, mut marked) = evaluate(&f.collection_expr, ctx)?.unmark();
    if !collection.is_known() {
        return Ok(Value::dynamic().mark_if(marked));
    }

    let mut tuple = Vec::new();
    let mut object = BTreeMap::new();
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut unknown = false;

    for (key, value) in iteration_pairs(&collection)? {
        let mut child = ctx.child();
        if let Some(key_var) = &f.key_var {
            child.declare_var(key_var.as_str(), key);
        }
        child.declare_var(f.value_var.as_str(), value);

        if let Some(cond_expr) = &f.cond_expr {
            let (cond, m) = evaluate(cond_expr, &child)?.unmark();
            marked |= m;
            if !cond.is_known() {
                unknown = true;
                continue;
            }
            let keep = to_bool(
                cond,
                "The condition value is null. Conditions must either be true or false.",
                "The 'if' clause value is invalid: a bool is required.",
            )?;
            if !keep {
                continue;
            }
        }

        let Some(key_expr) = &f.key_expr else {
            tuple.push(evaluate(&f.value_expr, &child)?);
            continue;
        };
        let (key, m) = evaluate(key_expr, &child)?.unmark();
        marked |= m;
        if !key.is_known() {
            unknown = true;
            continue;
        }
        let key = string_key(key, "Key expression in 'for' expression")
            .map_err(|e| EvalError::InvalidFor(e.detail()))?;
        let value = evaluate(&f.value_expr, &child)?;
        if f.grouping {
            groups.entry(key).or_default().push(value);
        } else if object.contains_key(&key) {
            return Err(EvalError::InvalidFor(format!(
                "Two different items produced the key \"{key}\" in this 'for' expression. If duplicates are expected, use the ellipsis (...) after the value expression to enable grouping by key."
            )));
        } else {
            object.insert(key, value);
        }
    }

    let result = if unknown {
        Value::dynamic()
    } else if f.key_expr.is_none() {
        Value::Tuple(tuple)
    } else if f.grouping {
        Value::Object(groups.into_iter().map(|(k, v)| (k, Value::Tuple(v))).collect())
    } else {
        Value::Object(object)
    };
    Ok(result.mark_if(marked))
}
