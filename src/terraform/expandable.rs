use super::evaluator::{Evaluator, InstanceKeyEvalData};
use crate::addrs::{InstanceKey, Referenceable};
use crate::hclext::{Block, Diagnostics, Expression};
use crate::lang::references;
use crate::tfhcl::{count_instances, for_each_instances};
use crate::value::{Type, Value};

/// One instance of a multiplied block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInstance {
    pub key: InstanceKey,
    pub key_data: InstanceKeyEvalData,
    pub block: Block,
}

/// Multiplies `block` by its `count` or `for_each` argument.
///
/// Each instance is an independent copy in which attributes referring to
/// `count` or `each` are already evaluated. An argument that is not known yet
/// produces no instances and no error.
pub fn expand_block(evaluator: &Evaluator, block: &Block) -> (Vec<BlockInstance>, Diagnostics) {
    if let Some(attr) = block.body.find_attr("count") {
        return expand_by_count(evaluator, block, &attr.expr);
    }
    if let Some(attr) = block.body.find_attr("for_each") {
        return expand_by_for_each(evaluator, block, &attr.expr);
    }
    let instance = BlockInstance {
        key: InstanceKey::NoKey,
        key_data: InstanceKeyEvalData::default(),
        block: block.clone(),
    };
    (vec![instance], Diagnostics::new())
}

fn expand_by_count(evaluator: &Evaluator, block: &Block, expr: &Expression) -> (Vec<BlockInstance>, Diagnostics) {
    let (value, mut diags) = evaluator.evaluate_expr(expr, &Type::Number, &InstanceKeyEvalData::default());
    if diags.has_errors() {
        return (Vec::new(), diags);
    }
    let count = match count_instances(value, expr.range()) {
        Ok(Some(count)) => count,
        Ok(None) => {
            log::debug!("count of {} is not known yet, skipping", block.def_range);
            return (Vec::new(), diags);
        }
        Err(diag) => {
            diags.push(diag);
            return (Vec::new(), diags);
        }
    };

    let mut instances = Vec::new();
    for index in 0..count {
        let key_data = InstanceKeyEvalData::count(index);
        let (block, d) = bind_instance(evaluator, block, &key_data, |r| matches!(r, Referenceable::CountAttr(_)));
        diags.extend(d);
        instances.push(BlockInstance {
            key: InstanceKey::Int(index),
            key_data,
            block,
        });
    }
    (instances, diags)
}

fn expand_by_for_each(evaluator: &Evaluator, block: &Block, expr: &Expression) -> (Vec<BlockInstance>, Diagnostics) {
    let (value, mut diags) = evaluator.evaluate_expr(expr, &Type::Dynamic, &InstanceKeyEvalData::default());
    if diags.has_errors() {
        return (Vec::new(), diags);
    }
    let elements = match for_each_instances(value, expr.range()) {
        Ok(Some(elements)) => elements,
        Ok(None) => {
            log::debug!("for_each of {} is not known yet, skipping", block.def_range);
            return (Vec::new(), diags);
        }
        Err(diag) => {
            diags.push(diag);
            return (Vec::new(), diags);
        }
    };

    let mut instances = Vec::new();
    for (key, value) in elements {
        let instance_key = match &key {
            Value::String(s) => InstanceKey::String(s.clone()),
            other => InstanceKey::String(other.to_string()),
        };
        let key_data = InstanceKeyEvalData::for_each(key, value);
        let (block, d) = bind_instance(evaluator, block, &key_data, |r| matches!(r, Referenceable::ForEachAttr(_)));
        diags.extend(d);
        instances.push(BlockInstance {
            key: instance_key,
            key_data,
            block,
        });
    }
    (instances, diags)
}

/// Copies `block`, binding the value of every attribute with a reference
/// `selects` picks. Marked values are left unbound.
fn bind_instance(
    evaluator: &Evaluator,
    block: &Block,
    key_data: &InstanceKeyEvalData,
    selects: impl Fn(&Referenceable) -> bool,
) -> (Block, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut instance = block.clone();
    instance.body.walk_attributes_mut(&mut |attr| {
        let (refs, _) = references(&attr.expr);
        if !refs.iter().any(|r| selects(&r.subject)) {
            return;
        }
        let (value, d) = evaluator.evaluate_expr(&attr.expr, &Type::Dynamic, key_data);
        diags.extend(d);
        if !value.contains_marked() {
            attr.expr.bind(value);
        }
    });
    (instance, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ModuleInstance;
    use crate::hclext::{parse_file, BlockSchema, BodySchema};
    use crate::terraform::config::{build_config, NoModules};
    use crate::terraform::evaluator::ContextMeta;
    use crate::terraform::input_value::variable_values;
    use crate::terraform::module::{File, Module};

    fn setup(src: &str) -> (Evaluator, Block) {
        let body = parse_file(src, "main.tf").unwrap();
        let mut module = Module::new(".", vec![File { path: "main.tf".into(), body }], vec![]);
        assert!(module.build().is_empty());
        let (config, _) = build_config(module, &NoModules);
        let (values, _) = variable_values(&config, Vec::new(), &[]);
        let schema = BodySchema::new().block(BlockSchema::new("resource", &["type", "name"]).body(BodySchema::just_attributes()));
        let (content, _) = config.module.partial_content(&schema, None);
        let block = content.blocks[0].clone();
        let evaluator = Evaluator::new(ContextMeta::default(), config, ModuleInstance::root(), values);
        (evaluator, block)
    }

    fn bound(block: &Block, name: &str) -> Option<Value> {
        block.body.find_attr(name).unwrap().expr.bound_value().cloned()
    }

    #[test]
    fn count_makes_independent_copies() {
        let (e, block) = setup("resource \"a\" \"b\" {\n  count = 3\n  name = \"n-${count.index}\"\n  static = \"s\"\n}\n");
        let (mut instances, diags) = expand_block(&e, &block);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(instances.len(), 3);
        assert_eq!(bound(&instances[1].block, "name"), Some(Value::from("n-1")));
        assert_eq!(bound(&instances[1].block, "static"), None);
        assert_eq!(instances[2].key, InstanceKey::Int(2));

        instances[0].block.body.attributes.remove("name");
        assert!(instances[1].block.body.find_attr("name").is_some());
        assert!(bound(&block, "name").is_none());
    }

    #[test]
    fn for_each_binds_each() {
        let (e, block) = setup("resource \"a\" \"b\" {\n  for_each = toset([\"x\", \"y\"])\n  name = each.key\n}\n");
        let (instances, diags) = expand_block(&e, &block);
        assert!(diags.is_empty(), "{diags}");
        let keys: Vec<_> = instances.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec![InstanceKey::String("x".into()), InstanceKey::String("y".into())]);
        assert_eq!(bound(&instances[1].block, "name"), Some(Value::from("y")));
    }

    #[test]
    fn zero_and_unknown_yield_nothing() {
        for src in [
            "resource \"a\" \"b\" {\n  count = 0\n}\n",
            "resource \"a\" \"b\" {\n  for_each = []\n}\n",
            "variable \"n\" {\n  type = number\n}\nresource \"a\" \"b\" {\n  count = var.n\n}\n",
            "variable \"m\" {}\nresource \"a\" \"b\" {\n  for_each = var.m\n}\n",
        ] {
            let (e, block) = setup(src);
            let (instances, diags) = expand_block(&e, &block);
            assert!(instances.is_empty(), "{src}");
            assert!(diags.is_empty(), "{src}: {diags}");
        }
    }

    #[test]
    fn invalid_arguments_are_errors() {
        let cases = [
            ("count = null", "Invalid count argument"),
            ("count = -2", "Invalid count argument"),
            ("count = 1.5", "Invalid count argument"),
            ("count = \"x\"", "Incorrect value type"),
            ("for_each = null", "Invalid for_each argument"),
            ("for_each = 1", "The `for_each` value is not iterable"),
        ];
        for (arg, summary) in cases {
            let (e, block) = setup(&format!("resource \"a\" \"b\" {{\n  {arg}\n}}\n"));
            let (instances, diags) = expand_block(&e, &block);
            assert!(instances.is_empty());
            assert_eq!(diags[0].summary, summary, "{arg}");
        }
    }

    #[test]
    fn sensitive_values_stay_unbound() {
        let (e, block) = setup(
            "variable \"s\" {\n  default = \"x\"\n  sensitive = true\n}\nresource \"a\" \"b\" {\n  count = 1\n  v = \"${var.s}${count.index}\"\n}\n",
        );
        let (instances, diags) = expand_block(&e, &block);
        assert!(diags.is_empty(), "{diags}");
        assert_eq!(bound(&instances[0].block, "v"), None);
    }
}
