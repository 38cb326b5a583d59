use super::config::Config;
use super::variable::{Variable, VariableParsingMode};
use crate::hclext::{Diagnostic, Diagnostics, SourceRange};
use crate::value::Value;
use std::collections::BTreeMap;

const VAR_ENV_PREFIX: &str = "TF_VAR_";

/// A variable value and where it was set.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    pub value: Value,
    pub range: Option<SourceRange>,
}

impl InputValue {
    pub fn new(value: Value) -> Self {
        Self { value, range: None }
    }
}

pub type InputValues = BTreeMap<String, InputValue>;

/// The default of every declared variable, or an unknown of its type when it
/// has none.
pub fn default_variable_values(variables: &BTreeMap<String, Variable>) -> InputValues {
    variables
        .iter()
        .map(|(name, variable)| {
            let value = variable
                .default
                .clone()
                .unwrap_or_else(|| Value::unknown(variable.ty.clone()));
            (
                name.clone(),
                InputValue {
                    value,
                    range: Some(variable.decl_range.clone()),
                },
            )
        })
        .collect()
}

/// Values from `TF_VAR_NAME` variables in `env`.
pub fn environment_variable_values<I>(variables: &BTreeMap<String, Variable>, env: I) -> (InputValues, Diagnostics)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut values = InputValues::new();
    let mut diags = Diagnostics::new();

    for (key, raw) in env {
        let Some(name) = key.strip_prefix(VAR_ENV_PREFIX) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let (value, d) = parsing_mode(variables, name).parse(name, &raw);
        diags.extend(d);
        values.insert(name.to_string(), InputValue::new(value));
    }

    (values, diags)
}

fn parsing_mode(variables: &BTreeMap<String, Variable>, name: &str) -> VariableParsingMode {
    variables
        .get(name)
        .map_or(VariableParsingMode::Literal, |v| v.parsing_mode)
}

/// Parses `name=value` pairs given on the command line. Malformed entries are
/// reported and skipped.
pub fn parse_variable_values(variables: &BTreeMap<String, Variable>, raw: &[String]) -> (InputValues, Diagnostics) {
    let mut values = InputValues::new();
    let mut diags = Diagnostics::new();

    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            diags.push(Diagnostic::error(
                "invalid variable value",
                format!("`{entry}` is invalid. Variables must be `key=value` format"),
            ));
            continue;
        };
        let (value, d) = parsing_mode(variables, name).parse(name, value);
        diags.extend(d);
        values.insert(name.to_string(), InputValue::new(value));
    }

    (values, diags)
}

/// Merges `layers` key by key; later layers win.
pub fn override_values<'a>(layers: impl IntoIterator<Item = &'a InputValues>) -> InputValues {
    let mut out = InputValues::new();
    for layer in layers {
        out.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    out
}

/// The values of the variables of `config`'s module, keyed by the module
/// instance path. Environment values only reach the root module.
pub fn variable_values(
    config: &Config,
    env: impl IntoIterator<Item = (String, String)>,
    layers: &[InputValues],
) -> (BTreeMap<String, BTreeMap<String, Value>>, Diagnostics) {
    let variables = &config.module.variables;
    let mut diags = Diagnostics::new();

    let defaults = default_variable_values(variables);
    let env_values = if config.is_root() {
        let (values, d) = environment_variable_values(variables, env);
        diags.extend(d);
        values
    } else {
        InputValues::new()
    };

    let merged = override_values(std::iter::once(&defaults).chain(std::iter::once(&env_values)).chain(layers));
    let values = merged.into_iter().map(|(k, v)| (k, v.value)).collect();

    let key = config.path.unkeyed_instance().to_string();
    (BTreeMap::from([(key, values)]), diags)
}
