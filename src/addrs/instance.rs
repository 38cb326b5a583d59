use crate::value::Value;
use std::fmt;

/// Identifies one instance of a counted or for_each'd object.
///
/// Variant order is the sort order: no key, then integer keys, then string
/// keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum InstanceKey {
    #[default]
    NoKey,
    Int(i64),
    String(String),
}

impl InstanceKey {
    /// The key as the value exposed to `count.index` or `each.key`.
    pub fn to_value(&self) -> Value {
        match self {
            InstanceKey::NoKey => Value::null(),
            InstanceKey::Int(i) => Value::from(*i),
            InstanceKey::String(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::NoKey => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{i}]"),
            InstanceKey::String(s) => write!(f, "[{s:?}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Path of module call instances from the root. Empty at the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ModuleInstance(pub Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_string(),
            key,
        });
        Self(steps)
    }

    /// The static module path with instance keys dropped.
    pub fn module(&self) -> Module {
        Module(self.0.iter().map(|step| step.name.clone()).collect())
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

/// Static path of module call names from the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Module(pub Vec<String>);

impl Module {
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut names = self.0.clone();
        names.push(name.to_string());
        Self(names)
    }

    /// Every instance path with this shape and no instance keys.
    pub fn unkeyed_instance(&self) -> ModuleInstance {
        ModuleInstance(
            self.0
                .iter()
                .map(|name| ModuleInstanceStep {
                    name: name.clone(),
                    key: InstanceKey::NoKey,
                })
                .collect(),
        )
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|name| format!("module.{name}")).collect();
        f.write_str(&parts.join("."))
    }
}
