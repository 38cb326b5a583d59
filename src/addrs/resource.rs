use super::{InstanceKey, ModuleInstance};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMode {
    Managed,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub mode: ResourceMode,
    pub ty: String,
    pub name: String,
}

impl Resource {
    pub fn managed(ty: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            ty: ty.to_string(),
            name: name.to_string(),
        }
    }

    pub fn data(ty: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            ..Self::managed(ty, name)
        }
    }

    pub fn instance(self, key: InstanceKey) -> ResourceInstance {
        ResourceInstance {
            resource: self,
            key,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.ty, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.ty, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: InstanceKey,
}

impl ResourceInstance {
    pub fn absolute(self, module: ModuleInstance) -> AbsResourceInstance {
        AbsResourceInstance {
            module,
            resource: self,
        }
    }
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsResourceInstance {
    pub module: ModuleInstance,
    pub resource: ResourceInstance,
}

impl AbsResourceInstance {
    /// Sort order: shallower modules first, then by module address, data
    /// resources before managed ones, then type, name and instance key.
    pub fn less(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Less
    }
}

impl Ord for AbsResourceInstance {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (&self.resource.resource, &other.resource.resource);
        self.module
            .len()
            .cmp(&other.module.len())
            .then_with(|| self.module.to_string().cmp(&other.module.to_string()))
            .then_with(|| match (a.mode, b.mode) {
                (ResourceMode::Data, ResourceMode::Managed) => Ordering::Less,
                (ResourceMode::Managed, ResourceMode::Data) => Ordering::Greater,
                _ => Ordering::Equal,
            })
            .then_with(|| a.ty.cmp(&b.ty))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| self.resource.key.cmp(&other.resource.key))
    }
}

impl PartialOrd for AbsResourceInstance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}
