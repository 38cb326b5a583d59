//! Typed addresses for the objects an expression can refer to.

mod instance;
mod module_source;
mod reference;
mod resource;

pub use instance::{InstanceKey, Module, ModuleInstance, ModuleInstanceStep};
pub use module_source::ModuleSource;
pub use reference::{parse_ref, InvalidReference, Reference, Referenceable, Traversal, TraverseStep};
pub use resource::{AbsResourceInstance, Resource, ResourceInstance, ResourceMode};
