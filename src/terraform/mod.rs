//! The module tree, variable values and the evaluator of one module
//! instance.

pub mod config;
pub mod evaluator;
pub mod expandable;
pub mod input_value;
pub mod loader;
pub mod module;
pub mod parser;
pub mod variable;

pub use config::{build_config, Config, ModuleRequest, ModuleWalker, NoModules};
pub use evaluator::{name_suggestion, ContextMeta, Evaluator, InstanceKeyEvalData};
pub use expandable::{expand_block, BlockInstance};
pub use input_value::{
    default_variable_values, environment_variable_values, override_values, parse_variable_values, variable_values,
    InputValue, InputValues,
};
pub use loader::{current_workspace, CallModuleType, ModuleLoader};
pub use module::{File, Local, Module, ModuleCall, Resource};
pub use parser::Parser;
pub use variable::{Variable, VariableParsingMode};
