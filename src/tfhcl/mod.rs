//! Expansion of `dynamic` blocks and of `count`/`for_each` meta-arguments
//! while content is extracted from a body.

mod expand_body;
mod expand_spec;
mod iteration;
mod meta_args;
mod variables;

pub use expand_body::{expand, ExpandBody};
pub use meta_args::{count_instances, for_each_instances};
pub use variables::expand_variables;
