//! Expression evaluation: the interpreter, reference analysis and the
//! function table.

mod eval;
pub mod funcs;
mod references;
mod scope;

pub use eval::{evaluate, evaluate_constant, evaluate_expression, EvalContext, EvalError};
pub use funcs::FunctionTable;
pub use references::{references, references_in_body, traversals};
pub use scope::{Data, Scope};
