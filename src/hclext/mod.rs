//! Attribute/block tree with source ranges, schemas and diagnostics.

mod body;
mod diagnostic;
mod parse;
mod range;
mod schema;

pub(crate) use body::check_labels;
pub use body::{Attribute, Block, Body, Expression};
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use parse::{parse_file, ParseError};
pub use range::{LineIndex, Pos, SourceRange};
pub use schema::{AttributeSchema, BlockSchema, BodySchema, SchemaMode};
