//! Translation of semantic metadata requests into ExifTool command lines.
//!
//! - [`fields`]: field-name normalisation, default categories and alias rules
//! - [`command`]: command-line construction for read/set/delete/strip/wipe
//! - [`tool`]: the [`ToolRunner`] seam and the process-spawning runner

pub mod command;
pub mod fields;
pub mod tool;

pub use command::{CommandBuilder, INLINE_VALUE_LIMIT, Invocation, Operation};
pub use fields::{AliasRule, Category, CategoryRewrite, FieldResolver, MetadataField};
pub use tool::{ExifToolRunner, ToolOutput, ToolRunner};
