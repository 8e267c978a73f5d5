//! Marked-block location and indentation-preserving patching.
//!
//! - [`BlockLocator`] finds a block's marker lines and canonical indent
//! - [`BlockPatchEngine`] sanitizes generated text and splices it into a buffer
//! - [`BlockPatcher`] applies patches to files below the bench directory

pub mod engine;
pub mod files;
pub mod locator;

pub use engine::BlockPatchEngine;
pub use files::BlockPatcher;
pub use locator::{leading_indent, BlockLocator, BlockSpan, MarkerKind, MarkerSyntax};
