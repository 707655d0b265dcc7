//! Command-line interface for docsync.

mod commands;
mod file_editor;
pub mod helpers;
pub mod icons;

pub use commands::{is_verbose, run};
pub use file_editor::FileEditor;
