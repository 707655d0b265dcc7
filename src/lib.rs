//! docsync - reconciliation engine for documents that embed citations,
//! statistics and project files.
//!
//! The document's HTML is the working copy; the citation, statistics, file
//! and version stores each own their entities. [`services::DocumentSession`]
//! keeps the two sides consistent while the document is being edited.

pub mod backend;
pub mod cli;
pub mod config;
pub mod content;
pub mod editor;
pub mod models;
pub mod services;
mod utils;
