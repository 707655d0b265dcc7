//! Version management commands.

use std::path::Path;
use std::sync::Arc;

use console::style;

use crate::cli::helpers::connect;
use crate::cli::icons::{info, success};
use crate::config::Settings;
use crate::editor::MemoryEditor;
use crate::models::DocumentRef;
use crate::services::DocumentSession;

async fn open(
    settings: &Settings,
    offline: bool,
    doc: &DocumentRef,
) -> anyhow::Result<DocumentSession> {
    let backend = connect(settings, offline, doc, None)?;
    let editor = Arc::new(MemoryEditor::default());
    Ok(DocumentSession::open(backend, editor, doc.clone(), settings.timings()).await?)
}

pub async fn cmd_versions_list(
    settings: &Settings,
    offline: bool,
    doc: &DocumentRef,
) -> anyhow::Result<()> {
    let session = open(settings, offline, doc).await?;
    let versions = session.list_versions().await?;

    if versions.is_empty() {
        println!("{} No versions of {}", info(), doc);
        return Ok(());
    }

    println!("\n{}", style(format!("Versions of {}", doc)).bold());
    println!("{}", "-".repeat(70));
    for version in &versions {
        println!(
            "{:>4}  {:<7} {}  {:>7} chars  {}",
            style(format!("v{}", version.version_number)).cyan(),
            version.version_type.as_str(),
            version.created_at.format("%Y-%m-%d %H:%M"),
            version.content_length,
            version.version_note.as_deref().unwrap_or("")
        );
        println!("      {}", style(&version.id).dim());
    }
    Ok(())
}

pub async fn cmd_versions_create(
    settings: &Settings,
    offline: bool,
    doc: &DocumentRef,
    note: Option<String>,
) -> anyhow::Result<()> {
    let session = open(settings, offline, doc).await?;
    let version = session.create_version(note.as_deref()).await?;
    println!(
        "{} Created version {} ({})",
        success(),
        style(version.version_number).cyan(),
        version.id
    );
    Ok(())
}

pub async fn cmd_versions_restore(
    settings: &Settings,
    offline: bool,
    doc: &DocumentRef,
    version_id: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let session = open(settings, offline, doc).await?;
    let result = session.restore_version(version_id).await?;
    println!(
        "{} Restored \"{}\"; the replaced content was kept as an auto version",
        success(),
        result.restored_title
    );

    if let Some(path) = output {
        tokio::fs::write(path, &result.restored_content).await?;
        println!("{} Wrote restored content to {}", info(), path.display());
    }
    Ok(())
}
