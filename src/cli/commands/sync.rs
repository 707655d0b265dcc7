//! Save, pull and watch commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{connect, print_save_report};
use crate::cli::icons::{dim_arrow, error, info, success, warn};
use crate::cli::FileEditor;
use crate::config::Settings;
use crate::editor::{Editor, MemoryEditor};
use crate::models::DocumentRef;
use crate::services::{DocumentSession, PullOutcome, PullTrigger, SyncEvent};

async fn read_file(file: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))
}

/// Open a session whose editor holds the file content.
async fn open_with_file(
    settings: &Settings,
    offline: bool,
    file: &Path,
    doc: &DocumentRef,
) -> anyhow::Result<(DocumentSession, Arc<MemoryEditor>, String)> {
    let content = read_file(file).await?;
    let backend = connect(settings, offline, doc, Some(&content))?;
    let editor = Arc::new(MemoryEditor::default());
    let session =
        DocumentSession::open(backend, editor.clone(), doc.clone(), settings.timings()).await?;
    editor.set_html(&content).await?;
    Ok((session, editor, content))
}

async fn write_back(file: &Path, original: &str, editor: &MemoryEditor) -> anyhow::Result<()> {
    let updated = editor.html().await;
    if updated != original {
        tokio::fs::write(file, &updated).await?;
        println!(
            "{} Wrote corrected content to {}",
            info(),
            style(file.display()).cyan()
        );
    }
    Ok(())
}

/// Persist a local file and run every sync pass.
pub async fn cmd_sync(
    settings: &Settings,
    offline: bool,
    file: &Path,
    doc: &DocumentRef,
    title: Option<String>,
) -> anyhow::Result<()> {
    let (session, editor, content) = open_with_file(settings, offline, file, doc).await?;
    if let Some(title) = title {
        session.set_title(title);
    }

    let report = session.save_now().await?;
    print_save_report(&report);
    write_back(file, &content, &editor).await
}

/// Persist a local file, then pull store-side statistics changes into it.
pub async fn cmd_pull(
    settings: &Settings,
    offline: bool,
    file: &Path,
    doc: &DocumentRef,
) -> anyhow::Result<()> {
    let (session, editor, content) = open_with_file(settings, offline, file, doc).await?;
    session.save_now().await?;

    match session.pull_sync(PullTrigger::Focus).await {
        PullOutcome::Clean => println!("{} Statistics are in sync", success()),
        PullOutcome::Corrected(report) => {
            println!("{} Pulled statistics changes", warn());
            for id in &report.removed_tables {
                println!("  {} removed deleted table {}", dim_arrow(), id);
            }
            for id in &report.rebuilt_tables {
                println!("  {} rebuilt table {}", dim_arrow(), id);
            }
            for id in &report.removed_charts {
                println!("  {} removed deleted chart {}", dim_arrow(), id);
            }
        }
        PullOutcome::Skipped(reason) => println!("{} Pull skipped: {:?}", warn(), reason),
        PullOutcome::Failed(e) => anyhow::bail!("Pull failed: {}", e),
    }
    write_back(file, &content, &editor).await
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Saved { content_length } => {
            println!("{} Saved ({} bytes)", success(), content_length)
        }
        SyncEvent::SaveFailed { error: e } => println!("{} Save failed: {}", error(), e),
        SyncEvent::BibliographyUpdating(true) => println!("{} Updating bibliography", info()),
        SyncEvent::BibliographyUpdating(false) => {}
        SyncEvent::ContentCorrected => println!("{} Content corrected", warn()),
        SyncEvent::PassFailed { pass, error: e } => {
            println!("{} {} sync failed: {}", warn(), pass, e)
        }
        SyncEvent::StatisticsPulled { removed, rebuilt } => println!(
            "{} Statistics pulled: {} removed, {} rebuilt",
            info(),
            removed,
            rebuilt
        ),
        SyncEvent::MetricsChanged(m) => println!(
            "  {} {} words, ~{} pages",
            dim_arrow(),
            m.words,
            m.pages
        ),
    }
}

/// Mirror a document into a file and run the orchestrator until Ctrl-C.
pub async fn cmd_watch(
    settings: &Settings,
    offline: bool,
    file: &Path,
    doc: &DocumentRef,
    poll: u64,
) -> anyhow::Result<()> {
    let seed = if offline {
        tokio::fs::read_to_string(file).await.ok()
    } else {
        None
    };
    let backend = connect(settings, offline, doc, seed.as_deref())?;
    let editor = Arc::new(FileEditor::new(file));

    let (tx, mut rx) = mpsc::channel(64);
    let session = DocumentSession::open(backend, editor.clone(), doc.clone(), settings.timings())
        .await?
        .with_events(tx);

    println!(
        "{} Watching {} for {} (Ctrl-C to stop)",
        info(),
        style(editor.path().display()).cyan(),
        style(doc).bold()
    );

    let watcher = async {
        let mut tick = tokio::time::interval(Duration::from_secs(poll.max(1)));
        loop {
            tick.tick().await;
            match editor.reload().await {
                Ok(true) => session.content_changed().await,
                Ok(false) => {}
                Err(e) => tracing::warn!("Cannot read {}: {}", editor.path().display(), e),
            }
        }
    };
    let reporter = async {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    };
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    tokio::select! {
        _ = session.run(shutdown) => {}
        _ = watcher => {}
        _ = reporter => {}
    }

    println!("{} Stopped; exit version requested", success());
    Ok(())
}
