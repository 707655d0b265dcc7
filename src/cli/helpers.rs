//! Shared helper functions for CLI commands.

use std::sync::Arc;

use console::style;

use super::icons::{dim_arrow, error, success, warn};
use crate::backend::{Backend, HttpBackend, MemoryBackend};
use crate::config::Settings;
use crate::content::{scan, ContentScan};
use crate::models::{Citation, Document, DocumentRef, Statistic, StatisticType};
use crate::services::{PassOutcome, SaveReport};

/// Build the backend for a command. Offline mode uses an in-memory
/// backend seeded with `seed` as the stored document content.
pub fn connect(
    settings: &Settings,
    offline: bool,
    doc: &DocumentRef,
    seed: Option<&str>,
) -> anyhow::Result<Arc<dyn Backend>> {
    if offline {
        let backend = MemoryBackend::new();
        seed_document(&backend, doc, seed.unwrap_or_default());
        return Ok(Arc::new(backend));
    }

    let backend = HttpBackend::new(
        &settings.api_base_url,
        settings.api_token.clone(),
        settings.request_timeout(),
    )?;
    Ok(Arc::new(backend))
}

/// Store `content` as the document, with citation and statistic records
/// reconstructed from the references it embeds.
pub fn seed_document(backend: &MemoryBackend, doc: &DocumentRef, content: &str) {
    let references = scan(content);
    let mut document = Document::new(doc.document_id.clone(), doc.document_id.clone());
    document.content = content.to_string();
    document.citations = seeded_citations(&references);
    backend.insert_document(doc, document);

    for table in references.tables() {
        backend.insert_statistic(
            &doc.project_id,
            Statistic {
                id: table.statistic_id.clone(),
                title: String::new(),
                kind: StatisticType::Table,
                config: serde_json::Value::Null,
                table_data: table.data.clone(),
                used_in_documents: vec![doc.document_id.clone()],
            },
        );
    }
    for chart in references.charts() {
        let payload = chart.payload.clone().unwrap_or_else(|| crate::content::ChartPayload {
            config: serde_json::Value::Null,
            table_data: Default::default(),
            chart_id: None,
        });
        backend.insert_statistic(
            &doc.project_id,
            Statistic {
                id: chart.chart_id.clone(),
                title: String::new(),
                kind: StatisticType::Chart,
                config: payload.config,
                table_data: payload.table_data,
                used_in_documents: vec![doc.document_id.clone()],
            },
        );
    }
}

fn seeded_citations(references: &ContentScan) -> Vec<Citation> {
    let meta = references.citation_meta();
    references
        .ordered_citation_ids()
        .into_iter()
        .enumerate()
        .map(|(index, id)| {
            let m = meta.get(&id);
            Citation {
                article_id: m
                    .and_then(|m| m.article_id.clone())
                    .unwrap_or_else(|| id.clone()),
                inline_number: m.and_then(|m| m.number).unwrap_or(0),
                sub_number: m.map(|m| m.sub_number).unwrap_or(1),
                note: None,
                order_index: index as u32,
                id,
            }
        })
        .collect()
}

fn print_pass(name: &str, outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Skipped => println!("  {} {}: unchanged", dim_arrow(), name),
        PassOutcome::Clean => println!("  {} {}: in sync", success(), name),
        PassOutcome::Corrected => println!("  {} {}: corrected", warn(), name),
        PassOutcome::Failed(e) => println!("  {} {}: {}", error(), name, style(e).red()),
    }
}

pub fn print_save_report(report: &SaveReport) {
    println!("{} Saved", success());
    print_pass("citations", &report.citations);
    print_pass("statistics", &report.statistics);
    print_pass("files", &report.files);
    if report.content_corrected {
        println!("  {} content was corrected", warn());
    }
}
