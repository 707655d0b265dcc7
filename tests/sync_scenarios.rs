//! End-to-end sync scenarios.
//!
//! Each test drives a `DocumentSession` against the in-memory backend and
//! an in-memory editor, the way the editor UI drives it.

use std::sync::Arc;
use std::time::Duration;

use docsync::backend::{Backend, BackendCall, MemoryBackend};
use docsync::content::{render_chart, render_citation, render_file, render_table, scan};
use docsync::editor::{Editor, MemoryEditor};
use docsync::models::{
    Citation, Document, DocumentRef, ProjectFile, Statistic, StatisticType, StatisticUpdate,
    TableData, VersionType,
};
use docsync::services::{
    DocumentSession, InsertOutcome, PassOutcome, PullOutcome, PullSkip, PullTrigger, SyncTimings,
};

const TABLE: &str = "7a1c2b3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
const CHART: &str = "0b1c2d3e-4f5a-4b6c-8d7e-8f9a0b1c2d3e";
const FILE: &str = "5e6f7a8b-9c0d-4e1f-8a2b-3c4d5e6f7a8b";

struct Fixture {
    backend: Arc<MemoryBackend>,
    editor: Arc<MemoryEditor>,
    session: Arc<DocumentSession>,
    doc: DocumentRef,
}

async fn open(content: &str) -> Fixture {
    open_with(content, |_| {}).await
}

async fn open_with(content: &str, seed: impl FnOnce(&MemoryBackend)) -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    let doc = DocumentRef::new("project", "doc");
    let mut document = Document::new("doc", "Draft");
    document.content = content.to_string();
    backend.insert_document(&doc, document);
    seed(&backend);

    let editor = Arc::new(MemoryEditor::default());
    let session = DocumentSession::open(
        backend.clone(),
        editor.clone(),
        doc.clone(),
        SyncTimings::default(),
    )
    .await
    .unwrap();

    Fixture {
        backend,
        editor,
        session: Arc::new(session),
        doc,
    }
}

fn table_data(rows: &[&[&str]]) -> TableData {
    TableData::new(
        vec!["Region".to_string(), "Cases".to_string()],
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
}

fn statistic(id: &str, kind: StatisticType, data: TableData) -> Statistic {
    Statistic {
        id: id.to_string(),
        title: "Cases by region".to_string(),
        kind,
        config: serde_json::json!({"type": "bar", "labelColumn": 0, "dataColumns": [1]}),
        table_data: data,
        used_in_documents: vec!["doc".to_string()],
    }
}

/// `(inline_number, sub_number)` of each marker, in document order.
async fn marker_numbers(editor: &MemoryEditor) -> Vec<(String, u32, u32)> {
    scan(&editor.html().await)
        .citations()
        .map(|c| (c.citation_id.clone(), c.number.unwrap_or(0), c.sub_number))
        .collect()
}

fn call_names(backend: &MemoryBackend) -> Vec<&'static str> {
    backend.calls().iter().map(|c| c.name()).collect()
}

#[tokio::test]
async fn repeated_article_gets_sub_numbers() {
    let f = open("<p>Intro</p>").await;

    let x1 = f.session.add_citation("article-x").await.unwrap();
    let y = f.session.add_citation("article-y").await.unwrap();
    let x2 = f.session.add_citation("article-x").await.unwrap();

    assert_eq!(
        marker_numbers(&f.editor).await,
        vec![
            (x1.id.clone(), 1, 1),
            (y.id.clone(), 2, 1),
            (x2.id.clone(), 1, 2),
        ]
    );

    let stored = f.backend.document(&f.doc).unwrap();
    let numbers: Vec<_> = [&x1, &y, &x2]
        .iter()
        .map(|c| {
            let c = stored.citation(&c.id).unwrap();
            (c.inline_number, c.sub_number)
        })
        .collect();
    assert_eq!(numbers, vec![(1, 1), (2, 1), (1, 2)]);
    assert!(f.editor.html().await.contains("[1.2]"));
}

#[tokio::test]
async fn removing_first_citation_compacts_numbers() {
    let f = open("<p>Intro</p>").await;
    let a = f.session.add_citation("a").await.unwrap();
    let b = f.session.add_citation("b").await.unwrap();
    let c = f.session.add_citation("c").await.unwrap();

    let report = f.session.remove_citation(&a.id).await.unwrap();
    assert!(!report.citations.is_failed());

    assert_eq!(
        marker_numbers(&f.editor).await,
        vec![(b.id.clone(), 1, 1), (c.id.clone(), 2, 1)]
    );
    let stored = f.backend.document(&f.doc).unwrap();
    assert!(stored.citation(&a.id).is_none());
    assert_eq!(stored.citation(&b.id).unwrap().inline_number, 1);
    assert_eq!(stored.citation(&c.id).unwrap().inline_number, 2);
    assert_eq!(f.editor.renumber_count(), 4);
}

#[tokio::test]
async fn reordered_markers_are_renumbered_by_the_authority() {
    let f = open("").await;
    let a = f.session.add_citation("a").await.unwrap();
    let b = f.session.add_citation("b").await.unwrap();

    // Move b in front of a without the editor renumbering.
    let html = f.editor.html().await;
    let parsed = scan(&html);
    assert_eq!(parsed.ordered_citation_ids(), vec![a.id.clone(), b.id.clone()]);
    let split = html.find("</span>").unwrap() + "</span>".len();
    let swapped = format!("{}{}", &html[split..], &html[..split]);
    f.editor.set_html(&swapped).await.unwrap();
    f.session.content_changed().await;

    let report = f.session.save_now().await.unwrap();
    assert_eq!(report.citations, PassOutcome::Corrected);
    assert!(report.content_corrected);
    assert_eq!(
        marker_numbers(&f.editor).await,
        vec![(b.id.clone(), 1, 1), (a.id.clone(), 2, 1)]
    );
    assert_eq!(f.session.persisted_content(), f.editor.html().await);
}

#[tokio::test]
async fn sync_is_idempotent() {
    let f = open("<p>Intro</p>").await;
    f.session.add_citation("a").await.unwrap();
    f.session.add_citation("a").await.unwrap();
    let settled = f.editor.html().await;

    f.backend.clear_calls();
    let report = f.session.save_now().await.unwrap();
    assert_eq!(report.citations, PassOutcome::Skipped);
    assert!(!report.content_corrected);
    assert_eq!(f.editor.html().await, settled);
    assert!(!call_names(&f.backend).contains(&"sync_citations"));
}

#[tokio::test]
async fn save_persists_raw_content_before_passes() {
    let content = format!(
        "<p>Body</p>{}{}",
        render_table(TABLE, &table_data(&[&["North", "3"]])),
        render_file(&ProjectFile {
            id: FILE.to_string(),
            name: "scan.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            category: "document".to_string(),
            size_formatted: "2 MB".to_string(),
        })
    );
    let f = open_with("<p></p>", |backend| {
        backend.insert_statistic(
            "project",
            statistic(TABLE, StatisticType::Table, table_data(&[&["North", "3"]])),
        );
    })
    .await;
    let a = f.session.add_citation("a").await.unwrap();
    f.backend.clear_calls();

    let with_citation = f.editor.html().await;
    f.editor
        .set_html(&format!("{}{}", content, with_citation))
        .await
        .unwrap();
    f.session.content_changed().await;
    f.session.save_now().await.unwrap();

    let names = call_names(&f.backend);
    let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
    assert_eq!(names[0], "update_document");
    assert!(position("sync_statistics") < position("sync_file_usage"));
    assert_eq!(f.backend.file_usage(&f.doc), vec![FILE.to_string()]);
    assert_eq!(
        f.backend.statistic("project", TABLE).unwrap().used_in_documents,
        vec!["doc".to_string()]
    );
    assert!(f.backend.document(&f.doc).unwrap().citation(&a.id).is_some());
}

#[tokio::test]
async fn failed_save_keeps_content_and_recovers() {
    let f = open("<p>v1</p>").await;
    f.editor.set_html("<p>v2</p>").await.unwrap();
    f.session.content_changed().await;

    f.backend.fail("update_document");
    assert!(f.session.save_now().await.is_err());
    assert_eq!(f.editor.html().await, "<p>v2</p>");
    assert_eq!(f.backend.document(&f.doc).unwrap().content, "<p>v1</p>");
    assert!(f.session.is_dirty());

    f.backend.recover("update_document");
    f.session.save_now().await.unwrap();
    assert_eq!(f.backend.document(&f.doc).unwrap().content, "<p>v2</p>");
    assert!(!f.session.is_dirty());
}

#[tokio::test]
async fn failed_statistics_pass_does_not_block_save() {
    let f = open("<p>v1</p>").await;
    f.editor.set_html("<p>v2</p>").await.unwrap();
    f.session.content_changed().await;
    f.backend.fail("sync_statistics");

    let report = f.session.save_now().await.unwrap();
    assert!(report.statistics.is_failed());
    assert_eq!(report.files, PassOutcome::Clean);
    assert_eq!(f.backend.document(&f.doc).unwrap().content, "<p>v2</p>");
}

#[tokio::test]
async fn chart_absent_from_listing_is_removed_and_persisted() {
    let chart = render_chart(&statistic(CHART, StatisticType::Chart, table_data(&[&["a", "1"]])));
    let f = open(&format!("<p>Before</p>{}<p>After</p>", chart)).await;

    let outcome = f.session.on_load().await;
    let PullOutcome::Corrected(report) = outcome else {
        panic!("expected a correction, got {:?}", outcome);
    };
    assert_eq!(report.removed_charts, vec![CHART.to_string()]);

    let stored = f.backend.document(&f.doc).unwrap().content;
    assert!(scan(&stored).chart_ids().is_empty());
    assert!(stored.contains("Before") && stored.contains("After"));
    assert_eq!(f.editor.html().await, stored);

    let last_sync = f
        .backend
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::SyncStatistics(request) => Some(request),
            _ => None,
        })
        .last()
        .unwrap();
    assert!(last_sync.charts.is_empty());
    assert!(f.session.has_synced());
}

#[tokio::test]
async fn upstream_table_edit_is_pulled_into_document() {
    let original = table_data(&[&["North", "3"]]);
    let f = open_with(&render_table(TABLE, &original), |backend| {
        backend.insert_statistic("project", statistic(TABLE, StatisticType::Table, original.clone()));
    })
    .await;
    assert_eq!(f.session.on_load().await, PullOutcome::Clean);

    let edited = table_data(&[&["North", "3"], &["South", "8"]]);
    f.backend
        .update_statistic(
            "project",
            TABLE,
            &StatisticUpdate {
                table_data: Some(edited.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = f.session.on_focus().await;
    assert!(matches!(outcome, PullOutcome::Corrected(ref r) if r.rebuilt_tables == vec![TABLE.to_string()]));
    let stored = scan(&f.backend.document(&f.doc).unwrap().content);
    assert!(stored.tables().next().unwrap().data.matches(&edited));
}

#[tokio::test(start_paused = true)]
async fn pull_never_clobbers_edits_made_during_the_pull() {
    let deleted_table = render_table(TABLE, &table_data(&[&["North", "3"]]));
    let f = open(&format!("<p>Draft</p>{}", deleted_table)).await;
    f.backend.set_latency(Duration::from_millis(100));

    let pull = {
        let session = f.session.clone();
        tokio::spawn(async move { session.pull_sync(PullTrigger::Interval).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let typed = format!("<p>Draft, now longer</p>{}", deleted_table);
    f.editor.set_html(&typed).await.unwrap();
    f.session.content_changed().await;

    let outcome = pull.await.unwrap();
    assert_eq!(outcome, PullOutcome::Skipped(PullSkip::PendingEdits));
    assert_eq!(f.editor.html().await, typed);
}

#[tokio::test]
async fn concurrent_pulls_run_once() {
    let f = open("<p></p>").await;
    f.backend.set_latency(Duration::from_millis(20));
    let content = render_table(TABLE, &table_data(&[]));
    f.editor.set_html(&content).await.unwrap();
    f.session.save_now().await.unwrap();
    f.backend.clear_calls();

    let (first, second) = tokio::join!(
        f.session.pull_sync(PullTrigger::Interval),
        f.session.pull_sync(PullTrigger::Focus)
    );
    let skipped = [&first, &second]
        .iter()
        .filter(|o| matches!(o, PullOutcome::Skipped(PullSkip::InFlight)))
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(
        call_names(&f.backend)
            .iter()
            .filter(|n| **n == "list_statistics")
            .count(),
        1
    );
}

#[tokio::test]
async fn inserting_deleted_statistic_reports_refreshed_listing() {
    let f = open_with("<p></p>", |backend| {
        backend.insert_statistic("project", statistic(TABLE, StatisticType::Table, table_data(&[])));
    })
    .await;
    assert!(f.backend.delete_statistic("project", TABLE));

    let outcome = f.session.insert_statistic(TABLE).await.unwrap();
    let InsertOutcome::Deleted { statistics, message } = outcome else {
        panic!("expected a deleted outcome");
    };
    assert!(statistics.is_empty());
    assert!(!message.is_empty());
    assert_eq!(f.editor.html().await, "<p></p>");
    assert!(!f.session.is_dirty());
}

#[tokio::test]
async fn inserting_statistic_and_file_marks_them_used() {
    let file = ProjectFile {
        id: FILE.to_string(),
        name: "notes.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        category: "document".to_string(),
        size_formatted: "12 KB".to_string(),
    };
    let f = open_with("<p></p>", |backend| {
        let mut chart = statistic(CHART, StatisticType::Chart, table_data(&[&["a", "1"]]));
        chart.used_in_documents.clear();
        backend.insert_statistic("project", chart);
        backend.insert_file("project", file.clone());
    })
    .await;

    let outcome = f.session.insert_statistic(CHART).await.unwrap();
    assert!(matches!(outcome, InsertOutcome::Inserted(_)));
    f.session.insert_file(&file).await.unwrap();
    assert!(f.session.is_dirty());

    f.session.save_now().await.unwrap();
    let references = scan(&f.backend.document(&f.doc).unwrap().content);
    assert_eq!(references.chart_ids(), vec![CHART.to_string()]);
    assert_eq!(f.backend.file_usage(&f.doc), vec![FILE.to_string()]);
    assert_eq!(
        f.backend.statistic("project", CHART).unwrap().used_in_documents,
        vec!["doc".to_string()]
    );
}

#[tokio::test]
async fn restore_replaces_content_and_records_previous_state() {
    let f = open("<p>first</p>").await;
    let v1 = f.session.create_version(Some("first draft")).await.unwrap();

    f.editor.set_html("<p>second</p>").await.unwrap();
    f.session.set_title("Renamed");
    f.session.content_changed().await;
    f.session.save_now().await.unwrap();

    let restored = f.session.restore_version(&v1.id).await.unwrap();
    assert_eq!(restored.restored_content, "<p>first</p>");
    assert_eq!(f.editor.html().await, "<p>first</p>");
    assert_eq!(f.session.title(), "Draft");
    assert!(!f.session.is_dirty());

    let versions = f.session.list_versions().await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_type, VersionType::Auto);
    assert_eq!(versions[0].content_length, "<p>second</p>".len());
    assert_eq!(versions[1].version_note.as_deref(), Some("first draft"));
}

#[tokio::test(start_paused = true)]
async fn run_loop_saves_pulls_versions_and_exits() {
    let f = open("<p></p>").await;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let runner = {
        let session = f.session.clone();
        tokio::spawn(async move {
            session
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    f.editor.set_html("<p>typed</p>").await.unwrap();
    f.session.content_changed().await;
    tokio::time::sleep(Duration::from_secs(301)).await;

    let names = call_names(&f.backend);
    assert!(names.contains(&"update_document"));
    assert!(names.iter().filter(|n| **n == "trigger_auto_version").count() >= 1);
    assert!(f.session.has_synced());

    stop_tx.send(()).unwrap();
    runner.await.unwrap();
    assert_eq!(call_names(&f.backend).last(), Some(&"exit_beacon"));
    assert!(f.backend.version_count(&f.doc) >= 1);
}

#[tokio::test(start_paused = true)]
async fn pull_never_clobbers_edits_saved_during_the_pull() {
    let deleted_table = render_table(TABLE, &table_data(&[&["North", "3"]]));
    let f = open(&format!("<p>Draft</p>{}", deleted_table)).await;
    f.backend.set_latency(Duration::from_secs(5));

    let pull = {
        let session = f.session.clone();
        tokio::spawn(async move { session.pull_sync(PullTrigger::Interval).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    f.backend.set_latency(Duration::ZERO);

    let typed = format!("<p>Draft plus an important sentence</p>{}", deleted_table);
    f.editor.set_html(&typed).await.unwrap();
    f.session.content_changed().await;
    f.session.save_now().await.unwrap();

    // The grace window has passed by the time the listing returns.
    let outcome = pull.await.unwrap();
    assert_eq!(outcome, PullOutcome::Skipped(PullSkip::ContentChanged));
    assert_eq!(f.editor.html().await, typed);
    assert_eq!(f.backend.document(&f.doc).unwrap().content, typed);
}

#[tokio::test(start_paused = true)]
async fn pull_never_undoes_a_restore_during_the_pull() {
    let deleted_table = render_table(TABLE, &table_data(&[&["North", "3"]]));
    let old = format!("<p>Old</p>{}", deleted_table);
    let f = open(&old).await;
    let v1 = f.session.create_version(Some("old")).await.unwrap();

    f.editor
        .set_html(&format!("<p>Draft</p>{}", deleted_table))
        .await
        .unwrap();
    f.session.content_changed().await;
    f.session.save_now().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    f.backend.set_latency(Duration::from_secs(5));
    let pull = {
        let session = f.session.clone();
        tokio::spawn(async move { session.pull_sync(PullTrigger::Focus).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    f.backend.set_latency(Duration::ZERO);
    f.session.restore_version(&v1.id).await.unwrap();

    let outcome = pull.await.unwrap();
    assert_eq!(outcome, PullOutcome::Skipped(PullSkip::ContentChanged));
    assert_eq!(f.editor.html().await, old);
    assert_eq!(f.backend.document(&f.doc).unwrap().content, old);
}

#[tokio::test]
async fn failed_citation_delete_leaves_removal_pending() {
    let f = open("<p></p>").await;
    let a = f.session.add_citation("a").await.unwrap();

    f.backend.fail("remove_citation");
    assert!(f.session.delete_citation(&a.id).await.is_err());
    assert_eq!(f.editor.html().await, "<p></p>");
    assert!(f.session.is_dirty());
    assert_eq!(
        f.session.pull_sync(PullTrigger::Focus).await,
        PullOutcome::Skipped(PullSkip::PendingEdits)
    );

    f.backend.recover("remove_citation");
    f.session.save_now().await.unwrap();
    let stored = f.backend.document(&f.doc).unwrap();
    assert_eq!(stored.content, "<p></p>");
    assert!(stored.citation(&a.id).is_none());
    assert!(!f.session.is_dirty());
}

#[tokio::test]
async fn restore_brings_links_in_line_with_restored_content() {
    let file = ProjectFile {
        id: FILE.to_string(),
        name: "notes.pdf".to_string(),
        mime_type: "application/pdf".to_string(),
        category: "document".to_string(),
        size_formatted: "12 KB".to_string(),
    };
    let data = table_data(&[&["North", "3"]]);
    let f = open_with("<p>first</p>", |backend| {
        let mut table = statistic(TABLE, StatisticType::Table, data.clone());
        table.used_in_documents.clear();
        backend.insert_statistic("project", table);
        backend.insert_file("project", file.clone());
    })
    .await;
    let v1 = f.session.create_version(Some("first")).await.unwrap();

    f.editor
        .set_html(&format!(
            "<p>second</p>{}{}",
            render_table(TABLE, &data),
            render_file(&file)
        ))
        .await
        .unwrap();
    f.session.content_changed().await;
    f.session.save_now().await.unwrap();
    assert_eq!(f.backend.file_usage(&f.doc), vec![FILE.to_string()]);
    assert_eq!(
        f.backend.statistic("project", TABLE).unwrap().used_in_documents,
        vec!["doc".to_string()]
    );

    f.session.restore_version(&v1.id).await.unwrap();
    assert!(f.backend.file_usage(&f.doc).is_empty());
    assert!(f
        .backend
        .statistic("project", TABLE)
        .unwrap()
        .used_in_documents
        .is_empty());
    assert_eq!(f.editor.html().await, "<p>first</p>");
    assert!(!f.session.is_dirty());
}

#[tokio::test]
async fn marker_of_unknown_citation_syncs_once() {
    let f = open("<p></p>").await;
    f.session.add_citation("a").await.unwrap();

    let unknown = Citation {
        id: "9f8e7d6c-5b4a-4c3d-8e2f-1a0b9c8d7e6f".to_string(),
        article_id: "gone".to_string(),
        inline_number: 2,
        sub_number: 1,
        note: None,
        order_index: 1,
    };
    let pasted = format!("{}{}", f.editor.html().await, render_citation(&unknown));
    f.editor.set_html(&pasted).await.unwrap();
    f.session.content_changed().await;

    let report = f.session.save_now().await.unwrap();
    assert_ne!(report.citations, PassOutcome::Skipped);

    f.backend.clear_calls();
    let report = f.session.save_now().await.unwrap();
    assert_eq!(report.citations, PassOutcome::Skipped);
    assert!(!call_names(&f.backend).contains(&"sync_citations"));
}
