//! Rendering typed records back into the embedded micro-format.

use super::attrs;
use super::scanner::ChartPayload;
use crate::models::{Citation, ProjectFile, Statistic, StatisticType, TableData};
use crate::utils::html_escape;

/// Inline citation marker.
pub fn render_citation(citation: &Citation) -> String {
    format!(
        r#"<span class="citation" {}="{}" {}="{}" {}="{}" {}="{}">{}</span>"#,
        attrs::CITATION_ID,
        html_escape(&citation.id),
        attrs::CITATION_NUMBER,
        citation.inline_number,
        attrs::SUB_NUMBER,
        citation.sub_number,
        attrs::ARTICLE_ID,
        html_escape(&citation.article_id),
        html_escape(&citation.label())
    )
}

/// Table element whose cell text mirrors `data` exactly.
pub fn render_table(statistic_id: &str, data: &TableData) -> String {
    let mut out = format!(
        r#"<table {}="{}">"#,
        attrs::STATISTIC_ID,
        html_escape(statistic_id)
    );
    if !data.headers.is_empty() {
        out.push_str("<thead><tr>");
        for header in &data.headers {
            out.push_str(&format!("<th>{}</th>", html_escape(header)));
        }
        out.push_str("</tr></thead>");
    }
    out.push_str("<tbody>");
    for row in &data.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<td>{}</td>", html_escape(cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}

/// Chart placeholder carrying the serialized `{config, tableData, chartId}`.
pub fn render_chart(statistic: &Statistic) -> String {
    let payload = ChartPayload {
        config: statistic.config.clone(),
        table_data: statistic.table_data.clone(),
        chart_id: Some(statistic.id.clone()),
    };
    let json = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"<div class="chart" {}="{}" {}="{}"></div>"#,
        attrs::CHART_ID,
        html_escape(&statistic.id),
        attrs::CHART_DATA,
        html_escape(&json)
    )
}

pub fn render_statistic(statistic: &Statistic) -> String {
    match statistic.kind {
        StatisticType::Table => render_table(&statistic.id, &statistic.table_data),
        StatisticType::Chart => render_chart(statistic),
    }
}

/// Inline reference to a project file.
pub fn render_file(file: &ProjectFile) -> String {
    format!(
        r#"<span class="file-reference" {}="{}" data-mime-type="{}">{}</span>"#,
        attrs::FILE_ID,
        html_escape(&file.id),
        html_escape(&file.mime_type),
        html_escape(&file.name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::scan;

    const ID: &str = "33333333-3333-3333-3333-333333333333";

    #[test]
    fn test_rendered_table_scans_back_to_same_data() {
        let data = TableData::new(
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["1".to_string(), "2".to_string()]],
        );
        let scan = scan(&render_table(ID, &data));
        let table = scan.tables().next().unwrap();
        assert!(table.data.matches(&data));

        let mut changed = data.clone();
        changed.rows[0][1] = "3".to_string();
        assert!(!table.data.matches(&changed));
    }

    #[test]
    fn test_rendered_table_escapes_cells() {
        let data = TableData::new(vec!["<A>".to_string()], vec![vec!["R&D".to_string()]]);
        let html = render_table(ID, &data);
        assert!(html.contains("<th>&lt;A&gt;</th>"));
        let scan = scan(&html);
        assert_eq!(scan.tables().next().unwrap().data, data);
    }

    #[test]
    fn test_rendered_chart_payload_survives_scan() {
        let statistic = Statistic {
            id: ID.to_string(),
            title: "Chart".to_string(),
            kind: StatisticType::Chart,
            config: serde_json::json!({ "type": "bar", "note": "\"quoted\" & <b>" }),
            table_data: TableData::new(vec!["X".to_string()], vec![]),
            used_in_documents: vec![],
        };
        let scan = scan(&render_statistic(&statistic));
        let chart = scan.charts().next().unwrap();
        let payload = chart.payload.as_ref().unwrap();
        assert_eq!(payload.config, statistic.config);
        assert_eq!(payload.chart_id.as_deref(), Some(ID));
    }

    #[test]
    fn test_rendered_citation_and_file_are_recognized() {
        let citation = Citation {
            id: "c1".to_string(),
            article_id: "a1".to_string(),
            inline_number: 3,
            sub_number: 2,
            note: None,
            order_index: 0,
        };
        let file = ProjectFile {
            id: "f1".to_string(),
            name: "data.csv".to_string(),
            mime_type: "text/csv".to_string(),
            category: "data".to_string(),
            size_formatted: "1 KB".to_string(),
        };
        let html = format!("{}{}", render_citation(&citation), render_file(&file));
        assert!(html.contains("[3.2]"));
        let scan = scan(&html);
        let c = scan.citations().next().unwrap();
        assert_eq!((c.number, c.sub_number), (Some(3), 2));
        assert_eq!(scan.file_ids(), vec!["f1"]);
    }
}
