//! Compact citation numbering.
//!
//! Numbers follow the first appearance of each article: the first cited
//! article is `1`, the next new article `2`, and so on with no gaps.
//! Repeated citations of an article share its number and get sub-numbers
//! `1, 2, 3…` in appearance order.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::Selector;

use super::{attrs, rebuild_element, scan, splice, Splice};
use crate::models::citation_label;
use crate::utils::html_escape;

static CITATION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-citation-id]").expect("valid citation selector"));

/// Number assigned to one citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberAssignment {
    pub citation_id: String,
    pub article_id: String,
    pub inline_number: u32,
    pub sub_number: u32,
}

/// Assign compact numbers to `(citation_id, article_id)` pairs given in
/// document order. Repeated citation ids keep their first assignment.
pub fn assign_numbers<'a, I>(ordered: I) -> Vec<NumberAssignment>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut seen = HashSet::new();
    let mut article_numbers: HashMap<&str, u32> = HashMap::new();
    let mut article_subs: HashMap<&str, u32> = HashMap::new();
    let mut assignments = Vec::new();

    for (citation_id, article_id) in ordered {
        if !seen.insert(citation_id) {
            continue;
        }
        let next = article_numbers.len() as u32 + 1;
        let inline_number = *article_numbers.entry(article_id).or_insert(next);
        let sub = article_subs.entry(article_id).or_insert(0);
        *sub += 1;
        assignments.push(NumberAssignment {
            citation_id: citation_id.to_string(),
            article_id: article_id.to_string(),
            inline_number,
            sub_number: *sub,
        });
    }
    assignments
}

/// Rewrite citation markers whose number, sub-number or label disagree with
/// `numbers` (citation id to `(inline_number, sub_number)`).
///
/// Returns `None` when every marker already agrees.
pub fn apply_numbers(html: &str, numbers: &HashMap<String, (u32, u32)>) -> Option<String> {
    splice(html, &CITATION_SELECTOR, |element| {
        let el = element.value();
        let id = el.attr(attrs::CITATION_ID)?.trim();
        let &(number, sub_number) = numbers.get(id)?;

        let label = citation_label(number, sub_number);
        let current_number = el.attr(attrs::CITATION_NUMBER).map(str::trim);
        let current_sub = el.attr(attrs::SUB_NUMBER).map(str::trim).unwrap_or("1");
        let current_label = element.text().collect::<String>();

        let up_to_date = current_number == Some(number.to_string().as_str())
            && current_sub == sub_number.to_string()
            && current_label.trim() == label;
        if up_to_date {
            return None;
        }

        Some(Splice::Replace(rebuild_element(
            element,
            &[
                (attrs::CITATION_NUMBER, number.to_string()),
                (attrs::SUB_NUMBER, sub_number.to_string()),
            ],
            &html_escape(&label),
        )))
    })
}

/// Client-side renumbering pass over the markers' own article ids.
///
/// Markers without an article id are numbered as their own article.
pub fn renumber_html(html: &str) -> Option<String> {
    let scan = scan(html);
    let ordered: Vec<(String, String)> = scan
        .citations()
        .map(|c| {
            let article = c.article_id.clone().unwrap_or_else(|| c.citation_id.clone());
            (c.citation_id.clone(), article)
        })
        .collect();

    let numbers = assign_numbers(ordered.iter().map(|(c, a)| (c.as_str(), a.as_str())))
        .into_iter()
        .map(|a| (a.citation_id, (a.inline_number, a.sub_number)))
        .collect();
    apply_numbers(html, &numbers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, article: &str, number: u32, sub: u32) -> String {
        format!(
            r#"<span data-citation-id="{id}" data-citation-number="{number}" data-sub-number="{sub}" data-article-id="{article}">{}</span>"#,
            citation_label(number, sub)
        )
    }

    fn numbers_of(html: &str) -> Vec<(String, u32, u32)> {
        scan(html)
            .citations()
            .map(|c| (c.citation_id.clone(), c.number.unwrap_or(0), c.sub_number))
            .collect()
    }

    #[test]
    fn test_repeated_article_gets_sub_numbers() {
        let assigned = assign_numbers([("c1", "x"), ("c2", "y"), ("c3", "x")]);
        let got: Vec<_> = assigned
            .iter()
            .map(|a| (a.citation_id.as_str(), a.inline_number, a.sub_number))
            .collect();
        assert_eq!(got, vec![("c1", 1, 1), ("c2", 2, 1), ("c3", 1, 2)]);
    }

    #[test]
    fn test_repeated_citation_id_keeps_first_assignment() {
        let assigned = assign_numbers([("c1", "x"), ("c2", "y"), ("c1", "x")]);
        assert_eq!(assigned.len(), 2);
    }

    #[test]
    fn test_numbers_are_compact() {
        let assigned = assign_numbers([("a", "p"), ("b", "q"), ("c", "p"), ("d", "r"), ("e", "q")]);
        let mut numbers: Vec<u32> = assigned.iter().map(|a| a.inline_number).collect();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_renumber_after_removing_first() {
        let html = format!("<p>{} {}</p>", marker("c2", "y", 2, 1), marker("c3", "z", 3, 1));
        let out = renumber_html(&html).unwrap();
        assert_eq!(
            numbers_of(&out),
            vec![("c2".to_string(), 1, 1), ("c3".to_string(), 2, 1)]
        );
        assert!(out.contains(">[1]<") && out.contains(">[2]<"));
    }

    #[test]
    fn test_renumber_is_idempotent() {
        let html = format!("<p>{} {}</p>", marker("c1", "x", 1, 1), marker("c2", "x", 1, 2));
        assert_eq!(renumber_html(&html), None);
    }

    #[test]
    fn test_apply_numbers_preserves_other_attributes() {
        let html = r#"<span class="citation" data-citation-id="c1" data-citation-number="4" data-article-id="x">[4]</span>"#;
        let numbers = HashMap::from([("c1".to_string(), (1, 1))]);
        let out = apply_numbers(html, &numbers).unwrap();
        assert!(out.contains(r#"class="citation""#));
        assert!(out.contains(r#"data-citation-number="1""#));
        assert!(out.contains(r#"data-sub-number="1""#));
        assert!(out.ends_with(">[1]</span>"));
        assert_eq!(scan(&out).citations().next().unwrap().article_id.as_deref(), Some("x"));
    }
}
