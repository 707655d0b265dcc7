//! In-place rewriting of referenced elements.
//!
//! Edits are applied to the parsed tree and the fragment is serialized
//! again only when at least one element changed, so a pass that finds
//! nothing to do never rewrites the user's markup.

use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};

use crate::utils::html_escape;

/// What to do with a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Splice {
    /// Drop the element and everything inside it.
    Remove,
    /// Swap the element for this markup.
    Replace(String),
}

/// Apply `decide` to every element matching `selector`.
///
/// Returns the rewritten HTML, or `None` when `decide` left every element
/// alone.
pub fn splice<F>(html: &str, selector: &Selector, mut decide: F) -> Option<String>
where
    F: FnMut(ElementRef<'_>) -> Option<Splice>,
{
    let mut fragment = Html::parse_fragment(html);

    let edits: Vec<_> = fragment
        .select(selector)
        .filter_map(|element| decide(element).map(|edit| (element.id(), edit)))
        .collect();
    if edits.is_empty() {
        return None;
    }

    // Replacement markup is spliced into the serialized output through a
    // text placeholder, since the tree only accepts single nodes.
    let token = uuid::Uuid::new_v4().simple().to_string();
    let mut replacements = Vec::new();

    for (index, (node_id, edit)) in edits.into_iter().enumerate() {
        let Some(mut node) = fragment.tree.get_mut(node_id) else {
            continue;
        };
        if let Splice::Replace(markup) = edit {
            let placeholder = format!("docsync-splice-{}-{}", token, index);
            node.insert_before(Node::Text(Text {
                text: placeholder.as_str().into(),
            }));
            replacements.push((placeholder, markup));
        }
        node.detach();
    }

    let mut output = fragment.root_element().inner_html();
    for (placeholder, markup) in replacements {
        output = output.replacen(&placeholder, &markup, 1);
    }
    Some(output)
}

/// Serialize `element` with some attributes overridden and new inner HTML.
///
/// Attributes keep their original order; overrides for attributes the
/// element lacks are appended.
pub fn rebuild_element(
    element: ElementRef<'_>,
    overrides: &[(&str, String)],
    inner_html: &str,
) -> String {
    let el = element.value();
    let name = el.name();
    let mut applied = vec![false; overrides.len()];

    let mut out = format!("<{}", name);
    for (attr, value) in el.attrs() {
        let value = match overrides.iter().position(|(n, _)| *n == attr) {
            Some(i) => {
                applied[i] = true;
                overrides[i].1.as_str()
            }
            None => value,
        };
        out.push_str(&format!(" {}=\"{}\"", attr, html_escape(value)));
    }
    for ((attr, value), done) in overrides.iter().zip(applied) {
        if !done {
            out.push_str(&format!(" {}=\"{}\"", attr, html_escape(value)));
        }
    }
    out.push('>');
    out.push_str(inner_html);
    out.push_str(&format!("</{}>", name));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn test_splice_without_edits_returns_none() {
        let html = "<p>Keep <em>exactly</em> this</p>";
        assert_eq!(splice(html, &selector("em"), |_| None), None);
    }

    #[test]
    fn test_splice_removes_element() {
        let html = r#"<p>a</p><div data-chart-id="x"><span>chart</span></div><p>b</p>"#;
        let out = splice(html, &selector("[data-chart-id]"), |_| Some(Splice::Remove)).unwrap();
        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_splice_replaces_element_in_place() {
        let html = "<p>one</p><table><tbody><tr><td>old</td></tr></tbody></table><p>two</p>";
        let out = splice(html, &selector("table"), |_| {
            Some(Splice::Replace("<table><tbody><tr><td>new</td></tr></tbody></table>".to_string()))
        })
        .unwrap();
        assert_eq!(
            out,
            "<p>one</p><table><tbody><tr><td>new</td></tr></tbody></table><p>two</p>"
        );
    }

    #[test]
    fn test_splice_only_touches_selected_elements() {
        let html = r#"<span data-x="1">a</span><span data-x="2">b</span>"#;
        let out = splice(html, &selector("span"), |el| {
            (el.value().attr("data-x") == Some("2")).then_some(Splice::Remove)
        })
        .unwrap();
        assert_eq!(out, r#"<span data-x="1">a</span>"#);
    }

    #[test]
    fn test_rebuild_element_overrides_and_appends() {
        let fragment = Html::parse_fragment(r#"<span class="c" data-n="1">[1]</span>"#);
        let el = fragment.select(&selector("span")).next().unwrap();
        let out = rebuild_element(
            el,
            &[("data-n", "2".to_string()), ("data-s", "1".to_string())],
            "[2]",
        );
        assert!(out.starts_with("<span "));
        assert!(out.contains(r#" class="c""#));
        assert!(out.contains(r#" data-n="2""#));
        assert!(out.ends_with(r#" data-s="1">[2]</span>"#));
    }
}
