//! Word, character and page counts shown next to the editor.

use scraper::Html;
use serde::Serialize;

/// Characters per estimated manuscript page.
pub const CHARACTERS_PER_PAGE: usize = 1800;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentMetrics {
    pub words: usize,
    pub characters: usize,
    pub characters_no_spaces: usize,
    pub pages: usize,
}

impl ContentMetrics {
    pub fn from_html(html: &str) -> Self {
        if html.trim().is_empty() {
            return Self::default();
        }

        let fragment = Html::parse_fragment(html);
        let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
        let normalized = text.split_whitespace().collect::<Vec<_>>();

        let words = normalized.len();
        let characters_no_spaces: usize = normalized.iter().map(|w| w.chars().count()).sum();
        let characters = characters_no_spaces + words.saturating_sub(1);
        let pages = if characters == 0 {
            0
        } else {
            characters.div_ceil(CHARACTERS_PER_PAGE)
        };

        Self {
            words,
            characters,
            characters_no_spaces,
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_words_across_elements() {
        let metrics = ContentMetrics::from_html("<p>Hello <b>world</b></p><p>again</p>");
        assert_eq!(metrics.words, 3);
        assert_eq!(metrics.characters_no_spaces, 15);
        assert_eq!(metrics.characters, 17);
        assert_eq!(metrics.pages, 1);
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(ContentMetrics::from_html(""), ContentMetrics::default());
        assert_eq!(ContentMetrics::from_html("<p></p>").pages, 0);
    }

    #[test]
    fn test_pages_round_up() {
        let html = format!("<p>{}</p>", "x".repeat(CHARACTERS_PER_PAGE + 1));
        assert_eq!(ContentMetrics::from_html(&html).pages, 2);
    }
}
