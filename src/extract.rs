//! Candidate and title extraction from fetched HTML.
//!
//! The news results page renders each hit as a block matching
//! [`RESULT_SELECTOR`]; the article link is the block's first anchor and the
//! headline sits in a nested `div`. Article pages only contribute their
//! `<title>`.
//!
//! Everything here is synchronous. [`scraper::Html`] is not `Send`, so callers
//! parse and extract inside a plain function and only carry the owned results
//! across `.await` points.

use crate::models::Candidate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// One hit on the lightweight news results page.
pub const RESULT_SELECTOR: &str = ".Gx5Zad.fP1Qef.xpd.EtOod.pkphOe";
const LINK_SELECTOR: &str = "a";
const HEADLINE_SELECTOR: &str = "div.BNeawe.vvjwJb.AP7Wnd";
const TITLE_SELECTOR: &str = "head > title";

/// Redirect prefix the results page wraps around outbound links.
const REDIRECT_PREFIX: &str = "/url?q=";

static RESULT: Lazy<Selector> = Lazy::new(|| selector(RESULT_SELECTOR));
static LINK: Lazy<Selector> = Lazy::new(|| selector(LINK_SELECTOR));
static HEADLINE: Lazy<Selector> = Lazy::new(|| selector(HEADLINE_SELECTOR));
static TITLE: Lazy<Selector> = Lazy::new(|| selector(TITLE_SELECTOR));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Selector strings are compile-time constants.
fn selector(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

/// Lazily yield a [`Candidate`] for every result block in `document`.
///
/// Blocks without an anchor, or with an empty `href`, are skipped.
pub fn candidates(document: &Html) -> impl Iterator<Item = Candidate> + '_ {
    document.select(&RESULT).filter_map(candidate_from_block)
}

fn candidate_from_block(block: ElementRef<'_>) -> Option<Candidate> {
    let href = block.select(&LINK).next()?.value().attr("href")?;
    let link = normalize_link(href);
    if link.is_empty() {
        debug!(href, "Result block has an empty link; skipping");
        return None;
    }

    let headline = block
        .select(&HEADLINE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();

    Some(Candidate { link, headline })
}

/// Parse a results page and collect at most `limit` candidates.
pub fn candidates_from_html(html: &str, limit: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    candidates(&document).take(limit).collect()
}

/// The first `<title>` inside `<head>`, whitespace-collapsed.
///
/// Returns `None` when there is no title or it is blank.
pub fn page_title(document: &Html) -> Option<String> {
    let title = document.select(&TITLE).next()?;
    let text = collapse_whitespace(&title.text().collect::<String>());
    if text.is_empty() { None } else { Some(text) }
}

/// Parse an article page and pull its title.
pub fn page_title_from_html(html: &str) -> Option<String> {
    page_title(&Html::parse_document(html))
}

/// Strip the results-page redirect wrapper from an outbound link.
///
/// `/url?q=https://a.com/x&sa=U&ved=...` becomes `https://a.com/x`. Links
/// without the wrapper pass through unchanged.
pub fn normalize_link(href: &str) -> String {
    let Some(rest) = href.strip_prefix(REDIRECT_PREFIX) else {
        return href.trim().to_string();
    };

    // Resolve against a dummy base so the query parser handles escaping.
    let target = Url::parse("https://redirect.invalid")
        .and_then(|base| base.join(href))
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "q")
                .map(|(_, v)| v.into_owned())
        });

    target.unwrap_or_else(|| rest.to_string()).trim().to_string()
}

/// Replace every whitespace run with a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A results page with one block per `(href, headline)` pair.
    pub fn results_page(entries: &[(&str, &str)]) -> String {
        let blocks: String = entries
            .iter()
            .map(|(href, headline)| {
                format!(
                    r#"<div class="Gx5Zad fP1Qef xpd EtOod pkphOe">
                        <a href="{href}"><div class="BNeawe vvjwJb AP7Wnd">{headline}</div></a>
                        <div class="BNeawe s3v9rd AP7Wnd">snippet</div>
                    </div>"#
                )
            })
            .collect();
        format!("<html><head><title>site:x - Search</title></head><body><div id=\"main\">{blocks}</div></body></html>")
    }

    /// A results page with `n` distinct redirect-wrapped entries.
    pub fn numbered_results_page(offset: usize, n: usize) -> String {
        let entries: Vec<(String, String)> = (offset..offset + n)
            .map(|i| {
                (
                    format!("/url?q=https://example.com/article/{i}&amp;sa=U"),
                    format!("Headline {i}"),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = entries
            .iter()
            .map(|(h, t)| (h.as_str(), t.as_str()))
            .collect();
        results_page(&refs)
    }

    pub fn article_page(title: &str) -> String {
        format!("<html><head><title>{title}</title></head><body><p>text</p></body></html>")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_candidates_from_results_page() {
        let html = results_page(&[
            (
                "/url?q=https://apnews.com/article/one&amp;sa=U&amp;ved=abc",
                "First   story\n headline",
            ),
            ("https://apnews.com/article/two", "Second"),
        ]);

        let found = candidates_from_html(&html, 10);
        assert_eq!(
            found,
            vec![
                Candidate {
                    link: "https://apnews.com/article/one".to_string(),
                    headline: "First story headline".to_string(),
                },
                Candidate {
                    link: "https://apnews.com/article/two".to_string(),
                    headline: "Second".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_candidates_respects_limit() {
        let html = numbered_results_page(0, 10);
        assert_eq!(candidates_from_html(&html, 4).len(), 4);
        assert_eq!(candidates_from_html(&html, 50).len(), 10);
    }

    #[test]
    fn test_blocks_without_links_are_skipped() {
        let html = r#"<html><body>
            <div class="Gx5Zad fP1Qef xpd EtOod pkphOe"><div class="BNeawe vvjwJb AP7Wnd">No link</div></div>
            <div class="Gx5Zad fP1Qef xpd EtOod pkphOe"><a href="">Empty</a></div>
            <div class="Gx5Zad fP1Qef xpd EtOod pkphOe"><a href="https://a.com/x">ok</a></div>
        </body></html>"#;
        let found = candidates_from_html(html, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].link, "https://a.com/x");
        assert_eq!(found[0].headline, "");
    }

    #[test]
    fn test_unrelated_markup_yields_nothing() {
        let html = "<html><body><div class=\"g\"><a href=\"https://a.com\">x</a></div></body></html>";
        assert!(candidates_from_html(html, 10).is_empty());
    }

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link("/url?q=https://a.com/p%3Fid%3D7&sa=U&ved=2ah"),
            "https://a.com/p?id=7"
        );
        assert_eq!(normalize_link("/url?q=https://a.com/x"), "https://a.com/x");
        assert_eq!(normalize_link(" https://b.com/y "), "https://b.com/y");
        assert_eq!(normalize_link("/url?q="), "");
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title_from_html(&article_page("  Storm hits\n coast | AP News ")),
            Some("Storm hits coast | AP News".to_string())
        );
        assert_eq!(page_title_from_html("<html><body>none</body></html>"), None);
        assert_eq!(page_title_from_html(&article_page("   ")), None);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }
}
