//! Heuristic main-content extraction from rendered HTML.
//!
//! The extractor is a pure function over the HTML string: it parses its own
//! DOM, prunes boilerplate, picks a main-content candidate, appends the
//! page's structural skeleton (headings, paragraphs, lists, tables), and
//! cleans the result. Identical input always yields identical output.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::core::config::{
    BODY_FALLBACK_MIN_CHARS, CONTENT_CAP_CHARS, DESCRIPTION_MAX_CHARS, EMPTY_EXTRACT_CHARS,
    FALLBACK_MIN_CHARS, MAIN_CONTENT_MIN_CHARS, PARAGRAPH_MIN_CHARS, TEXT_RATIO_MIN,
    TITLE_MAX_CHARS,
};

/// Which path produced the main content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// One of the known content selectors matched with enough text.
    Selector(String),
    /// Best-scoring container won the text-to-markup contest.
    Scored,
    /// Main candidate was too thin; joined paragraphs + lists used instead.
    FallbackParagraphs,
    /// Even the paragraphs were thin; full body text used.
    FallbackBody,
    /// Nothing usable on the page.
    Empty,
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub title: String,
    pub description: String,
    pub content: String,
    pub outcome: ExtractionOutcome,
}

/// Selectors tried in order for the main content container.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    ".main-content",
    "#content",
    "#main",
    ".post-content",
    ".entry-content",
    ".page-content",
    ".article-body",
    ".post-body",
    ".text-content",
];

/// Class tokens that mark an element as boilerplate. `ad`/`ads` must match
/// the whole token (stripping every class merely *containing* "ad" would
/// take out headers); the longer names match as token substrings so
/// `cookie-banner-wrap` is still removed.
const NOISE_CLASS_EXACT: &[&str] = &["ad", "ads"];
const NOISE_CLASS_SUBSTRING: &[&str] = &["advertisement", "cookie-banner", "popup", "modal"];

const STRIP_TAGS: &[&str] = &["script", "style", "link", "meta", "noscript", "iframe"];

/// Whether extraction produced too little to store.
pub fn is_empty_extract(content: &str) -> bool {
    content.chars().count() < EMPTY_EXTRACT_CHARS
}

/// Extract `(title, description, content)` from rendered HTML.
pub fn extract(html: &str) -> Extracted {
    let mut doc = Html::parse_document(html);

    // Title and description come from the intact head; pruning below removes
    // every <meta>.
    let title = extract_title(&doc);
    let description = extract_description(&doc);

    strip_boilerplate(&mut doc);

    let headings = collect_headings(&doc);
    let paragraphs = collect_paragraphs(&doc);
    let list_items = collect_list_items(&doc);
    let tables = collect_tables(&doc);

    let (mut main_text, mut outcome) = select_main_candidate(&doc);

    // Thin candidates degrade through the paragraph and body fallbacks.
    if main_text.chars().count() < FALLBACK_MIN_CHARS {
        let joined = join_blocks(&[paragraphs.join("\n\n"), list_items.join("\n")]);
        if !joined.is_empty() {
            main_text = joined;
            outcome = ExtractionOutcome::FallbackParagraphs;
        }
        if main_text.chars().count() < BODY_FALLBACK_MIN_CHARS {
            if let Some(body) = body_text(&doc) {
                if body.chars().count() > main_text.chars().count() {
                    main_text = body;
                    outcome = ExtractionOutcome::FallbackBody;
                }
            }
        }
    }

    let structure = join_blocks(&[
        headings.join("\n"),
        paragraphs.join("\n\n"),
        list_items.join("\n"),
        tables.join("\n\n"),
    ]);

    let content = clean_text(&join_blocks(&[main_text, structure]));
    let content = truncate_chars(&content, CONTENT_CAP_CHARS);

    if is_empty_extract(&content) {
        outcome = ExtractionOutcome::Empty;
    }

    Extracted {
        title,
        description,
        content,
        outcome,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Boilerplate pruning
// ─────────────────────────────────────────────────────────────────────────────

/// Detach scripts, styles, metadata, hidden elements, and ad/cookie/popup
/// containers from the parsed tree. Navigation and footers stay — they carry
/// link structure the crawler wants.
fn strip_boilerplate(doc: &mut Html) {
    let mut doomed = Vec::new();
    for node in doc.tree.nodes() {
        let el = match node.value().as_element() {
            Some(el) => el,
            None => continue,
        };

        let name = el.name().to_ascii_lowercase();
        let noisy_tag = STRIP_TAGS.contains(&name.as_str());

        let noisy_class = el.classes().any(|c| {
            let c = c.to_ascii_lowercase();
            NOISE_CLASS_EXACT.contains(&c.as_str())
                || NOISE_CLASS_SUBSTRING.iter().any(|kw| c.contains(kw))
        });

        let hidden = el.attr("hidden").is_some()
            || el
                .attr("style")
                .map(|s| {
                    let s: String = s.to_ascii_lowercase().split_whitespace().collect();
                    s.contains("display:none")
                })
                .unwrap_or(false);

        if noisy_tag || noisy_class || hidden {
            doomed.push(node.id());
        }
    }

    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Title / description
// ─────────────────────────────────────────────────────────────────────────────

fn extract_title(doc: &Html) -> String {
    let candidates = [
        element_text_first(doc, "title"),
        element_text_first(doc, "h1"),
        meta_content(doc, "meta[property=\"og:title\"]"),
    ];
    let title = candidates
        .into_iter()
        .flatten()
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());
    truncate_chars(&title, TITLE_MAX_CHARS)
}

fn extract_description(doc: &Html) -> String {
    let candidates = [
        meta_content(doc, "meta[name=\"description\"]"),
        meta_content(doc, "meta[property=\"og:description\"]"),
    ];
    let description = candidates
        .into_iter()
        .flatten()
        .find(|d| !d.is_empty())
        .unwrap_or_default();
    truncate_chars(&description, DESCRIPTION_MAX_CHARS)
}

fn element_text_first(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel).next().map(|el| normalize_ws(&text_of(el)))
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).unwrap();
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(normalize_ws)
}

// ─────────────────────────────────────────────────────────────────────────────
// Main-content candidate
// ─────────────────────────────────────────────────────────────────────────────

fn select_main_candidate(doc: &Html) -> (String, ExtractionOutcome) {
    for selector in CONTENT_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        if let Some(el) = doc.select(&sel).next() {
            let text = normalize_ws(&text_of(el));
            if text.chars().count() > MAIN_CONTENT_MIN_CHARS {
                return (text, ExtractionOutcome::Selector(selector.to_string()));
            }
        }
    }

    // No known selector qualified: score generic containers by text length,
    // filtered by text-to-markup ratio so link farms don't win.
    let sel = Selector::parse("main, article, section, div").unwrap();
    let mut best: Option<String> = None;
    let mut best_len = 0usize;
    for el in doc.select(&sel) {
        let text = normalize_ws(&text_of(el));
        let text_len = text.chars().count();
        if text_len <= best_len {
            continue;
        }
        let html_len = el.html().len().max(1);
        if (text_len as f64) / (html_len as f64) > TEXT_RATIO_MIN {
            best_len = text_len;
            best = Some(text);
        }
    }

    match best {
        Some(text) => (text, ExtractionOutcome::Scored),
        None => (String::new(), ExtractionOutcome::Empty),
    }
}

fn body_text(doc: &Html) -> Option<String> {
    let sel = Selector::parse("body").unwrap();
    doc.select(&sel).next().map(|el| normalize_ws(&text_of(el)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Structural augmentation
// ─────────────────────────────────────────────────────────────────────────────

fn collect_headings(doc: &Html) -> Vec<String> {
    let sel = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    doc.select(&sel)
        .map(|el| normalize_ws(&text_of(el)))
        .filter(|t| !t.is_empty())
        .map(|t| format!("## {t}"))
        .collect()
}

fn collect_paragraphs(doc: &Html) -> Vec<String> {
    let sel = Selector::parse("p").unwrap();
    doc.select(&sel)
        .map(|el| normalize_ws(&text_of(el)))
        .filter(|t| t.chars().count() > PARAGRAPH_MIN_CHARS)
        .collect()
}

fn collect_list_items(doc: &Html) -> Vec<String> {
    let sel = Selector::parse("li").unwrap();
    doc.select(&sel)
        .map(|el| normalize_ws(&text_of(el)))
        .filter(|t| !t.is_empty())
        .map(|t| format!("• {t}"))
        .collect()
}

fn collect_tables(doc: &Html) -> Vec<String> {
    let table_sel = Selector::parse("table").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();
    let th_sel = Selector::parse("th").unwrap();

    let mut out = Vec::new();
    for table in doc.select(&table_sel) {
        let mut lines = Vec::new();
        let has_header = table.select(&th_sel).next().is_some();
        for (i, row) in table.select(&row_sel).enumerate() {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| normalize_ws(&text_of(c)))
                .collect();
            if cells.is_empty() {
                continue;
            }
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 && has_header {
                let dashes: Vec<&str> = cells.iter().map(|_| "---").collect();
                lines.push(format!("| {} |", dashes.join(" | ")));
            }
        }
        if !lines.is_empty() {
            out.push(lines.join("\n"));
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Text utilities
// ─────────────────────────────────────────────────────────────────────────────

fn text_of(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Collapse all whitespace runs to single spaces.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Final cleanup: tabs and non-breaking spaces to spaces, space runs to one
/// space, newline runs to at most one blank line, trimmed edges.
fn clean_text(s: &str) -> String {
    let s = s.replace(['\u{a0}', '\t'], " ").replace('\r', "");
    let space_runs = Regex::new(r" {2,}").unwrap();
    let s = space_runs.replace_all(&s, " ");
    let ragged_newlines = Regex::new(r" *\n *").unwrap();
    let s = ragged_newlines.replace_all(&s, "\n");
    let newline_runs = Regex::new(r"\n{3,}").unwrap();
    let s = newline_runs.replace_all(&s, "\n\n");
    s.trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn join_blocks(blocks: &[String]) -> String {
    blocks
        .iter()
        .filter(|b| !b.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_beats_nav_on_nav_heavy_page() {
        let body = "word ".repeat(400); // ~2000 chars
        let html = format!(
            "<html><head><title>Nav Heavy</title></head><body>\
             <nav><a href=\"/a\">Home</a> <a href=\"/b\">About</a> links here</nav>\
             <article>{body}</article>\
             </body></html>"
        );
        let out = extract(&html);
        assert_eq!(out.title, "Nav Heavy");
        assert_eq!(out.outcome, ExtractionOutcome::Selector("article".into()));
        // Main content dominated by the article, not the 50-char nav.
        assert!(out.content.chars().count() > 1500);
    }

    #[test]
    fn title_fallback_chain() {
        let html = "<html><body><h1>From H1</h1><main>x</main></body></html>";
        assert_eq!(extract(html).title, "From H1");

        let html = "<html><head><meta property=\"og:title\" content=\"From OG\"></head>\
                    <body><main>x</main></body></html>";
        assert_eq!(extract(html).title, "From OG");

        let html = "<html><body><div>x</div></body></html>";
        assert_eq!(extract(html).title, "Untitled");
    }

    #[test]
    fn description_from_meta() {
        let html = "<html><head><meta name=\"description\" content=\"A fine page\"></head>\
                    <body></body></html>";
        assert_eq!(extract(html).description, "A fine page");
    }

    #[test]
    fn scripts_styles_and_hidden_elements_are_stripped() {
        let visible = "visible content ".repeat(40);
        let html = format!(
            "<html><body><main><p>{visible}</p>\
             <script>var secret = 'SCRIPTTEXT';</script>\
             <style>.x {{ color: red }}</style>\
             <div style=\"display: none\">HIDDENTEXT</div>\
             <div hidden>ALSOHIDDEN</div>\
             <div class=\"cookie-banner-wrap\">COOKIENOTICE</div>\
             <div class=\"ad\">BUYTHINGS</div>\
             </main></body></html>"
        );
        let out = extract(&html);
        assert!(!out.content.contains("SCRIPTTEXT"));
        assert!(!out.content.contains("HIDDENTEXT"));
        assert!(!out.content.contains("ALSOHIDDEN"));
        assert!(!out.content.contains("COOKIENOTICE"));
        assert!(!out.content.contains("BUYTHINGS"));
        assert!(out.content.contains("visible content"));
    }

    #[test]
    fn header_class_is_not_an_ad() {
        // "header" contains "ad" as a substring; token matching must keep it.
        let text = "important header copy ".repeat(30);
        let html = format!(
            "<html><body><main><div class=\"header\">{text}</div></main></body></html>"
        );
        let out = extract(&html);
        assert!(out.content.contains("important header copy"));
    }

    #[test]
    fn structural_augmentation_renders_headings_lists_tables() {
        let filler = "paragraph text that is long enough to be kept by the filter. ".repeat(10);
        let html = format!(
            "<html><body><main>\
             <h2>Section One</h2>\
             <p>{filler}</p>\
             <ul><li>alpha</li><li>beta</li></ul>\
             <table><tr><th>Name</th><th>Age</th></tr><tr><td>Ada</td><td>36</td></tr></table>\
             </main></body></html>"
        );
        let out = extract(&html);
        assert!(out.content.contains("## Section One"));
        assert!(out.content.contains("• alpha"));
        assert!(out.content.contains("| Name | Age |"));
        assert!(out.content.contains("| --- | --- |"));
        assert!(out.content.contains("| Ada | 36 |"));
    }

    #[test]
    fn thin_candidate_falls_back_to_paragraphs() {
        let para = "a paragraph that is comfortably over the minimum length for keeping. ";
        let html = format!(
            "<html><body>\
             <div id=\"content\">tiny</div>\
             <p>{}</p><p>{}</p>\
             </body></html>",
            para.repeat(3),
            para.repeat(3)
        );
        let out = extract(&html);
        assert_eq!(out.outcome, ExtractionOutcome::FallbackParagraphs);
        assert!(out.content.contains("comfortably over the minimum"));
    }

    #[test]
    fn empty_page_is_flagged() {
        let out = extract("<html><body><div>hi</div></body></html>");
        assert_eq!(out.outcome, ExtractionOutcome::Empty);
        assert!(is_empty_extract(&out.content));
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = "<html><head><title>T</title></head><body><main>\
                    <h1>Heading</h1><p>Some repeated paragraph content that is long enough to keep and keep again.</p>\
                    </main></body></html>";
        let a = extract(html);
        let b = extract(html);
        assert_eq!(a.title, b.title);
        assert_eq!(a.description, b.description);
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn whitespace_is_normalized() {
        let text = "spaced    out\t\ttext with   runs. ".repeat(20);
        let html = format!("<html><body><main><p>{text}</p></main></body></html>");
        let out = extract(&html);
        assert!(!out.content.contains("  "), "double spaces survived");
        assert!(!out.content.contains('\t'));
        assert!(!out.content.contains("\n\n\n"));
    }

    #[test]
    fn content_is_capped() {
        let huge = "x".repeat(60_000);
        let html = format!("<html><body><main><p>{huge}</p></main></body></html>");
        let out = extract(&html);
        assert!(out.content.chars().count() <= CONTENT_CAP_CHARS);
    }
}
