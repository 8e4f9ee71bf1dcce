//! Heuristic URL classification.
//!
//! [`is_likely_content_url`] decides whether a URL is worth rendering at all.
//! It deliberately has no positive allowlist: anything not clearly
//! machine-facing (admin panels, feeds, assets, API endpoints) passes, which
//! keeps recall high on sites with unusual path layouts.

use url::Url;

/// Path keywords that mark system/non-content URLs. Matched at path
/// boundaries, not as bare substrings, so `/blog/administrivia` survives
/// while `/admin/` does not.
const SYSTEM_SEGMENTS: &[&str] = &[
    "wp-admin",
    "wp-login",
    "wp-includes",
    "wp-json",
    "admin",
    "login",
    "logout",
    "signin",
    "signup",
    "dashboard",
    "panel",
    "cpanel",
    "node_modules",
    ".git",
    ".env",
    "cgi-bin",
    "api/",
    "rest/",
    "graphql",
    "feed",
    "rss",
    "atom",
    "cart",
    "checkout",
    "payment",
    "search?",
    "ajax",
    "action=",
];

/// File extensions that never resolve to a content page.
const NON_PAGE_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp",
    // styles
    "css", "scss", "less",
    // scripts
    "js", "mjs",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // archives
    "zip", "rar", "tar", "gz", "7z",
    // media
    "mp3", "wav", "ogg", "mp4", "avi", "mov", "webm",
    // data
    "xml", "json", "txt", "log", "csv",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // source maps
    "map",
];

/// Query parameter names that mark programmatic endpoints.
const REJECTED_QUERY_PARAMS: &[&str] = &["action", "ajax", "callback", "jsonp"];

const MAX_QUERY_PARAMS: usize = 5;

/// Whether a `Content-Type` header value can carry a content page.
pub fn content_type_ok(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "text/html" || essence == "text/plain"
}

/// Pure predicate: is this URL likely to be a content page?
///
/// Returns `false` on any parse error, any system path segment, any
/// non-page extension, programmatic query parameters, or more than
/// five distinct query parameters.
pub fn is_likely_content_url(url: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        if !content_type_ok(ct) {
            return false;
        }
    }

    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };

    let path = parsed.path().to_ascii_lowercase();
    // Keyword rules also cover `search?` and `action=`, which straddle the
    // path/query boundary, so match against the combined form.
    let path_and_query = match parsed.query() {
        Some(q) => format!("{}?{}", path, q.to_ascii_lowercase()),
        None => path.clone(),
    };

    for kw in SYSTEM_SEGMENTS {
        if has_boundary_keyword(&path_and_query, kw) {
            return false;
        }
    }

    if let Some(ext) = final_extension(&path) {
        if NON_PAGE_EXTENSIONS.contains(&ext) {
            return false;
        }
    }

    let mut names: Vec<String> = Vec::new();
    for (name, _) in parsed.query_pairs() {
        let name = name.to_ascii_lowercase();
        if REJECTED_QUERY_PARAMS.contains(&name.as_str()) {
            return false;
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if names.len() > MAX_QUERY_PARAMS {
        return false;
    }

    true
}

/// Match `kw` in `target` at a path boundary: preceded by `/` (or start of
/// path) and followed by `/`, `?`, `=`, or end — unless the keyword carries
/// its own trailing boundary character (`api/`, `search?`, `action=`).
fn has_boundary_keyword(target: &str, kw: &str) -> bool {
    let mut from = 0;
    while let Some(rel) = target[from..].find(kw) {
        let at = from + rel;
        let end = at + kw.len();
        let before_ok = at == 0 || target.as_bytes()[at - 1] == b'/';
        let self_bounded = kw.ends_with('/') || kw.ends_with('?') || kw.ends_with('=');
        let after_ok = self_bounded
            || end == target.len()
            || matches!(target.as_bytes()[end], b'/' | b'?' | b'=');
        if before_ok && after_ok {
            return true;
        }
        from = at + 1;
    }
    false
}

/// The extension of the final path segment, when it has one.
fn final_extension(path: &str) -> Option<&str> {
    let last = path.rsplit('/').next()?;
    let dot = last.rfind('.')?;
    let ext = &last[dot + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_content_urls_pass() {
        assert!(is_likely_content_url("https://ex.com/blog/post-1", None));
        assert!(is_likely_content_url("https://ex.com/", None));
        assert!(is_likely_content_url(
            "https://ex.com/docs/getting-started",
            None
        ));
        // Keyword inside a longer word is not a boundary match.
        assert!(is_likely_content_url(
            "https://ex.com/blog/administrivia",
            None
        ));
        assert!(is_likely_content_url("https://ex.com/cartography", None));
    }

    #[test]
    fn system_segments_reject() {
        assert!(!is_likely_content_url(
            "https://ex.com/wp-admin/edit.php",
            None
        ));
        assert!(!is_likely_content_url("https://ex.com/admin", None));
        assert!(!is_likely_content_url("https://ex.com/admin/users", None));
        assert!(!is_likely_content_url("https://ex.com/api/v1/posts", None));
        assert!(!is_likely_content_url("https://ex.com/feed", None));
        assert!(!is_likely_content_url("https://ex.com/cart", None));
        assert!(!is_likely_content_url("https://ex.com/search?q=x", None));
    }

    #[test]
    fn non_page_extensions_reject() {
        assert!(!is_likely_content_url("https://ex.com/style.css", None));
        assert!(!is_likely_content_url("https://ex.com/app.min.js", None));
        assert!(!is_likely_content_url("https://ex.com/a/b/photo.JPG", None));
        assert!(!is_likely_content_url("https://ex.com/report.pdf", None));
        assert!(!is_likely_content_url("https://ex.com/bundle.js.map", None));
        // Dots inside directory names don't count.
        assert!(is_likely_content_url("https://ex.com/v1.2/notes", None));
    }

    #[test]
    fn programmatic_query_params_reject() {
        assert!(!is_likely_content_url(
            "https://ex.com/page?action=delete",
            None
        ));
        assert!(!is_likely_content_url(
            "https://ex.com/page?callback=jsonp123",
            None
        ));
    }

    #[test]
    fn too_many_query_params_reject() {
        assert!(!is_likely_content_url(
            "https://ex.com/x?a=1&b=2&c=3&d=4&e=5&f=6",
            None
        ));
        assert!(is_likely_content_url(
            "https://ex.com/x?a=1&b=2&c=3&d=4&e=5",
            None
        ));
        // Repeated names count once.
        assert!(is_likely_content_url(
            "https://ex.com/x?a=1&a=2&a=3&a=4&a=5&a=6",
            None
        ));
    }

    #[test]
    fn content_type_gate() {
        assert!(is_likely_content_url(
            "https://ex.com/p",
            Some("text/html; charset=utf-8")
        ));
        assert!(is_likely_content_url("https://ex.com/p", Some("text/plain")));
        assert!(!is_likely_content_url(
            "https://ex.com/p",
            Some("application/json")
        ));
        assert!(!is_likely_content_url("https://ex.com/p", Some("image/png")));
    }

    #[test]
    fn parse_errors_reject() {
        assert!(!is_likely_content_url("not a url", None));
        assert!(!is_likely_content_url("", None));
    }

    #[test]
    fn deterministic() {
        let url = "https://ex.com/blog/post-1?utm=a";
        assert_eq!(
            is_likely_content_url(url, None),
            is_likely_content_url(url, None)
        );
    }
}
