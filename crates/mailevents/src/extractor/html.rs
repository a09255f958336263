//! HTML flattening for notification bodies.

use std::sync::LazyLock;

use regex::Regex;

static RE_HTML_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(html|body|div|table|p|br|h[1-6]|span|a)\b").unwrap());
static RE_DROP_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head|title)\b[^>]*>.*?</(script|style|head|title)\s*>").unwrap()
});
static RE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});
static RE_LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static RE_BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|tr|table|li|ul|ol|h[1-6]|td|th|section|header|footer)\b[^>]*>")
        .unwrap()
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h([1-3])\b[^>]*>(.*?)</h[1-3]\s*>").unwrap());
static RE_NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

/// Heuristic check for HTML content.
pub fn looks_like_html(text: &str) -> bool {
    RE_HTML_HINT.is_match(text)
}

/// Flattens HTML into plain text lines.
///
/// Block elements and `<br>` become line breaks, link targets are kept next
/// to their text so URLs survive, and entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let text = RE_DROP_BLOCKS.replace_all(html, "");
    let text = RE_COMMENT.replace_all(&text, "");
    let text = RE_ANCHOR.replace_all(&text, "$2 $1");
    let text = RE_LINE_BREAK.replace_all(&text, "\n");
    let text = RE_BLOCK_END.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    normalize_lines(&text)
}

/// Text of the first `<h1>`-`<h3>` element, if any.
pub fn first_heading(html: &str) -> Option<String> {
    RE_HEADING
        .captures_iter(html)
        .filter_map(|caps| caps.get(2))
        .map(|inner| {
            let text = RE_TAG.replace_all(inner.as_str(), " ");
            collapse_spaces(&decode_entities(&text))
        })
        .find(|text| !text.is_empty())
}

/// Decodes the named entities notification mail uses plus numeric references.
pub fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&ndash;", "–")
        .replace("&mdash;", "—")
        .replace("&middot;", "·")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'");

    let numeric = RE_NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    // Last, so "&amp;lt;" decodes to "&lt;" and not "<".
    numeric.replace("&amp;", "&")
}

fn collapse_spaces(text: &str) -> String {
    RE_SPACES.replace_all(text, " ").trim().to_string()
}

/// Collapses horizontal whitespace per line and squeezes runs of blank lines.
pub fn normalize_lines(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let line = collapse_spaces(line);
        if line.is_empty() {
            if !blank && !out.is_empty() {
                out.push(String::new());
            }
            blank = true;
        } else {
            out.push(line);
            blank = false;
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<html><body>x</body></html>"));
        assert!(looks_like_html("Hello<br/>world"));
        assert!(!looks_like_html("Going: 5 people <- not html"));
    }

    #[test]
    fn test_html_to_text_keeps_structure() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
<body><table><tr><td><h1>Fall&nbsp;Festival</h1></td></tr>
<tr><td><p>Saturday, October 24, 2026 at 6:00 PM</p>
<div>Location: <b>Millennium&nbsp;Plaza</b></div></td></tr></table></body></html>"#;
        let text = html_to_text(html);
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "Fall Festival",
                "Saturday, October 24, 2026 at 6:00 PM",
                "Location: Millennium Plaza"
            ]
        );
    }

    #[test]
    fn test_html_to_text_keeps_link_targets() {
        let html = r#"<p><a href="https://www.facebook.com/events/123456">View Event</a></p>"#;
        assert_eq!(
            html_to_text(html),
            "View Event https://www.facebook.com/events/123456"
        );
    }

    #[test]
    fn test_first_heading() {
        let html = "<h4>ignored</h4><h2> <span>Trivia &amp; Tacos</span> </h2><h1>Later</h1>";
        assert_eq!(first_heading(html).as_deref(), Some("Trivia & Tacos"));
        assert_eq!(first_heading("<p>none</p>"), None);
        assert_eq!(first_heading("<h1>  </h1><h3>Real</h3>").as_deref(), Some("Real"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&#8211; &#x2013;"), "– –");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&#xZZ;"), "&#xZZ;");
    }

    #[test]
    fn test_normalize_lines() {
        assert_eq!(normalize_lines("  a   b \n\n\n c\t\n\n"), "a b\n\nc");
    }
}
