//! Readable-text extraction from HTML

use scraper::{ElementRef, Html, Selector};

const ROOT_SELECTORS: &[&str] = &["article", "main", "body"];
const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, blockquote, pre, td";

/// Extract `(text, title)` from an HTML page.
///
/// Text comes from block elements under the first `article`, `main` or `body` root,
/// one block per line. Returns empty text when nothing readable is found.
pub fn extract_text(html: &str) -> (String, Option<String>) {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let root = ROOT_SELECTORS.iter().find_map(|css| {
        Selector::parse(css)
            .ok()
            .and_then(|sel| document.select(&sel).next())
    });

    let Some(root) = root else {
        return (String::new(), title);
    };

    let Ok(block_sel) = Selector::parse(BLOCK_SELECTOR) else {
        return (String::new(), title);
    };

    let mut blocks: Vec<String> = Vec::new();
    for elem in root.select(&block_sel) {
        // Nested blocks (li > p) would otherwise be emitted twice.
        if has_block_ancestor(elem, root) {
            continue;
        }
        let text = compact_ws(&text_content(elem));
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    if blocks.is_empty() {
        let fallback = compact_ws(&text_content(root));
        return (fallback, title);
    }

    (blocks.join("\n"), title)
}

fn extract_title(document: &Html) -> Option<String> {
    let from_tag = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|elem| compact_ws(&text_content(elem)));

    let from_og = || {
        Selector::parse(r#"meta[property="og:title"]"#)
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .and_then(|elem| elem.value().attr("content"))
            .map(compact_ws)
    };

    from_tag
        .filter(|t| !t.is_empty())
        .or_else(from_og)
        .filter(|t| !t.is_empty())
}

fn has_block_ancestor(elem: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    elem.ancestors()
        .take_while(|node| node.id() != root.id())
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_block(ancestor.value().name()))
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "li" | "blockquote" | "pre" | "td"
    )
}

/// Text of an element, skipping script and style content
fn text_content(elem: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in elem.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| matches!(a.value().name(), "script" | "style" | "noscript"));
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }
    out
}

fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
