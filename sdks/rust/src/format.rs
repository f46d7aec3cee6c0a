//! Lightweight formatting for assistant replies.
//!
//! Model output may contain a small subset of markdown: `**bold**`,
//! `*emphasis*` or `_emphasis_`, `` `code` `` and line breaks. [`parse`]
//! turns it into a tree of [`Span`]s; [`render_html`] writes that tree with
//! every piece of text escaped. A marker without a closing partner is kept as
//! literal text.

/// One node of formatted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Bold(Vec<Span>),
    Emphasis(Vec<Span>),
    Code(String),
    LineBreak,
}

/// Parse `input` into formatting spans.
#[must_use]
pub fn parse(input: &str) -> Vec<Span> {
    let chars: Vec<char> = input.chars().collect();
    parse_chars(&chars)
}

fn parse_chars(chars: &[char]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let parsed = match c {
            '*' if next == Some('*') => find_double_star(chars, i + 2)
                .map(|end| (Span::Bold(parse_chars(&chars[i + 2..end])), end + 2)),
            '*' | '_' => find_single(chars, i + 1, c)
                .map(|end| (Span::Emphasis(parse_chars(&chars[i + 1..end])), end + 1)),
            '`' => find_single(chars, i + 1, '`')
                .map(|end| (Span::Code(chars[i + 1..end].iter().collect()), end + 1)),
            '\n' => Some((Span::LineBreak, i + 1)),
            _ => None,
        };

        match parsed {
            Some((span, resume)) => {
                if !text.is_empty() {
                    spans.push(Span::Text(std::mem::take(&mut text)));
                }
                spans.push(span);
                i = resume;
            }
            None => {
                text.push(c);
                i += 1;
            }
        }
    }

    if !text.is_empty() {
        spans.push(Span::Text(text));
    }
    spans
}

/// Index of the next `**` at or after `from`, with non-empty content.
fn find_double_star(chars: &[char], from: usize) -> Option<usize> {
    (from + 1..chars.len())
        .find(|&j| chars[j - 1] == '*' && chars[j] == '*')
        .map(|j| j - 1)
        .filter(|&end| end > from)
}

/// Index of the next lone `marker` at or after `from`, with non-empty content.
///
/// For `*`, characters that belong to a `**` pair are skipped.
fn find_single(chars: &[char], from: usize, marker: char) -> Option<usize> {
    (from..chars.len())
        .find(|&j| {
            chars[j] == marker
                && (marker != '*'
                    || (chars.get(j + 1) != Some(&'*') && (j == from || chars[j - 1] != '*')))
        })
        .filter(|&end| end > from)
}

/// Render spans as HTML, escaping all text.
#[must_use]
pub fn render_html(spans: &[Span]) -> String {
    let mut out = String::new();
    write_html(&mut out, spans);
    out
}

fn write_html(out: &mut String, spans: &[Span]) {
    for span in spans {
        match span {
            Span::Text(text) => escape_into(out, text),
            Span::Bold(children) => {
                out.push_str("<strong>");
                write_html(out, children);
                out.push_str("</strong>");
            }
            Span::Emphasis(children) => {
                out.push_str("<em>");
                write_html(out, children);
                out.push_str("</em>");
            }
            Span::Code(code) => {
                out.push_str("<code>");
                escape_into(out, code);
                out.push_str("</code>");
            }
            Span::LineBreak => out.push_str("<br>"),
        }
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Flatten spans to plain text, dropping all markers.
#[must_use]
pub fn plain_text(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        match span {
            Span::Text(text) | Span::Code(text) => out.push_str(text),
            Span::Bold(children) | Span::Emphasis(children) => out.push_str(&plain_text(children)),
            Span::LineBreak => out.push('\n'),
        }
    }
    out
}
