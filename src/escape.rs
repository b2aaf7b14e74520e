//! HTML escaping for the input boundary, and markup stripping for
//! plain text output.

use html5gum::{Token, Tokenizer};

/// Escape the five characters that are significant in HTML text and
/// attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_html`, for values that leave HTML (URLs, plain
/// text output). Other character references are left alone.
pub fn unescape_html(s: &str) -> String {
    if ! s.contains('&') {
        return s.into()
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let mut matched = false;
        for (entity, c) in [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'),
                            ("&quot;", '"'), ("&#39;", '\'')] {
            if let Some(r) = rest.strip_prefix(entity) {
                out.push(c);
                rest = r;
                matched = true;
                break
            }
        }
        if ! matched {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Trim, then escape: the normalization every external string goes
/// through exactly once, when the request context is built.
pub fn sanitize(s: &str) -> String {
    escape_html(s.trim())
}

/// The text content of an HTML fragment: tags and comments dropped,
/// character references decoded. Leading blank lines are removed;
/// runs of blank lines elsewhere collapse into one.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::new();
    for token in Tokenizer::new(html).infallible() {
        match token {
            Token::String(s) => text.push_str(&String::from_utf8_lossy(&s)),
            Token::StartTag(tag) => {
                // Block-ish elements separate words
                match &**tag.name {
                    b"br" | b"p" | b"div" | b"li" | b"tr" | b"h1" | b"h2" | b"h3" =>
                        text.push('\n'),
                    _ => ()
                }
            }
            _ => ()
        }
    }
    collapse_blank_lines(&text)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = true; // at start, swallow all blank lines
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            if ! blank_run {
                out.push('\n');
                blank_run = true;
            }
        } else {
            out.push_str(line);
            out.push('\n');
            blank_run = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_escape_html() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
        assert_eq!(escape_html("plain"), "plain");
        assert_eq!(sanitize("  <x>  "), "&lt;x&gt;");
        let s = "a<b>&\"c' &amp; &copy;";
        assert_eq!(unescape_html(&escape_html(s)), s);
        assert_eq!(unescape_html("&copy; &"), "&copy; &");
    }

    #[test]
    fn t_strip_tags() {
        assert_eq!(strip_tags("<h2>Title</h2><p>Hello &amp; <b>bye</b></p>"),
                   "Title\nHello & bye\n");
        assert_eq!(strip_tags("\n\n  \n<p>x</p>\n\n\n<p>y</p>"),
                   "x\n\ny\n");
        assert_eq!(strip_tags(""), "");
    }
}
