use pct_str::{PctString, URIReserved};

use crate::{escape::{escape_html, unescape_html}, params::Param};

pub fn url_encode(s: &str) -> String {
    let p = PctString::encode(s.chars(), URIReserved);
    p.to_string()
}

/// A relative link carrying the given parameters, ready for use in an
/// HTML attribute. Values are taken as already HTML-escaped (as all
/// input values are), so they are unescaped before URL encoding.
pub fn href(params: &[(Param, &str)]) -> String {
    let query: Vec<String> = params.iter()
        .filter(|(_, v)| ! v.is_empty())
        .map(|(p, v)| format!("{}={}", p.key(), url_encode(&unescape_html(v))))
        .collect();
    escape_html(&format!("?{}", query.join("&")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_url_encode() {
        let e = url_encode("a b&c=d#e");
        assert!(! e.contains(' '));
        assert!(! e.contains('&'));
        assert!(! e.contains('#'));
        assert_eq!(url_encode("News"), "News");
    }

    #[test]
    fn t_href() {
        assert_eq!(href(&[(Param::Plugin, "News"), (Param::Page, "2")]),
                   "?o=News&amp;p=2");
        assert_eq!(href(&[(Param::Plugin, "News"), (Param::Query, "")]),
                   "?o=News");
        // the escaped ampersand in the value is not passed on as "&amp;"
        let h = href(&[(Param::Query, "a&amp;b")]);
        assert!(h.starts_with("?q=a%26b") || h.starts_with("?q=a%26B"), "{h}");
    }
}
