//! Small HTML building blocks shared by themes and views. Text
//! arguments are expected to be HTML-safe already: input values are
//! escaped once when the request context is built, and stored records
//! were built from such values.

use serde_json::{Map, Value};

use crate::{params::Param, url_encoding::href};

/// Display text of a JSON value.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "yes".into() } else { "no".into() },
        other => other.to_string(),
    }
}

pub fn alert(kind: &str, message: &str) -> String {
    format!("<div class=\"alert alert-{kind}\">{message}</div>\n")
}

pub fn card(head: &str, body: &str) -> String {
    format!("<div class=\"card\">\n<h2>{head}</h2>\n<div class=\"card-body\">\n{body}\n</div>\n</div>\n")
}

pub fn link(href: &str, text: &str) -> String {
    format!("<a href=\"{href}\">{text}</a>")
}

/// A table of records. Columns are those of the first record unless
/// given; `row_link` may turn a record into a link target for its
/// first column.
pub fn table(items: &[Value], columns: Option<&[&str]>,
             row_link: impl Fn(&Map<String, Value>) -> Option<String>) -> String
{
    let first_columns: Vec<&str>;
    let columns = match columns {
        Some(c) => c,
        None => {
            first_columns = items.first()
                .and_then(Value::as_object)
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            &first_columns[..]
        }
    };
    let mut out = String::from("<table class=\"items\">\n<thead><tr>");
    for c in columns {
        out.push_str(&format!("<th>{c}</th>"));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for item in items.iter().filter_map(Value::as_object) {
        out.push_str("<tr>");
        let target = row_link(item);
        for (i, c) in columns.iter().enumerate() {
            let text = item.get(*c).map(value_text).unwrap_or_default();
            match (i, &target) {
                (0, Some(h)) => out.push_str(&format!("<td>{}</td>", link(h, &text))),
                _ => out.push_str(&format!("<td>{text}</td>")),
            }
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

pub fn definition_list(record: &Map<String, Value>) -> String {
    let mut out = String::from("<dl class=\"record\">\n");
    for (k, v) in record {
        out.push_str(&format!("<dt>{k}</dt><dd>{}</dd>\n", value_text(v)));
    }
    out.push_str("</dl>\n");
    out
}

/// Previous/next links for a `pagination` payload member, keeping
/// the plugin and search query.
pub fn pagination(plugin: &str, query: &str, pagination: &Value) -> String {
    let get = |k: &str| pagination.get(k).and_then(Value::as_i64).unwrap_or(0);
    let (page, pages, total) = (get("page"), get("pages"), get("total"));
    if pages <= 1 {
        return format!("<p class=\"pagination\">{total} total</p>\n")
    }
    let to = |p: i64| {
        let p = p.to_string();
        href(&[(Param::Plugin, plugin), (Param::Query, query), (Param::Page, &p)])
    };
    let mut out = String::from("<p class=\"pagination\">");
    if page > 1 {
        out.push_str(&link(&to(page - 1), "&laquo; previous"));
        out.push(' ');
    }
    out.push_str(&format!("page {page} of {pages} ({total} total)"));
    if page < pages {
        out.push(' ');
        out.push_str(&link(&to(page + 1), "next &raquo;"));
    }
    out.push_str("</p>\n");
    out
}

/// A POST form submitting to the given parameters.
pub fn form(target: &[(Param, &str)], fields: &str, submit: &str) -> String {
    format!("<form method=\"post\" action=\"{}\">\n{fields}<p><button type=\"submit\">{submit}</button></p>\n</form>\n",
            href(target))
}

pub fn input_field(name: &str, label: &str, value: &str, kind: &str) -> String {
    format!("<p><label for=\"f-{name}\">{label}</label><br>\
             <input id=\"f-{name}\" type=\"{kind}\" name=\"{name}\" value=\"{value}\"></p>\n")
}

pub fn textarea_field(name: &str, label: &str, value: &str) -> String {
    format!("<p><label for=\"f-{name}\">{label}</label><br>\
             <textarea id=\"f-{name}\" name=\"{name}\" rows=\"8\">{value}</textarea></p>\n")
}

pub fn checkbox_field(name: &str, label: &str, checked: bool) -> String {
    format!("<p><label><input type=\"checkbox\" name=\"{name}\" value=\"1\"{}> {label}</label></p>\n",
            if checked { " checked" } else { "" })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn t_table() {
        let items = vec![json!({"id": 1, "title": "A"}), json!({"id": 2, "title": "B"})];
        let t = table(&items, Some(&["title", "id"]), |r| {
            Some(format!("?i={}", r.get("id")?))
        });
        assert!(t.contains("<th>title</th><th>id</th>"));
        assert!(t.contains("<td><a href=\"?i=2\">B</a></td><td>2</td>"));
        let t = table(&items, None, |_| None);
        assert!(t.contains("<th>id</th><th>title</th>"));
        assert!(t.contains("<td>1</td><td>A</td>"));
    }

    #[test]
    fn t_pagination() {
        let p = pagination("News", "", &json!({"page": 1, "pages": 1, "total": 3}));
        assert!(! p.contains("href"));
        let p = pagination("News", "x", &json!({"page": 2, "pages": 3, "total": 12}));
        assert!(p.contains("?o=News&amp;q=x&amp;p=1"));
        assert!(p.contains("?o=News&amp;q=x&amp;p=3"));
        assert!(p.contains("page 2 of 3"));
    }

    #[test]
    fn t_value_text() {
        assert_eq!(value_text(&json!(null)), "");
        assert_eq!(value_text(&json!("a")), "a");
        assert_eq!(value_text(&json!(3)), "3");
    }
}
