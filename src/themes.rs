//! The installed themes, and payload presentation they share.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{context::RequestContext,
            escape::escape_html,
            markup,
            params::Param,
            plugin::message,
            render::Renderer,
            url_encoding::href};

pub mod plain;
pub mod simple;

/// Used when the `t` parameter names no installed theme.
pub const DEFAULT_THEME: &str = "Simple";

pub fn builtin() -> Vec<(&'static str, Arc<dyn Renderer>)> {
    vec![
        ("Simple", Arc::new(simple::Simple)),
        ("Plain", Arc::new(plain::Plain)),
    ]
}

/// Alert class for each message key.
fn alert_kind(key: &str) -> &'static str {
    match key {
        "error" => "danger",
        "not_found" => "warning",
        _ => "info",
    }
}

/// Link target for the record of an `items` list, if it has an id.
pub fn read_link(plugin: &str) -> impl Fn(&Map<String, Value>) -> Option<String> + '_ {
    move |item| {
        let id = item.get("id")?.as_i64()?.to_string();
        Some(href(&[(Param::Plugin, plugin), (Param::Operation, "read"), (Param::Id, &id)]))
    }
}

/// The flash message taken for this response.
pub fn flash_markup(ctx: &RequestContext) -> Option<String> {
    ctx.flash.as_deref().map(|m| markup::alert("info", &escape_html(m)))
}

/// Title of the current plugin: its label if registered.
pub fn plugin_label(ctx: &RequestContext) -> String {
    match ctx.plugins.get(ctx.plugin_name()) {
        Some(d) => escape_html(&d.label),
        None => ctx.plugin_name().to_string(),
    }
}

/// The generic rendering of a payload, per its conventions. None for
/// payloads of unknown shape.
pub fn payload_markup(ctx: &RequestContext, with_pagination: bool) -> Option<String> {
    let p = &ctx.payload;
    if let Some((key, msg)) = message(p) {
        return Some(markup::alert(alert_kind(key), &escape_html(msg)))
    }
    if let (Some(head), Some(main)) = (p.get("head").and_then(Value::as_str),
                                       p.get("main").and_then(Value::as_str)) {
        return Some(markup::card(head, main))
    }
    if let Some(items) = p.get("items").and_then(Value::as_array) {
        let head = p.get("head").and_then(Value::as_str).map(String::from)
            .unwrap_or_else(|| plugin_label(ctx));
        let mut body = if items.is_empty() {
            "<p>Nothing here yet.</p>\n".to_string()
        } else {
            markup::table(items, None, read_link(ctx.plugin_name()))
        };
        if with_pagination {
            if let Some(pg) = p.get("pagination") {
                body.push_str(&markup::pagination(ctx.plugin_name(), ctx.query(), pg));
            }
        }
        return Some(markup::card(&head, &body))
    }
    if let Some(record) = p.get("record").and_then(Value::as_object) {
        return Some(markup::card(&plugin_label(ctx), &markup::definition_list(record)))
    }
    None
}
