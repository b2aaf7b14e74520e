//! Picking the representation of the response from the `x` flag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{context::{RequestContext, Slot},
            escape::strip_tags,
            plugin::Payload,
            render::fallback_page};

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The full document
    Page,
    /// The main slot without markup
    Text,
    /// Slots and payload as JSON
    Json,
    /// The markup of one slot, for replacing part of a page
    Fragment(Slot),
}

impl Format {
    /// Unknown flags get JSON.
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "" => Format::Page,
            "text" => Format::Text,
            "json" => Format::Json,
            other => Slot::from_name(other).map(Format::Fragment).unwrap_or(Format::Json),
        }
    }

    /// Whether `slot` ends up in what the visitor sees. JSON is data
    /// for a script, not a display.
    pub fn shows(self, slot: Slot) -> bool {
        match self {
            Format::Page => true,
            Format::Text => slot == Slot::Main,
            Format::Json => false,
            Format::Fragment(s) => s == slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Output {
    pub fn html(status: u16, body: String) -> Self {
        Output { status, content_type: CONTENT_TYPE_HTML, body }
    }
}

/// The JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonOutput {
    pub slots: BTreeMap<String, String>,
    pub payload: Payload,
}

impl JsonOutput {
    pub fn from_context(ctx: &RequestContext) -> Self {
        JsonOutput {
            slots: ctx.slots.iter().map(|(slot, v)| (slot.name().to_string(), v.to_string()))
                .collect(),
            payload: ctx.payload.clone(),
        }
    }
}

fn json_output(ctx: &RequestContext) -> Output {
    let body = match serde_json::to_string(&JsonOutput::from_context(ctx)) {
        Ok(s) => s,
        // Can't happen with string keys, but still answer in JSON
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    };
    Output { status: 200, content_type: CONTENT_TYPE_JSON, body }
}

pub fn negotiate(ctx: &RequestContext) -> Output {
    match Format::from_flag(ctx.format()) {
        Format::Page => Output::html(
            200,
            ctx.buffer.clone().unwrap_or_else(|| fallback_page(ctx))),
        Format::Text => Output {
            status: 200,
            content_type: CONTENT_TYPE_TEXT,
            // strip_tags decodes the character references
            body: strip_tags(ctx.slots.get(Slot::Main)),
        },
        Format::Json => json_output(ctx),
        Format::Fragment(slot) => Output::html(200, ctx.slots.get(slot).to_string()),
    }
}
