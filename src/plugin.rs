//! The five-operation contract every plugin implements.

use serde_json::{json, Map, Value};
use strum::{EnumIter, IntoEnumIterator};

use crate::context::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Operation::iter().find(|op| op.as_str() == s)
    }
}

/// What a plugin operation produced, handed to the renderers and
/// serialized for JSON output.
pub type Payload = Map<String, Value>;

fn object(v: Value) -> Payload {
    match v {
        Value::Object(m) => m,
        _ => Payload::new()
    }
}

/// A card with a heading and preformatted markup.
pub fn card(head: &str, main: &str) -> Payload {
    object(json!({ "head": head, "main": main }))
}

/// A business error, shown inline.
pub fn error(message: &str) -> Payload {
    object(json!({ "error": message }))
}

pub fn not_found(plugin: &str) -> Payload {
    object(json!({ "not_found": format!("No plugin {plugin:?} here.") }))
}

pub fn not_implemented(plugin: &str, op: &str) -> Payload {
    object(json!({ "not_implemented": format!("{plugin} does not implement {op:?}.") }))
}

/// The keys under which a payload carries a message instead of data.
pub const MESSAGE_KEYS: [&str; 3] = ["error", "not_found", "not_implemented"];

/// The first message of a payload, with its key.
pub fn message(payload: &Payload) -> Option<(&'static str, &str)> {
    MESSAGE_KEYS.iter().find_map(
        |k| payload.get(*k).and_then(Value::as_str).map(|m| (*k, m)))
}

/// Abandon the rest of the pipeline and send the visitor elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Redirect { location: location.into() }
    }
}

pub type PluginResult = Result<Payload, Redirect>;

/// A feature module. Every operation is optional; the default
/// answers with a "not implemented" payload. Access has been checked
/// by the gate before any of these is called, only per-record
/// permissions are left to the plugin.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, _ctx: &mut RequestContext) -> PluginResult {
        Ok(not_implemented(self.name(), "create"))
    }
    fn read(&self, _ctx: &mut RequestContext) -> PluginResult {
        Ok(not_implemented(self.name(), "read"))
    }
    fn update(&self, _ctx: &mut RequestContext) -> PluginResult {
        Ok(not_implemented(self.name(), "update"))
    }
    fn delete(&self, _ctx: &mut RequestContext) -> PluginResult {
        Ok(not_implemented(self.name(), "delete"))
    }
    fn list(&self, _ctx: &mut RequestContext) -> PluginResult {
        Ok(not_implemented(self.name(), "list"))
    }
}

pub fn invoke(plugin: &dyn Plugin, op: Operation, ctx: &mut RequestContext) -> PluginResult {
    match op {
        Operation::Create => plugin.create(ctx),
        Operation::Read => plugin.read(ctx),
        Operation::Update => plugin.update(ctx),
        Operation::Delete => plugin.delete(ctx),
        Operation::List => plugin.list(ctx),
    }
}
