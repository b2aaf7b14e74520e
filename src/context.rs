//! The per-request value bundle handed through gate, plugin and
//! renderers.

use std::{collections::BTreeMap, sync::Arc, time::{Duration, Instant}};

use strum::{EnumIter, IntoEnumIterator};

use crate::{access::{AccessGate, Visitor},
            escape::{escape_html, sanitize},
            params::{Input, Param},
            plugin::{Operation, Payload},
            registry::PluginIndex,
            session::Session,
            storage::Storage};

/// Named regions of a page, in the order the renderer chain fills
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum Slot {
    Main,
    Doc,
    Head,
    Log,
    Nav1,
    Nav2,
    Foot,
    Css,
    Js,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Main => "main",
            Slot::Doc => "doc",
            Slot::Head => "head",
            Slot::Log => "log",
            Slot::Nav1 => "nav1",
            Slot::Nav2 => "nav2",
            Slot::Foot => "foot",
            Slot::Css => "css",
            Slot::Js => "js",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Slot::iter().find(|slot| slot.name() == s)
    }
}

pub const MAIN_PLACEHOLDER: &str =
    "<p class=\"error\">Nothing could be rendered for this request.</p>";

#[derive(Debug, Clone)]
pub struct Slots(BTreeMap<Slot, String>);

impl Slots {
    /// `doc` carries the site name, `main` an error placeholder,
    /// everything else is empty.
    pub fn with_defaults(site_name: &str) -> Self {
        Slots(Slot::iter().map(|slot| {
            let v = match slot {
                Slot::Doc => escape_html(site_name),
                Slot::Main => MAIN_PLACEHOLDER.into(),
                _ => String::new(),
            };
            (slot, v)
        }).collect())
    }

    pub fn get(&self, slot: Slot) -> &str {
        self.0.get(&slot).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, slot: Slot, markup: String) {
        self.0.insert(slot, markup);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Request data as it came in, before any normalization.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    pub query: Vec<(String, String)>,
    /// Urlencoded POST body fields
    pub form: Vec<(String, String)>,
    pub is_post: bool,
}

impl RawInput {
    /// A GET request with the given query parameters.
    pub fn get(query: &[(&str, &str)]) -> Self {
        RawInput {
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            form: Vec::new(),
            is_post: false,
        }
    }

    /// A POST request; `form` holds both parameters and other fields.
    pub fn post(query: &[(&str, &str)], form: &[(&str, &str)]) -> Self {
        RawInput {
            form: form.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            is_post: true,
            ..Self::get(query)
        }
    }

    /// Posted values win over query values.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.form.iter().chain(self.query.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Posted fields that aren't recognized parameters.
#[derive(Debug, Clone, Default)]
pub struct Form {
    sanitized: BTreeMap<String, String>,
    raw: BTreeMap<String, String>,
}

impl Form {
    fn from_raw(raw: &RawInput) -> Self {
        let mut form = Form::default();
        for (k, v) in &raw.form {
            if Param::iter().any(|p| p.key() == k) {
                continue
            }
            form.sanitized.insert(k.clone(), sanitize(v));
            form.raw.insert(k.clone(), v.clone());
        }
        form
    }

    /// Trimmed and HTML-escaped; empty if absent.
    pub fn get(&self, key: &str) -> &str {
        self.sanitized.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn has(&self, key: &str) -> bool {
        self.sanitized.contains_key(key)
    }

    /// The value exactly as posted. Only for secrets that are hashed
    /// or verified and never shown.
    pub fn secret(&self, key: &str) -> &str {
        self.raw.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Site wide settings the plugins and themes see.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    /// Mean time before answering a login attempt; None disables the
    /// delay (development)
    pub login_delay: Option<Duration>,
    /// Consulted by the dispatcher and by navigation
    pub gate: AccessGate,
}

impl Default for Site {
    fn default() -> Self {
        Site { name: "plugsite".into(), login_delay: None, gate: AccessGate::default() }
    }
}

pub struct RequestContext<'r> {
    pub input: Input,
    pub form: Form,
    pub is_post: bool,
    pub payload: Payload,
    pub slots: Slots,
    /// The assembled page, once the page renderer has run
    pub buffer: Option<String>,
    pub visitor: Option<Visitor>,
    /// Taken from the session right before rendering
    pub flash: Option<String>,
    pub session: &'r mut Session,
    pub plugins: Arc<PluginIndex>,
    pub storage: &'r dyn Storage,
    pub site: &'r Site,
    /// Names of the installed themes, for the theme selector
    pub themes: Vec<&'static str>,
    /// Don't send the response before this time
    pub respond_not_before: Option<Instant>,
}

impl<'r> RequestContext<'r> {
    /// Resolve every parameter (request, else sticky session value,
    /// else default), sanitizing request values, and write sticky
    /// values back to the session.
    pub fn new(raw: &RawInput,
               session: &'r mut Session,
               plugins: Arc<PluginIndex>,
               storage: &'r dyn Storage,
               site: &'r Site) -> Self
    {
        let input = Input::from_fn(|p| {
            if let Some(v) = raw.param(p.key()).and_then(|v| p.parse(v)) {
                return v
            }
            if p.is_sticky() {
                if let Some(v) = session.get_opt(&p.session_key())
                    .and_then(|s| p.from_session(s))
                {
                    return v
                }
            }
            p.default_value()
        });
        for (p, v) in input.iter() {
            if p.is_sticky() {
                session.set_sticky(&p.session_key(), &v.to_session_string());
            }
        }
        let visitor = Visitor::from_session(session, storage);
        RequestContext {
            input,
            form: Form::from_raw(raw),
            is_post: raw.is_post,
            payload: Payload::new(),
            slots: Slots::with_defaults(&site.name),
            buffer: None,
            visitor,
            flash: None,
            session,
            plugins,
            storage,
            site,
            themes: Vec::new(),
            respond_not_before: None,
        }
    }

    pub fn plugin_name(&self) -> &str {
        self.input.str(Param::Plugin)
    }

    pub fn operation_name(&self) -> &str {
        self.input.str(Param::Operation)
    }

    /// None for an unknown operation name.
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_name(self.operation_name())
    }

    pub fn id(&self) -> i64 {
        self.input.int(Param::Id)
    }

    pub fn page(&self) -> i64 {
        self.input.int(Param::Page)
    }

    pub fn query(&self) -> &str {
        self.input.str(Param::Query)
    }

    pub fn format(&self) -> &str {
        self.input.str(Param::Format)
    }

    pub fn theme_name(&self) -> &str {
        self.input.str(Param::Theme)
    }

    pub fn is_admin(&self) -> bool {
        self.visitor.as_ref().map(|v| v.admin).unwrap_or(false)
    }

    /// Set a message to show on the next page.
    pub fn flash(&mut self, message: &str) {
        self.session.set_flash(FLASH_KEY, message);
    }
}

/// The session flash key used for status messages.
pub const FLASH_KEY: &str = "msg";
