//! The recognized request parameters, their short keys, defaults and
//! stickiness.

use std::collections::BTreeMap;

use kstring::KString;
use strum::{EnumIter, IntoEnumIterator};

use crate::escape::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum Param {
    /// Selected plugin
    Plugin,
    /// Selected operation (create, read, update, delete, list)
    Operation,
    /// Item id
    Id,
    /// Page number, for paginated lists
    Page,
    /// Search text
    Query,
    /// Output format flag: empty, `json`, `text`, or a slot name
    Format,
    /// Selected theme
    Theme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
}

impl Param {
    /// The query/form key. Keep these stable, generated links and
    /// bookmarks depend on them.
    pub fn key(self) -> &'static str {
        match self {
            Param::Plugin => "o",
            Param::Operation => "m",
            Param::Id => "i",
            Param::Page => "p",
            Param::Query => "q",
            Param::Format => "x",
            Param::Theme => "t",
        }
    }

    pub fn kind(self) -> ParamKind {
        match self {
            Param::Id | Param::Page => ParamKind::Int,
            _ => ParamKind::Str,
        }
    }

    /// Sticky parameters persist in the session until overwritten.
    pub fn is_sticky(self) -> bool {
        matches!(self, Param::Plugin | Param::Theme)
    }

    /// The session key a sticky value is stored under.
    pub fn session_key(self) -> String {
        format!("param:{}", self.key())
    }

    pub fn default_value(self) -> InputValue {
        match self {
            Param::Plugin => InputValue::Str(KString::from_static("Home")),
            Param::Operation => InputValue::Str(KString::from_static("list")),
            Param::Id => InputValue::Int(0),
            Param::Page => InputValue::Int(1),
            Param::Query => InputValue::Str(KString::from_static("")),
            Param::Format => InputValue::Str(KString::from_static("")),
            Param::Theme => InputValue::Str(KString::from_static("Simple")),
        }
    }

    /// Turn an external string into a value of this parameter's kind,
    /// or None if it should be treated as absent.
    pub fn parse(self, raw: &str) -> Option<InputValue> {
        let s = raw.trim();
        if s.is_empty() {
            return None
        }
        match self.kind() {
            ParamKind::Str => Some(InputValue::Str(KString::from_string(sanitize(s)))),
            ParamKind::Int => {
                let n: i64 = s.parse().ok()?;
                let n = if self == Param::Page { n.max(1) } else { n.max(0) };
                Some(InputValue::Int(n))
            }
        }
    }

    /// Like `parse`, for a value that was sanitized before it was
    /// stored in the session, so it isn't escaped a second time.
    pub fn from_session(self, stored: &str) -> Option<InputValue> {
        if stored.is_empty() {
            return None
        }
        match self.kind() {
            ParamKind::Str => Some(InputValue::Str(KString::from_ref(stored))),
            ParamKind::Int => self.parse(stored),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    Str(KString),
    Int(i64),
}

impl InputValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            InputValue::Str(s) => Some(s.as_str()),
            InputValue::Int(_) => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            InputValue::Str(_) => None,
            InputValue::Int(n) => Some(*n),
        }
    }
    /// How a value is persisted in the session.
    pub fn to_session_string(&self) -> String {
        match self {
            InputValue::Str(s) => s.to_string(),
            InputValue::Int(n) => n.to_string(),
        }
    }
}

/// The normalized values of all recognized parameters. Always
/// complete: every `Param` has a value.
#[derive(Debug, Clone)]
pub struct Input(BTreeMap<Param, InputValue>);

impl Input {
    pub fn from_fn(mut f: impl FnMut(Param) -> InputValue) -> Self {
        Input(Param::iter().map(|p| (p, f(p))).collect())
    }

    pub fn get(&self, param: Param) -> &InputValue {
        // `from_fn` fills every member
        &self.0[&param]
    }

    pub fn str(&self, param: Param) -> &str {
        self.get(param).as_str().unwrap_or("")
    }

    pub fn int(&self, param: Param) -> i64 {
        self.get(param).as_int().unwrap_or(0)
    }

    pub fn set(&mut self, param: Param, value: InputValue) {
        self.0.insert(param, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, &InputValue)> {
        self.0.iter().map(|(p, v)| (*p, v))
    }
}
