//! The storage collaborator: named collections of flat records,
//! addressed by a filter expression with `?` placeholders and bound
//! parameters. Plugins talk to this; the dispatch engine never does.

pub mod db;
pub mod transaction;
pub mod sqlite_store;

use serde_json::{Map, Value};

use crate::def_boxed_thiserror;

/// One row of a collection, column name to value.
pub type Record = Map<String, Value>;

def_boxed_thiserror!(StorageError, pub enum StorageErrorKind {
    #[error("SQLite error: {error} at {file:?} line {line}")]
    Sqlite { error: ::sqlite::Error, file: &'static str, line: u32 },
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("reading {collection}: more than one result for filter {filter:?}")]
    MoreThanOne { collection: String, filter: String },
    #[error("nothing to write to {0}")]
    EmptyRecord(String),
});

/// Turn a `Result<_, sqlite::Error>` into a `StorageError` that
/// records where it happened.
#[macro_export]
macro_rules! try_sqlite {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(error) => {
                let e: $crate::storage::StorageError =
                    $crate::storage::StorageErrorKind::Sqlite {
                        error, file: file!(), line: line!()
                    }.into();
                return Err(e.into())
            }
        }
    }
}

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl From<i64> for Bound {
    fn from(n: i64) -> Self { Bound::Int(n) }
}
impl From<&str> for Bound {
    fn from(s: &str) -> Self { Bound::Text(s.into()) }
}
impl From<String> for Bound {
    fn from(s: String) -> Self { Bound::Text(s) }
}

impl From<&Value> for Bound {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => Bound::Null,
            Value::Bool(b) => Bound::Int(*b as i64),
            Value::Number(n) =>
                if let Some(i) = n.as_i64() {
                    Bound::Int(i)
                } else {
                    n.as_f64().map(Bound::Float).unwrap_or(Bound::Null)
                },
            Value::String(s) => Bound::Text(s.clone()),
            // Nested structures are stored as their JSON text
            other => Bound::Text(other.to_string()),
        }
    }
}

/// Ordering and window for `list`.
#[derive(Debug, Clone, Copy)]
pub struct Window<'t> {
    /// Comma separated column names, each optionally followed by
    /// `asc` or `desc`.
    pub order: &'t str,
    pub limit: i64,
    pub offset: i64,
}

pub trait Storage: Send + Sync {
    /// Insert a record, returning its new id.
    fn create(&self, collection: &str, record: &Record) -> Result<i64, StorageError>;

    /// The single record matching `filter`, if any. More than one
    /// match is an error.
    fn read(&self, collection: &str, filter: &str, params: &[Bound])
            -> Result<Option<Record>, StorageError>;

    /// Overwrite the fields given in `record` on all matching rows;
    /// returns the number of rows changed.
    fn update(&self, collection: &str, record: &Record, filter: &str, params: &[Bound])
              -> Result<usize, StorageError>;

    /// Returns the number of rows deleted.
    fn delete(&self, collection: &str, filter: &str, params: &[Bound])
              -> Result<usize, StorageError>;

    fn list(&self, collection: &str, filter: &str, params: &[Bound], window: Window)
            -> Result<Vec<Record>, StorageError>;

    fn count(&self, collection: &str, filter: &str, params: &[Bound])
             -> Result<i64, StorageError>;
}

/// Collection and column names are spliced into SQL, so they are
/// restricted to ASCII identifiers.
pub fn check_identifier(s: &str) -> Result<&str, StorageError> {
    let mut chars = s.chars();
    let ok = match chars.next() {
        Some(c) => (c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        None => false
    };
    if ok {
        Ok(s)
    } else {
        Err(StorageErrorKind::InvalidIdentifier(s.into()))?
    }
}

/// Validate an `order by` clause as understood by `Window`.
pub fn check_order(order: &str) -> Result<&str, StorageError> {
    for part in order.split(',') {
        let mut words = part.split_whitespace();
        check_identifier(words.next().unwrap_or(""))?;
        match words.next().map(|w| w.to_ascii_lowercase()).as_deref() {
            None | Some("asc") | Some("desc") => (),
            Some(_) => Err(StorageErrorKind::InvalidIdentifier(part.into()))?
        }
        if words.next().is_some() {
            Err(StorageErrorKind::InvalidIdentifier(part.into()))?
        }
    }
    Ok(order)
}
