//! `Storage` on a single sqlite database file.

use std::path::{Path, PathBuf};

use ::sqlite::{Connection, State, Statement, Value as SqlValue};
use serde_json::{Number, Value};

use crate::try_sqlite;
use super::{Bound, Record, Storage, StorageError, StorageErrorKind, Window,
            check_identifier, check_order,
            db::with_connection,
            transaction::transact};

const SCHEMA: &str = "
create table if not exists users (
    id integer primary key,
    login text not null unique,
    fname text not null default '',
    lname text not null default '',
    email text not null default '',
    hashed_pass text not null,
    admin integer not null default 0,
    created text not null,
    updated text not null
);
create table if not exists news (
    id integer primary key,
    title text not null,
    content text not null,
    author integer not null,
    created text not null,
    updated text not null
);
create index if not exists news_created on news(created);
";

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    /// Open (creating if necessary) the database at `path` and make
    /// sure all tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        with_connection(&path, |c| -> Result<(), StorageError> {
            try_sqlite!(c.execute(SCHEMA));
            Ok(())
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn bind_all(sth: &mut Statement, params: &[Bound], first: usize) -> Result<(), StorageError> {
    for (i, p) in params.iter().enumerate() {
        let idx = first + i;
        match p {
            Bound::Int(n) => try_sqlite!(sth.bind((idx, *n))),
            Bound::Float(x) => try_sqlite!(sth.bind((idx, *x))),
            Bound::Text(s) => try_sqlite!(sth.bind((idx, s.as_str()))),
            Bound::Null => try_sqlite!(sth.bind((idx, Option::<&str>::None))),
        }
    }
    Ok(())
}

fn json_of(v: SqlValue) -> Value {
    match v {
        SqlValue::Integer(n) => Value::Number(n.into()),
        SqlValue::Float(x) => Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::String(s) => Value::String(s),
        // No shipped collection has blob columns
        SqlValue::Binary(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
        SqlValue::Null => Value::Null,
    }
}

fn read_rows(sth: &mut Statement, max: Option<usize>) -> Result<Vec<Record>, StorageError> {
    let names: Vec<String> = sth.column_names().to_vec();
    let mut rows = Vec::new();
    while let State::Row = try_sqlite!(sth.next()) {
        let mut record = Record::new();
        for (i, name) in names.iter().enumerate() {
            let v: SqlValue = try_sqlite!(sth.read::<SqlValue, _>(i));
            record.insert(name.clone(), json_of(v));
        }
        rows.push(record);
        if let Some(max) = max {
            if rows.len() > max {
                break
            }
        }
    }
    Ok(rows)
}

fn scalar(c: &Connection, sql: &str, params: &[Bound]) -> Result<i64, StorageError> {
    let mut sth = try_sqlite!(c.prepare(sql));
    bind_all(&mut sth, params, 1)?;
    match try_sqlite!(sth.next()) {
        State::Row => Ok(try_sqlite!(sth.read::<i64, _>(0))),
        State::Done => Ok(0),
    }
}

fn run(c: &Connection, sql: &str, params: &[Bound]) -> Result<(), StorageError> {
    let mut sth = try_sqlite!(c.prepare(sql));
    bind_all(&mut sth, params, 1)?;
    while let State::Row = try_sqlite!(sth.next()) {}
    Ok(())
}

fn where_clause(filter: &str) -> String {
    if filter.trim().is_empty() {
        String::new()
    } else {
        format!(" where {filter}")
    }
}

/// Column names and bound values of `record`, in iteration order.
fn columns(collection: &str, record: &Record) -> Result<(Vec<String>, Vec<Bound>), StorageError> {
    if record.is_empty() {
        Err(StorageErrorKind::EmptyRecord(collection.into()))?
    }
    let mut names = Vec::with_capacity(record.len());
    let mut values = Vec::with_capacity(record.len());
    for (k, v) in record {
        names.push(check_identifier(k)?.to_string());
        values.push(Bound::from(v));
    }
    Ok((names, values))
}

impl Storage for SqliteStorage {
    fn create(&self, collection: &str, record: &Record) -> Result<i64, StorageError> {
        let collection = check_identifier(collection)?;
        let (names, values) = columns(collection, record)?;
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!("insert into {collection} ({}) values ({placeholders})",
                          names.join(", "));
        with_connection(&self.path, |c| {
            transact(c, |t| -> Result<i64, StorageError> {
                run(t, &sql, &values)?;
                scalar(t, "select last_insert_rowid()", &[])
            })
        })
    }

    fn read(&self, collection: &str, filter: &str, params: &[Bound])
            -> Result<Option<Record>, StorageError>
    {
        let collection = check_identifier(collection)?;
        let sql = format!("select * from {collection}{}", where_clause(filter));
        with_connection(&self.path, |c| -> Result<Option<Record>, StorageError> {
            let mut sth = try_sqlite!(c.prepare(&sql));
            bind_all(&mut sth, params, 1)?;
            let mut rows = read_rows(&mut sth, Some(1))?;
            match rows.len() {
                0 => Ok(None),
                1 => Ok(rows.pop()),
                _ => Err(StorageErrorKind::MoreThanOne {
                    collection: collection.into(),
                    filter: filter.into()
                })?
            }
        })
    }

    fn update(&self, collection: &str, record: &Record, filter: &str, params: &[Bound])
              -> Result<usize, StorageError>
    {
        let collection = check_identifier(collection)?;
        let (names, mut values) = columns(collection, record)?;
        let assignments: Vec<String> = names.iter().map(|n| format!("{n} = ?")).collect();
        let sql = format!("update {collection} set {}{}",
                          assignments.join(", "), where_clause(filter));
        values.extend(params.iter().cloned());
        with_connection(&self.path, |c| {
            transact(c, |t| -> Result<usize, StorageError> {
                run(t, &sql, &values)?;
                Ok(scalar(t, "select changes()", &[])? as usize)
            })
        })
    }

    fn delete(&self, collection: &str, filter: &str, params: &[Bound])
              -> Result<usize, StorageError>
    {
        let collection = check_identifier(collection)?;
        let sql = format!("delete from {collection}{}", where_clause(filter));
        with_connection(&self.path, |c| {
            transact(c, |t| -> Result<usize, StorageError> {
                run(t, &sql, params)?;
                Ok(scalar(t, "select changes()", &[])? as usize)
            })
        })
    }

    fn list(&self, collection: &str, filter: &str, params: &[Bound], window: Window)
            -> Result<Vec<Record>, StorageError>
    {
        let collection = check_identifier(collection)?;
        let order = check_order(window.order)?;
        let sql = format!("select * from {collection}{} order by {order} limit ? offset ?",
                          where_clause(filter));
        let mut values = params.to_vec();
        values.push(Bound::Int(window.limit));
        values.push(Bound::Int(window.offset));
        with_connection(&self.path, |c| -> Result<Vec<Record>, StorageError> {
            let mut sth = try_sqlite!(c.prepare(&sql));
            bind_all(&mut sth, &values, 1)?;
            read_rows(&mut sth, None)
        })
    }

    fn count(&self, collection: &str, filter: &str, params: &[Bound])
             -> Result<i64, StorageError>
    {
        let collection = check_identifier(collection)?;
        let sql = format!("select count(*) from {collection}{}", where_clause(filter));
        with_connection(&self.path, |c| scalar(c, &sql, params))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object")
        }
    }

    fn news(title: &str, author: i64, created: &str) -> Record {
        record(json!({
            "title": title,
            "content": format!("about {title}"),
            "author": author,
            "created": created,
            "updated": created,
        }))
    }

    #[test]
    fn t_crudl() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = SqliteStorage::open(dir.path().join("t.sqlite"))?;

        let a = st.create("news", &news("first", 1, "2024-01-01"))?;
        let b = st.create("news", &news("second", 2, "2024-01-02"))?;
        assert!(b > a);

        let r = st.read("news", "id = ?", &[a.into()])?.expect("present");
        assert_eq!(r["title"], json!("first"));
        assert_eq!(r["author"], json!(1));
        assert_eq!(st.read("news", "id = ?", &[Bound::Int(999)])?, None);
        assert!(st.read("news", "", &[]).is_err());

        let n = st.update("news", &record(json!({"title": "changed"})),
                          "id = ?", &[a.into()])?;
        assert_eq!(n, 1);
        let r = st.read("news", "id = ?", &[a.into()])?.expect("present");
        assert_eq!(r["title"], json!("changed"));

        assert_eq!(st.count("news", "", &[])?, 2);
        assert_eq!(st.count("news", "title like ?", &["%cond%".into()])?, 1);

        let items = st.list("news", "", &[],
                            Window { order: "created desc", limit: 1, offset: 0 })?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], json!("second"));
        let items = st.list("news", "", &[],
                            Window { order: "created desc", limit: 5, offset: 1 })?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], json!("changed"));

        assert_eq!(st.delete("news", "id = ?", &[a.into()])?, 1);
        assert_eq!(st.delete("news", "id = ?", &[a.into()])?, 0);
        assert_eq!(st.count("news", "", &[])?, 1);
        Ok(())
    }

    #[test]
    fn t_rejects_bad_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = SqliteStorage::open(dir.path().join("t.sqlite"))?;
        assert!(st.create("news;", &news("x", 1, "2024")).is_err());
        assert!(st.create("news", &record(json!({"ti tle": "x"}))).is_err());
        assert!(st.create("news", &Record::new()).is_err());
        assert!(st.list("news", "", &[],
                        Window { order: "1; drop", limit: 1, offset: 0 }).is_err());
        Ok(())
    }

    #[test]
    fn t_failed_write_rolls_back() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = SqliteStorage::open(dir.path().join("t.sqlite"))?;
        // title is not null
        assert!(st.create("news", &record(json!({
            "title": null, "content": "", "author": 1,
            "created": "", "updated": ""
        }))).is_err());
        assert_eq!(st.count("news", "", &[])?, 0);
        // and the connection is usable afterwards
        st.create("news", &news("ok", 1, "2024"))?;
        assert_eq!(st.count("news", "", &[])?, 1);
        Ok(())
    }
}
