use std::{cell::RefCell, collections::HashMap, path::{Path, PathBuf}, rc::Rc};

use ::sqlite::Connection;

use crate::{try_sqlite, warn_thread};
use super::StorageError;

// One connection per database file and worker thread. The server runs
// requests on a fixed-size pool, which bounds the number of open
// connections.
thread_local!{
    static CONNECTIONS: RefCell<HashMap<PathBuf, Rc<Connection>>> =
        RefCell::new(HashMap::new());
}

fn open(path: &Path) -> Result<Connection, StorageError> {
    let c = try_sqlite!(::sqlite::open(path));
    try_sqlite!(c.execute("PRAGMA foreign_keys = ON"));
    // Wait for concurrent writers from other threads instead of
    // failing right away with SQLITE_BUSY
    try_sqlite!(c.execute("PRAGMA busy_timeout = 2000"));
    warn_thread!("opened database {:?}", path);
    Ok(c)
}

/// Run `f` with this thread's connection to the database at `path`,
/// opening it on first use.
pub fn with_connection<F, R, E>(path: &Path, f: F) -> Result<R, E>
where F: FnOnce(&Connection) -> Result<R, E>,
      E: From<StorageError>
{
    let conn = CONNECTIONS.with(|m| -> Result<Rc<Connection>, StorageError> {
        let mut m = m.borrow_mut();
        if let Some(c) = m.get(path) {
            return Ok(c.clone())
        }
        let c = Rc::new(open(path)?);
        m.insert(path.to_path_buf(), c.clone());
        Ok(c)
    })?;
    // The map is not borrowed any more here, so `f` may open other
    // databases.
    f(&conn)
}

/// Drop this thread's connection to `path`, if any.
pub fn forget_connection(path: &Path) {
    CONNECTIONS.with(|m| {
        if m.borrow_mut().remove(path).is_some() {
            warn_thread!("closed database {:?}", path);
        }
    })
}
