use std::ops::Deref;

use ::sqlite::Connection;

use crate::{try_sqlite, warn, warn_thread};
use super::StorageError;

/// A `BEGIN`..`COMMIT` bracket on a connection. Rolled back when
/// dropped without having been committed.
pub struct Transaction<'c> {
    conn: &'c Connection,
    is_committed: bool
}

impl<'c> Transaction<'c> {
    pub fn new(conn: &'c Connection) -> Result<Self, StorageError> {
        try_sqlite!(conn.execute("BEGIN TRANSACTION"));
        warn_thread!("begun transaction");
        Ok(Self {
            conn,
            is_committed: false
        })
    }

    pub fn commit(mut self) -> Result<(), StorageError> {
        try_sqlite!(self.conn.execute("COMMIT TRANSACTION"));
        self.is_committed = true;
        warn_thread!("committed transaction");
        Ok(())
    }
}

impl<'c> Deref for Transaction<'c> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl<'c> Drop for Transaction<'c> {
    fn drop(&mut self) {
        if ! self.is_committed {
            if let Err(e) = self.conn.execute("ROLLBACK TRANSACTION") {
                warn!("drop Transaction: ROLLBACK gave error: {e:?}");
            }
            warn_thread!("rolled back transaction");
        }
    }
}

/// Run `f` inside a transaction, committing iff it returns `Ok`.
pub fn transact<F, R, E>(conn: &Connection, f: F) -> Result<R, E>
where F: FnOnce(&Transaction) -> Result<R, E>,
      E: From<StorageError>
{
    let trans = Transaction::new(conn)?;
    let r = f(&trans);
    if r.is_ok() {
        trans.commit()?;
    }
    r
}
