use std::{panic, sync::mpsc::channel};

use anyhow::Result;
use scoped_thread_pool::Pool;

/// Run `f` on one of the pool's threads and wait for its result. A
/// panic in `f` is resumed in the calling thread.
pub fn in_threadpool<F, R>(threadpool: &Pool, f: F) -> Result<R>
where F: FnOnce() -> R + Send,
      R: Send
{
    let (tx, rx) = channel();
    threadpool.scoped(move |scope| {
        scope.execute(move || {
            let result = panic::catch_unwind(panic::AssertUnwindSafe(f));
            // the receiver only goes away if the caller panicked
            let _ = tx.send(result);
        });
        match rx.recv()? {
            Ok(r) => Ok(r),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}
