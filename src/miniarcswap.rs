use std::sync::{Mutex, Arc, MutexGuard};

/// Hands out clones of an `Arc<T>` to any number of readers, and lets
/// a writer replace it at any time. Readers keep whatever version they
/// got for as long as they hold it; the lock is only held for the
/// pointer copy.
pub struct MiniArcSwap<T> {
    payload: Mutex<Arc<T>>
}

impl<T> MiniArcSwap<T> {
    pub fn new(payload: Arc<T>) -> MiniArcSwap<T> {
        MiniArcSwap { payload: Mutex::new(payload) }
    }

    // Nothing can panic while the lock is held, but don't let that
    // assumption turn into an outage.
    fn lock(&self) -> MutexGuard<'_, Arc<T>> {
        match self.payload.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner()
        }
    }

    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.lock())
    }

    /// From this instant on, `get` returns `val`.
    pub fn set(&self, val: Arc<T>) {
        *self.lock() = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_readers_keep_their_version() {
        let s = MiniArcSwap::new(Arc::new(1));
        let old = s.get();
        s.set(Arc::new(2));
        assert_eq!(*old, 1);
        assert_eq!(*s.get(), 2);
    }
}
