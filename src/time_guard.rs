use std::{fmt::Debug, time::Instant};

/// Reports the time between its creation and drop to stderr.
pub struct TimeGuard<S: Debug> {
    pub name: S,
    pub start: Instant,
}

impl<S: Debug> Drop for TimeGuard<S> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        eprintln!("{:?}: {:?}", self.name, elapsed);
    }
}

/// Time the rest of the enclosing block if `$enabled`.
#[macro_export]
macro_rules! time_guard {
    ($enabled:expr, $namestr:expr) => {
        let _guard = if $enabled {
            Some($crate::time_guard::TimeGuard {
                name: $namestr,
                start: std::time::Instant::now()
            })
        } else {
            None
        };
    }
}
