//! Diagnostics to stderr. One line per message, with the source
//! location appended, so that a supervisor like daemontools can
//! collect it.

use std::sync::atomic::AtomicBool;

/// Switches `warn_thread!` on and off, e.g. chatty per-connection
/// messages from the storage layer.
pub static WARN_THREAD: AtomicBool = AtomicBool::new(false);

#[macro_export]
macro_rules! warn {
    ($formatstr:expr $(,$arg:expr)*) => { {
        use std::io::Write;
        let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
        let _ = write!(&mut outp, "W: ");
        let _ = write!(&mut outp, $formatstr $(,$arg)*);
        let _ = writeln!(&mut outp, " at {:?} line {}", file!(), line!());
        let _ = outp.flush();
    } }
}

/// Like `warn!` but prefixed with the thread id, and only printed
/// when `WARN_THREAD` is set.
#[macro_export]
macro_rules! warn_thread {
    { $fmt:expr $(,$arg:expr)* } => {
        if $crate::warn::WARN_THREAD.load(std::sync::atomic::Ordering::Relaxed) {
            use std::io::Write;
            let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
            let _ = write!(&mut outp, "{:?} W: ", std::thread::current().id());
            let _ = write!(&mut outp, $fmt $(,$arg)*);
            let _ = writeln!(&mut outp, " at {:?} line {}", file!(), line!());
            let _ = outp.flush();
        }
    }
}
