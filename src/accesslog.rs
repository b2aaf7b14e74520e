//! HTTP access logging in the Combined Log Format (Apache style, see
//! <https://httpd.apache.org/docs/2.4/logs.html>), with the handling
//! duration appended.

use std::{io::{stderr, BufWriter, Write},
          panic,
          path::Path,
          sync::{Arc, Mutex},
          time::{Duration, Instant}};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rouille::{Request, Response};

use crate::{easy_fs::open_log_output, warn};

/// What the log needs to know about a request.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub client_ip: String,
    pub request_line: String,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl LogEntry {
    pub fn from_request(request: &Request) -> Self {
        LogEntry {
            client_ip: request.remote_addr().ip().to_string(),
            request_line: format!("{} {} HTTP/1.1", request.method(), request.raw_url()),
            referer: request.header("Referer").map(String::from),
            user_agent: request.header("User-Agent").map(String::from),
        }
    }
}

/// A response with what is logged about it.
pub struct Served {
    pub response: Response,
    pub body_len: usize,
    /// Login of the visitor, if any
    pub user: Option<String>,
    pub sleep_until: Option<Instant>,
}

impl Served {
    pub fn error_page(status: u16, title: &str) -> Self {
        let body = format!("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
                            <title>{title}</title></head>\n\
                            <body><h1>{title}</h1></body></html>\n");
        Served {
            body_len: body.len(),
            response: Response::html(body).with_status_code(status),
            user: None,
            sleep_until: None,
        }
    }
}

// "06/Dec/2023:02:02:47 +0000"
pub fn write_time(outp: &mut impl Write, time: DateTime<Utc>) -> Result<()> {
    write!(outp, "{}", time.format("%d/%b/%Y:%H:%M:%S +0000"))?;
    Ok(())
}

pub fn write_combined(outp: &mut impl Write,
                      now: DateTime<Utc>,
                      entry: &LogEntry,
                      served: &Served,
                      duration: Duration) -> Result<()> {
    write!(outp, "{} - {} [", entry.client_ip, served.user.as_deref().unwrap_or("-"))?;
    write_time(outp, now)?;
    writeln!(outp, "] {:?} {} {} {:?} {:?} {duration:?}",
             entry.request_line,
             served.response.status_code,
             served.body_len,
             entry.referer.as_deref().unwrap_or("-"),
             entry.user_agent.as_deref().unwrap_or("-"))?;
    outp.flush()?;
    Ok(())
}

fn write_error(outp: &mut impl Write,
               now: DateTime<Utc>,
               entry: &LogEntry,
               duration: Duration,
               err: &anyhow::Error) -> Result<()> {
    write!(outp, "[")?;
    write_time(outp, now)?;
    writeln!(outp, "] [error] [client {}] {:?} {duration:?}: {err:#}",
             entry.client_ip, entry.request_line)?;
    outp.flush()?;
    Ok(())
}

fn write_panic_stderr(entry: &LogEntry, duration: Duration) {
    let mut outp = BufWriter::new(stderr().lock());
    // stderr goes to a supervisor that adds timestamps
    let _ = writeln!(&mut outp, "[panic] handling {:?} after {duration:?}", entry.request_line);
    let _ = outp.flush();
}

/// The log files: every response goes to the access log, requests
/// that could not be handled also to the error log.
pub struct Logs {
    pub access_log: Box<dyn Write + Send>,
    pub error_log: Box<dyn Write + Send>,
}

impl Logs {
    pub fn open_in_dir(logdir: &Path) -> Result<Arc<Mutex<Logs>>> {
        let open = |name: &str| -> Result<Box<dyn Write + Send>> {
            let path = logdir.join(name);
            Ok(Box::new(open_log_output(&path).with_context(
                || format!("opening log file {path:?}"))?))
        };
        Ok(Arc::new(Mutex::new(Logs {
            access_log: open("http_access.log")?,
            error_log: open("http_error.log")?,
        })))
    }
}

/// Run `handler` and log its outcome. An error from the handler
/// means the request could not be read; it is answered with a 400
/// page. Panics are reported to stderr and resumed.
pub fn log_combined<F>(logs: &Mutex<Logs>, entry: &LogEntry, handler: F) -> Served
where F: FnOnce() -> Result<Served>
{
    let start = Instant::now();
    let result = panic::catch_unwind(panic::AssertUnwindSafe(handler));
    let elapsed = start.elapsed();
    let mut logs = match logs.lock() {
        Ok(l) => l,
        Err(poisoned) => poisoned.into_inner()
    };
    match result {
        Ok(Ok(served)) => {
            if let Err(e) = write_combined(&mut logs.access_log, Utc::now(), entry, &served,
                                           elapsed) {
                warn!("could not write to access log: {e:#}");
            }
            served
        }
        Ok(Err(err)) => {
            if let Err(e) = write_error(&mut logs.error_log, Utc::now(), entry, elapsed, &err) {
                warn!("could not write to error log: {e:#}");
            }
            let served = Served::error_page(400, "Bad request");
            if let Err(e) = write_combined(&mut logs.access_log, Utc::now(), entry, &served,
                                           elapsed) {
                warn!("could not write to access log: {e:#}");
            }
            served
        }
        Err(payload) => {
            drop(logs);
            write_panic_stderr(entry, elapsed);
            panic::resume_unwind(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    /// A log file that can be looked at after being handed over.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.0.lock() {
                Ok(mut v) => v.extend_from_slice(buf),
                Err(_) => return Err(std::io::Error::new(std::io::ErrorKind::Other, "poisoned")),
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    impl Shared {
        fn text(&self) -> String {
            self.0.lock().map(|v| String::from_utf8_lossy(&v).into_owned()).unwrap_or_default()
        }
    }

    fn entry() -> LogEntry {
        LogEntry {
            client_ip: "10.0.0.7".into(),
            request_line: "GET /?o=News HTTP/1.1".into(),
            referer: None,
            user_agent: Some("curl/8.0".into()),
        }
    }

    #[test]
    fn t_write_combined() -> Result<()> {
        let now = Utc.with_ymd_and_hms(2023, 12, 6, 2, 2, 47).single()
            .ok_or_else(|| anyhow::anyhow!("bad date"))?;
        let mut served = Served::error_page(404, "Not found");
        served.user = Some("alice".into());
        let mut out = Vec::new();
        write_combined(&mut out, now, &entry(), &served, Duration::from_millis(3))?;
        let line = String::from_utf8(out)?;
        assert!(line.starts_with("10.0.0.7 - alice [06/Dec/2023:02:02:47 +0000] \
                                  \"GET /?o=News HTTP/1.1\" 404 "));
        assert!(line.contains(" \"-\" \"curl/8.0\" 3ms\n"));
        Ok(())
    }

    #[test]
    fn t_log_combined() {
        let (access, error) = (Shared::default(), Shared::default());
        let logs = Mutex::new(Logs {
            access_log: Box::new(access.clone()),
            error_log: Box::new(error.clone()),
        });
        let served = log_combined(&logs, &entry(), || Ok(Served::error_page(200, "ok")));
        assert_eq!(served.response.status_code, 200);
        assert!(access.text().contains("\" 200 "));
        assert_eq!(error.text(), "");

        let served = log_combined(&logs, &entry(), || Err(anyhow::anyhow!("unreadable body")));
        assert_eq!(served.response.status_code, 400);
        assert!(error.text().contains("unreadable body"));
        assert!(access.text().contains("\" 400 "));
    }
}
