//! Serving the engine over HTTP with rouille. Requests are handled
//! start to finish on a fixed pool of worker threads, which keeps the
//! number of thread-local sqlite connections bounded.

use std::{sync::{Arc, Mutex}, thread, time::Duration};

use anyhow::{anyhow, Context, Result};
use rouille::{input::post::raw_urlencoded_post_input, session::session, Request, Response, Server};
use scoped_thread_pool::Pool;
use strum::IntoEnumIterator;

use crate::{accesslog::{log_combined, LogEntry, Logs, Served},
            accounts::sleep_until,
            config::Config,
            context::RawInput,
            dispatch::{Engine, Handled, Reply},
            in_threadpool::in_threadpool,
            params::Param,
            plugins::builtin_descriptors,
            registry::PluginRegistry,
            session::SqliteBackend,
            storage::sqlite_store::SqliteStorage,
            time_guard,
            warn};

/// How often expired sessions are removed from the store.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// The recognized parameters from the query string, and for POST
/// requests all urlencoded body fields.
pub fn raw_input(request: &Request) -> Result<RawInput> {
    let query = Param::iter()
        .filter_map(|p| request.get_param(p.key()).map(|v| (p.key().to_string(), v)))
        .collect();
    let is_post = request.method() == "POST";
    let form = if is_post {
        raw_urlencoded_post_input(request)
            .map_err(|e| anyhow!("reading POST body: {e}"))?
    } else {
        Vec::new()
    };
    Ok(RawInput { query, form, is_post })
}

pub fn served(handled: Handled) -> Served {
    let Handled { reply, respond_not_before, login } = handled;
    let (response, body_len) = match reply {
        Reply::Content(out) => {
            let len = out.body.len();
            (Response::from_data(out.content_type, out.body).with_status_code(out.status), len)
        }
        Reply::Redirect(location) => (Response::redirect_302(location), 0),
    };
    Served {
        response: response.with_no_cache(),
        body_len,
        user: login,
        sleep_until: respond_not_before,
    }
}

/// Make a handler for rouille's `Server`.
pub fn server_handler(
    engine: Arc<Engine>,
    threadpool: Arc<Pool>,
    logs: Arc<Mutex<Logs>>,
    session_timeout: u64,
    timed: bool,
) -> impl Fn(&Request) -> Response
{
    move |request: &Request| -> Response {
        time_guard!(timed, "server_handler");
        let entry = LogEntry::from_request(request);
        session(request, "sid", session_timeout, |session| {
            let sid = session.id();
            let outcome = in_threadpool(&threadpool, || {
                log_combined(&logs, &entry, || -> Result<Served> {
                    let raw = raw_input(request)?;
                    Ok(served(engine.handle(sid, &raw)))
                })
            });
            match outcome {
                Ok(Served { response, sleep_until: t, .. }) => {
                    if let Some(t) = t {
                        sleep_until(t);
                    }
                    response
                }
                Err(e) => {
                    warn!("worker pool: {e}");
                    Response::text("Internal error").with_status_code(500)
                }
            }
        })
    }
}

/// Set everything up from `config` and serve until the process ends.
pub fn run(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.datadir)
        .with_context(|| format!("creating data directory {:?}", config.datadir))?;
    let storage = SqliteStorage::open(config.database_path())
        .with_context(|| format!("opening database {:?}", config.database_path()))?;
    let sessions = Arc::new(SqliteBackend::open(config.sessions_path(),
                                                &config.sessionid_hasher_secret,
                                                config.session_timeout as i64)?);
    thread::Builder::new().name("session_purge".into()).spawn({
        let sessions = sessions.clone();
        move || loop {
            match sessions.purge_expired() {
                Ok(0) => (),
                Ok(n) => eprintln!("purged {n} expired sessions"),
                Err(e) => warn!("purging sessions: {e}"),
            }
            thread::sleep(SESSION_PURGE_INTERVAL);
        }
    })?;
    let registry = PluginRegistry::from_dir(config.registry_config(), builtin_descriptors());
    let engine = Arc::new(Engine::new(registry, sessions, Arc::new(storage), config.site()));

    let logs = Logs::open_in_dir(&config.logdir)?;
    eprintln!("Logging to dir {:?}", config.logdir);

    // Kept small, since each worker holds its own database
    // connections.
    let workerthreadpool_size = 2 * thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threadpool = {
        let cfg = scoped_thread_pool::ThreadConfig::new().prefix("plugsite_worker");
        Arc::new(Pool::with_thread_config(workerthreadpool_size, cfg))
    };

    let handler = server_handler(engine, threadpool, logs, config.session_timeout,
                                 config.is_dev);
    let server = Server::new(config.listen.as_str(), handler)
        .map_err(|e| anyhow!("starting server on {:?}: {e}", config.listen))?;
    eprintln!("Listening on http://{}", server.server_addr());
    server.run();
    Ok(())
}
