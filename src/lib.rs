// Macros first, so they are in scope for the modules below.
pub mod warn;
pub mod boxed_error;
pub mod time_guard;
pub mod storage;

pub mod easy_fs;
pub mod miniarcswap;
pub mod in_threadpool;
pub mod escape;
pub mod url_encoding;
pub mod params;
pub mod session;
pub mod accounts;
pub mod registry;
pub mod access;
pub mod plugin;
pub mod context;
pub mod markup;
pub mod render;
pub mod negotiate;
pub mod themes;
pub mod plugins;
pub mod dispatch;
pub mod config;
pub mod accesslog;
pub mod server;
