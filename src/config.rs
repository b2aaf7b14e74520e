//! Settings from environment variables, read once at startup.

use std::{env::VarError, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};

use crate::{access::AccessGate, context::Site, registry::RegistryConfig};

/// Mean delay before answering a login attempt outside development.
pub const LOGIN_DELAY: Duration = Duration::from_millis(1000);

const DATABASE_FILE: &str = "plugsite.sqlite";

/// The database path from `DATADIR` alone, for tools that need
/// nothing else.
pub fn database_path_from_env() -> Result<PathBuf> {
    let get = |name: &str| std::env::var(name);
    Ok(PathBuf::from(getenv_or(&get, "DATADIR", "data")?).join(DATABASE_FILE))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub datadir: PathBuf,
    pub plugindir: PathBuf,
    pub logdir: PathBuf,
    pub sessionid_hasher_secret: String,
    pub site_name: String,
    pub plugin_cache_ttl: Duration,
    pub plugin_recheck: Duration,
    /// Seconds
    pub session_timeout: u64,
    pub is_dev: bool,
}

/// How the environment is read; `std::env::var` outside of tests.
type Lookup<'t> = &'t dyn Fn(&str) -> Result<String, VarError>;

fn getenv(get: Lookup, name: &str) -> Result<Option<String>> {
    match get(name) {
        Ok(s) => Ok(Some(s)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => bail!("{name:?} env var is not unicode"),
    }
}

fn getenv_or(get: Lookup, name: &str, fallback: &str) -> Result<String> {
    Ok(getenv(get, name)?.unwrap_or_else(|| fallback.into()))
}

fn xgetenv(get: Lookup, name: &str) -> Result<String> {
    getenv(get, name)?.ok_or_else(|| anyhow!("missing env var {name:?}"))
}

fn getenv_number(get: Lookup, name: &str, fallback: u64) -> Result<u64> {
    match getenv(get, name)? {
        Some(s) => s.trim().parse().with_context(
            || anyhow!("{name:?} env var is not a non-negative integer: {s:?}")),
        None => Ok(fallback)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|name: &str| std::env::var(name))
    }

    fn from_lookup(get: Lookup) -> Result<Self> {
        let datadir = PathBuf::from(getenv_or(get, "DATADIR", "data")?);
        let plugindir = match getenv(get, "PLUGINDIR")? {
            Some(d) => PathBuf::from(d),
            None => datadir.join("plugins"),
        };
        Ok(Config {
            listen: getenv_or(get, "LISTEN_HTTP", "127.0.0.1:3000")?,
            plugindir,
            logdir: PathBuf::from(getenv_or(get, "LOGDIR", "log")?),
            sessionid_hasher_secret: xgetenv(get, "SESSIONID_HASHER_SECRET")?,
            site_name: getenv_or(get, "SITE_NAME", "plugsite")?,
            plugin_cache_ttl: Duration::from_secs(getenv_number(get, "PLUGIN_CACHE_TTL", 300)?),
            plugin_recheck: Duration::from_millis(getenv_number(get, "PLUGIN_RECHECK_MS", 1000)?),
            session_timeout: getenv_number(get, "SESSION_TIMEOUT", 3600)?,
            is_dev: getenv(get, "IS_DEV")?.is_some(),
            datadir,
        })
    }

    /// Users and news.
    pub fn database_path(&self) -> PathBuf {
        self.datadir.join(DATABASE_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.datadir.join("sessions.sqlite")
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            plugindir: self.plugindir.clone(),
            cachefile: self.datadir.join("plugins-cache.json"),
            ttl: self.plugin_cache_ttl,
            recheck_interval: self.plugin_recheck,
        }
    }

    pub fn site(&self) -> Site {
        Site {
            name: self.site_name.clone(),
            login_delay: if self.is_dev { None } else { Some(LOGIN_DELAY) },
            gate: AccessGate::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(&|name: &str| vars.get(name).cloned().ok_or(VarError::NotPresent))
    }

    #[test]
    fn t_defaults() -> Result<()> {
        let c = config(&[("SESSIONID_HASHER_SECRET", "s3cret")])?;
        assert_eq!(c.listen, "127.0.0.1:3000");
        assert_eq!(c.plugindir, PathBuf::from("data/plugins"));
        assert_eq!(c.plugin_cache_ttl, Duration::from_secs(300));
        assert_eq!(c.session_timeout, 3600);
        assert!(! c.is_dev);
        assert_eq!(c.site().login_delay, Some(LOGIN_DELAY));
        Ok(())
    }

    #[test]
    fn t_overrides() -> Result<()> {
        let c = config(&[("SESSIONID_HASHER_SECRET", "s"), ("DATADIR", "/srv/site"),
                         ("PLUGIN_RECHECK_MS", "50"), ("IS_DEV", ""), ("SITE_NAME", "Demo")])?;
        assert_eq!(c.plugindir, PathBuf::from("/srv/site/plugins"));
        assert_eq!(c.database_path(), PathBuf::from("/srv/site/plugsite.sqlite"));
        assert_eq!(c.registry_config().recheck_interval, Duration::from_millis(50));
        let site = c.site();
        assert_eq!(site.name, "Demo");
        assert_eq!(site.login_delay, None);
        Ok(())
    }

    #[test]
    fn t_errors_name_the_variable() {
        let e = config(&[]).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(e.contains("SESSIONID_HASHER_SECRET"));
        let e = config(&[("SESSIONID_HASHER_SECRET", "s"), ("SESSION_TIMEOUT", "soon")])
            .err().map(|e| format!("{e:#}")).unwrap_or_default();
        assert!(e.contains("SESSION_TIMEOUT"));
    }
}
