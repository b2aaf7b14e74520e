//! Plugin discovery: descriptors from `<plugindir>/<Name>/meta.json`,
//! sorted for navigation, indexed by name, and cached on disk and in
//! memory.

use std::{collections::HashMap,
          fs,
          path::{Path, PathBuf},
          sync::{Arc, Mutex},
          time::{Duration, Instant, SystemTime, UNIX_EPOCH}};

use itertools::Itertools;
use kstring::KString;
use serde::{Deserialize, Serialize};

use crate::{def_boxed_thiserror, warn,
            easy_fs::{easy_filepaths_in_dir, mtime_millis, write_file_atomic, FileKind},
            miniarcswap::MiniArcSwap};

/// Milliseconds since the epoch.
pub type Millis = i64;

pub fn now_millis() -> Millis {
    SystemTime::now().duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}

pub const DEFAULT_ORDER: i64 = 999;

def_boxed_thiserror!(RegistryError, pub enum RegistryErrorKind {
    #[error("reading plugin directory {path:?}: {error}")]
    ReadDir { path: PathBuf, error: std::io::Error },
    #[error("writing plugin cache {path:?}: {error}")]
    WriteCache { path: PathBuf, error: std::io::Error },
    #[error("encoding plugin cache: {0}")]
    Encode(#[from] serde_json::Error),
});

/// The contents of a `meta.json` file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginMeta {
    pub name: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub group: Option<String>,
    pub order: Option<i64>,
    pub auth: bool,
    pub admin: bool,
    pub auth_ops: Vec<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub label: String,
    pub icon: String,
    pub group: Option<String>,
    pub order: i64,
    /// Requires a logged-in visitor
    pub auth: bool,
    /// Requires an admin visitor
    pub admin: bool,
    /// Operations requiring a logged-in visitor on an otherwise
    /// public plugin
    #[serde(default)]
    pub auth_ops: Vec<String>,
    pub enabled: bool,
}

impl PluginDescriptor {
    /// A public, enabled, ungrouped descriptor labeled with its name.
    pub fn new(name: &str) -> Self {
        PluginDescriptor {
            name: name.into(),
            label: name.into(),
            icon: String::new(),
            group: None,
            order: DEFAULT_ORDER,
            auth: false,
            admin: false,
            auth_ops: Vec::new(),
            enabled: true,
        }
    }

    pub fn label(mut self, label: &str) -> Self { self.label = label.into(); self }
    pub fn icon(mut self, icon: &str) -> Self { self.icon = icon.into(); self }
    pub fn group(mut self, group: &str) -> Self { self.group = Some(group.into()); self }
    pub fn order(mut self, order: i64) -> Self { self.order = order; self }
    pub fn auth(mut self) -> Self { self.auth = true; self }
    pub fn admin(mut self) -> Self { self.auth = true; self.admin = true; self }
    pub fn auth_for(mut self, ops: &[&str]) -> Self {
        self.auth_ops = ops.iter().map(|op| op.to_string()).collect();
        self
    }
    pub fn disabled(mut self) -> Self { self.enabled = false; self }

    pub fn from_meta(dirname: &str, meta: PluginMeta) -> Self {
        let name = meta.name.unwrap_or_else(|| dirname.into());
        PluginDescriptor {
            label: meta.label.unwrap_or_else(|| name.clone()),
            icon: meta.icon.unwrap_or_default(),
            group: meta.group.filter(|g| ! g.is_empty()),
            order: meta.order.unwrap_or(DEFAULT_ORDER),
            // admin implies auth
            auth: meta.auth || meta.admin,
            admin: meta.admin,
            auth_ops: meta.auth_ops,
            enabled: meta.enabled.unwrap_or(true),
            name,
        }
    }
}

/// One contiguous run of navigation entries sharing a group.
#[derive(Debug)]
pub struct NavGroup<'t> {
    pub group: Option<&'t str>,
    pub entries: Vec<&'t PluginDescriptor>,
}

/// The enabled descriptors, sorted by (group, order), with lookup by
/// name.
#[derive(Debug, Default)]
pub struct PluginIndex {
    sorted: Vec<PluginDescriptor>,
    by_name: HashMap<KString, usize>,
}

impl PluginIndex {
    /// Disabled descriptors are dropped; of several with the same
    /// name the first one is kept.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        let mut seen = HashMap::new();
        let mut sorted: Vec<PluginDescriptor> = Vec::new();
        for d in descriptors {
            if ! d.enabled {
                continue
            }
            if seen.insert(d.name.clone(), ()).is_some() {
                warn!("ignoring duplicate plugin name {:?}", d.name);
                continue
            }
            sorted.push(d);
        }
        // Vec::sort_by is stable
        sorted.sort_by(|a, b| (&a.group, a.order).cmp(&(&b.group, b.order)));
        let by_name = sorted.iter().enumerate()
            .map(|(i, d)| (KString::from_ref(&d.name), i))
            .collect();
        PluginIndex { sorted, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.by_name.get(name).map(|i| &self.sorted[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.sorted.iter()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn nav_groups(&self) -> Vec<NavGroup<'_>> {
        self.sorted.iter()
            .group_by(|d| d.group.as_deref())
            .into_iter()
            .map(|(group, entries)| NavGroup { group, entries: entries.collect() })
            .collect()
    }
}

/// A file the scan result depends on, with its modification time at
/// scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub path: PathBuf,
    pub mtime: Millis,
}

/// Whether any source changed after the cache was made. A source that
/// can no longer be stat'ed counts as changed (pass `Millis::MAX`).
pub fn needs_rescan(cache_time: Millis, source_times: impl IntoIterator<Item = Millis>) -> bool {
    source_times.into_iter().any(|t| t > cache_time)
}

pub fn cache_expired(cache_time: Millis, now: Millis, ttl: Duration) -> bool {
    now.saturating_sub(cache_time) > ttl.as_millis() as Millis
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Taken just before the scan started
    pub scanned_at: Millis,
    pub sources: Vec<SourceStamp>,
    /// All descriptors found, in directory name order, including
    /// disabled ones
    pub descriptors: Vec<PluginDescriptor>,
}

impl ScanResult {
    pub fn is_stale(&self, now: Millis, ttl: Duration) -> bool {
        cache_expired(self.scanned_at, now, ttl)
            || needs_rescan(self.scanned_at,
                            self.sources.iter().map(
                                |s| mtime_millis(&s.path).unwrap_or(Millis::MAX)))
    }
}

fn read_meta(path: &Path) -> Option<PluginMeta> {
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("can't read plugin metadata {path:?}: {e}");
            return None
        }
    };
    match serde_json::from_str(&s) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("invalid plugin metadata {path:?}, using defaults: {e}");
            None
        }
    }
}

/// Read the descriptor of every subdirectory of `plugindir`.
pub fn scan(plugindir: &Path) -> Result<ScanResult, RegistryError> {
    let scanned_at = now_millis();
    let read_dir_error = |error| RegistryErrorKind::ReadDir {
        path: plugindir.to_path_buf(), error
    };
    let mut dirs = Vec::new();
    for entry in easy_filepaths_in_dir(plugindir).map_err(read_dir_error)? {
        let (path, kind) = entry.map_err(read_dir_error)?;
        if kind != FileKind::Dir {
            continue
        }
        let dirname = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) if n.starts_with('.') => continue,
            Some(n) => n.to_string(),
            None => {
                warn!("skipping plugin directory with non-UTF-8 name {path:?}");
                continue
            }
        };
        dirs.push((dirname, path));
    }
    dirs.sort();

    let mut sources = vec![SourceStamp {
        path: plugindir.to_path_buf(),
        mtime: mtime_millis(plugindir).unwrap_or(scanned_at),
    }];
    let mut descriptors = Vec::with_capacity(dirs.len());
    for (dirname, path) in dirs {
        let metapath = path.join("meta.json");
        let meta = read_meta(&metapath).unwrap_or_default();
        descriptors.push(PluginDescriptor::from_meta(&dirname, meta));
        if let Some(mtime) = mtime_millis(&path) {
            sources.push(SourceStamp { path, mtime });
        }
        if let Some(mtime) = mtime_millis(&metapath) {
            sources.push(SourceStamp { path: metapath, mtime });
        }
    }
    Ok(ScanResult { scanned_at, sources, descriptors })
}

/// None if the file is missing or can't be decoded.
pub fn read_cache(cachefile: &Path) -> Option<ScanResult> {
    let s = fs::read(cachefile).ok()?;
    match serde_json::from_slice(&s) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!("ignoring corrupt plugin cache {cachefile:?}: {e}");
            None
        }
    }
}

pub fn write_cache(cachefile: &Path, scan: &ScanResult) -> Result<(), RegistryError> {
    let json = serde_json::to_vec_pretty(scan)?;
    write_file_atomic(cachefile, &json).map_err(
        |error| RegistryErrorKind::WriteCache { path: cachefile.to_path_buf(), error })?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub plugindir: PathBuf,
    pub cachefile: PathBuf,
    pub ttl: Duration,
    /// How often `snapshot` looks at the file system at most
    pub recheck_interval: Duration,
}

struct Snapshot {
    index: Arc<PluginIndex>,
    scan: Option<ScanResult>,
}

/// Process-wide holder of the current `PluginIndex`.
pub struct PluginRegistry {
    config: Option<RegistryConfig>,
    fallback: Vec<PluginDescriptor>,
    current: MiniArcSwap<Snapshot>,
    last_check: Mutex<Instant>,
}

impl PluginRegistry {
    /// A registry that never changes.
    pub fn fixed(descriptors: Vec<PluginDescriptor>) -> Self {
        PluginRegistry {
            config: None,
            current: MiniArcSwap::new(Arc::new(Snapshot {
                index: Arc::new(PluginIndex::from_descriptors(descriptors.clone())),
                scan: None,
            })),
            fallback: descriptors,
            last_check: Mutex::new(Instant::now()),
        }
    }

    /// A registry backed by a plugin directory. `fallback` is used
    /// while the directory can't be read.
    pub fn from_dir(config: RegistryConfig, fallback: Vec<PluginDescriptor>) -> Self {
        let snapshot = match read_cache(&config.cachefile) {
            Some(scan) if ! scan.is_stale(now_millis(), config.ttl) =>
                Snapshot {
                    index: Arc::new(PluginIndex::from_descriptors(scan.descriptors.clone())),
                    scan: Some(scan),
                },
            _ => Self::rescan(&config, &fallback),
        };
        PluginRegistry {
            config: Some(config),
            fallback,
            current: MiniArcSwap::new(Arc::new(snapshot)),
            last_check: Mutex::new(Instant::now()),
        }
    }

    fn rescan(config: &RegistryConfig, fallback: &[PluginDescriptor]) -> Snapshot {
        match scan(&config.plugindir) {
            Ok(scan) => {
                if let Err(e) = write_cache(&config.cachefile, &scan) {
                    warn!("{e}");
                }
                Snapshot {
                    index: Arc::new(PluginIndex::from_descriptors(scan.descriptors.clone())),
                    scan: Some(scan),
                }
            }
            Err(e) => {
                warn!("{e}, using built-in plugin list");
                Snapshot {
                    index: Arc::new(PluginIndex::from_descriptors(fallback.to_vec())),
                    scan: None,
                }
            }
        }
    }

    fn check_due(&self, interval: Duration) -> bool {
        let mut last = match self.last_check.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner()
        };
        if last.elapsed() >= interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }

    /// The current index. Callers keep it for the whole request; a
    /// rescan in the meantime does not affect them.
    pub fn snapshot(&self) -> Arc<PluginIndex> {
        let current = self.current.get();
        if let Some(config) = &self.config {
            if self.check_due(config.recheck_interval) {
                let stale = match &current.scan {
                    Some(scan) => scan.is_stale(now_millis(), config.ttl),
                    // the directory was unreadable last time
                    None => true,
                };
                if stale {
                    let new = Arc::new(Self::rescan(config, &self.fallback));
                    let index = new.index.clone();
                    self.current.set(new);
                    return index
                }
            }
        }
        current.index.clone()
    }
}
