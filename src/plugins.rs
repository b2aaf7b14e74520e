//! The plugins shipped with the site, their views, and helpers they
//! share.

use std::{fmt::Display, sync::Arc};

use serde_json::{json, Value};

use crate::{plugin::{error, Payload, Plugin, PluginResult},
            registry::PluginDescriptor,
            render::Renderer,
            storage::Window,
            warn};

pub mod auth;
pub mod home;
pub mod news;
pub mod users;

pub fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(home::Home),
        Arc::new(news::News),
        Arc::new(users::Users),
        Arc::new(auth::Auth),
    ]
}

pub fn builtin_views() -> Vec<(&'static str, Arc<dyn Renderer>)> {
    vec![
        ("News", Arc::new(news::NewsView)),
        ("Users", Arc::new(users::UsersView)),
        ("Auth", Arc::new(auth::AuthView)),
    ]
}

/// Descriptors for the built-in plugins, used when there is no
/// plugin directory to scan.
pub fn builtin_descriptors() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::new("Home").order(1),
        PluginDescriptor::new("News").order(2).auth_for(&["create", "update", "delete"]),
        PluginDescriptor::new("Auth").label("Login").order(9),
        PluginDescriptor::new("Users").group("Admin").order(1).admin(),
    ]
}

/// Turn the failure of a collaborator into an error payload, so the
/// page can still be shown.
pub fn guarded(plugin: &str, op: &str, result: anyhow::Result<PluginResult>) -> PluginResult {
    match result {
        Ok(r) => r,
        Err(e) => {
            warn!("{plugin} {op}: {e:#}");
            Ok(error(&format!("Could not {op}: {e}")))
        }
    }
}

/// The object inside `v`; empty for anything else.
pub fn object(v: Value) -> Payload {
    match v {
        Value::Object(m) => m,
        _ => Payload::new()
    }
}

/// Where a list page is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub pages: i64,
    pub total: i64,
    pub per_page: i64,
}

impl Pagination {
    /// `requested` is clamped to the existing pages.
    pub fn new(requested: i64, total: i64, per_page: i64) -> Self {
        let pages = ((total + per_page - 1) / per_page).max(1);
        Pagination { page: requested.clamp(1, pages), pages, total, per_page }
    }

    pub fn window<'t>(&self, order: &'t str) -> Window<'t> {
        Window { order, limit: self.per_page, offset: (self.page - 1) * self.per_page }
    }

    pub fn to_json(self) -> Value {
        json!({
            "page": self.page,
            "pages": self.pages,
            "total": self.total,
            "per_page": self.per_page,
        })
    }
}

/// The text of a JSON field, empty if absent.
pub fn text<'v>(record: &'v serde_json::Map<String, Value>, key: &str) -> &'v str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

/// A message to show with a failed form, and the form again.
pub fn form_error(message: impl Display, form: Value) -> Payload {
    object(json!({ "error": message.to_string(), "form": form }))
}

/// Calling plugins outside of the dispatcher.
#[cfg(test)]
pub mod testing {
    use std::{sync::Arc, time::Instant};

    use tempfile::TempDir;

    use crate::{access::Visitor,
                context::{RawInput, RequestContext, Site, Slot, FLASH_KEY},
                plugin::{invoke, Operation, Plugin, PluginResult},
                render::{render_chain, Renderer},
                session::{MemoryBackend, Session},
                storage::sqlite_store::SqliteStorage,
                themes::simple::Simple};

    pub struct Fixture {
        _dir: TempDir,
        pub storage: SqliteStorage,
        pub backend: MemoryBackend,
        pub site: Site,
    }

    pub fn fixture() -> anyhow::Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(dir.path().join("plugins.sqlite"))?;
        Ok(Fixture { _dir: dir, storage, backend: MemoryBackend::new(), site: Site::default() })
    }

    pub struct Called {
        pub result: PluginResult,
        pub flash: Option<String>,
        /// The main slot, if the result was a payload
        pub main: String,
        pub session: Session,
        pub respond_not_before: Option<Instant>,
    }

    pub fn call(f: &Fixture, plugin: &dyn Plugin, view: Option<&dyn Renderer>,
                visitor: Option<Visitor>, op: Operation, raw: RawInput)
                -> anyhow::Result<Called>
    {
        let mut session = Session::load(&f.backend, "sid")?;
        if let Some(v) = &visitor {
            v.store(&mut session);
        }
        let (result, main, respond_not_before) = {
            let mut ctx = RequestContext::new(&raw, &mut session, Arc::default(),
                                              &f.storage, &f.site);
            let result = invoke(plugin, op, &mut ctx);
            let mut main = String::new();
            if let Ok(p) = &result {
                ctx.payload = p.clone();
                render_chain(view, Some(&Simple), &mut ctx);
                main = ctx.slots.get(Slot::Main).to_string();
            }
            (result, main, ctx.respond_not_before)
        };
        let flash = session.take_flash(FLASH_KEY);
        Ok(Called { result, flash, main, session, respond_not_before })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_pagination() {
        assert_eq!(Pagination::new(1, 0, 5),
                   Pagination { page: 1, pages: 1, total: 0, per_page: 5 });
        assert_eq!(Pagination::new(9, 11, 5).page, 3);
        assert_eq!(Pagination::new(-2, 11, 5).page, 1);
        let w = Pagination::new(2, 11, 5).window("id");
        assert_eq!((w.limit, w.offset), (5, 5));
    }

    #[test]
    fn t_guarded() {
        let r = guarded("News", "list", Err(anyhow::anyhow!("disk on fire")));
        let p = r.unwrap_or_default();
        assert_eq!(p.get("error").and_then(Value::as_str), Some("Could not list: disk on fire"));
    }

    #[test]
    fn t_builtin_names_match() {
        let names: Vec<_> = builtin().iter().map(|p| p.name()).collect();
        for d in builtin_descriptors() {
            assert!(names.contains(&d.name.as_str()), "{}", d.name);
        }
        for (name, _) in builtin_views() {
            assert!(names.contains(&name));
        }
    }
}
