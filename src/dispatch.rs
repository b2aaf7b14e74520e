//! One request from parameters to response: resolve the plugin, ask
//! the gate, invoke the operation, render, negotiate the output.

use std::{collections::HashMap, sync::Arc, time::Instant};

use kstring::KString;

use crate::{access::AccessDecision,
            context::{RawInput, RequestContext, Site, Slot, FLASH_KEY},
            escape::{escape_html, unescape_html},
            negotiate::{negotiate, Format, Output},
            plugin::{invoke, not_found, not_implemented, Plugin, Redirect},
            plugins,
            registry::PluginRegistry,
            render::{render_chain, Renderer},
            session::{Session, SessionBackend},
            storage::Storage,
            themes::{self, DEFAULT_THEME},
            warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Content(Output),
    /// 302 to this location
    Redirect(String),
}

#[derive(Debug)]
pub struct Handled {
    pub reply: Reply,
    /// The response must not be sent before this time
    pub respond_not_before: Option<Instant>,
    /// Who was logged in while handling the request
    pub login: Option<String>,
}

pub struct Engine {
    plugins: HashMap<KString, Arc<dyn Plugin>>,
    views: HashMap<KString, Arc<dyn Renderer>>,
    themes: Vec<(&'static str, Arc<dyn Renderer>)>,
    registry: PluginRegistry,
    sessions: Arc<dyn SessionBackend>,
    storage: Arc<dyn Storage>,
    site: Site,
}

fn error_page(site: &Site) -> String {
    format!("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n\
             <body>\n<h1>Internal error</h1>\n\
             <p>Your session could not be loaded. Please try again later.</p>\n\
             </body></html>\n",
            escape_html(&site.name))
}

impl Engine {
    /// An engine with the built-in plugins, views and themes.
    pub fn new(registry: PluginRegistry,
               sessions: Arc<dyn SessionBackend>,
               storage: Arc<dyn Storage>,
               site: Site) -> Self
    {
        let mut engine = Engine {
            plugins: HashMap::new(),
            views: HashMap::new(),
            themes: Vec::new(),
            registry,
            sessions,
            storage,
            site,
        };
        for p in plugins::builtin() {
            engine = engine.with_plugin(p);
        }
        for (name, v) in plugins::builtin_views() {
            engine = engine.with_view(name, v);
        }
        for (name, t) in themes::builtin() {
            engine = engine.with_theme(name, t);
        }
        engine
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.insert(KString::from_static(plugin.name()), plugin);
        self
    }

    pub fn with_view(mut self, plugin_name: &'static str, view: Arc<dyn Renderer>) -> Self {
        self.views.insert(KString::from_static(plugin_name), view);
        self
    }

    /// A theme of the same name is replaced.
    pub fn with_theme(mut self, name: &'static str, theme: Arc<dyn Renderer>) -> Self {
        self.themes.retain(|(n, _)| *n != name);
        self.themes.push((name, theme));
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn sessions(&self) -> &dyn SessionBackend {
        &*self.sessions
    }

    /// The named theme, else the default one.
    fn theme(&self, name: &str) -> Option<&dyn Renderer> {
        let find = |name: &str| self.themes.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| &**t);
        find(name).or_else(|| find(DEFAULT_THEME))
    }

    pub fn handle(&self, sid: &str, raw: &RawInput) -> Handled {
        let mut session = match Session::load(&*self.sessions, sid) {
            Ok(s) => s,
            Err(e) => {
                warn!("loading session: {e}");
                return Handled {
                    reply: Reply::Content(Output::html(500, error_page(&self.site))),
                    respond_not_before: None,
                    login: None,
                }
            }
        };
        let (reply, respond_not_before, login) = {
            let mut ctx = RequestContext::new(raw, &mut session, self.registry.snapshot(),
                                              &*self.storage, &self.site);
            ctx.themes = self.themes.iter().map(|(n, _)| *n).collect();
            let login = ctx.visitor.as_ref().map(|v| v.login.clone());
            let reply = self.dispatch(&mut ctx);
            (reply, ctx.respond_not_before, login)
        };
        if let Err(e) = session.save(&*self.sessions) {
            warn!("saving session: {e}");
        }
        Handled { reply, respond_not_before, login }
    }

    fn dispatch(&self, ctx: &mut RequestContext) -> Reply {
        let name = ctx.plugin_name().to_string();
        let op_name = ctx.operation_name().to_string();
        let descriptor = ctx.plugins.get(&name).cloned();
        let outcome = match (descriptor, self.plugins.get(name.as_str())) {
            (Some(descriptor), Some(plugin)) => {
                let decision = self.site.gate.decide(ctx.visitor.as_ref(), &descriptor,
                                                     &unescape_html(&op_name));
                match decision {
                    AccessDecision::Deny { redirect, message } => {
                        ctx.flash(&message);
                        return Reply::Redirect(redirect)
                    }
                    AccessDecision::Allow => match ctx.operation() {
                        Some(op) => invoke(&**plugin, op, ctx),
                        None => Ok(not_implemented(&name, &unescape_html(&op_name))),
                    }
                }
            }
            _ => Ok(not_found(&unescape_html(&name))),
        };
        match outcome {
            Err(Redirect { location }) => Reply::Redirect(location),
            Ok(payload) => {
                ctx.payload.extend(payload);
                // left for the next full page if this output has no log
                if Format::from_flag(ctx.format()).shows(Slot::Log) {
                    ctx.flash = ctx.session.take_flash(FLASH_KEY);
                }
                let view = self.views.get(name.as_str()).map(|v| &**v);
                let theme = self.theme(ctx.theme_name());
                render_chain(view, theme, ctx);
                Reply::Content(negotiate(ctx))
            }
        }
    }
}
