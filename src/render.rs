//! The renderer chain: per slot, the plugin's view first, then the
//! theme, then whatever default the slot already holds.

use strum::IntoEnumIterator;

use crate::{context::{RequestContext, Slot},
            escape::escape_html,
            plugin::Operation};

/// A view (per plugin) or a theme (shared). Both methods are
/// optional; returning None or an empty string passes on to the next
/// renderer in the chain.
pub trait Renderer: Send + Sync {
    fn render(&self, _slot: Slot, _op: Option<Operation>, _ctx: &RequestContext)
              -> Option<String> {
        None
    }

    /// The whole document, from the already rendered slots.
    fn page(&self, _ctx: &RequestContext) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    NoRenderer,
    ViewTried,
    ThemeTried,
    Rendered,
}

/// Who produced a slot's final content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedBy {
    View,
    Theme,
    Default,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| ! s.trim().is_empty())
}

/// Run the chain for one slot. Returns the new content, or None if
/// the default is to stay.
pub fn render_slot(view: Option<&dyn Renderer>,
                   theme: Option<&dyn Renderer>,
                   slot: Slot,
                   op: Option<Operation>,
                   ctx: &RequestContext) -> (RenderedBy, Option<String>)
{
    let mut state = RenderState::NoRenderer;
    let mut result = (RenderedBy::Default, None);
    loop {
        state = match state {
            RenderState::NoRenderer =>
                match view.and_then(|v| non_empty(v.render(slot, op, ctx))) {
                    Some(s) => {
                        result = (RenderedBy::View, Some(s));
                        RenderState::Rendered
                    }
                    None => RenderState::ViewTried
                },
            RenderState::ViewTried =>
                match theme.and_then(|t| non_empty(t.render(slot, op, ctx))) {
                    Some(s) => {
                        result = (RenderedBy::Theme, Some(s));
                        RenderState::Rendered
                    }
                    None => RenderState::ThemeTried
                },
            RenderState::ThemeTried | RenderState::Rendered =>
                return result
        }
    }
}

/// A page that still shows the main content when no renderer
/// assembles one.
pub fn fallback_page(ctx: &RequestContext) -> String {
    format!("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n\
             <body>\n<p class=\"error\">{}: page layout not implemented</p>\n{}\n</body></html>\n",
            ctx.slots.get(Slot::Doc),
            escape_html(ctx.theme_name()),
            ctx.slots.get(Slot::Main))
}

/// Fill all slots in chain order, then assemble the page into
/// `ctx.buffer`. Later slots see the content of earlier ones.
pub fn render_chain(view: Option<&dyn Renderer>,
                    theme: Option<&dyn Renderer>,
                    ctx: &mut RequestContext) -> Vec<(Slot, RenderedBy)>
{
    let op = ctx.operation();
    let mut trace = Vec::new();
    for slot in Slot::iter() {
        let (by, content) = render_slot(view, theme, slot, op, ctx);
        if let Some(content) = content {
            ctx.slots.set(slot, content);
        }
        trace.push((slot, by));
    }
    let page = view.and_then(|v| non_empty(v.page(ctx)))
        .or_else(|| theme.and_then(|t| non_empty(t.page(ctx))))
        .unwrap_or_else(|| fallback_page(ctx));
    ctx.buffer = Some(page);
    trace
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{context::{RawInput, Site, MAIN_PLACEHOLDER},
                session::{MemoryBackend, Session},
                storage::sqlite_store::SqliteStorage};
    use super::*;

    struct Fixed(&'static str, Option<Slot>);

    impl Renderer for Fixed {
        fn render(&self, slot: Slot, _op: Option<Operation>, _ctx: &RequestContext)
                  -> Option<String> {
            if Some(slot) == self.1 { Some(self.0.into()) } else { None }
        }
    }

    struct Empty;
    impl Renderer for Empty {
        fn render(&self, _: Slot, _: Option<Operation>, _: &RequestContext) -> Option<String> {
            Some("  ".into())
        }
    }

    struct Nothing;
    impl Renderer for Nothing {}

    fn with_ctx(f: impl FnOnce(&mut RequestContext)) -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(dir.path().join("r.sqlite"))?;
        let backend = MemoryBackend::new();
        let mut session = Session::load(&backend, "sid")?;
        let site = Site::default();
        let mut ctx = RequestContext::new(&RawInput::default(), &mut session,
                                          Arc::default(), &storage, &site);
        f(&mut ctx);
        Ok(())
    }

    #[test]
    fn t_view_before_theme() -> anyhow::Result<()> {
        with_ctx(|ctx| {
            let view = Fixed("view", Some(Slot::Main));
            let theme = Fixed("theme", Some(Slot::Main));
            let r = render_slot(Some(&view), Some(&theme), Slot::Main, None, ctx);
            assert_eq!(r, (RenderedBy::View, Some("view".into())));
        })
    }

    #[test]
    fn t_theme_only() -> anyhow::Result<()> {
        with_ctx(|ctx| {
            let theme = Fixed("theme", Some(Slot::Main));
            let r = render_slot(None, Some(&theme), Slot::Main, None, ctx);
            assert_eq!(r, (RenderedBy::Theme, Some("theme".into())));
            // a view that doesn't render this slot falls through
            let view = Fixed("view", Some(Slot::Foot));
            let r = render_slot(Some(&view), Some(&theme), Slot::Main, None, ctx);
            assert_eq!(r, (RenderedBy::Theme, Some("theme".into())));
            // so does one that renders blank
            let r = render_slot(Some(&Empty), Some(&theme), Slot::Main, None, ctx);
            assert_eq!(r, (RenderedBy::Theme, Some("theme".into())));
        })
    }

    #[test]
    fn t_default_kept() -> anyhow::Result<()> {
        with_ctx(|ctx| {
            let trace = render_chain(Some(&Nothing), None, ctx);
            assert!(trace.iter().all(|(_, by)| *by == RenderedBy::Default));
            assert_eq!(trace.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
                       Slot::iter().collect::<Vec<_>>());
            assert_eq!(ctx.slots.get(Slot::Main), MAIN_PLACEHOLDER);
            let page = ctx.buffer.as_deref().expect("always set");
            assert!(page.contains("not implemented"));
            assert!(page.contains(MAIN_PLACEHOLDER));
        })
    }

    #[test]
    fn t_chain_sets_slots() -> anyhow::Result<()> {
        with_ctx(|ctx| {
            let view = Fixed("<p>custom</p>", Some(Slot::Main));
            let theme = Fixed("footer", Some(Slot::Foot));
            let trace = render_chain(Some(&view), Some(&theme), ctx);
            assert_eq!(ctx.slots.get(Slot::Main), "<p>custom</p>");
            assert_eq!(ctx.slots.get(Slot::Foot), "footer");
            assert!(trace.contains(&(Slot::Main, RenderedBy::View)));
            assert!(trace.contains(&(Slot::Foot, RenderedBy::Theme)));
            assert!(trace.contains(&(Slot::Js, RenderedBy::Default)));
            assert!(ctx.buffer.as_deref().unwrap_or("").contains("<p>custom</p>"));
        })
    }
}
