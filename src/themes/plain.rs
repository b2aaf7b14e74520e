//! A bare theme: the main content, the flash message and a minimal
//! page.

use crate::{context::{RequestContext, Slot},
            plugin::Operation,
            render::Renderer};
use super::{flash_markup, payload_markup};

pub struct Plain;

impl Renderer for Plain {
    fn render(&self, slot: Slot, _op: Option<Operation>, ctx: &RequestContext) -> Option<String> {
        match slot {
            Slot::Main => payload_markup(ctx, false),
            Slot::Log => flash_markup(ctx),
            _ => None
        }
    }

    fn page(&self, ctx: &RequestContext) -> Option<String> {
        Some(format!("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n\
                      <body>\n{}{}{}\n</body></html>\n",
                     ctx.slots.get(Slot::Doc),
                     ctx.slots.get(Slot::Log),
                     ctx.slots.get(Slot::Nav1),
                     ctx.slots.get(Slot::Main)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{context::{RawInput, Site},
                plugin::card,
                render::{render_chain, RenderedBy},
                session::{MemoryBackend, Session},
                storage::sqlite_store::SqliteStorage};
    use super::*;

    #[test]
    fn t_main_log_and_page() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(dir.path().join("p.sqlite"))?;
        let backend = MemoryBackend::new();
        let mut session = Session::load(&backend, "sid")?;
        let site = Site::default();
        let mut ctx = RequestContext::new(&RawInput::get(&[("t", "Plain")]), &mut session,
                                          Arc::default(), &storage, &site);
        ctx.payload = card("Home", "<p>Hi</p>");
        ctx.flash = Some("Saved <now>".into());
        let trace = render_chain(None, Some(&Plain), &mut ctx);
        for (slot, by) in trace {
            let expected = match slot {
                Slot::Main | Slot::Log => RenderedBy::Theme,
                _ => RenderedBy::Default,
            };
            assert_eq!(by, expected, "{slot:?}");
        }
        let page = ctx.buffer.as_deref().unwrap_or("");
        assert!(page.contains("<title>plugsite</title>"));
        assert!(page.contains("<h2>Home</h2>"));
        assert!(page.contains("Saved &lt;now&gt;"));
        assert!(! page.contains("not implemented"));
        Ok(())
    }
}
