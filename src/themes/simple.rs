//! The default theme: cards, tables, grouped navigation, a theme
//! selector and a complete page.

use chrono::{Datelike, Utc};

use crate::{context::{RequestContext, Slot},
            escape::escape_html,
            markup,
            params::Param,
            plugin::Operation,
            render::Renderer,
            url_encoding::href};
use super::{flash_markup, payload_markup, plugin_label};

const CSS: &str = "<style>
body { font-family: sans-serif; max-width: 60em; margin: 0 auto; padding: 0 1em; }
#nav1 ul, #nav2 ul { list-style: none; padding: 0; }
#nav1 li, #nav2 li { display: inline; margin-right: 1em; }
li.active a { font-weight: bold; }
.card { border: 1px solid #ccc; border-radius: 4px; padding: 0 1em; margin: 1em 0; }
.alert { padding: 0.5em 1em; border-radius: 4px; margin: 1em 0; }
.alert-danger { background: #f8d7da; }
.alert-warning { background: #fff3cd; }
.alert-info { background: #d1ecf1; }
table.items { border-collapse: collapse; }
table.items td, table.items th { border-bottom: 1px solid #ddd; padding: 0.2em 0.6em; text-align: left; }
#foot { color: #777; font-size: smaller; }
</style>";

pub struct Simple;

impl Simple {
    fn nav1(&self, ctx: &RequestContext) -> String {
        let visitor = ctx.visitor.as_ref();
        let mut out = String::from("<nav>\n");
        for group in ctx.plugins.nav_groups() {
            let entries: Vec<_> = group.entries.into_iter()
                .filter(|d| ctx.site.gate.can_open(visitor, d))
                .collect();
            if entries.is_empty() {
                continue
            }
            if let Some(g) = group.group {
                out.push_str(&format!("<h3>{}</h3>\n", escape_html(g)));
            }
            out.push_str("<ul>\n");
            for d in entries {
                let class = if d.name == ctx.plugin_name() { " class=\"active\"" } else { "" };
                let text = if d.icon.is_empty() {
                    escape_html(&d.label)
                } else {
                    format!("{} {}", escape_html(&d.icon), escape_html(&d.label))
                };
                out.push_str(&format!("<li{class}>{}</li>\n",
                                      markup::link(&href(&[(Param::Plugin, &d.name)]), &text)));
            }
            out.push_str("</ul>\n");
        }
        out.push_str("</nav>\n");
        out
    }

    fn nav2(&self, ctx: &RequestContext) -> String {
        let mut out = String::from("<ul class=\"themes\">\n");
        for name in &ctx.themes {
            let class = if *name == ctx.theme_name() { " class=\"active\"" } else { "" };
            out.push_str(&format!("<li{class}>{}</li>\n",
                                  markup::link(&href(&[(Param::Theme, *name)]), name)));
        }
        out.push_str("</ul>\n");
        out
    }

    fn foot(&self, ctx: &RequestContext) -> String {
        let who = match &ctx.visitor {
            Some(v) => format!(" | logged in as {}", escape_html(&v.login)),
            None => String::new(),
        };
        format!("<footer><p>&copy; {} {}{who}</p></footer>\n",
                Utc::now().year(), escape_html(&ctx.site.name))
    }
}

impl Renderer for Simple {
    fn render(&self, slot: Slot, _op: Option<Operation>, ctx: &RequestContext) -> Option<String> {
        match slot {
            Slot::Main => payload_markup(ctx, true),
            Slot::Doc => Some(format!("{} | {}", escape_html(&ctx.site.name), plugin_label(ctx))),
            Slot::Head => Some(format!("<header><h1>{}</h1></header>\n",
                                       markup::link(&href(&[(Param::Plugin, "Home")]),
                                                    &escape_html(&ctx.site.name)))),
            Slot::Log => flash_markup(ctx),
            Slot::Nav1 => Some(self.nav1(ctx)),
            Slot::Nav2 => Some(self.nav2(ctx)),
            Slot::Foot => Some(self.foot(ctx)),
            Slot::Css => Some(CSS.into()),
            Slot::Js => None,
        }
    }

    fn page(&self, ctx: &RequestContext) -> Option<String> {
        let s = |slot| ctx.slots.get(slot);
        Some(format!("<!DOCTYPE html>
<html lang=\"en\">
<head>
<meta charset=\"utf-8\">
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">
<title>{}</title>
{}
</head>
<body>
<div id=\"head\">{}</div>
<div id=\"nav1\">{}</div>
<div id=\"log\">{}</div>
<main id=\"main\">{}</main>
<div id=\"nav2\">{}</div>
<div id=\"foot\">{}</div>
{}
</body>
</html>
",
                     s(Slot::Doc), s(Slot::Css), s(Slot::Head), s(Slot::Nav1), s(Slot::Log),
                     s(Slot::Main), s(Slot::Nav2), s(Slot::Foot), s(Slot::Js)))
    }
}
