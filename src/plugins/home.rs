use crate::{context::RequestContext,
            escape::escape_html,
            plugin::{card, Plugin, PluginResult}};

pub struct Home;

impl Plugin for Home {
    fn name(&self) -> &'static str { "Home" }

    fn list(&self, ctx: &mut RequestContext) -> PluginResult {
        let mut main = format!("<p>Welcome to {}.</p>\n", escape_html(&ctx.site.name));
        match &ctx.visitor {
            Some(v) => main.push_str(&format!("<p>You are logged in as {}.</p>\n",
                                              escape_html(&v.login))),
            None => main.push_str("<p>Log in to write news.</p>\n"),
        }
        Ok(card("Home", &main))
    }
}
