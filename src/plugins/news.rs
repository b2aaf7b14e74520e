//! News items: anyone may read them, visitors may write them, and
//! only the author or an admin may change or remove one.

use serde_json::{json, Map, Value};

use crate::{accounts::{find_by_id, now_string},
            context::{RequestContext, Slot},
            escape::escape_html,
            markup,
            params::Param,
            plugin::{error, message, Operation, Plugin, PluginResult, Redirect},
            render::Renderer,
            storage::{Bound, Record},
            url_encoding::href};
use super::{form_error, guarded, object, text, Pagination};

pub const NEWS: &str = "news";
const PER_PAGE: i64 = 5;
const MAX_TITLE: usize = 200;
const MAX_CONTENT: usize = 20_000;

pub struct News;

/// Redirect target; not HTML-escaped.
fn location(op: &str, id: i64) -> String {
    format!("?o=News&m={op}&i={id}")
}

fn find(ctx: &RequestContext, id: i64) -> anyhow::Result<Option<Record>> {
    Ok(ctx.storage.read(NEWS, "id = ?", &[Bound::Int(id)])?)
}

fn may_edit(ctx: &RequestContext, record: &Record) -> bool {
    match &ctx.visitor {
        Some(v) => v.admin || record.get("author").and_then(Value::as_i64) == Some(v.id),
        None => false
    }
}

fn posted_form(ctx: &RequestContext, op: &str, id: i64) -> Value {
    json!({
        "op": op,
        "id": id,
        "title": ctx.form.get("title"),
        "content": ctx.form.get("content"),
    })
}

fn checked_fields(ctx: &RequestContext) -> Result<(String, String), &'static str> {
    let title = ctx.form.get("title");
    let content = ctx.form.get("content");
    if title.is_empty() {
        return Err("The title must not be empty.")
    }
    if title.chars().count() > MAX_TITLE {
        return Err("The title is too long.")
    }
    if content.chars().count() > MAX_CONTENT {
        return Err("The text is too long.")
    }
    Ok((title.into(), content.into()))
}

fn list(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let pattern = format!("%{}%", ctx.query());
    let (filter, params) = if ctx.query().is_empty() {
        ("", vec![])
    } else {
        ("title like ? or content like ?", vec![Bound::from(pattern.as_str()), pattern.into()])
    };
    let total = ctx.storage.count(NEWS, filter, &params)?;
    let pagination = Pagination::new(ctx.page(), total, PER_PAGE);
    let rows = ctx.storage.list(NEWS, filter, &params, pagination.window("created desc, id desc"))?;
    let items: Vec<Value> = rows.iter().map(|r| json!({
        "id": r.get("id"),
        "title": text(r, "title"),
        "created": text(r, "created"),
    })).collect();
    Ok(Ok(object(json!({
        "head": "News",
        "items": items,
        "pagination": pagination.to_json(),
    }))))
}

fn read(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let r = match find(ctx, ctx.id())? {
        Some(r) => r,
        None => return Ok(Ok(error("No such news item.")))
    };
    let author = match r.get("author").and_then(Value::as_i64) {
        Some(id) => find_by_id(ctx.storage, id)?.map(|u| u.login).unwrap_or_default(),
        None => String::new()
    };
    Ok(Ok(object(json!({
        "record": {
            "id": r.get("id"),
            "title": text(&r, "title"),
            "content": text(&r, "content"),
            "author": author,
            "created": text(&r, "created"),
            "updated": text(&r, "updated"),
        },
        "can_edit": may_edit(ctx, &r),
    }))))
}

fn create(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    if ! ctx.is_post {
        return Ok(Ok(object(json!({ "form": { "op": "create", "title": "", "content": "" } }))))
    }
    let (title, content) = match checked_fields(ctx) {
        Ok(fields) => fields,
        Err(msg) => return Ok(Ok(form_error(msg, posted_form(ctx, "create", 0))))
    };
    let author = match &ctx.visitor {
        Some(v) => v.id,
        None => return Ok(Ok(error("News items need a logged-in author.")))
    };
    let now = now_string();
    let id = ctx.storage.create(NEWS, &object(json!({
        "title": title,
        "content": content,
        "author": author,
        "created": now,
        "updated": now,
    })))?;
    ctx.flash("News item created.");
    Ok(Err(Redirect::to(location("read", id))))
}

/// The record if the visitor may change it, else the payload to show.
fn editable(ctx: &RequestContext) -> anyhow::Result<Result<Record, PluginResult>> {
    Ok(match find(ctx, ctx.id())? {
        None => Err(Ok(error("No such news item."))),
        Some(r) if ! may_edit(ctx, &r) =>
            Err(Ok(error("Only the author or an admin may change this item."))),
        Some(r) => Ok(r)
    })
}

fn update(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let r = match editable(ctx)? {
        Ok(r) => r,
        Err(shown) => return Ok(shown)
    };
    let id = ctx.id();
    if ! ctx.is_post {
        return Ok(Ok(object(json!({ "form": {
            "op": "update",
            "id": id,
            "title": text(&r, "title"),
            "content": text(&r, "content"),
        }}))))
    }
    let (title, content) = match checked_fields(ctx) {
        Ok(fields) => fields,
        Err(msg) => return Ok(Ok(form_error(msg, posted_form(ctx, "update", id))))
    };
    ctx.storage.update(NEWS, &object(json!({
        "title": title,
        "content": content,
        "updated": now_string(),
    })), "id = ?", &[Bound::Int(id)])?;
    ctx.flash("News item saved.");
    Ok(Err(Redirect::to(location("read", id))))
}

fn delete(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let r = match editable(ctx)? {
        Ok(r) => r,
        Err(shown) => return Ok(shown)
    };
    let id = ctx.id();
    if ! ctx.is_post {
        return Ok(Ok(object(json!({ "confirm": { "id": id, "title": text(&r, "title") } }))))
    }
    ctx.storage.delete(NEWS, "id = ?", &[Bound::Int(id)])?;
    ctx.flash("News item deleted.");
    Ok(Err(Redirect::to("?o=News")))
}

impl Plugin for News {
    fn name(&self) -> &'static str { "News" }

    fn list(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("News", "list", list(ctx))
    }

    fn read(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("News", "read", read(ctx))
    }

    fn create(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("News", "create", create(ctx))
    }

    fn update(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("News", "update", update(ctx))
    }

    fn delete(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("News", "delete", delete(ctx))
    }
}


pub struct NewsView;

fn target<'t>(op: &'t str, id: &'t str) -> [(Param, &'t str); 3] {
    [(Param::Plugin, "News"), (Param::Operation, op), (Param::Id, id)]
}

fn news_form(form: &Map<String, Value>) -> String {
    let op = text(form, "op");
    let id = form.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
    let fields = format!("{}{}",
                         markup::input_field("title", "Title", text(form, "title"), "text"),
                         markup::textarea_field("content", "Text", text(form, "content")));
    let id = if op == "update" { id } else { String::new() };
    markup::form(&target(op, &id), &fields, "Save")
}

fn search_form(query: &str) -> String {
    format!("<form method=\"get\" action=\"\" class=\"search\">\
             <input type=\"hidden\" name=\"o\" value=\"News\">\
             <input type=\"search\" name=\"q\" value=\"{query}\">\
             <button type=\"submit\">Search</button></form>\n")
}

impl NewsView {
    fn items(&self, ctx: &RequestContext, items: &[Value]) -> String {
        let mut out = search_form(ctx.query());
        if ctx.visitor.is_some() {
            out.push_str(&format!("<p>{}</p>\n",
                                  markup::link(&href(&target("create", "")), "Write news")));
        }
        if items.is_empty() {
            out.push_str("<p>No news.</p>\n");
        }
        for item in items.iter().filter_map(Value::as_object) {
            let id = item.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
            out.push_str(&format!("<article><h3>{}</h3><p class=\"meta\">{}</p></article>\n",
                                  markup::link(&href(&target("read", &id)), text(item, "title")),
                                  text(item, "created")));
        }
        if let Some(p) = ctx.payload.get("pagination") {
            out.push_str(&markup::pagination("News", ctx.query(), p));
        }
        markup::card("News", &out)
    }

    fn record(&self, ctx: &RequestContext, r: &Map<String, Value>) -> String {
        let id = r.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
        let mut out = format!("<p class=\"meta\">{} {}</p>\n<div class=\"content\">{}</div>\n",
                              text(r, "author"), text(r, "created"),
                              text(r, "content").replace('\n', "<br>\n"));
        if ctx.payload.get("can_edit").and_then(Value::as_bool).unwrap_or(false) {
            out.push_str(&format!("<p>{} {}</p>\n",
                                  markup::link(&href(&target("update", &id)), "Edit"),
                                  markup::link(&href(&target("delete", &id)), "Delete")));
        }
        markup::card(text(r, "title"), &out)
    }
}

impl Renderer for NewsView {
    fn render(&self, slot: Slot, _op: Option<Operation>, ctx: &RequestContext) -> Option<String> {
        if slot != Slot::Main {
            return None
        }
        let p = &ctx.payload;
        if let Some(form) = p.get("form").and_then(Value::as_object) {
            let mut out = message(p)
                .map(|(_, m)| markup::alert("danger", &escape_html(m)))
                .unwrap_or_default();
            out.push_str(&news_form(form));
            let head = if text(form, "op") == "update" { "Edit news" } else { "Write news" };
            return Some(markup::card(head, &out))
        }
        if let Some(c) = p.get("confirm").and_then(Value::as_object) {
            let id = c.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
            let body = format!("<p>Really delete &quot;{}&quot;?</p>\n{}",
                               text(c, "title"),
                               markup::form(&target("delete", &id), "", "Delete"));
            return Some(markup::card("Delete news", &body))
        }
        if let Some(r) = p.get("record").and_then(Value::as_object) {
            return Some(self.record(ctx, r))
        }
        if let Some(items) = p.get("items").and_then(Value::as_array) {
            return Some(self.items(ctx, items))
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{access::Visitor,
                accounts::{create_user, NewUser},
                context::RawInput,
                plugins::testing::{call, fixture, Fixture},
                storage::Storage};
    use super::*;

    fn visitor(f: &Fixture, login: &str, admin: bool) -> anyhow::Result<Visitor> {
        let id = create_user(&f.storage,
                             &NewUser::checked(login, "password1", "", "", "", admin)?)?;
        Ok(Visitor { id, login: login.into(), admin })
    }

    fn post(f: &Fixture, v: &Visitor, title: &str) -> anyhow::Result<i64> {
        let c = call(f, &News, None, Some(v.clone()), Operation::Create,
                     RawInput::post(&[], &[("title", title), ("content", "Some text")]))?;
        match c.result {
            Err(Redirect { location }) => {
                let id = location.rsplit('=').next().unwrap_or("").parse()?;
                Ok(id)
            }
            Ok(p) => anyhow::bail!("no redirect: {p:?}"),
        }
    }

    #[test]
    fn t_create_needs_author() -> anyhow::Result<()> {
        let f = fixture()?;
        let c = call(&f, &News, None, None, Operation::Create,
                     RawInput::post(&[], &[("title", "x")]))?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["error"], "News items need a logged-in author.");
        assert_eq!(f.storage.count(NEWS, "", &[])?, 0);
        Ok(())
    }

    #[test]
    fn t_create_list_read() -> anyhow::Result<()> {
        let f = fixture()?;
        let alice = visitor(&f, "alice", false)?;
        let id = post(&f, &alice, "Hello & welcome")?;
        for i in 0..5 {
            post(&f, &alice, &format!("Filler {i}"))?;
        }
        let c = call(&f, &News, Some(&NewsView), None, Operation::List, RawInput::default())?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["items"].as_array().map(Vec::len), Some(5));
        assert_eq!(p["pagination"]["pages"], 2);
        assert!(c.main.contains("page 1 of 2"));

        let c = call(&f, &News, None, None, Operation::List,
                     RawInput::get(&[("q", "welcome")]))?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["pagination"]["total"], 1);
        assert_eq!(p["items"][0]["title"], "Hello &amp; welcome");

        let c = call(&f, &News, Some(&NewsView), None, Operation::Read,
                     RawInput::get(&[("i", &id.to_string())]))?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["record"]["author"], "alice");
        assert_eq!(p["can_edit"], false);
        assert!(c.main.contains("<h2>Hello &amp; welcome</h2>"));
        assert!(! c.main.contains("Edit"));
        Ok(())
    }

    #[test]
    fn t_invalid_input_shows_form_again() -> anyhow::Result<()> {
        let f = fixture()?;
        let alice = visitor(&f, "alice", false)?;
        let c = call(&f, &News, Some(&NewsView), Some(alice), Operation::Create,
                     RawInput::post(&[], &[("title", "  "), ("content", "kept")]))?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["error"], "The title must not be empty.");
        assert!(c.main.contains("alert-danger"));
        assert!(c.main.contains(">kept</textarea>"));
        Ok(())
    }

    #[test]
    fn t_only_author_or_admin_changes() -> anyhow::Result<()> {
        let f = fixture()?;
        let alice = visitor(&f, "alice", false)?;
        let bob = visitor(&f, "bob", false)?;
        let root = visitor(&f, "root", true)?;
        let id = post(&f, &alice, "Mine")?;
        let i = id.to_string();

        let c = call(&f, &News, None, Some(bob), Operation::Update,
                     RawInput::post(&[("i", &i)], &[("title", "Stolen")]))?;
        assert!(c.result.unwrap_or_default().contains_key("error"));

        let c = call(&f, &News, None, Some(root), Operation::Update,
                     RawInput::post(&[("i", &i)], &[("title", "Fixed"), ("content", "")]))?;
        assert_eq!(c.result, Err(Redirect::to(location("read", id))));
        assert_eq!(c.flash.as_deref(), Some("News item saved."));
        let r = f.storage.read(NEWS, "id = ?", &[Bound::Int(id)])?.unwrap_or_default();
        assert_eq!(text(&r, "title"), "Fixed");
        Ok(())
    }

    #[test]
    fn t_delete_confirms_first() -> anyhow::Result<()> {
        let f = fixture()?;
        let alice = visitor(&f, "alice", false)?;
        let id = post(&f, &alice, "Going")?;
        let i = id.to_string();
        let c = call(&f, &News, Some(&NewsView), Some(alice.clone()), Operation::Delete,
                     RawInput::get(&[("i", &i)]))?;
        assert!(c.result.unwrap_or_default().contains_key("confirm"));
        assert!(c.main.contains("Really delete &quot;Going&quot;?"));
        assert_eq!(f.storage.count(NEWS, "", &[])?, 1);
        let c = call(&f, &News, None, Some(alice), Operation::Delete,
                     RawInput::post(&[("i", &i)], &[]))?;
        assert_eq!(c.result, Err(Redirect::to("?o=News")));
        assert_eq!(f.storage.count(NEWS, "", &[])?, 0);
        Ok(())
    }
}
