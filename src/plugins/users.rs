//! Account administration. The descriptor requires an admin, so
//! everything here runs for admins only.

use serde_json::{json, Map, Value};

use crate::{accounts::{create_user, find_by_id, now_string, set_password, trimcheck_email,
                       trimcheck_name, AccountError, AccountErrorKind, NewUser, User, USERS},
            context::{RequestContext, Slot},
            escape::escape_html,
            markup,
            params::Param,
            plugin::{error, message, Operation, Plugin, PluginResult, Redirect},
            render::Renderer,
            storage::Bound,
            themes::read_link,
            url_encoding::href};
use super::{form_error, guarded, object, text, Pagination};

const PER_PAGE: i64 = 20;

pub struct Users;

fn user_json(u: &User) -> Value {
    json!({
        "id": u.id,
        "login": u.login,
        "fname": u.fname,
        "lname": u.lname,
        "email": u.email,
        "admin": u.admin,
    })
}

fn posted_form(ctx: &RequestContext, op: &str, id: i64) -> Value {
    json!({
        "op": op,
        "id": id,
        "login": ctx.form.get("login"),
        "fname": ctx.form.get("fname"),
        "lname": ctx.form.get("lname"),
        "email": ctx.form.get("email"),
        "admin": ctx.form.has("admin"),
    })
}

/// Errors caused by the input, to be shown with the form.
fn is_business(e: &AccountError) -> bool {
    matches!(e.kind(),
             AccountErrorKind::Input(_)
             | AccountErrorKind::LoginTaken(_)
             | AccountErrorKind::NoSuchLogin(_))
}

fn list(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let total = ctx.storage.count(USERS, "", &[])?;
    let pagination = Pagination::new(ctx.page(), total, PER_PAGE);
    let rows = ctx.storage.list(USERS, "", &[], pagination.window("login"))?;
    let items: Vec<Value> = rows.iter().filter_map(User::from_record)
        .map(|u| user_json(&u))
        .collect();
    Ok(Ok(object(json!({
        "head": "Users",
        "items": items,
        "pagination": pagination.to_json(),
    }))))
}

fn read(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    Ok(Ok(match find_by_id(ctx.storage, ctx.id())? {
        Some(u) => object(json!({ "record": user_json(&u) })),
        None => error("No such user.")
    }))
}

fn create(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    if ! ctx.is_post {
        return Ok(Ok(object(json!({ "form": { "op": "create", "admin": false } }))))
    }
    let created = NewUser::checked(
        ctx.form.get("login"),
        ctx.form.secret("password"),
        ctx.form.get("fname"),
        ctx.form.get("lname"),
        ctx.form.get("email"),
        ctx.form.has("admin"))
        .map_err(AccountError::from)
        .and_then(|user| create_user(ctx.storage, &user));
    match created {
        Ok(id) => {
            ctx.flash("User created.");
            Ok(Err(Redirect::to(format!("?o=Users&m=read&i={id}"))))
        }
        Err(e) if is_business(&e) => Ok(Ok(form_error(e, posted_form(ctx, "create", 0)))),
        Err(e) => Err(e.into())
    }
}

/// Apply the posted changes to user `u`; the login stays.
fn save_changes(ctx: &RequestContext, u: &User) -> Result<(), AccountError> {
    let fname = trimcheck_name("first name", ctx.form.get("fname"))?;
    let lname = trimcheck_name("last name", ctx.form.get("lname"))?;
    let email = trimcheck_email(ctx.form.get("email"))?;
    let password = ctx.form.secret("password");
    if ! password.is_empty() {
        set_password(ctx.storage, &u.login, password)?;
    }
    ctx.storage.update(USERS, &object(json!({
        "fname": fname,
        "lname": lname,
        "email": email,
        "admin": ctx.form.has("admin") as i64,
        "updated": now_string(),
    })), "id = ?", &[Bound::Int(u.id)])?;
    Ok(())
}

fn update(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let u = match find_by_id(ctx.storage, ctx.id())? {
        Some(u) => u,
        None => return Ok(Ok(error("No such user.")))
    };
    if ! ctx.is_post {
        let mut form = user_json(&u);
        form["op"] = "update".into();
        return Ok(Ok(object(json!({ "form": form }))))
    }
    match save_changes(ctx, &u) {
        Ok(()) => {
            ctx.flash("User saved.");
            Ok(Err(Redirect::to(format!("?o=Users&m=read&i={}", u.id))))
        }
        Err(e) if is_business(&e) => {
            let mut form = posted_form(ctx, "update", u.id);
            form["login"] = u.login.into();
            Ok(Ok(form_error(e, form)))
        }
        Err(e) => Err(e.into())
    }
}

fn delete(ctx: &mut RequestContext) -> anyhow::Result<PluginResult> {
    let id = ctx.id();
    if ctx.visitor.as_ref().map(|v| v.id) == Some(id) {
        return Ok(Ok(error("You cannot delete yourself.")))
    }
    let u = match find_by_id(ctx.storage, id)? {
        Some(u) => u,
        None => return Ok(Ok(error("No such user.")))
    };
    if ! ctx.is_post {
        return Ok(Ok(object(json!({ "confirm": { "id": id, "login": u.login } }))))
    }
    ctx.storage.delete(USERS, "id = ?", &[Bound::Int(id)])?;
    ctx.flash("User deleted.");
    Ok(Err(Redirect::to("?o=Users")))
}

impl Plugin for Users {
    fn name(&self) -> &'static str { "Users" }

    fn list(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("Users", "list", list(ctx))
    }

    fn read(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("Users", "read", read(ctx))
    }

    fn create(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("Users", "create", create(ctx))
    }

    fn update(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("Users", "update", update(ctx))
    }

    fn delete(&self, ctx: &mut RequestContext) -> PluginResult {
        guarded("Users", "delete", delete(ctx))
    }
}


pub struct UsersView;

fn target<'t>(op: &'t str, id: &'t str) -> [(Param, &'t str); 3] {
    [(Param::Plugin, "Users"), (Param::Operation, op), (Param::Id, id)]
}

fn user_form(form: &Map<String, Value>) -> String {
    let op = text(form, "op");
    let admin = form.get("admin").and_then(Value::as_bool).unwrap_or(false);
    let mut fields = String::new();
    if op == "create" {
        fields.push_str(&markup::input_field("login", "Login", text(form, "login"), "text"));
        fields.push_str(&markup::input_field("password", "Password", "", "password"));
    } else {
        fields.push_str(&format!("<p>Login: {}</p>\n", text(form, "login")));
        fields.push_str(&markup::input_field("password", "New password (leave empty to keep)",
                                             "", "password"));
    }
    fields.push_str(&markup::input_field("fname", "First name", text(form, "fname"), "text"));
    fields.push_str(&markup::input_field("lname", "Last name", text(form, "lname"), "text"));
    fields.push_str(&markup::input_field("email", "Email", text(form, "email"), "email"));
    fields.push_str(&markup::checkbox_field("admin", "Administrator", admin));
    let id = match op {
        "update" => form.get("id").and_then(Value::as_i64).unwrap_or(0).to_string(),
        _ => String::new()
    };
    markup::form(&target(op, &id), &fields, "Save")
}

impl Renderer for UsersView {
    fn render(&self, slot: Slot, _op: Option<Operation>, ctx: &RequestContext) -> Option<String> {
        if slot != Slot::Main {
            return None
        }
        let p = &ctx.payload;
        if let Some(form) = p.get("form").and_then(Value::as_object) {
            let mut out = message(p)
                .map(|(_, m)| markup::alert("danger", &escape_html(m)))
                .unwrap_or_default();
            out.push_str(&user_form(form));
            let head = if text(form, "op") == "update" { "Edit user" } else { "New user" };
            return Some(markup::card(head, &out))
        }
        if let Some(c) = p.get("confirm").and_then(Value::as_object) {
            let id = c.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
            let body = format!("<p>Really delete the account {}?</p>\n{}",
                               text(c, "login"),
                               markup::form(&target("delete", &id), "", "Delete"));
            return Some(markup::card("Delete user", &body))
        }
        if let Some(r) = p.get("record").and_then(Value::as_object) {
            let id = r.get("id").and_then(Value::as_i64).unwrap_or(0).to_string();
            let body = format!("{}<p>{} {}</p>\n",
                               markup::definition_list(r),
                               markup::link(&href(&target("update", &id)), "Edit"),
                               markup::link(&href(&target("delete", &id)), "Delete"));
            return Some(markup::card(text(r, "login"), &body))
        }
        if let Some(items) = p.get("items").and_then(Value::as_array) {
            let mut body = format!("<p>{}</p>\n",
                                   markup::link(&href(&target("create", "")), "New user"));
            body.push_str(&markup::table(items,
                                         Some(&["login", "fname", "lname", "email", "admin"]),
                                         read_link("Users")));
            if let Some(pg) = p.get("pagination") {
                body.push_str(&markup::pagination("Users", "", pg));
            }
            return Some(markup::card("Users", &body))
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{access::Visitor,
                accounts::{check_login, find_by_login},
                context::RawInput,
                plugins::testing::{call, fixture, Fixture}};
    use super::*;

    fn admin(f: &Fixture) -> anyhow::Result<Visitor> {
        let id = create_user(&f.storage,
                             &NewUser::checked("root", "password1", "", "", "", true)?)?;
        Ok(Visitor { id, login: "root".into(), admin: true })
    }

    #[test]
    fn t_create_and_list() -> anyhow::Result<()> {
        let f = fixture()?;
        let root = admin(&f)?;
        let c = call(&f, &Users, None, Some(root.clone()), Operation::Create,
                     RawInput::post(&[], &[("login", "alice"), ("password", "secret123"),
                                           ("fname", "Alice"), ("email", "a@example.com")]))?;
        assert!(matches!(c.result, Err(Redirect { .. })));
        assert_eq!(c.flash.as_deref(), Some("User created."));
        assert!(check_login(&f.storage, "alice", "secret123")?.is_some());

        let c = call(&f, &Users, Some(&UsersView), Some(root), Operation::List,
                     RawInput::default())?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["items"].as_array().map(Vec::len), Some(2));
        assert!(p["items"][0].get("hashed_pass").is_none());
        assert!(! c.main.contains("argon2"));
        assert!(c.main.contains("<th>login</th>"));
        Ok(())
    }

    #[test]
    fn t_bad_input_is_shown() -> anyhow::Result<()> {
        let f = fixture()?;
        let root = admin(&f)?;
        let c = call(&f, &Users, Some(&UsersView), Some(root.clone()), Operation::Create,
                     RawInput::post(&[], &[("login", "root"), ("password", "secret123")]))?;
        let p = c.result.unwrap_or_default();
        assert_eq!(p["error"], "login \"root\" is already taken");
        assert!(c.main.contains("alert-danger"));
        let c = call(&f, &Users, None, Some(root), Operation::Create,
                     RawInput::post(&[], &[("login", "bob"), ("password", "short")]))?;
        assert!(c.result.unwrap_or_default().contains_key("error"));
        assert!(find_by_login(&f.storage, "bob")?.is_none());
        Ok(())
    }

    #[test]
    fn t_update() -> anyhow::Result<()> {
        let f = fixture()?;
        let root = admin(&f)?;
        let id = create_user(&f.storage,
                             &NewUser::checked("alice", "password1", "", "", "", false)?)?;
        let i = id.to_string();
        let c = call(&f, &Users, None, Some(root.clone()), Operation::Update,
                     RawInput::get(&[("i", &i)]))?;
        assert_eq!(c.result.unwrap_or_default()["form"]["login"], "alice");
        let c = call(&f, &Users, None, Some(root), Operation::Update,
                     RawInput::post(&[("i", &i)], &[("lname", "Liddell"), ("admin", "1"),
                                                     ("password", "newpassword")]))?;
        assert_eq!(c.result, Err(Redirect::to(format!("?o=Users&m=read&i={id}"))));
        let u = check_login(&f.storage, "alice", "newpassword")?;
        assert_eq!(u.map(|u| (u.lname, u.admin)), Some(("Liddell".into(), true)));
        Ok(())
    }

    #[test]
    fn t_cannot_delete_self() -> anyhow::Result<()> {
        let f = fixture()?;
        let root = admin(&f)?;
        let i = root.id.to_string();
        let c = call(&f, &Users, None, Some(root.clone()), Operation::Delete,
                     RawInput::post(&[("i", &i)], &[]))?;
        assert_eq!(c.result.unwrap_or_default()["error"], "You cannot delete yourself.");
        assert!(find_by_login(&f.storage, "root")?.is_some());

        let id = create_user(&f.storage,
                             &NewUser::checked("alice", "password1", "", "", "", false)?)?;
        let c = call(&f, &Users, None, Some(root), Operation::Delete,
                     RawInput::post(&[("i", &id.to_string())], &[]))?;
        assert_eq!(c.result, Err(Redirect::to("?o=Users")));
        assert!(find_by_login(&f.storage, "alice")?.is_none());
        Ok(())
    }
}
