//! Logging in and out.

use std::time::Instant;

use serde_json::{json, Value};

use crate::{access::{Visitor, HOME_TARGET, LOGIN_TARGET},
            accounts::{check_login, login_response_time},
            context::{RequestContext, Slot},
            escape::escape_html,
            markup,
            params::Param,
            plugin::{card, error, message, Operation, Plugin, PluginResult, Redirect},
            render::Renderer,
            warn};
use super::{object, text};

pub struct Auth;

fn logout_form() -> String {
    markup::form(&[(Param::Plugin, "Auth"), (Param::Operation, "delete")], "", "Log out")
}

impl Plugin for Auth {
    fn name(&self) -> &'static str { "Auth" }

    fn list(&self, ctx: &mut RequestContext) -> PluginResult {
        Ok(match &ctx.visitor {
            Some(v) => card("Account", &format!("<p>You are logged in as {}.</p>\n{}",
                                                escape_html(&v.login), logout_form())),
            None => object(json!({ "login_form": { "login": "" } }))
        })
    }

    fn create(&self, ctx: &mut RequestContext) -> PluginResult {
        if ! ctx.is_post {
            return self.list(ctx)
        }
        let start = Instant::now();
        let checked = check_login(ctx.storage, ctx.form.get("login"), ctx.form.secret("password"));
        if let Some(mean) = ctx.site.login_delay {
            ctx.respond_not_before = Some(login_response_time(start, mean));
        }
        match checked {
            Ok(Some(user)) => {
                Visitor::from(&user).store(ctx.session);
                ctx.flash(&format!("Logged in as {}.", user.login));
                Err(Redirect::to(HOME_TARGET))
            }
            Ok(None) => {
                ctx.flash("Wrong login or password.");
                Err(Redirect::to(LOGIN_TARGET))
            }
            Err(e) => {
                warn!("Auth create: {e}");
                Ok(object(json!({
                    "error": "Logging in is not possible right now.",
                    "login_form": { "login": ctx.form.get("login") },
                })))
            }
        }
    }

    fn delete(&self, ctx: &mut RequestContext) -> PluginResult {
        if ctx.visitor.is_none() {
            return Ok(error("You are not logged in."))
        }
        Visitor::clear(ctx.session);
        ctx.flash("Logged out.");
        Err(Redirect::to(HOME_TARGET))
    }
}


pub struct AuthView;

impl Renderer for AuthView {
    fn render(&self, slot: Slot, _op: Option<Operation>, ctx: &RequestContext) -> Option<String> {
        let form = match (slot, ctx.payload.get("login_form").and_then(Value::as_object)) {
            (Slot::Main, Some(form)) => form,
            _ => return None
        };
        let mut out = message(&ctx.payload)
            .map(|(_, m)| markup::alert("danger", &escape_html(m)))
            .unwrap_or_default();
        let fields = format!("{}{}",
                             markup::input_field("login", "Login", text(form, "login"), "text"),
                             markup::input_field("password", "Password", "", "password"));
        out.push_str(&markup::form(&[(Param::Plugin, "Auth"), (Param::Operation, "create")],
                                   &fields, "Log in"));
        Some(markup::card("Log in", &out))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{accounts::{create_user, find_by_id, NewUser},
                context::RawInput,
                plugins::testing::{call, fixture}};
    use super::*;

    #[test]
    fn t_login_form() -> anyhow::Result<()> {
        let f = fixture()?;
        let c = call(&f, &Auth, Some(&AuthView), None, Operation::List, RawInput::default())?;
        assert!(c.main.contains("name=\"password\""));
        assert!(c.main.contains("action=\"?o=Auth&amp;m=create\""));
        Ok(())
    }

    #[test]
    fn t_login_and_logout() -> anyhow::Result<()> {
        let mut f = fixture()?;
        f.site.login_delay = Some(Duration::from_millis(50));
        let id = create_user(&f.storage,
                             &NewUser::checked("alice", "password1", "", "", "", false)?)?;

        let c = call(&f, &Auth, None, None, Operation::Create,
                     RawInput::post(&[], &[("login", "alice"), ("password", "wrong one")]))?;
        assert_eq!(c.result, Err(Redirect::to(LOGIN_TARGET)));
        assert_eq!(c.flash.as_deref(), Some("Wrong login or password."));
        assert!(c.respond_not_before.is_some());
        assert_eq!(Visitor::session_user_id(&c.session), None);

        let c = call(&f, &Auth, None, None, Operation::Create,
                     RawInput::post(&[], &[("login", "alice"), ("password", "password1")]))?;
        assert_eq!(c.result, Err(Redirect::to(HOME_TARGET)));
        assert_eq!(Visitor::session_user_id(&c.session), Some(id));
        let v = find_by_id(&f.storage, id)?.as_ref().map(Visitor::from);
        assert_eq!(v.as_ref().map(|v| v.login.as_str()), Some("alice"));

        let c = call(&f, &Auth, None, v, Operation::Delete, RawInput::post(&[], &[]))?;
        assert_eq!(c.result, Err(Redirect::to(HOME_TARGET)));
        assert_eq!(c.flash.as_deref(), Some("Logged out."));
        assert_eq!(Visitor::session_user_id(&c.session), None);
        Ok(())
    }

    #[test]
    fn t_no_delay_in_development() -> anyhow::Result<()> {
        let f = fixture()?;
        let c = call(&f, &Auth, None, None, Operation::Create,
                     RawInput::post(&[], &[("login", "nobody"), ("password", "whatever1")]))?;
        assert!(c.respond_not_before.is_none());
        Ok(())
    }
}
