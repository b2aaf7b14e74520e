//! Who is visiting, and whether they may open a plugin.

use crate::{accounts::{find_by_id, User},
            registry::PluginDescriptor,
            session::Session,
            storage::Storage,
            warn};

/// Where visitors without login are sent.
pub const LOGIN_TARGET: &str = "?o=Auth";
/// Where logged-in visitors lacking privileges are sent.
pub const HOME_TARGET: &str = "?o=Home";

const KEY_ID: &str = "visitor:id";

/// A logged-in visitor, as currently stored in the users table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub id: i64,
    pub login: String,
    pub admin: bool,
}

impl From<&User> for Visitor {
    fn from(user: &User) -> Self {
        Visitor { id: user.id, login: user.login.clone(), admin: user.admin }
    }
}

impl Visitor {
    /// The user id the session is logged in as.
    pub fn session_user_id(session: &Session) -> Option<i64> {
        session.get_opt(KEY_ID)?.parse().ok()
    }

    /// Only the id lives in the session; login and privileges are
    /// looked up on every request. A user that no longer exists is
    /// logged out. On storage failure the request is handled as
    /// anonymous, but the session is kept.
    pub fn from_session(session: &mut Session, storage: &dyn Storage) -> Option<Self> {
        let id = Self::session_user_id(session)?;
        match find_by_id(storage, id) {
            Ok(Some(user)) => Some(Visitor::from(&user)),
            Ok(None) => {
                Self::clear(session);
                None
            }
            Err(e) => {
                warn!("looking up visitor {id}: {e}");
                None
            }
        }
    }

    pub fn store(&self, session: &mut Session) {
        session.set_sticky(KEY_ID, &self.id.to_string());
    }

    pub fn clear(session: &mut Session) {
        session.remove(KEY_ID);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny { redirect: String, message: String },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    pub login_target: String,
    pub home_target: String,
}

impl Default for AccessGate {
    fn default() -> Self {
        AccessGate {
            login_target: LOGIN_TARGET.into(),
            home_target: HOME_TARGET.into(),
        }
    }
}

impl AccessGate {
    /// Decided by the descriptor alone: plugin-wide `auth`/`admin`,
    /// and `auth_ops` naming single operations that need a login.
    pub fn decide(&self, visitor: Option<&Visitor>, descriptor: &PluginDescriptor, op: &str)
                  -> AccessDecision
    {
        let needs_login = descriptor.auth || descriptor.admin
            || descriptor.auth_ops.iter().any(|o| o == op);
        match visitor {
            None if needs_login =>
                AccessDecision::Deny {
                    redirect: self.login_target.clone(),
                    message: format!("Please log in to {op} {}.", descriptor.label),
                },
            Some(v) if descriptor.admin && ! v.admin =>
                AccessDecision::Deny {
                    redirect: self.home_target.clone(),
                    message: format!("You may not {op} {}.", descriptor.label),
                },
            _ => AccessDecision::Allow
        }
    }

    /// Whether navigation should offer `descriptor` to `visitor`.
    pub fn can_open(&self, visitor: Option<&Visitor>, descriptor: &PluginDescriptor) -> bool {
        self.decide(visitor, descriptor, "list").is_allowed()
    }
}
