//! User accounts in the `users` collection: password hashing, input
//! checks, and the lookups the Users and Auth plugins and the
//! `plugsite-users` tool share.

use std::{ops::RangeInclusive, time::{Duration, Instant}};

use argon2::{
    password_hash::{
        rand_core::OsRng,
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString
    },
    Argon2
};
use chrono::Utc;
use rand::{thread_rng, Rng};
use rand_distr::Weibull;
use serde_json::{json, Value};

use crate::{def_boxed_thiserror,
            storage::{Bound, Record, Storage, StorageError, Window}};

pub const USERS: &str = "users";

def_boxed_thiserror!(HashingError, pub enum HashingErrorKind {
    #[error("argon2 hashing error: {0}")]
    Argon2(argon2::password_hash::Error),
});
impl From<argon2::password_hash::Error> for HashingErrorKind {
    fn from(e: argon2::password_hash::Error) -> Self {
        HashingErrorKind::Argon2(e)
    }
}

pub fn create_password_hash(password: &str) -> Result<String, HashingError> {
    let salt = SaltString::generate(&mut OsRng);
    // Argon2id v19, PHC string format
    let pw = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(pw.to_string())
}

pub fn verify_password(password: &str,
                       existing_hash: &str) -> Result<bool, HashingError> {
    let parsed_hash = PasswordHash::new(existing_hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into())
    }
}

/// When to answer a login attempt: about `mean` after `start`, with a
/// little jitter, so that response times don't tell whether a login
/// name exists.
pub fn login_response_time(start: Instant, mean: Duration) -> Instant {
    let micros = mean.as_micros() as f64;
    let jittered = match Weibull::new(micros, 20.) {
        Ok(dist) => thread_rng().sample(dist),
        Err(_) => micros,
    };
    start + Duration::from_micros(jittered as u64)
}

pub fn sleep_until(target: Instant) {
    let now = Instant::now();
    if target > now {
        std::thread::sleep(target - now);
    }
}

// number of characters
const LENRANGE_LOGIN: RangeInclusive<usize> = 2..=20;
const LENRANGE_PASSWORD: RangeInclusive<usize> = 8..=200;
const LENRANGE_EMAIL: RangeInclusive<usize> = 3..=120;
const LENRANGE_NAME: RangeInclusive<usize> = 0..=60;

def_boxed_thiserror!(InputCheckFailure, pub enum InputCheckFailureKind {
    #[error("{0} is too long, must be {1:?} characters")]
    TooLong(&'static str, RangeInclusive<usize>),
    #[error("{0} is too short, must be {1:?} characters")]
    TooShort(&'static str, RangeInclusive<usize>),
    #[error("{0} contains the \\0 character")]
    ContainsNull(&'static str),
    #[error("{0} may only contain letters, digits and . _ -")]
    InvalidCharacter(&'static str),
    #[error("{0} is missing the '@' character")]
    MissingAt(&'static str),
});

fn trimcheck<'s>(
    fieldname: &'static str,
    len_range: RangeInclusive<usize>,
    s: &'s str
) -> Result<&'s str, InputCheckFailure>
{
    if s.contains('\0') {
        Err(InputCheckFailureKind::ContainsNull(fieldname))?
    }
    let s = s.trim();
    let len = s.chars().count();
    if len < *len_range.start() {
        Err(InputCheckFailureKind::TooShort(fieldname, len_range))?
    } else if len > *len_range.end() {
        Err(InputCheckFailureKind::TooLong(fieldname, len_range))?
    } else {
        Ok(s)
    }
}

pub fn trimcheck_login(s: &str) -> Result<&str, InputCheckFailure> {
    let s = trimcheck("login", LENRANGE_LOGIN, s)?;
    if s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        Ok(s)
    } else {
        Err(InputCheckFailureKind::InvalidCharacter("login"))?
    }
}

pub fn trimcheck_password(s: &str) -> Result<&str, InputCheckFailure> {
    trimcheck("password", LENRANGE_PASSWORD, s)
}

pub fn trimcheck_name<'s>(fieldname: &'static str, s: &'s str) -> Result<&'s str, InputCheckFailure> {
    trimcheck(fieldname, LENRANGE_NAME, s)
}

/// Empty means no email address.
pub fn trimcheck_email(s: &str) -> Result<&str, InputCheckFailure> {
    let s = s.trim();
    if s.is_empty() {
        Ok(s)
    } else if s.contains('@') {
        trimcheck("email", LENRANGE_EMAIL, s)
    } else {
        Err(InputCheckFailureKind::MissingAt("email"))?
    }
}

def_boxed_thiserror!(AccountError, pub enum AccountErrorKind {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Hashing(#[from] HashingError),
    #[error("{0}")]
    Input(#[from] InputCheckFailure),
    #[error("login {0:?} is already taken")]
    LoginTaken(String),
    #[error("no user with login {0:?}")]
    NoSuchLogin(String),
});

/// A row of `users`, without the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub admin: bool,
}

impl User {
    pub fn from_record(r: &Record) -> Option<Self> {
        let s = |k: &str| r.get(k).and_then(Value::as_str).unwrap_or("").to_string();
        Some(User {
            id: r.get("id")?.as_i64()?,
            login: r.get("login")?.as_str()?.into(),
            fname: s("fname"),
            lname: s("lname"),
            email: s("email"),
            admin: r.get("admin").and_then(Value::as_i64).unwrap_or(0) != 0,
        })
    }

    /// "fname lname", or the login if both are empty.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.fname, self.lname);
        let full = full.trim();
        if full.is_empty() { self.login.clone() } else { full.into() }
    }
}

/// The fields of a new user, already checked.
#[derive(Debug, Clone)]
pub struct NewUser<'t> {
    pub login: &'t str,
    pub password: &'t str,
    pub fname: &'t str,
    pub lname: &'t str,
    pub email: &'t str,
    pub admin: bool,
}

impl<'t> NewUser<'t> {
    pub fn checked(login: &'t str, password: &'t str, fname: &'t str, lname: &'t str,
                   email: &'t str, admin: bool) -> Result<Self, InputCheckFailure> {
        Ok(NewUser {
            login: trimcheck_login(login)?,
            password: trimcheck_password(password)?,
            fname: trimcheck_name("first name", fname)?,
            lname: trimcheck_name("last name", lname)?,
            email: trimcheck_email(email)?,
            admin,
        })
    }
}

pub fn now_string() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn record(v: Value) -> Record {
    match v {
        Value::Object(m) => m,
        _ => Record::new()
    }
}

pub fn find_by_login(storage: &dyn Storage, login: &str)
                     -> Result<Option<(User, String)>, AccountError> {
    let r = storage.read(USERS, "login = ?", &[login.into()])?;
    Ok(r.and_then(|r| {
        let hash = r.get("hashed_pass")?.as_str()?.to_string();
        Some((User::from_record(&r)?, hash))
    }))
}

pub fn find_by_id(storage: &dyn Storage, id: i64) -> Result<Option<User>, AccountError> {
    let r = storage.read(USERS, "id = ?", &[Bound::Int(id)])?;
    Ok(r.as_ref().and_then(User::from_record))
}

pub fn create_user(storage: &dyn Storage, user: &NewUser) -> Result<i64, AccountError> {
    if find_by_login(storage, user.login)?.is_some() {
        Err(AccountErrorKind::LoginTaken(user.login.into()))?
    }
    let now = now_string();
    Ok(storage.create(USERS, &record(json!({
        "login": user.login,
        "hashed_pass": create_password_hash(user.password)?,
        "fname": user.fname,
        "lname": user.lname,
        "email": user.email,
        "admin": user.admin as i64,
        "created": now,
        "updated": now,
    })))?)
}

pub fn set_password(storage: &dyn Storage, login: &str, password: &str) -> Result<(), AccountError> {
    let password = trimcheck_password(password)?;
    let n = storage.update(USERS, &record(json!({
        "hashed_pass": create_password_hash(password)?,
        "updated": now_string(),
    })), "login = ?", &[login.into()])?;
    if n == 0 {
        Err(AccountErrorKind::NoSuchLogin(login.into()))?
    }
    Ok(())
}

pub fn set_admin(storage: &dyn Storage, login: &str, admin: bool) -> Result<(), AccountError> {
    let n = storage.update(USERS, &record(json!({
        "admin": admin as i64,
        "updated": now_string(),
    })), "login = ?", &[login.into()])?;
    if n == 0 {
        Err(AccountErrorKind::NoSuchLogin(login.into()))?
    }
    Ok(())
}

pub fn delete_user(storage: &dyn Storage, login: &str) -> Result<(), AccountError> {
    if storage.delete(USERS, "login = ?", &[login.into()])? == 0 {
        Err(AccountErrorKind::NoSuchLogin(login.into()))?
    }
    Ok(())
}

pub fn list_users(storage: &dyn Storage) -> Result<Vec<User>, AccountError> {
    let rows = storage.list(USERS, "", &[], Window { order: "login", limit: -1, offset: 0 })?;
    Ok(rows.iter().filter_map(User::from_record).collect())
}

/// The user if `login` exists and `password` matches. The password
/// goes through the same check as when it was set, so surrounding
/// whitespace is ignored the same way; one that could never have been
/// set just doesn't match.
pub fn check_login(storage: &dyn Storage, login: &str, password: &str)
                   -> Result<Option<User>, AccountError> {
    let password = match trimcheck_password(password) {
        Ok(p) => p,
        Err(_) => return Ok(None),
    };
    match find_by_login(storage, login.trim())? {
        Some((user, hash)) =>
            if verify_password(password, &hash)? { Ok(Some(user)) } else { Ok(None) },
        None => Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::sqlite_store::SqliteStorage;

    use super::*;

    #[test]
    fn t_password_hash() -> anyhow::Result<()> {
        let h = create_password_hash("correct horse")?;
        assert!(h.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &h)?);
        assert!(! verify_password("wrong horse", &h)?);
        assert!(verify_password("x", "not a hash").is_err());
        Ok(())
    }

    #[test]
    fn t_trimcheck() {
        assert_eq!(trimcheck_login(" alice ").ok(), Some("alice"));
        assert!(trimcheck_login("a").is_err());
        assert!(trimcheck_login("al ice").is_err());
        assert!(trimcheck_login("&lt;x&gt;").is_err());
        assert!(trimcheck_password("short").is_err());
        assert!(trimcheck_password("long enough").is_ok());
        assert!(trimcheck_password("nul\0in the middle").is_err());
        assert_eq!(trimcheck_email("").ok(), Some(""));
        assert!(trimcheck_email("nobody").is_err());
        assert_eq!(trimcheck_email(" a@b.ch ").ok(), Some("a@b.ch"));
    }

    #[test]
    fn t_login_response_time() {
        let start = Instant::now();
        let t = login_response_time(start, Duration::from_millis(100));
        let d = t - start;
        assert!(d > Duration::from_millis(50) && d < Duration::from_millis(150));
    }

    #[test]
    fn t_user_lifecycle() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = SqliteStorage::open(dir.path().join("u.sqlite"))?;
        let new = NewUser::checked("alice", "s3cret pass", "Alice", "", "", true)?;
        let id = create_user(&st, &new)?;
        assert!(create_user(&st, &new).is_err());

        let u = find_by_id(&st, id)?.expect("exists");
        assert_eq!(u.login, "alice");
        assert!(u.admin);
        assert_eq!(u.display_name(), "Alice");

        assert_eq!(check_login(&st, "alice", "s3cret pass")?.map(|u| u.id), Some(id));
        assert_eq!(check_login(&st, "alice", "wrong")?, None);
        assert_eq!(check_login(&st, "bob", "s3cret pass")?, None);

        set_password(&st, "alice", "another pass")?;
        assert!(check_login(&st, "alice", "another pass")?.is_some());
        set_admin(&st, "alice", false)?;
        assert!(! find_by_id(&st, id)?.expect("exists").admin);
        assert!(set_admin(&st, "bob", true).is_err());

        assert_eq!(list_users(&st)?.len(), 1);
        delete_user(&st, "alice")?;
        assert!(delete_user(&st, "alice").is_err());
        assert!(list_users(&st)?.is_empty());
        Ok(())
    }

    #[test]
    fn t_login_with_password_as_typed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let st = SqliteStorage::open(dir.path().join("u.sqlite"))?;
        create_user(&st, &NewUser::checked("alice", " secret-pw ", "", "", "", false)?)?;
        assert!(check_login(&st, "alice", " secret-pw ")?.is_some());
        assert!(check_login(&st, "alice", "secret-pw")?.is_some());
        assert!(check_login(&st, "alice", "short")?.is_none());
        Ok(())
    }
}
