use std::io::Write;

use anyhow::{anyhow, bail, Result};
use clap::Parser as ClapParser;
use plugsite::{accounts::{create_user, delete_user, find_by_login, list_users, set_admin,
                          set_password, trimcheck_login, NewUser},
               config::database_path_from_env,
               escape::sanitize,
               storage::sqlite_store::SqliteStorage};


fn try_ask_input(ask: &str) -> Result<Option<String>> {
    let mut outp = std::io::stdout().lock();
    write!(&mut outp, "{ask}: ")?;
    outp.flush()?;
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line)? == 0 {
        Ok(None)
    } else {
        Ok(Some(line.trim_end().into()))
    }
}

fn ask_input(ask: &str) -> Result<String> {
    try_ask_input(ask)?.ok_or_else(|| anyhow!("cancelled by user"))
}

#[derive(clap::Parser, Debug)]
/// Manage the user accounts of a plugsite database (found via the
/// DATADIR env var unless --db is given).
struct Args {
    /// Action, one of "create-user", "passwd", "set-admin",
    /// "unset-admin", "delete" or "list".
    #[clap(required(true))]
    action: String,

    /// The user with this login
    #[clap(long)]
    user: Option<String>,

    /// Create the user as an administrator
    #[clap(long)]
    admin: bool,

    /// Path to the sqlite database
    #[clap(long)]
    db: Option<String>,
}

impl Args {
    fn login(&self) -> Result<&str> {
        Ok(trimcheck_login(self.user.as_deref().ok_or_else(
            || anyhow!("need --user option"))?)?)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let storage = match &args.db {
        Some(path) => SqliteStorage::open(path)?,
        None => SqliteStorage::open(database_path_from_env()?)?,
    };
    match &*args.action {
        "create-user" => {
            let login = args.login()?;
            if let Some((user, _)) = find_by_login(&storage, login)? {
                bail!("already got user with login {login:?}, named {:?}",
                      user.display_name());
            }
            let fname = sanitize(&ask_input("first name")?);
            let lname = sanitize(&ask_input("last name")?);
            let email = sanitize(&ask_input("email (optional)")?);
            let password = ask_input("new password")?;
            let id = create_user(&storage, &NewUser::checked(
                login, &password, &fname, &lname, &email, args.admin)?)?;
            println!("created user {login:?} with id {id}");
            Ok(())
        }
        "passwd" => {
            let login = args.login()?;
            if find_by_login(&storage, login)?.is_none() {
                bail!("There's no user with login {login:?}")
            }
            let password = ask_input("new password")?;
            Ok(set_password(&storage, login, &password)?)
        }
        "set-admin" => Ok(set_admin(&storage, args.login()?, true)?),
        "unset-admin" => Ok(set_admin(&storage, args.login()?, false)?),
        "delete" => Ok(delete_user(&storage, args.login()?)?),
        "list" => {
            for user in list_users(&storage)? {
                println!("{}\t{}\t{}\t{}{}",
                         user.id, user.login, user.display_name(), user.email,
                         if user.admin { "\tadmin" } else { "" });
            }
            Ok(())
        }
        _ => bail!("invalid action name")
    }
}
