//! `user` subcommand: edit the users file.
//!
//! Passwords are stored as `md5` hashes. The file is rewritten through a
//! temporary file readable by the owner only.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use open8055_access::{UserRecord, UserStore};
use open8055_server::ServerConfig;
use tracing::info;

#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,

    /// Configuration file naming the users file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Users file, overrides the configuration
    #[arg(short = 'f', long, global = true, value_name = "FILE")]
    pub users_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Add a new user
    Add(UserOptions),
    /// Change an existing user
    Update(UserOptions),
    /// Add the user, or change it if it exists
    Set(UserOptions),
    /// Remove a user
    Delete {
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct UserOptions {
    pub name: String,

    /// Grant admin rights
    #[arg(short = 'A', long, conflicts_with = "no_admin")]
    pub admin: bool,

    /// Revoke admin rights
    #[arg(short = 'N', long)]
    pub no_admin: bool,

    /// New password. Prompted for when not given; an empty answer keeps
    /// the current password.
    #[arg(short, long)]
    pub password: Option<String>,
}

impl UserOptions {
    fn admin_flag(&self) -> Option<bool> {
        match (self.admin, self.no_admin) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

pub fn run(args: UserArgs) -> anyhow::Result<()> {
    let path = match &args.users_file {
        Some(path) => path.clone(),
        None => ServerConfig::locate(args.config.as_deref())
            .context("loading configuration")?
            .users_path(),
    };

    let password = match &args.action {
        UserAction::Delete { .. } => None,
        UserAction::Add(options) | UserAction::Update(options) | UserAction::Set(options) => {
            match &options.password {
                Some(password) => Some(password.clone()),
                None => prompt_password(&options.name)?,
            }
        }
    };

    let mut store =
        UserStore::load_or_default(&path).with_context(|| format!("reading {}", path.display()))?;
    apply(&mut store, &args.action, password.as_deref())?;
    store
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(users_file = %path.display(), "users file updated");
    Ok(())
}

fn prompt_password(name: &str) -> anyhow::Result<Option<String>> {
    let password = inquire::Password::new(&format!("New password for {name}:"))
        .with_help_message("leave empty to keep the current password")
        .with_display_mode(inquire::PasswordDisplayMode::Hidden)
        .prompt()
        .context("reading password")?;
    Ok(Some(password).filter(|p| !p.is_empty()))
}

/// Apply `action` to `store`. `password` is in clear text.
fn apply(store: &mut UserStore, action: &UserAction, password: Option<&str>) -> anyhow::Result<()> {
    match action {
        UserAction::Add(options) => {
            let password = password.context("a new user needs a password")?;
            let record = UserRecord::with_password(
                options.name.as_str(),
                options.admin_flag().unwrap_or(false),
                password,
            )?;
            store.add(record)?;
        }
        UserAction::Update(options) => {
            store.update(&options.name, options.admin_flag(), password)?;
        }
        UserAction::Set(options) => {
            store.upsert(&options.name, options.admin_flag(), password)?;
        }
        UserAction::Delete { name } => store.remove(name)?,
    }
    Ok(())
}
