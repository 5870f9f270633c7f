//! `open8055server`: network server for Open8055 cards and administration
//! of its users file.

mod serve;
mod user;

use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use open8055_core::constants::SERVER_VERSION;
use tracing_subscriber::EnvFilter;

use crate::serve::ServeArgs;
use crate::user::UserArgs;

#[derive(Debug, Parser)]
#[command(name = "open8055server")]
#[command(version = SERVER_VERSION)]
#[command(about = "Network server for Open8055 USB experiment cards")]
#[command(long_about = "Open8055 network server\n\n\
    Run the server:      open8055server serve\n\
    Without hardware:    open8055server serve --simulate 2\n\
    Add a user:          open8055server user add alice\n\
    Change a password:   open8055server user update alice\n\n\
    SIGHUP reloads the configuration, SIGINT and SIGTERM stop the server.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More log output (-v debug, -vv trace). Without it RUST_LOG applies.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accept clients until stopped by a signal
    Serve(ServeArgs),

    /// Add, change or remove users
    User(UserArgs),
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Serve(args) => serve::run(args).await,
        Command::User(args) => user::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("open8055server: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["open8055server", "serve", "-vv", "--simulate", "2"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Serve(args) => assert_eq!(args.simulate, Some(2)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["open8055server"]).is_err());
    }
}
