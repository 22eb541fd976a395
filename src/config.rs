//! CLI arguments, subcommands and server configuration defaults.

use clap::{Args, Parser, Subcommand, ValueEnum};
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_FILES_DIR: &str = "data";
pub const DEFAULT_DB_PATH: &str = "direct-upload.db";
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_HASH_COST: u32 = 12;
pub const MIN_HASH_COST: u32 = 10;
pub const MAX_HASH_COST: u32 = 31;
pub const DEFAULT_LOCK_WAIT_TIMEOUT_SECS: u64 = 30;
pub const LOCK_PRUNE_INTERVAL_SECS: u64 = 300;
pub const AUTH_REALM: &str = r#"Basic realm="direct-upload""#;

/// Credential repository backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One directory per user holding a `.credentials` file
    File,
    /// A single redb key-value file
    Kv,
}

#[derive(Parser, Debug)]
#[command(
    name = "direct-upload",
    version = VERSION_INFO,
    about = "Resumable direct upload server"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(
        short = 'l',
        long,
        global = true,
        env = "DU_VERBOSE",
        help = "Enable debug logging"
    )]
    pub verbose: bool,
    #[arg(
        short = 'f',
        long,
        global = true,
        env = "DU_FILES_DIR",
        default_value = DEFAULT_FILES_DIR,
        help = "Directory where users and uploaded files are stored"
    )]
    pub files: PathBuf,
    #[arg(
        long,
        global = true,
        env = "DU_BACKEND",
        value_enum,
        default_value_t = Backend::File,
        help = "Credential repository backend"
    )]
    pub backend: Backend,
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "DU_DB",
        default_value = DEFAULT_DB_PATH,
        help = "Database file for the kv backend"
    )]
    pub db: PathBuf,
    #[arg(
        long,
        global = true,
        env = "DU_HASH_COST",
        default_value_t = DEFAULT_HASH_COST,
        value_parser = clap::value_parser!(u32)
            .range(i64::from(MIN_HASH_COST)..=i64::from(MAX_HASH_COST)),
        help = "bcrypt cost factor for new password hashes"
    )]
    pub hash_cost: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the upload server
    Server(ServerArgs),
    /// Manage user credentials
    #[command(subcommand)]
    User(UserCommand),
    /// About direct-upload
    About,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(
        short = 'a',
        long,
        env = "DU_ADDRESS",
        default_value = DEFAULT_ADDRESS,
        help = "Address for the server to bind to"
    )]
    pub address: String,
    #[arg(short = 'c', long, env = "DU_CERT", help = "TLS certificate file, ie. ./fullcert.pem")]
    pub cert: Option<PathBuf>,
    #[arg(short = 'k', long, env = "DU_KEY", help = "TLS private key file, ie. ./key.pem")]
    pub key: Option<PathBuf>,
    #[arg(
        long,
        conflicts_with_all = ["cert", "key"],
        help = "Serve HTTPS with a generated self-signed certificate"
    )]
    pub self_signed: bool,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Add a user if it doesn't already exist
    Add(UserPasswordArgs),
    /// Change the password of an existing user
    ChangePassword(UserPasswordArgs),
    /// Delete a user and all of its uploads
    Del {
        #[arg(short = 'u', long)]
        username: String,
        #[arg(long, help = "Confirm deletion of the user and all its data")]
        yes: bool,
    },
    /// List usernames
    List,
    /// Toggle the administrator role of a user
    Role {
        #[arg(short = 'u', long)]
        username: String,
    },
}

#[derive(Args, Debug)]
pub struct UserPasswordArgs {
    #[arg(short = 'u', long)]
    pub username: String,
    #[arg(short = 'p', long, env = "DU_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn server_defaults() {
        let cli = Cli::try_parse_from(["direct-upload", "server"]).expect("parse");
        assert_eq!(cli.global.backend, Backend::File);
        assert_eq!(cli.global.hash_cost, DEFAULT_HASH_COST);
        let Command::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.address, DEFAULT_ADDRESS);
        assert!(args.cert.is_none() && !args.self_signed);
    }

    #[test]
    fn rejects_weak_hash_cost() {
        let result = Cli::try_parse_from(["direct-upload", "--hash-cost", "4", "user", "list"]);
        assert!(result.is_err());
    }

    #[test]
    fn user_add_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "direct-upload",
            "user",
            "add",
            "-u",
            "alice",
            "-p",
            "Secret123",
            "--backend",
            "kv",
        ])
        .expect("parse");
        assert_eq!(cli.global.backend, Backend::Kv);
        let Command::User(UserCommand::Add(args)) = cli.command else {
            panic!("expected user add");
        };
        assert_eq!(args.username, "alice");
        assert_eq!(args.password, "Secret123");
    }
}
