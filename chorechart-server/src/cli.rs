use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables
(a .env file in the working directory is loaded first):
  CONFIG_PATH            (default: ./config.yaml)
  DB_PATH                (default: data/app.db)
  PORT                   (default: 5151 or config.listen_port)
  CHORECHART_JWT_SECRET  (overrides config.jwt_secret)
  RUST_LOG               (default: info)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorechart-server",
    version,
    about = "ChoreChart family chore and reward server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bcrypt hash for use as `password_hash` in the config
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,
    },
    /// Load and validate a config file, then exit
    CheckConfig {
        /// Config file to check (defaults to CONFIG_PATH or ./config.yaml)
        path: Option<PathBuf>,
    },
}
