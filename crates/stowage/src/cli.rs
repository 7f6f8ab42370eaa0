use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "stowage")]
#[command(about = "Choose and configure where your backups are stored")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Write debug output to the log file
    #[arg(long, global = true)]
    pub debug: bool,

    /// Interface language (en, de). Defaults to the locale.
    #[arg(long, global = true, env = "STOWAGE_LANG")]
    pub lang: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the interactive setup wizard (the default)
    Setup,

    /// Print the saved configuration
    Show,

    /// Print the backup engine arguments for the saved destination, one per
    /// line
    Args {
        /// Append `--password` with the value of this environment variable
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
    },

    /// Test the connection to the saved destination
    Test,

    /// Install external tools such as tailscale or rclone
    Install {
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// List Tailscale peers, best candidates first
    Peers,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Setup)
    }
}
