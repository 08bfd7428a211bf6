use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "threatfeed", version, about = "Live security alert feed client")]
pub struct Cli {
    /// Bearer token (falls back to the stored credential)
    #[arg(long, env = "THREATFEED_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// REST base URL, e.g. http://localhost:8000/api
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Live-update endpoint, e.g. ws://localhost:8000/ws/admin
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Where the encrypted credential is kept
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream live alerts merged with polled snapshots until Ctrl-C
    Watch {
        /// Don't raise notifications for critical/high alerts
        #[arg(long)]
        no_notify: bool,
    },
    /// Print pipeline and live-update server status
    Status,
    /// Store the --token credential, encrypted for this machine
    Login,
    /// Remove the stored credential
    Logout,
}
