//! Command-line interface for Bergelmir
//!
//! Provides main commands:
//! - `run` - Serve the capsule (the default when no command is given)
//! - `init` - Scaffold a new project directory

mod init;

pub use init::{build_config, run_init, scaffold};

use crate::config::CONFIG_FILE_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bergelmir - Gemini capsule server with a built-in onion service
#[derive(Parser, Debug)]
#[command(name = "bergelmir")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE_PATH)]
    pub config: PathBuf,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the capsule until interrupted
    Run,

    /// Create a config file, default pages and the Tor/HTML templates
    Init(InitArgs),
}

/// Arguments for init command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Publish the capsule as a Tor onion service
    #[arg(long, default_value_t = false)]
    pub tor: bool,

    /// Domain name the capsule answers to (repeatable)
    #[arg(long = "domain")]
    pub domains: Vec<String>,

    /// Gemini listening port
    #[arg(long, default_value_t = crate::gemini::DEFAULT_PORT)]
    pub gemini_port: u16,

    /// Listen on every interface instead of localhost only
    #[arg(long, default_value_t = false)]
    pub public: bool,

    /// Enable the HTTP gateway
    #[arg(long, default_value_t = false)]
    pub http: bool,

    /// HTTP gateway listening port
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Gemtext page the feed is generated from (enables /rss and /feed)
    #[arg(long)]
    pub rss_source: Option<String>,

    /// Title for HTML pages without a level-1 heading
    #[arg(long, default_value = "")]
    pub page_title: String,

    /// Overwrite an existing config file
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["bergelmir"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_init_flags() {
        let cli = Cli::try_parse_from([
            "bergelmir",
            "--config",
            "site/config.toml",
            "init",
            "--tor",
            "--domain",
            "example.org",
            "--domain",
            "www.example.org",
            "--http",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert!(args.tor);
                assert!(args.http);
                assert_eq!(args.domains, ["example.org", "www.example.org"]);
                assert_eq!(args.gemini_port, 1965);
                assert_eq!(args.http_port, 8080);
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
