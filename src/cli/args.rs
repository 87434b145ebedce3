//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Templar development server CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: templar.yml)
    #[arg(short = 'C', long, default_value = "templar.yml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new component project
    #[command(visible_alias = "i")]
    Init {
        /// Project directory name (relative to current directory)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        name: Option<PathBuf>,
    },

    /// Scan and build all components once
    #[command(visible_alias = "b")]
    Build,

    /// Start the development server with hot reload
    #[command(visible_alias = "s")]
    Serve {
        /// Bind host (e.g. localhost, 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable the filesystem watcher (incremental rebuilds)
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

impl Cli {
    pub fn is_init(&self) -> bool {
        matches!(self.command, Commands::Init { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from(["templar", "serve", "--port", "9000", "--host", "0.0.0.0"]);
        match cli.command {
            Commands::Serve { port, host, watch } => {
                assert_eq!(port, Some(9000));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(watch, None);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_watch_flag_forms() {
        let cli = Cli::parse_from(["templar", "serve", "--watch", "false"]);
        match cli.command {
            Commands::Serve { watch, .. } => assert_eq!(watch, Some(false)),
            _ => panic!("expected serve"),
        }

        let cli = Cli::parse_from(["templar", "serve", "-w"]);
        match cli.command {
            Commands::Serve { watch, .. } => assert_eq!(watch, Some(true)),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_build_alias() {
        let cli = Cli::parse_from(["templar", "b"]);
        assert!(matches!(cli.command, Commands::Build));
    }

    #[test]
    fn test_is_init() {
        let cli = Cli::parse_from(["templar", "init"]);
        assert!(cli.is_init());
    }
}
