//! Command-line interface definitions.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for any failure (configuration, IO, verification).
pub const EXIT_ERROR: i32 = 2;

const DEFAULT_CONFIG: &str = "paygate.toml";

/// The `paygate` command-line interface.
#[derive(Debug, Parser)]
#[command(name = "paygate", version, about = "Account-abstraction sponsorship service")]
pub struct Cli {
    /// Raise log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sponsorship daemon
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Audit log operations
    Audit {
        /// The audit operation to run.
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Configuration helpers
    Config {
        /// The configuration operation to run.
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Subcommands of `paygate audit`.
#[derive(Debug, Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log's HMAC chain end to end
    Verify {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

/// Subcommands of `paygate config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print a commented default configuration to stdout
    Print,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn test_serve_defaults_config_path() {
        let cli = Cli::try_parse_from(["paygate", "serve"]).expect("parse");
        match cli.command {
            Commands::Serve { config } => {
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_verbosity_is_counted_and_global() {
        let cli = Cli::try_parse_from(["paygate", "serve", "-vv"]).expect("parse");
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["paygate", "-v", "audit", "verify"]).expect("parse");
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_audit_verify_takes_config() {
        let cli = Cli::try_parse_from(["paygate", "audit", "verify", "--config", "/tmp/p.toml"])
            .expect("parse");
        match cli.command {
            Commands::Audit {
                command: AuditCommands::Verify { config },
            } => assert_eq!(config, PathBuf::from("/tmp/p.toml")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_print_parses() {
        let cli = Cli::try_parse_from(["paygate", "config", "print"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Print
            }
        ));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["paygate", "frobnicate"]).is_err());
    }
}
