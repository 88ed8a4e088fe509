//! Command-line interface.

mod doctor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use doctor::run_doctor_command;

#[derive(Parser, Debug)]
#[command(name = "voteauth", version, about = "Wallet-signature auth and on-chain admin authority")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// TOML settings file (defaults to ~/.voteauth/config.toml when present).
        #[arg(long, env = "VOTEAUTH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Replace the persisted session epoch, invalidating every issued token
    /// once the gateway restarts.
    RotateEpoch {
        #[arg(long, env = "VOTEAUTH_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Check configuration, database, artifacts and chain reachability.
    Doctor {
        #[arg(long, env = "VOTEAUTH_CONFIG")]
        config: Option<PathBuf>,
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["voteauth", "serve", "--config", "/tmp/v.toml"]).unwrap();
        match cli.command {
            Command::Serve { config } => assert_eq!(config, Some(PathBuf::from("/tmp/v.toml"))),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["voteauth", "doctor", "--strict"]).unwrap();
        assert!(matches!(cli.command, Command::Doctor { strict: true, .. }));

        let cli = Cli::try_parse_from(["voteauth", "rotate-epoch"]).unwrap();
        assert!(matches!(cli.command, Command::RotateEpoch { .. }));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
