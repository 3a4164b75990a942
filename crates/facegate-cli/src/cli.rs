use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facegate",
    about = "Enroll face embeddings and authenticate probes against them",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a new identity with one or more embedding vectors
    Register(RegisterArgs),
    /// Match probe vectors against every enrolled identity and issue a session token
    Authenticate(AuthenticateArgs),
    /// List enrolled identities without exposing their vectors
    Identities(IdentitiesArgs),
    /// Session token utilities
    #[command(subcommand)]
    Token(TokenCommands),
    /// Secret Service utilities
    #[command(subcommand)]
    Keyring(KeyringCommands),
    /// Diagnose configuration, store and key setup
    Doctor,
}

/// Flags shared by every command that opens the embedding store.
#[derive(Debug, Clone, Default, Args)]
pub struct EngineArgs {
    /// Configuration file to read instead of the default search paths
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Embedding store directory (overrides $FACEGATE_STORE_DIR and the config file)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    /// Identity name (letters, digits, '-', '_' or '.')
    #[arg(long)]
    pub name: String,

    /// JSON file holding the vectors to enroll
    #[arg(long)]
    pub vectors: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Clone, Args)]
pub struct AuthenticateArgs {
    /// JSON file holding one or more probe vectors
    #[arg(long)]
    pub probe: PathBuf,

    /// Override the configured match threshold (exclusive Euclidean distance)
    #[arg(long)]
    pub threshold: Option<f64>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct IdentitiesArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Clone, Subcommand)]
pub enum TokenCommands {
    /// Verify a session token's signature and expiry
    Verify(TokenVerifyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TokenVerifyArgs {
    /// The compact token string printed by `authenticate`
    pub token: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum KeyringCommands {
    /// Verify that the Secret Service is reachable
    Check(KeyringCheckArgs),
    /// Generate and store the session signing key
    Init(KeyringInitArgs),
}

#[derive(Debug, Clone, Args)]
pub struct KeyringCheckArgs {}

#[derive(Debug, Clone, Default, Args)]
pub struct KeyringInitArgs {
    /// Replace keys that already exist
    #[arg(long)]
    pub force: bool,

    /// Also generate the at-rest store encryption key
    #[arg(long)]
    pub store_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn authenticate_parses_threshold_and_store_dir() {
        let cli = Cli::try_parse_from([
            "facegate",
            "--json",
            "authenticate",
            "--probe",
            "probe.json",
            "--threshold",
            "0.45",
            "--store-dir",
            "/tmp/store",
        ])
        .unwrap();
        assert_eq!(cli.output_mode(), OutputMode::Json);
        match cli.command {
            Commands::Authenticate(args) => {
                assert_eq!(args.threshold, Some(0.45));
                assert_eq!(args.engine.store_dir, Some(PathBuf::from("/tmp/store")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = Cli::try_parse_from(["facegate", "-vv", "identities"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn register_requires_name_and_vectors() {
        assert!(Cli::try_parse_from(["facegate", "register", "--name", "alice"]).is_err());
    }
}
