//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use rapid_verify::{EngineConfig, VerificationType};
use std::path::PathBuf;

/// Domain ownership verification engine.
#[derive(Parser, Debug)]
#[command(name = "rapid-verify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the proof store.
    #[arg(long, env = "RAPID_VERIFY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Network check timeout in milliseconds.
    #[arg(long, env = "RAPID_VERIFY_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Engine operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start verifying a domain and print the setup instructions.
    Initiate {
        /// Claiming developer.
        #[arg(long, short)]
        developer: String,
        /// Domain to verify.
        domain: String,
        /// Proof method.
        #[arg(long = "type", short = 't', value_enum, default_value = "dns-txt")]
        method: CliMethod,
        /// App the claim is for.
        #[arg(long, short)]
        app: Option<String>,
    },

    /// Check the published evidence for a verification.
    Verify {
        /// Verification id.
        id: String,
    },

    /// Show one verification.
    Status {
        /// Verification id.
        id: String,
        /// Requesting developer.
        #[arg(long, short)]
        developer: String,
    },

    /// List a developer's verifications, newest first.
    List {
        /// Developer whose verifications to list.
        #[arg(long, short)]
        developer: String,
    },

    /// Delete a verification.
    Delete {
        /// Verification id.
        id: String,
        /// Requesting developer.
        #[arg(long, short)]
        developer: String,
    },

    /// Write the effective configuration to a TOML file.
    WriteConfig {
        /// Destination path.
        path: PathBuf,
    },
}

/// Proof method CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMethod {
    /// TXT record under the verification label.
    DnsTxt,
    /// Meta tag on the homepage.
    MetaTag,
    /// Token file at a well-known path.
    FileUpload,
    /// Reviewed by a human.
    ManualReview,
}

impl Cli {
    /// Build the engine configuration from the config file and overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<EngineConfig> {
        let mut config = if let Some(ref path) = self.config {
            EngineConfig::from_file(path)?
        } else {
            EngineConfig::default()
        };

        if let Some(ref data_dir) = self.data_dir {
            config.data_dir.clone_from(data_dir);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.verifier.timeout_ms = timeout_ms;
        }
        config.log_level.clone_from(&self.log_level);

        config.validate()?;
        Ok(config)
    }
}

impl From<CliMethod> for VerificationType {
    fn from(m: CliMethod) -> Self {
        match m {
            CliMethod::DnsTxt => VerificationType::DnsTxt,
            CliMethod::MetaTag => VerificationType::MetaTag,
            CliMethod::FileUpload => VerificationType::FileUpload,
            CliMethod::ManualReview => VerificationType::ManualReview,
        }
    }
}
