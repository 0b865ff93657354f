//! Offline custody verification binary
//!
//! Reloads a chain-of-custody journal, re-walks the hash chain, re-digests
//! every referenced artifact and prints the report as JSON. Exits with
//! status 1 when anything is TAMPERED, MISMATCH or MISSING_FILE.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use custody_ledger::{
    digest::digest_directory, report::SessionReport, CustodySession, DigestAlgorithm,
    DigestEngine, Verifier,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Chain-of-custody verification
#[derive(Parser)]
#[command(name = "custody-verify")]
#[command(about = "Verify a chain-of-custody journal and its artifacts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a journal and every artifact it references
    Verify {
        /// Journal file (chain_of_custody.jsonl)
        journal: PathBuf,

        /// Hex Ed25519 public key the seal must be signed with
        #[arg(long, env = "CUSTODY_TRUSTED_KEY")]
        trusted_key: Option<String>,

        /// Write a full session report here instead of printing the verification
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Hash every file under a directory
    HashDir {
        /// Directory to hash
        root: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Algorithms (comma separated)
        #[arg(short, long, value_delimiter = ',', default_value = "MD5,SHA1,SHA256,SHA512")]
        algorithms: Vec<String>,

        /// Write the hash report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::error!(error = %message, "custody-verify failed");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Returns `Ok(false)` when integrity problems were found
fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Verify {
            journal,
            trusted_key,
            output,
        } => {
            let mut verifier = Verifier::new();
            if let Some(key) = trusted_key {
                verifier = verifier.with_trusted_key(parse_key(&key)?);
            }

            let session = CustodySession::load(&journal)
                .with_context(|| format!("loading {}", journal.display()))?;
            let report = verifier.verify(&session)?;
            let clean = report.is_clean();

            match output {
                Some(path) => {
                    SessionReport::build(&session, Some(report)).write_json(&path)?;
                    tracing::info!(path = %path.display(), "Session report written");
                }
                None => println!("{}", report.to_json()?),
            }

            Ok(clean)
        }

        Commands::HashDir {
            root,
            recursive,
            algorithms,
            output,
        } => {
            let algorithms = algorithms
                .iter()
                .map(|name| name.parse::<DigestAlgorithm>())
                .collect::<custody_ledger::Result<Vec<_>>>()?;
            let engine = DigestEngine::new(algorithms)?;

            let report = digest_directory(&engine, &root, recursive)?;
            match output {
                Some(path) => report.write_json(&path)?,
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }

            Ok(report.errors.is_empty())
        }
    }
}

fn parse_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim()).context("trusted key is not hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("trusted key must be 32 bytes"))
}
