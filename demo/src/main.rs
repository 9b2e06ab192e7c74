//! auditchain: operator CLI
//!
//! Records events into, and verifies, an audit hash chain kept in a
//! JSON-lines file.  The signing secret comes from `--config <file.toml>` or,
//! without it, from the `AUDIT_*` environment variables.
//!
//! Usage:
//!   cargo run -p demo -- record CREATE_DEVICE dev-1 user-A --metadata '{"type":"PC"}'
//!   cargo run -p demo -- verify
//!   cargo run -p demo -- history dev-1
//!   cargo run -p demo -- lookup <hash>
//!   cargo run -p demo -- scenario

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auditchain_contracts::{
    block::actions,
    config::ChainConfig,
    error::{ChainError, ChainResult},
    report::VerificationReport,
};
use auditchain_ledger::{ChainRecorder, ChainVerifier, InMemoryChainStore, JsonlChainStore};

// ── CLI definition ────────────────────────────────────────────────────────────

/// auditchain: tamper-evident audit log for the inventory/helpdesk backend.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Record and verify the auditchain hash chain",
    long_about = "Appends HMAC-signed, SHA-256 linked audit blocks to a JSON-lines\n\
                  chain file and verifies the whole chain or single hashes."
)]
struct Cli {
    /// Chain file (JSON lines).  Created on first use.
    #[arg(long, default_value = "audit_chain.jsonl")]
    store: PathBuf,

    /// TOML configuration file with an `[audit]` table.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one event to the chain.
    Record {
        action: String,
        entity_id: String,
        user_id: String,
        /// Event payload as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Verify every block in the chain.
    Verify,
    /// Show the audit history of one entity, newest first.
    History { entity_id: String },
    /// Check one block's signature by its hash.
    Lookup { hash: String },
    /// Record a device create + update in memory and verify the result.
    Scenario,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("auditchain error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command completed but found a problem.
async fn run(cli: Cli) -> ChainResult<bool> {
    let config = match &cli.config {
        Some(path) => ChainConfig::from_file(path)?,
        None => ChainConfig::from_env()?,
    };

    match cli.command {
        Command::Record {
            action,
            entity_id,
            user_id,
            metadata,
        } => {
            let metadata = metadata
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|e| {
                        ChainError::validation(format!("--metadata is not valid JSON: {}", e))
                    })
                })
                .transpose()?;

            let recorder = ChainRecorder::new(open_store(&cli.store).await?, config);
            let block = recorder
                .record_event(&action, &entity_id, &user_id, metadata)
                .await?;
            print_json(&block)?;
            Ok(true)
        }
        Command::Verify => {
            let verifier = ChainVerifier::new(open_store(&cli.store).await?, config);
            let report = verifier.verify_chain().await?;
            print_report(&report)?;
            Ok(report.valid)
        }
        Command::History { entity_id } => {
            let verifier = ChainVerifier::new(open_store(&cli.store).await?, config);
            print_json(&verifier.entity_history(&entity_id).await?)?;
            Ok(true)
        }
        Command::Lookup { hash } => {
            let verifier = ChainVerifier::new(open_store(&cli.store).await?, config);
            let lookup = verifier.lookup_hash(&hash).await?;
            print_json(&lookup)?;
            Ok(lookup.valid)
        }
        Command::Scenario => run_scenario(config).await,
    }
}

async fn open_store(path: &Path) -> ChainResult<Arc<JsonlChainStore>> {
    Ok(Arc::new(JsonlChainStore::open(path).await?))
}

// ── Scenario ──────────────────────────────────────────────────────────────────

async fn run_scenario(config: ChainConfig) -> ChainResult<bool> {
    let store = Arc::new(InMemoryChainStore::new());
    let recorder = ChainRecorder::new(store.clone(), config.clone());
    let verifier = ChainVerifier::new(store, config);

    let device_id = ChainRecorder::mint_entity_id();
    let created = recorder
        .record_event(
            actions::CREATE_DEVICE,
            &device_id,
            "user-A",
            Some(serde_json::json!({ "type": "PC" })),
        )
        .await?;
    let updated = recorder
        .record_event(
            actions::UPDATE_DEVICE,
            &device_id,
            "user-A",
            Some(serde_json::json!({ "estado": "ACTIVO" })),
        )
        .await?;

    println!("block {}  {}  prev {}", created.block_number, created.hash, created.previous_hash);
    println!("block {}  {}  prev {}", updated.block_number, updated.hash, updated.previous_hash);
    println!();

    let report = verifier.verify_chain().await?;
    print_report(&report)?;
    Ok(report.valid)
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_json<T: serde::Serialize>(value: &T) -> ChainResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ChainError::Serialization {
        reason: e.to_string(),
    })?;
    println!("{}", text);
    Ok(())
}

fn print_report(report: &VerificationReport) -> ChainResult<()> {
    print_json(report)?;
    if report.valid {
        println!("chain OK: {} block(s) verified", report.total_blocks);
    } else {
        println!(
            "chain CORRUPTED: blocks {:?} failed verification",
            report.corrupted_numbers()
        );
    }
    Ok(())
}
