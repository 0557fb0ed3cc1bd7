//! docsign-pki operator tool
//!
//! - `issue`: bootstrap the CA hierarchy, CRL and signing certificate
//! - `sync`: refresh the mirrored trust lists once
//! - `lookup`: find a trusted anchor by SubjectKeyIdentifier
//! - `serve`: refresh at startup, keep refreshing in the background and offer
//!   an interactive menu

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsign_pki::configs::{AppConfig, TrustConfig};
use docsign_pki::fetch::HttpFetcher;
use docsign_pki::issuance::IssuancePipeline;
use docsign_pki::refresh_scheduler::RefreshScheduler;
use docsign_pki::storage::FileArtifactStore;
use docsign_pki::trust_list_registry::TrustListRegistry;
use docsign_pki::trust_list_syncer::{SyncOutcome, TrustListSyncer};
use docsign_pki::trust_store::TrustStore;
use docsign_pki::trust_store_file::FileTrustStore;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "docsign-pki")]
#[command(about = "Document-signing CA bootstrap and trust-list mirror", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate root, CRL, intermediate and leaf artifacts
    Issue,
    /// Update trust lists now
    Sync {
        /// Ignore the update frequency and fetch regardless of age
        #[arg(long)]
        force: bool,
    },
    /// Look up a trusted certificate by SubjectKeyIdentifier (hex)
    Lookup { ski: String },
    /// Run the refresh scheduler with an interactive menu
    Serve,
}

fn main() -> Result<()> {
    let log_level = env::var("DOCSIGN_PKI_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Issue => issue(config),
        Command::Sync { force } => sync(&config.trust, force),
        Command::Lookup { ski } => lookup(&config.trust, &ski),
        Command::Serve => serve(config.trust),
    }
}

fn issue(config: AppConfig) -> Result<()> {
    println!("=== Issuing CA hierarchy ===\n");
    let store = Arc::new(FileArtifactStore::new(&config.artifacts.directory));
    let directory = config.artifacts.directory.clone();
    let pipeline = IssuancePipeline::new(store, config.artifacts, config.ca, config.crl);

    let report = pipeline.run().context("Failed to issue CA hierarchy")?;
    println!("✓ Root CA generated: {}", report.root.common_name().unwrap_or_default());
    println!("✓ CRL generated (next update {})", report.crl.next_update);
    if let Some(intermediate) = &report.intermediate {
        println!(
            "✓ Intermediate CA generated: {}",
            intermediate.common_name().unwrap_or_default()
        );
    }
    println!(
        "✓ Leaf certificate generated: {} (signed by {:?})",
        report.leaf.common_name().unwrap_or_default(),
        report.leaf_signer
    );
    println!("✓ Artifacts written to '{}'", directory.display());
    Ok(())
}

fn build_syncer(trust: &TrustConfig) -> Result<TrustListSyncer> {
    let mut registry = TrustListRegistry::with_defaults();
    for source in &trust.sources {
        registry
            .register(source.clone())
            .with_context(|| format!("Invalid trust list source '{}'", source.id))?;
    }
    let store = FileTrustStore::open(&trust.store_path).with_context(|| {
        format!("Failed to open trust store {}", trust.store_path.display())
    })?;
    let fetcher = HttpFetcher::new(trust.fetch_timeout_secs)?;

    Ok(TrustListSyncer::new(
        Arc::new(registry),
        Arc::new(store),
        Arc::new(fetcher),
        &trust.scratch_dir,
    ))
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Skipped { days_elapsed } => {
            println!("✓ Trust lists are current (refreshed {} day(s) ago)", days_elapsed)
        }
        SyncOutcome::Refreshed(reports) => {
            for report in reports {
                println!(
                    "✓ Trust list '{}' updated: {} imported, {} skipped",
                    report.list, report.imported, report.skipped
                );
            }
        }
    }
}

fn sync(trust: &TrustConfig, force: bool) -> Result<()> {
    let syncer = build_syncer(trust)?;
    let mut trust = trust.clone();
    if force {
        trust.update_frequency = 0;
    }
    let outcome = syncer.update(&trust).context("Trust list update failed")?;
    print_outcome(&outcome);
    Ok(())
}

fn lookup(trust: &TrustConfig, ski: &str) -> Result<()> {
    let store = FileTrustStore::open(&trust.store_path)?;
    match store.find_by_ski(ski)? {
        Some(entry) => {
            println!("✓ Trusted: {}", entry.name);
            println!("  list: {}", entry.list);
            println!("  aki:  {}", entry.aki);
            println!("  ski:  {}", entry.ski);
        }
        None => println!("✗ No trusted certificate with SKI {}", ski),
    }
    Ok(())
}

fn serve(trust: TrustConfig) -> Result<()> {
    println!("=== docsign-pki trust service ===\n");
    let syncer = Arc::new(build_syncer(&trust)?);

    let scheduler = RefreshScheduler::from_config(Arc::clone(&syncer), trust.clone());
    let (outcome, handle) = scheduler
        .start()
        .context("Startup trust list update failed")?;
    print_outcome(&outcome);
    println!(
        "✓ Background refresh every {} hour(s)\n",
        trust.refresh_interval_hours.max(1)
    );

    loop {
        println!("\n=== Trust List Menu ===");
        println!("1. Update now");
        println!("2. Show trust list status");
        println!("3. Clear external trust lists");
        println!("4. Exit");
        print!("\nSelect an option: ");
        io::stdout().flush()?;

        let mut choice = String::new();
        if io::stdin().read_line(&mut choice)? == 0 {
            break;
        }

        match choice.trim() {
            "1" => {
                let mut forced = trust.clone();
                forced.update_frequency = 0;
                match syncer.update(&forced) {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => println!("✗ Update failed: {}", e),
                }
            }
            "2" => show_status(syncer.store().as_ref(), &trust)?,
            "3" => {
                let removed = syncer.store().clear_external()?;
                println!("✓ Removed {} mirrored certificate(s)", removed);
            }
            "4" => {
                println!("\nStopping trust list refresh...");
                break;
            }
            _ => println!("Invalid option. Please select 1-4."),
        }
    }

    handle.shutdown();
    Ok(())
}

fn show_status(store: &dyn TrustStore, trust: &TrustConfig) -> Result<()> {
    println!("\n=== Trust List Status ===");
    match store.last_refresh()? {
        Some(at) => println!("Last refresh: {}", at),
        None => println!("Last refresh: never"),
    }
    for list in &trust.list {
        println!("{:>8}: {} certificate(s)", list, store.entries(list)?.len());
    }
    Ok(())
}
