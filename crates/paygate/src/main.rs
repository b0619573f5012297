//! The `paygate` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

use paygate::audit::AuditLogger;
use paygate::cli::{AuditCommands, Cli, Commands, ConfigCommands, EXIT_ERROR};
use paygate::logging::init_logging;
use paygate::recon::Reconciler;
use paygate_chain::EndpointRegistry;
use paygate_core::store::MemoryStore;
use paygate_core::Config;
use paygate_crypto::PaymasterSigner;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(EXIT_ERROR);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Config {
            command: ConfigCommands::Print,
        } => {
            print!("{}", Config::default_toml());
            Ok(())
        }
        Commands::Audit {
            command: AuditCommands::Verify { config },
        } => verify_audit(&config),
        Commands::Serve { config } => {
            let config = Config::load(&config)?;
            init_logging(&config.logging, cli.verbose)?;
            serve(&config)
        }
    }
}

fn verify_audit(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    let logger = AuditLogger::from_config(&expand_home(&config.audit.directory))?;
    let result = logger.verify_chain()?;
    if result.valid {
        println!("audit chain valid: {} entries", result.entries_checked);
        Ok(())
    } else {
        Err(format!(
            "audit chain broken at seq {}: {}",
            result.first_invalid_seq.unwrap_or(0),
            result.error_message.unwrap_or_default()
        )
        .into())
    }
}

fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let signer = PaymasterSigner::from_config(&config.signer)?;
        let registry = EndpointRegistry::from_endpoints(&config.endpoints()?)?;
        let store = MemoryStore::new();
        let audit = AuditLogger::from_config(&expand_home(&config.audit.directory))?;

        info!(
            paymaster = %signer.paymaster(),
            signer = %signer.address(),
            chains = ?registry.chain_ids(),
            entry_point = %config.entry_point.address,
            "paygate daemon starting"
        );

        let reconciler = Reconciler::new(
            &store,
            &store,
            &registry,
            config.entry_point.address,
            config.reconciliation.clone(),
            Some(&audit),
        );
        reconciler.run_scheduler().await;
        Ok(())
    })
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
