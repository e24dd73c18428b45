//! Netible CLI - run a controller automation module from the command line.
//!
//! The orchestration runtime normally drives modules directly; this binary
//! is the standalone entry point. It reads a JSON argument file, runs the
//! named module, prints the result envelope as JSON on stdout, and exits 0
//! unless the envelope is failed. Ctrl-C cancels cooperatively: the request
//! on the wire completes, nothing further is issued.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use netible::modules::{run_module, ModuleContext, ModuleRegistry};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "netible", version = VERSION, about = "Controller automation modules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase diagnostic verbosity on stderr
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a module against the controller
    Run {
        /// Module name, e.g. `vlan`
        module: String,

        /// Path to a JSON file with the module arguments
        #[arg(long)]
        args: PathBuf,

        /// Compute what would change without issuing mutations
        #[arg(long)]
        check: bool,
    },

    /// List the available modules
    Modules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = ModuleRegistry::with_builtins();
    match cli.command {
        Commands::Modules => {
            for name in registry.names() {
                let module = registry.get(name).unwrap_or_else(|| unreachable!());
                println!("{:<16} {}", name, module.description());
            }
            Ok(())
        }
        Commands::Run {
            module,
            args,
            check,
        } => {
            let Some(module) = registry.get(&module) else {
                bail!("module '{}' not found; see `netible modules`", module);
            };
            let raw = std::fs::read_to_string(&args)
                .with_context(|| format!("cannot read argument file '{}'", args.display()))?;
            let input: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("argument file '{}' is not JSON", args.display()))?;
            let Some(input) = input.as_object() else {
                bail!("argument file '{}' must contain a JSON object", args.display());
            };

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let ctx = ModuleContext::new()
                .with_check_mode(check)
                .with_cancel(cancel);
            let envelope = run_module(module.as_ref(), input, &ctx).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(envelope.exit_code());
        }
    }
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
