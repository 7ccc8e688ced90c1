//! cascade - pluggable dataflow runtime
//!
//! # Configuration
//!
//! Settings are resolved from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `PIPELINE_DIR`: directory pipeline documents live in
//! - `MODULE_DIR`: module roots, colon- or semicolon-separated
//! - `CASCADE_SECURITY_MODE`: default security mode
//! - `CASCADE_TRANSLATION_CACHE`: translation cache capacity
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | pipeline error |
//! | 2 | security rejection |
//! | 3 | configuration error |

mod commands;

use cascade_runtime::{parse_path_list, RuntimeConfig, RuntimeConfigLoader};
use cascade_security::SecurityMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// cascade - pluggable dataflow runtime
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory pipeline documents live in (also: PIPELINE_DIR)
    #[arg(long, global = true)]
    pipeline_dir: Option<PathBuf>,

    /// Module roots, colon- or semicolon-separated (also: MODULE_DIR)
    #[arg(long, global = true)]
    module_dir: Option<String>,

    /// Trusted signers registry path
    #[arg(long, global = true)]
    signers: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline
    Run {
        /// Pipeline name (defaults to `default`)
        pipeline: Option<String>,

        /// Security mode for module admission
        #[arg(long, value_name = "MODE")]
        security_mode: Option<SecurityMode>,

        /// Admit unverified modules without prompting
        #[arg(long)]
        allow_unverified: bool,

        /// Slot config overrides, `<slot>.<key>=<value>` (repeatable)
        #[arg(long = "set", value_name = "SLOT.KEY=VALUE")]
        set: Vec<String>,
    },

    /// List discovered modules or available pipelines
    List {
        #[command(subcommand)]
        what: commands::ListTarget,
    },

    /// Module signing and trust management
    Security {
        #[command(subcommand)]
        action: commands::SecurityAction,
    },
}

fn resolve_config(args: &Args) -> RuntimeConfig {
    let mut loader = RuntimeConfigLoader::new();
    if let Some(ref dir) = args.pipeline_dir {
        loader = loader.with_pipeline_dir(dir);
    }
    if let Some(ref roots) = args.module_dir {
        loader = loader.with_module_roots(parse_path_list(roots));
    }
    if let Some(ref signers) = args.signers {
        loader = loader.with_trusted_signers_path(signers);
    }
    loader.load()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging: --debug > --verbose > RUST_LOG env > default "warn".
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = resolve_config(&args);

    let code = match args.command {
        Command::Run {
            pipeline,
            security_mode,
            allow_unverified,
            set,
        } => {
            commands::run(
                config,
                pipeline.as_deref().unwrap_or("default"),
                security_mode,
                allow_unverified,
                &set,
            )
            .await
        }
        Command::List { what } => commands::list(&config, &what),
        Command::Security { action } => commands::security(&config, &action),
    };

    ExitCode::from(code)
}
