//! Subcommand implementations.
//!
//! Every function returns the process exit code directly (0 success,
//! 1 pipeline error, 2 security rejection, 3 configuration error) so
//! `main` stays a thin dispatcher.

use cascade_runtime::{
    parse_set_override, Engine, FactoryRegistry, ModuleRegistry, RuntimeConfig,
};
use cascade_security::{
    generate_keypair, load_private_key, save_keypair, sign_module, verify_module, AdmissionPolicy,
    AdmissionPrompt, PromptDecision, SecurityMode, TrustedSigner, TrustedSigners,
};
use cascade_types::{ErrorCode, ModuleName, SignerId};
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;
use tracing::error;

/// `list` targets.
#[derive(Subcommand, Debug)]
pub enum ListTarget {
    /// List discovered modules with their verification verdicts
    Modules,
    /// List pipeline documents
    Pipelines,
}

/// `security` actions.
#[derive(Subcommand, Debug)]
pub enum SecurityAction {
    /// Verify a module directory against the trusted signers
    Verify {
        /// Path of the module directory
        module_path: PathBuf,
    },
    /// Sign a module directory, writing `module.sig`
    Sign {
        /// Path of the PKCS#8 PEM private key
        #[arg(long)]
        key: PathBuf,
        /// Path of the module directory
        module_path: PathBuf,
    },
    /// Generate a fresh RSA key pair
    GenerateKeypair {
        /// Directory the PEM files are written into
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Add a public key to the trusted signers
    Trust {
        /// Path of the SPKI PEM public key
        #[arg(long)]
        key: PathBuf,
        /// Signer id
        #[arg(long)]
        id: SignerId,
        /// Human-readable comment
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Remove a signer from the trusted signers
    Untrust {
        /// Signer id
        id: SignerId,
    },
    /// List trusted signers
    ListTrusted,
}

/// Interactive admission prompt on the operator's terminal.
struct TerminalPrompt;

impl AdmissionPrompt for TerminalPrompt {
    fn prompt(&self, module: &ModuleName, reason: &str) -> PromptDecision {
        println!();
        println!("SECURITY WARNING: module '{module}' is {reason}.");
        println!("Running unverified modules can be a security risk.");

        loop {
            print!("Proceed with this module? (yes/no/always): ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return PromptDecision::Deny;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return PromptDecision::AllowOnce,
                "n" | "no" => return PromptDecision::Deny,
                "always" => return PromptDecision::AllowAlways,
                _ => println!("Please answer 'yes', 'no', or 'always'."),
            }
        }
    }
}

/// Runs a pipeline and maps the outcome to an exit code.
pub async fn run(
    mut config: RuntimeConfig,
    pipeline: &str,
    security_mode: Option<SecurityMode>,
    allow_unverified: bool,
    set: &[String],
) -> u8 {
    if let Some(mode) = security_mode {
        config.security_mode = mode;
    }
    if allow_unverified {
        config.allow_unverified = true;
    }

    let mut overrides = Vec::new();
    for spec in set {
        match parse_set_override(spec) {
            Ok(parsed) => overrides.push(parsed),
            Err(e) => {
                error!("{e}");
                return 3;
            }
        }
    }

    let admission = AdmissionPolicy::new(config.security_mode, std::sync::Arc::new(TerminalPrompt))
        .with_allow_unverified(config.allow_unverified);

    // Bundled module constructors would be registered here; the
    // runtime itself ships none, so unknown modules surface as
    // configuration errors.
    let engine = Engine::new(config, FactoryRegistry::new(), admission);

    // First Ctrl-C requests a graceful stop.
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, shutting down");
            shutdown.trigger();
        }
    });

    match engine.run(pipeline, &overrides).await {
        Ok(report) => {
            println!(
                "pipeline '{}': {} published, {} delivered, {} translation failures, \
                 {} dropped at shutdown, {} faults",
                report.pipeline,
                report.metrics.published,
                report.metrics.delivered,
                report.metrics.translation_failures,
                report.metrics.dropped_at_shutdown,
                report.faults,
            );
            for slot in &report.excluded {
                println!("excluded: {slot}");
            }
            for slot in &report.shutdown_timeouts {
                println!("shutdown timeout: {slot}");
            }
            exit_code(report.severity.exit_code())
        }
        Err(e) => {
            error!(code = e.code(), "{e}");
            exit_code(e.severity().exit_code())
        }
    }
}

/// Lists modules or pipelines.
pub fn list(config: &RuntimeConfig, what: &ListTarget) -> u8 {
    match what {
        ListTarget::Modules => {
            let signers = match TrustedSigners::load(&config.trusted_signers_path) {
                Ok(signers) => signers,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            let registry = match ModuleRegistry::discover(&config.module_roots, &signers) {
                Ok(registry) => registry,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            if registry.is_empty() {
                println!("no modules discovered");
                return 0;
            }
            for (name, record) in registry.list_all() {
                println!(
                    "{name}  {}  [{}]  {}",
                    record.manifest.version,
                    record.verdict,
                    record.path.display()
                );
            }
            0
        }
        ListTarget::Pipelines => {
            let entries = match std::fs::read_dir(&config.pipeline_dir) {
                Ok(entries) => entries,
                Err(e) => {
                    error!(
                        "cannot read pipeline directory {}: {e}",
                        config.pipeline_dir.display()
                    );
                    return 3;
                }
            };
            let mut names: Vec<String> = entries
                .flatten()
                .filter_map(|entry| {
                    let path = entry.path();
                    let ext = path.extension()?.to_str()?;
                    if ext == "yaml" || ext == "yml" {
                        Some(path.file_stem()?.to_string_lossy().into_owned())
                    } else {
                        None
                    }
                })
                .collect();
            names.sort();
            if names.is_empty() {
                println!("no pipelines found");
            }
            for name in names {
                println!("{name}");
            }
            0
        }
    }
}

/// Signing and trust management.
pub fn security(config: &RuntimeConfig, action: &SecurityAction) -> u8 {
    match action {
        SecurityAction::Verify { module_path } => {
            let signers = match TrustedSigners::load(&config.trusted_signers_path) {
                Ok(signers) => signers,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            match verify_module(module_path, &signers) {
                Ok(verdict) => {
                    println!("verdict: {verdict}");
                    println!("digest:  {}", verdict.digest());
                    if verdict.is_verified() {
                        0
                    } else {
                        2
                    }
                }
                Err(e) => {
                    error!("{e}");
                    3
                }
            }
        }
        SecurityAction::Sign { key, module_path } => {
            let private = match load_private_key(key) {
                Ok(private) => private,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            match sign_module(module_path, &private) {
                Ok(digest) => {
                    println!("signed {} (digest {digest})", module_path.display());
                    0
                }
                Err(e) => {
                    error!("{e}");
                    3
                }
            }
        }
        SecurityAction::GenerateKeypair { output_dir } => {
            let (private, _) = match generate_keypair() {
                Ok(pair) => pair,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            if let Err(e) = save_keypair(&private, output_dir) {
                error!("{e}");
                return 3;
            }
            println!(
                "wrote {}/private_key.pem and {}/public_key.pem",
                output_dir.display(),
                output_dir.display()
            );
            0
        }
        SecurityAction::Trust { key, id, comment } => {
            let pubkey = match std::fs::read_to_string(key) {
                Ok(pem) => pem,
                Err(e) => {
                    error!("cannot read {}: {e}", key.display());
                    return 3;
                }
            };
            with_signers_mut(config, |signers| {
                signers.add(
                    id.clone(),
                    TrustedSigner {
                        pubkey: pubkey.clone(),
                        comment: comment.clone(),
                    },
                )?;
                println!("trusted signer '{id}'");
                Ok(())
            })
        }
        SecurityAction::Untrust { id } => with_signers_mut(config, |signers| {
            signers.remove(id)?;
            println!("removed signer '{id}'");
            Ok(())
        }),
        SecurityAction::ListTrusted => {
            let signers = match TrustedSigners::load(&config.trusted_signers_path) {
                Ok(signers) => signers,
                Err(e) => {
                    error!("{e}");
                    return 3;
                }
            };
            if signers.is_empty() {
                println!("no trusted signers");
            }
            for (id, signer) in signers.iter() {
                if signer.comment.is_empty() {
                    println!("{id}");
                } else {
                    println!("{id}  {}", signer.comment);
                }
            }
            0
        }
    }
}

/// Loads, mutates, and saves the signer registry.
fn with_signers_mut<F>(config: &RuntimeConfig, mutate: F) -> u8
where
    F: FnOnce(&mut TrustedSigners) -> Result<(), cascade_security::SecurityError>,
{
    let mut signers = match TrustedSigners::load(&config.trusted_signers_path) {
        Ok(signers) => signers,
        Err(e) => {
            error!("{e}");
            return 3;
        }
    };
    if let Err(e) = mutate(&mut signers) {
        error!("{e}");
        return 3;
    }
    if let Err(e) = signers.save(&config.trusted_signers_path) {
        error!("{e}");
        return 3;
    }
    0
}

fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
