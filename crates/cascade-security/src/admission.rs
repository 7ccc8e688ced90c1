//! Admission policy.
//!
//! The decision matrix over (verification verdict, security mode):
//!
//! | Verdict \ Mode | paranoid | default | permissive |
//! |----------------|----------|---------|------------|
//! | Verified-by-trusted | admit | admit | admit |
//! | Signed-but-untrusted | reject | prompt | admit + warn |
//! | Unsigned | reject | prompt | admit + warn |
//! | Invalid | reject | reject | admit + warn |
//!
//! Prompting is delegated to an injected [`AdmissionPrompt`] so the
//! policy is testable without a terminal. `AllowAlways` decisions are
//! remembered for the lifetime of the policy only; nothing persists
//! across runs.

use crate::Verdict;
use cascade_types::ModuleName;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Security mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    /// Only verified modules run.
    Paranoid,
    /// Prompt for untrusted modules, reject invalid ones.
    #[default]
    Default,
    /// Run everything, warn about anything unverified.
    Permissive,
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paranoid" => Ok(Self::Paranoid),
            "default" => Ok(Self::Default),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!(
                "invalid security mode '{other}': expected paranoid, default, or permissive"
            )),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Paranoid => "paranoid",
            Self::Default => "default",
            Self::Permissive => "permissive",
        };
        f.write_str(s)
    }
}

/// Outcome of an interactive admission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    /// Admit this module for this run.
    AllowOnce,
    /// Reject this module.
    Deny,
    /// Admit and stop prompting for the rest of this engine's
    /// lifetime.
    AllowAlways,
}

/// Capability for asking the operator about an unverified module.
///
/// The CLI installs a terminal prompt; tests install scripted
/// deciders. The core never touches stdin.
pub trait AdmissionPrompt: Send + Sync {
    /// Asks whether `module` may run despite `reason`.
    fn prompt(&self, module: &ModuleName, reason: &str) -> PromptDecision;
}

/// A prompt that always denies. The safe fallback for non-interactive
/// runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyingPrompt;

impl AdmissionPrompt for DenyingPrompt {
    fn prompt(&self, _module: &ModuleName, _reason: &str) -> PromptDecision {
        PromptDecision::Deny
    }
}

/// Outcome of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The module may run.
    Admit,
    /// The module may run; a warning was logged.
    AdmitWithWarning,
    /// The module must not run.
    Reject,
}

impl Admission {
    /// Returns `true` when the module may run.
    #[must_use]
    pub fn is_admitted(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// Evaluates the admission matrix for each slot of a run.
pub struct AdmissionPolicy {
    mode: SecurityMode,
    /// Suppresses prompting in default mode, admitting with a warning.
    allow_unverified: bool,
    prompt: Arc<dyn AdmissionPrompt>,
    /// Modules granted `AllowAlways` during this engine's lifetime.
    always_allowed: Mutex<HashSet<ModuleName>>,
}

impl AdmissionPolicy {
    /// Creates a policy for `mode` with the injected prompt.
    #[must_use]
    pub fn new(mode: SecurityMode, prompt: Arc<dyn AdmissionPrompt>) -> Self {
        Self {
            mode,
            allow_unverified: false,
            prompt,
            always_allowed: Mutex::new(HashSet::new()),
        }
    }

    /// Creates a non-interactive policy that denies every prompt.
    #[must_use]
    pub fn non_interactive(mode: SecurityMode) -> Self {
        Self::new(mode, Arc::new(DenyingPrompt))
    }

    /// Sets whether unverified modules are admitted without prompting
    /// in default mode.
    #[must_use]
    pub fn with_allow_unverified(mut self, allow: bool) -> Self {
        self.allow_unverified = allow;
        self
    }

    /// Returns the active security mode.
    #[must_use]
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Decides whether `module` with `verdict` may run.
    pub fn decide(&self, module: &ModuleName, verdict: &Verdict) -> Admission {
        if verdict.is_verified() {
            return Admission::Admit;
        }

        match self.mode {
            SecurityMode::Paranoid => {
                warn!(%module, verdict = %verdict, "Rejected in paranoid mode");
                Admission::Reject
            }
            SecurityMode::Permissive => {
                warn!(%module, verdict = %verdict, "Running unverified module");
                Admission::AdmitWithWarning
            }
            SecurityMode::Default => self.decide_default(module, verdict),
        }
    }

    fn decide_default(&self, module: &ModuleName, verdict: &Verdict) -> Admission {
        // Invalid signatures are never prompt-worthy.
        if matches!(verdict, Verdict::Invalid { .. }) {
            warn!(%module, "Rejected: invalid signature");
            return Admission::Reject;
        }

        if self.allow_unverified || self.always_allowed.lock().contains(module) {
            warn!(%module, verdict = %verdict, "Running unverified module (allowed)");
            return Admission::AdmitWithWarning;
        }

        match self.prompt.prompt(module, verdict.label()) {
            PromptDecision::AllowOnce => {
                info!(%module, "Operator allowed unverified module for this run");
                Admission::AdmitWithWarning
            }
            PromptDecision::AllowAlways => {
                info!(%module, "Operator allowed unverified modules permanently for this engine");
                self.always_allowed.lock().insert(module.clone());
                Admission::AdmitWithWarning
            }
            PromptDecision::Deny => {
                info!(%module, "Operator denied unverified module");
                Admission::Reject
            }
        }
    }
}
