//! Runtime configuration.
//!
//! # Load Order
//!
//! 1. Compiled defaults
//! 2. Environment variables
//! 3. Explicit setters on the loader (CLI flags)
//!
//! Each layer overrides the previous.
//!
//! # Environment Variables
//!
//! - `PIPELINE_DIR`: directory pipeline documents live in
//! - `MODULE_DIR`: module roots, colon- or semicolon-separated
//! - `CASCADE_SECURITY_MODE`: `paranoid` | `default` | `permissive`
//! - `CASCADE_TRANSLATION_CACHE`: translation cache capacity

use cascade_bus::DEFAULT_TRANSLATION_CACHE_SIZE;
use cascade_security::SecurityMode;
use cascade_types::SlotId;
use std::path::PathBuf;

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Directory pipeline documents are resolved in.
    pub pipeline_dir: PathBuf,
    /// Module roots, scanned in order.
    pub module_roots: Vec<PathBuf>,
    /// Path of the trusted-signers JSON registry.
    pub trusted_signers_path: PathBuf,
    /// Security mode for admission decisions.
    pub security_mode: SecurityMode,
    /// Admit unverified modules without prompting (default mode only).
    pub allow_unverified: bool,
    /// Translation cache capacity.
    pub translation_cache_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pipeline_dir: PathBuf::from("pipelines"),
            module_roots: vec![PathBuf::from("modules")],
            trusted_signers_path: PathBuf::from("settings/trusted_signers.json"),
            security_mode: SecurityMode::default(),
            allow_unverified: false,
            translation_cache_size: DEFAULT_TRANSLATION_CACHE_SIZE,
        }
    }
}

/// Builder-style loader for [`RuntimeConfig`].
///
/// # Example
///
/// ```
/// use cascade_runtime::RuntimeConfigLoader;
///
/// let config = RuntimeConfigLoader::new()
///     .skip_env_vars() // deterministic in tests
///     .with_module_roots(vec!["./my-modules".into()])
///     .load();
/// assert_eq!(config.module_roots.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct RuntimeConfigLoader {
    pipeline_dir: Option<PathBuf>,
    module_roots: Option<Vec<PathBuf>>,
    trusted_signers_path: Option<PathBuf>,
    security_mode: Option<SecurityMode>,
    allow_unverified: Option<bool>,
    translation_cache_size: Option<usize>,
    skip_env: bool,
}

impl RuntimeConfigLoader {
    /// Creates a loader with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Overrides the pipeline directory.
    #[must_use]
    pub fn with_pipeline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pipeline_dir = Some(dir.into());
        self
    }

    /// Overrides the module roots.
    #[must_use]
    pub fn with_module_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.module_roots = Some(roots);
        self
    }

    /// Overrides the trusted-signers registry path.
    #[must_use]
    pub fn with_trusted_signers_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trusted_signers_path = Some(path.into());
        self
    }

    /// Overrides the security mode.
    #[must_use]
    pub fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Overrides the allow-unverified flag.
    #[must_use]
    pub fn with_allow_unverified(mut self, allow: bool) -> Self {
        self.allow_unverified = Some(allow);
        self
    }

    /// Overrides the translation cache capacity.
    #[must_use]
    pub fn with_translation_cache_size(mut self, size: usize) -> Self {
        self.translation_cache_size = Some(size);
        self
    }

    /// Resolves the configuration: defaults, then environment, then
    /// explicit overrides.
    #[must_use]
    pub fn load(self) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();

        if !self.skip_env {
            if let Ok(dir) = std::env::var("PIPELINE_DIR") {
                config.pipeline_dir = PathBuf::from(dir);
            }
            if let Ok(roots) = std::env::var("MODULE_DIR") {
                let parsed = parse_path_list(&roots);
                if !parsed.is_empty() {
                    config.module_roots = parsed;
                }
            }
            if let Ok(mode) = std::env::var("CASCADE_SECURITY_MODE") {
                match mode.parse() {
                    Ok(mode) => config.security_mode = mode,
                    Err(e) => tracing::warn!(error = %e, "Ignoring CASCADE_SECURITY_MODE"),
                }
            }
            if let Ok(size) = std::env::var("CASCADE_TRANSLATION_CACHE") {
                match size.parse() {
                    Ok(size) => config.translation_cache_size = size,
                    Err(_) => tracing::warn!(value = %size, "Ignoring CASCADE_TRANSLATION_CACHE"),
                }
            }
        }

        if let Some(dir) = self.pipeline_dir {
            config.pipeline_dir = dir;
        }
        if let Some(roots) = self.module_roots {
            config.module_roots = roots;
        }
        if let Some(path) = self.trusted_signers_path {
            config.trusted_signers_path = path;
        }
        if let Some(mode) = self.security_mode {
            config.security_mode = mode;
        }
        if let Some(allow) = self.allow_unverified {
            config.allow_unverified = allow;
        }
        if let Some(size) = self.translation_cache_size {
            config.translation_cache_size = size;
        }

        config
    }
}

/// Splits a `MODULE_DIR`-style list on `:` and `;`, dropping empties.
#[must_use]
pub fn parse_path_list(value: &str) -> Vec<PathBuf> {
    value
        .split([':', ';'])
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Parses a `--set <slot>.<key>=<value>` override.
///
/// The value is parsed as JSON when possible (`3`, `true`,
/// `[1,2]`), falling back to a plain string.
///
/// # Errors
///
/// Returns a description when the reference is not of the form
/// `slot.key=value`.
pub fn parse_set_override(
    spec: &str,
) -> Result<(SlotId, String, serde_json::Value), String> {
    let (target, raw_value) = spec
        .split_once('=')
        .ok_or_else(|| format!("override '{spec}' is missing '='"))?;
    let (slot, key) = target
        .split_once('.')
        .ok_or_else(|| format!("override target '{target}' must be <slot>.<key>"))?;
    if key.is_empty() {
        return Err(format!("override target '{target}' has an empty key"));
    }

    let slot: SlotId = slot
        .parse()
        .map_err(|e| format!("override '{spec}': {e}"))?;
    let value = serde_json::from_str(raw_value)
        .unwrap_or_else(|_| serde_json::Value::String(raw_value.to_string()));

    Ok((slot, key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfigLoader::new().skip_env_vars().load();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.pipeline_dir, PathBuf::from("pipelines"));
        assert_eq!(config.security_mode, SecurityMode::Default);
    }

    #[test]
    fn explicit_overrides_win() {
        let config = RuntimeConfigLoader::new()
            .skip_env_vars()
            .with_pipeline_dir("/p")
            .with_module_roots(vec!["/m1".into(), "/m2".into()])
            .with_security_mode(SecurityMode::Paranoid)
            .with_allow_unverified(true)
            .with_translation_cache_size(16)
            .load();

        assert_eq!(config.pipeline_dir, PathBuf::from("/p"));
        assert_eq!(config.module_roots.len(), 2);
        assert_eq!(config.security_mode, SecurityMode::Paranoid);
        assert!(config.allow_unverified);
        assert_eq!(config.translation_cache_size, 16);
    }

    #[test]
    fn path_list_splitting() {
        assert_eq!(
            parse_path_list("a:b;c"),
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert_eq!(parse_path_list(""), Vec::<PathBuf>::new());
        assert_eq!(parse_path_list("solo"), vec![PathBuf::from("solo")]);
    }

    #[test]
    fn set_override_parsing() {
        let (slot, key, value) = parse_set_override("crawler.depth=3").unwrap();
        assert_eq!(slot.as_str(), "crawler");
        assert_eq!(key, "depth");
        assert_eq!(value, serde_json::json!(3));

        let (_, _, value) = parse_set_override("crawler.agent=cascade-bot").unwrap();
        assert_eq!(value, serde_json::json!("cascade-bot"));

        let (_, key, value) = parse_set_override("a.flag=true").unwrap();
        assert_eq!(key, "flag");
        assert_eq!(value, serde_json::json!(true));
    }

    #[test]
    fn set_override_rejects_malformed() {
        assert!(parse_set_override("no_equals").is_err());
        assert!(parse_set_override("nodot=1").is_err());
        assert!(parse_set_override("a.=1").is_err());
        assert!(parse_set_override("Bad.key=1").is_err());
    }
}
