//! Configuration types for isolates.
//!
//! Settings can be built in code, loaded from JSON, or parsed from a
//! V8-style flag string such as `"--expose-gc --stack-size=512"`.

use serde::Deserialize;

use crate::error::IsolateResult;

/// Default amount of external memory tolerated before a collection is requested
pub const DEFAULT_EXTERNAL_MEMORY_LIMIT: i64 = 1024 * 1024;

/// Engine and isolate settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IsolateConfig {
    /// Engine heap limit in bytes.
    /// Default: None (unlimited)
    pub memory_limit: Option<usize>,

    /// Native stack limit for script execution in bytes.
    /// Default: None (engine default)
    pub max_stack_size: Option<usize>,

    /// Allocation volume that triggers an automatic collection.
    /// Default: None (engine default)
    pub gc_threshold: Option<usize>,

    /// External memory growth tolerated before a collection is requested.
    /// Default: 1 MiB
    pub external_memory_limit: i64,

    /// Install a global `gc()` function.
    /// Default: false
    pub expose_gc: bool,

    /// Seed for a deterministic `Math.random`.
    /// Default: None (engine generator)
    pub random_seed: Option<u64>,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
            external_memory_limit: DEFAULT_EXTERNAL_MEMORY_LIMIT,
            expose_gc: false,
            random_seed: None,
        }
    }
}

impl IsolateConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> IsolateResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a whitespace separated V8 flag string.
    ///
    /// Recognized: `--expose-gc`, `--no-expose-gc`, `--stack-size=<KiB>`,
    /// `--max-heap-size=<MiB>`, `--random-seed=<n>`. Underscores and
    /// dashes are interchangeable. Anything else is ignored.
    pub fn from_flags(flags: &str) -> Self {
        let mut config = Self::default();
        config.apply_flags(flags);
        config
    }

    /// Apply a V8 flag string on top of the current settings.
    pub fn apply_flags(&mut self, flags: &str) {
        for flag in flags.split_whitespace() {
            let normalized = flag.trim_start_matches('-').replace('_', "-");
            let (name, value) = match normalized.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (normalized.as_str(), None),
            };

            match (name, value) {
                ("expose-gc", None) => self.expose_gc = true,
                ("no-expose-gc", None) => self.expose_gc = false,
                ("stack-size", Some(kib)) => {
                    match kib.parse::<usize>().ok().and_then(|kib| kib.checked_mul(1024)) {
                        Some(bytes) => self.max_stack_size = Some(bytes),
                        None => tracing::debug!(target: "qv8", flag, "invalid stack size"),
                    }
                }
                ("max-heap-size", Some(mib)) => {
                    match mib.parse::<usize>().ok().and_then(|mib| mib.checked_mul(1024 * 1024)) {
                        Some(bytes) => self.memory_limit = Some(bytes),
                        None => tracing::debug!(target: "qv8", flag, "invalid heap size"),
                    }
                }
                ("random-seed", Some(seed)) => match seed.parse::<u64>() {
                    Ok(seed) => self.random_seed = Some(seed),
                    Err(_) => tracing::debug!(target: "qv8", flag, "invalid random seed"),
                },
                _ => tracing::debug!(target: "qv8", flag, "ignoring unknown flag"),
            }
        }
    }

    /// Set the engine heap limit.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set the native stack limit.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    /// Set the automatic collection threshold.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    /// Set the external memory limit step.
    pub fn external_memory_limit(mut self, bytes: i64) -> Self {
        self.external_memory_limit = bytes;
        self
    }

    /// Enable or disable the global `gc()` hook.
    pub fn expose_gc(mut self, enabled: bool) -> Self {
        self.expose_gc = enabled;
        self
    }

    /// Make `Math.random` deterministic.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Merge with another config (other takes precedence for set values).
    pub fn merge(mut self, other: &IsolateConfig) -> Self {
        if other.memory_limit.is_some() {
            self.memory_limit = other.memory_limit;
        }
        if other.max_stack_size.is_some() {
            self.max_stack_size = other.max_stack_size;
        }
        if other.gc_threshold.is_some() {
            self.gc_threshold = other.gc_threshold;
        }
        if other.external_memory_limit != DEFAULT_EXTERNAL_MEMORY_LIMIT {
            self.external_memory_limit = other.external_memory_limit;
        }
        if other.random_seed.is_some() {
            self.random_seed = other.random_seed;
        }
        self.expose_gc |= other.expose_gc;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IsolateConfig::default();
        assert!(!config.expose_gc);
        assert_eq!(config.external_memory_limit, 1024 * 1024);
        assert!(config.memory_limit.is_none());
        assert!(config.random_seed.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = IsolateConfig::new()
            .memory_limit(64 * 1024 * 1024)
            .max_stack_size(256 * 1024)
            .expose_gc(true)
            .random_seed(7);

        assert_eq!(config.memory_limit, Some(64 * 1024 * 1024));
        assert_eq!(config.max_stack_size, Some(256 * 1024));
        assert!(config.expose_gc);
        assert_eq!(config.random_seed, Some(7));
    }

    #[test]
    fn test_from_flags() {
        let config = IsolateConfig::from_flags(
            "--expose_gc --stack-size=512 --max-heap-size=32 --random-seed=99 --harmony",
        );
        assert!(config.expose_gc);
        assert_eq!(config.max_stack_size, Some(512 * 1024));
        assert_eq!(config.memory_limit, Some(32 * 1024 * 1024));
        assert_eq!(config.random_seed, Some(99));
    }

    #[test]
    fn test_flags_later_wins() {
        let config = IsolateConfig::from_flags("--expose-gc --no-expose-gc");
        assert!(!config.expose_gc);
    }

    #[test]
    fn test_oversized_flag_value_ignored() {
        let config = IsolateConfig::from_flags(&format!(
            "--stack-size={} --max-heap-size={}",
            usize::MAX,
            usize::MAX / 1024
        ));
        assert!(config.max_stack_size.is_none());
        assert!(config.memory_limit.is_none());

        let config = IsolateConfig::from_flags(&format!("--stack-size={}", usize::MAX / 1024));
        assert_eq!(config.max_stack_size, Some(usize::MAX / 1024 * 1024));
    }

    #[test]
    fn test_invalid_flag_value_ignored() {
        let config = IsolateConfig::from_flags("--stack-size=big");
        assert!(config.max_stack_size.is_none());
    }

    #[test]
    fn test_from_json() {
        let config =
            IsolateConfig::from_json(r#"{ "expose_gc": true, "gc_threshold": 4096 }"#).unwrap();
        assert!(config.expose_gc);
        assert_eq!(config.gc_threshold, Some(4096));
        assert_eq!(config.external_memory_limit, DEFAULT_EXTERNAL_MEMORY_LIMIT);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(IsolateConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_merge() {
        let base = IsolateConfig::new().memory_limit(1024).random_seed(1);
        let overlay = IsolateConfig::from_flags("--expose-gc --random-seed=2");
        let merged = base.merge(&overlay);

        assert_eq!(merged.memory_limit, Some(1024));
        assert_eq!(merged.random_seed, Some(2));
        assert!(merged.expose_gc);
    }
}
