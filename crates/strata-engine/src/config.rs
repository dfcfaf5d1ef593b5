//! Engine configuration
//!
//! Every field has a documented default; a TOML document only needs to name
//! what it changes.
//!
//! ```toml
//! max_call_depth = 2000
//!
//! [dispatch]
//! call_threshold = 3
//! compile_mode = "synchronous"
//!
//! [passes]
//! dead_code_elimination = false
//! ```

use serde::Deserialize;

use crate::error::ConfigError;

/// How promotions are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileMode {
    /// Hand requests to background worker threads
    Background,
    /// Compile on the calling thread before it continues (deterministic, for
    /// tests)
    Synchronous,
}

/// Tiered dispatch settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Whether methods are ever promoted; when false the call counter is not
    /// touched (default: true)
    pub jit_enabled: bool,
    /// Interpreted calls before promotion (default: 50)
    pub call_threshold: u32,
    /// Backward jumps taken before promotion (default: 10_000)
    pub loop_threshold: u32,
    /// Largest snapshot, in instructions, that will be compiled (default: 4096)
    pub max_scope_size: usize,
    /// Background or synchronous compilation (default: background)
    pub compile_mode: CompileMode,
    /// Background compiler threads, 0 for one per CPU up to 4 (default: 1)
    pub compile_threads: usize,
    /// Pending compile requests before submissions are refused (default: 64)
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            jit_enabled: true,
            call_threshold: 50,
            loop_threshold: 10_000,
            max_scope_size: 4096,
            compile_mode: CompileMode::Background,
            compile_threads: 1,
            queue_capacity: 64,
        }
    }
}

impl DispatchConfig {
    /// Number of background worker threads to start
    pub fn worker_count(&self) -> usize {
        if self.compile_threads == 0 {
            num_cpus::get().clamp(1, 4)
        } else {
            self.compile_threads
        }
    }
}

/// Which optional passes `PassPipeline::prepare` runs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    /// Remove instructions whose results are never used (default: true)
    pub dead_code_elimination: bool,
    /// Keep closure-visible locals in temporaries with explicit binding
    /// loads and stores (default: true)
    pub binding_insertion: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig {
            dead_code_elimination: true,
            binding_insertion: true,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tiered dispatch settings
    pub dispatch: DispatchConfig,
    /// Pass selection
    pub passes: PassConfig,
    /// Deepest allowed call nesting before `SystemStackError` (default: 1000)
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dispatch: DispatchConfig::default(),
            passes: PassConfig::default(),
            max_call_depth: 1000,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic settings for tests: synchronous compilation at the given
    /// threshold
    pub fn synchronous(call_threshold: u32) -> Self {
        EngineConfig {
            dispatch: DispatchConfig {
                call_threshold,
                compile_mode: CompileMode::Synchronous,
                ..DispatchConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".into()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid("dispatch.queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.dispatch.jit_enabled);
        assert_eq!(config.dispatch.call_threshold, 50);
        assert_eq!(config.dispatch.compile_mode, CompileMode::Background);
        assert!(config.passes.dead_code_elimination);
        assert_eq!(config.max_call_depth, 1000);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_call_depth = 64

            [dispatch]
            call_threshold = 3
            compile_mode = "synchronous"

            [passes]
            binding_insertion = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.dispatch.call_threshold, 3);
        assert_eq!(config.dispatch.compile_mode, CompileMode::Synchronous);
        assert_eq!(config.dispatch.queue_capacity, 64);
        assert!(!config.passes.binding_insertion);
        assert!(config.passes.dead_code_elimination);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("dispatch = 5"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_call_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_worker_count() {
        let mut dispatch = DispatchConfig::default();
        assert_eq!(dispatch.worker_count(), 1);
        dispatch.compile_threads = 0;
        assert!((1..=4).contains(&dispatch.worker_count()));
    }
}
