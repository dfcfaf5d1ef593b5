//! Promotion policy
//!
//! A method leaves the interpreter once either its entry count or the
//! backward jumps taken inside it reach their threshold. Only methods still
//! in the `Interpreted` state qualify, and snapshots longer than the size
//! cap are never handed to a backend.

use super::profile::{MethodProfile, TierState};
use crate::config::DispatchConfig;

/// Promotion thresholds, taken from [`DispatchConfig`]
#[derive(Debug, Clone)]
pub struct CompilationPolicy {
    /// Entries counted before promotion (default: 50)
    pub call_threshold: u32,
    /// Backward jumps counted before promotion (default: 10_000)
    pub loop_threshold: u32,
    /// Longest snapshot, in instructions including closures, a backend gets
    pub max_scope_size: usize,
}

impl CompilationPolicy {
    /// Thresholds of the default dispatch settings
    pub fn new() -> Self {
        Self::from_config(&DispatchConfig::default())
    }

    /// Thresholds of `config`
    pub fn from_config(config: &DispatchConfig) -> Self {
        CompilationPolicy {
            call_threshold: config.call_threshold,
            loop_threshold: config.loop_threshold,
            max_scope_size: config.max_scope_size,
        }
    }

    /// Whether a method with `profile` and a snapshot of `snapshot_len`
    /// instructions is due for promotion
    pub fn should_compile(&self, profile: &MethodProfile, snapshot_len: usize) -> bool {
        if profile.state() != TierState::Interpreted || snapshot_len > self.max_scope_size {
            return false;
        }
        profile.calls() >= self.call_threshold || profile.loops() >= self.loop_threshold
    }
}

impl Default for CompilationPolicy {
    fn default() -> Self {
        Self::new()
    }
}
