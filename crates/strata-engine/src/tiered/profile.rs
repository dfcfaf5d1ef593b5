//! Per-method profiling counters and tier state
//!
//! The interpreter bumps these at method entry and on backward jumps.
//! Increments are relaxed; a lost update only shifts the promotion point.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Where a method is in its promotion lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TierState {
    /// Running in the interpreter, eligible for promotion
    Interpreted = 0,
    /// A compile request is in flight
    Promoting = 1,
    /// A compiled artifact is installed
    Compiled = 2,
    /// Compilation failed; the method stays interpreted
    Failed = 3,
}

impl TierState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TierState::Promoting,
            2 => TierState::Compiled,
            3 => TierState::Failed,
            _ => TierState::Interpreted,
        }
    }
}

/// Profiling counters for a single method
pub struct MethodProfile {
    call_count: AtomicU32,
    loop_count: AtomicU32,
    state: AtomicU8,
}

impl MethodProfile {
    /// Create a profile with zero counters
    pub fn new() -> Self {
        MethodProfile {
            call_count: AtomicU32::new(0),
            loop_count: AtomicU32::new(0),
            state: AtomicU8::new(TierState::Interpreted as u8),
        }
    }

    /// Record an interpreted call, return new count
    pub fn record_call(&self) -> u32 {
        self.call_count.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Record a backward jump, return new count
    pub fn record_loop(&self) -> u32 {
        self.loop_count.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Interpreted calls recorded so far
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Backward jumps recorded so far
    pub fn loops(&self) -> u32 {
        self.loop_count.load(Ordering::Relaxed)
    }

    /// Current tier state
    pub fn state(&self) -> TierState {
        TierState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Try to claim this method for compilation (CAS `Interpreted` to
    /// `Promoting`). Returns true if we claimed it.
    pub fn try_start_promotion(&self) -> bool {
        self.state
            .compare_exchange(
                TierState::Interpreted as u8,
                TierState::Promoting as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Compiled code is installed
    pub fn mark_compiled(&self) {
        self.state.store(TierState::Compiled as u8, Ordering::Release);
    }

    /// Compilation failed for good
    pub fn mark_failed(&self) {
        self.state.store(TierState::Failed as u8, Ordering::Release);
    }

    /// The request never reached a compiler; allow another promotion
    pub fn revert(&self) {
        let _ = self.state.compare_exchange(
            TierState::Promoting as u8,
            TierState::Interpreted as u8,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

impl Default for MethodProfile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let profile = MethodProfile::new();
        assert_eq!(profile.record_call(), 1);
        assert_eq!(profile.record_call(), 2);
        assert_eq!(profile.record_loop(), 1);
        assert_eq!(profile.calls(), 2);
        assert_eq!(profile.loops(), 1);
    }

    #[test]
    fn test_promotion_lifecycle() {
        let profile = MethodProfile::new();
        assert_eq!(profile.state(), TierState::Interpreted);

        assert!(profile.try_start_promotion());
        // Can't claim again while promoting
        assert!(!profile.try_start_promotion());

        profile.revert();
        assert_eq!(profile.state(), TierState::Interpreted);
        assert!(profile.try_start_promotion());

        profile.mark_compiled();
        assert_eq!(profile.state(), TierState::Compiled);
        assert!(!profile.try_start_promotion());
        // Revert only applies to in-flight promotions
        profile.revert();
        assert_eq!(profile.state(), TierState::Compiled);
    }

    #[test]
    fn test_failed_is_terminal() {
        let profile = MethodProfile::new();
        assert!(profile.try_start_promotion());
        profile.mark_failed();
        assert_eq!(profile.state(), TierState::Failed);
        assert!(!profile.try_start_promotion());
    }
}
