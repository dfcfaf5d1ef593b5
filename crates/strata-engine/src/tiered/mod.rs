//! Tiered dispatch
//!
//! Methods start interpreted. Call and loop counters feed a compilation
//! policy; a hot method is compiled by a [`CompilerBackend`] and the
//! artifact is published through a write-once slot that every later call
//! reads.

pub mod background;
pub mod backend;
pub mod engine;
pub mod method;
pub mod policy;
pub mod profile;
pub mod stub;
pub mod threaded;

pub use background::{BackgroundCompiler, CompileRequest};
pub use backend::{CompiledArtifact, CompilerBackend};
pub use engine::{EngineStats, TieredEngine};
pub use method::{MethodStats, TieredMethod};
pub use policy::CompilationPolicy;
pub use profile::{MethodProfile, TierState};
pub use stub::StubBackend;
pub use threaded::{ThreadedBackend, ThreadedCode};
