//! Stub backend for exercising the promotion path without real codegen

use std::sync::Arc;

use super::backend::{CompiledArtifact, CompilerBackend};
use crate::error::CompileError;
use crate::ir::ScopeSnapshot;

/// A backend whose every compilation fails
pub struct StubBackend;

impl CompilerBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn compile(&self, _snapshot: &Arc<ScopeSnapshot>) -> Result<Arc<dyn CompiledArtifact>, CompileError> {
        Err(CompileError::BackendError(
            "stub backend cannot produce executable code".to_string(),
        ))
    }
}
