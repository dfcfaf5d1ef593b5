//! Control-flow graphs
//!
//! Built once per scope generation from the flat instruction list, mutated
//! in place by structural passes, and flattened back to an instruction array
//! by the linearizer.

pub mod block;
pub mod builder;
pub mod graph;
pub mod linearize;

pub use block::{BasicBlock, BlockId};
pub use builder::{build_cfg, CfgBuilder};
pub use graph::{Cfg, EdgeKind};
pub use linearize::{layout_order, linearize, Linearized};
