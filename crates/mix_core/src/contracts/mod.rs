//! Static stage declarations (contracts) and their registry.
//!
//! The contract file is the sole source of truth for plan order, metric
//! targets, change limits and inter-stage dependencies. It is loaded once
//! per process and immutable afterwards; hot-reload is a non-goal.

mod registry;
mod types;

pub use registry::{ContractLoadError, ContractRegistry};
pub use types::{Contract, StageKind};
