//! Abstract interfaces for weft collaborators.
//!
//! These traits define the contracts for:
//! - Targets (objects whose methods get intercepted)
//! - Named executors (worker pools used by async dispatch)
//!
//! plus the dynamic payload and cause types that flow through a call.

pub mod executor;
pub mod target;

pub use executor::{Job, NamedExecutor};
pub use target::{Deferred, Fault, Fields, Target, Value};
