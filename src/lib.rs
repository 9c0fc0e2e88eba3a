//! Weft - aspect weaving engine
//!
//! Attaches cross-cutting behavior (logging, transactions, retries, async
//! dispatch) to selected methods of arbitrary objects without changing
//! those objects. Methods are described by pre-computed signatures carrying
//! capability tags; aspects select them with pointcut expressions.

pub mod advice;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod facade;
pub mod interfaces;
pub mod pipeline;
pub mod pointcut;
pub mod proxy;
pub mod registry;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use advice::{AdviceDecl, AdviceKind, Aspect};
pub use descriptor::{MethodSignature, TypeDescriptor};
pub use facade::{Weaver, WeaverBuilder, WeaverError};
pub use interfaces::{Fault, Target, Value};
pub use pipeline::Reply;
pub use pointcut::Pointcut;
pub use proxy::Woven;
