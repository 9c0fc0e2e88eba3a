//! Advice: units of cross-cutting behavior bound to a pointcut.
//!
//! # Architecture
//!
//! Aspects are declared with [`Aspect::builder`] and handed to the registry,
//! which parses every pointcut and compiles each declaration into an
//! [`AdviceDescriptor`]. Bodies are typed closures captured at declaration
//! time; nothing is looked up by name at call time.
//!
//! ```ignore
//! let tracing = Aspect::builder("tracing")
//!     .pointcut("services", "execution(* com.x.*Service.*(..))")
//!     .before("services()", |args| {
//!         info!(method = %args.join_point().method(), "entering");
//!         Ok(())
//!     })
//!     .after_throwing("services()", "ex", |args| {
//!         warn!(error = ?args.cause(), "failed");
//!         Ok(())
//!     })
//!     .build();
//! ```
//!
//! # Ordering
//!
//! For a fixed (method, kind) advice is totally ordered by explicit `order`
//! ascending, ties broken by registration sequence. Lower orders run first
//! for Before and Around entry, and therefore wrap everything with a higher
//! order.

mod aspect;
mod binding;

use std::fmt;
use std::sync::Arc;

pub use aspect::{AdviceDecl, Aspect, AspectBuilder, AspectId, DEFAULT_ORDER};
pub use binding::{AdviceArgs, AdviceBindingError, Bound, CauseType, Outcome, Param, Shape};
pub(crate) use binding::bind;

use crate::interfaces::{Fault, Value};
use crate::pipeline::Proceed;
use crate::pointcut::Pointcut;

/// Advice kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdviceKind {
    Before,
    After,
    Around,
    AfterReturning,
    AfterThrowing,
}

impl AdviceKind {
    pub const ALL: [AdviceKind; 5] = [
        Self::Before,
        Self::After,
        Self::Around,
        Self::AfterReturning,
        Self::AfterThrowing,
    ];
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Around => "around",
            Self::AfterReturning => "after-returning",
            Self::AfterThrowing => "after-throwing",
        };
        f.write_str(name)
    }
}

/// Body of a Before/After/AfterReturning/AfterThrowing advice.
pub type AdviceFn = Arc<dyn Fn(&AdviceArgs<'_>) -> Result<(), Fault> + Send + Sync>;

/// Body of an Around advice. May call the continuation zero, one or many
/// times.
pub type AroundFn = Arc<dyn Fn(&Proceed<'_>) -> Result<Value, Fault> + Send + Sync>;

#[derive(Clone)]
pub enum AdviceBody {
    Plain(AdviceFn),
    Around(AroundFn),
}

/// A compiled, registered advice.
#[derive(Clone)]
pub struct AdviceDescriptor {
    pub(crate) kind: AdviceKind,
    pub(crate) aspect: AspectId,
    pub(crate) aspect_name: Arc<str>,
    pub(crate) name: String,
    pub(crate) pointcut: Arc<Pointcut>,
    pub(crate) order: i32,
    pub(crate) seq: u64,
    pub(crate) returning: Option<String>,
    pub(crate) throwing: Option<String>,
    pub(crate) params: Vec<Param>,
    pub(crate) body: AdviceBody,
}

impl AdviceDescriptor {
    pub fn kind(&self) -> AdviceKind {
        self.kind
    }

    pub fn aspect(&self) -> AspectId {
        self.aspect
    }

    pub fn aspect_name(&self) -> &str {
        &self.aspect_name
    }

    /// Advice name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointcut(&self) -> &Arc<Pointcut> {
        &self.pointcut
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Registration sequence; the ordering tie-breaker.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn returning(&self) -> Option<&str> {
        self.returning.as_deref()
    }

    pub fn throwing(&self) -> Option<&str> {
        self.throwing.as_deref()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn body(&self) -> &AdviceBody {
        &self.body
    }

    /// Total ordering key.
    pub fn sort_key(&self) -> (i32, u64) {
        (self.order, self.seq)
    }
}

impl fmt::Debug for AdviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceDescriptor")
            .field("kind", &self.kind)
            .field("aspect", &self.aspect_name)
            .field("name", &self.name)
            .field("pointcut", &self.pointcut.source())
            .field("order", &self.order)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AdviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.aspect_name, self.name, self.kind)
    }
}
