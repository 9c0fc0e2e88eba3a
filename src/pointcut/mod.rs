//! Pointcut expressions.
//!
//! A pointcut is a boolean predicate over a [`MethodSignature`], written in a
//! small expression language:
//!
//! ```text
//! execution(<modifiers> <return> <type>.<method>(<params>))
//! @annotation(<tag>)
//! <name>()                      reference to a named pointcut
//! !a    a && b    a || b    (a)
//! ```
//!
//! Expressions are parsed once into an immutable AST and evaluated by
//! walking it; nothing is re-tokenized at evaluation time.
//!
//! # Example
//!
//! ```
//! use weft::descriptor::MethodSignature;
//! use weft::pointcut::Pointcut;
//!
//! let pointcut = Pointcut::parse("execution(* * com.x.Foo.*(..)) && !@annotation(internal)")?;
//! let bar = MethodSignature::new("com.x.Foo", "bar");
//!
//! assert!(pointcut.matches(&bar));
//! assert!(!pointcut.matches(&bar.clone().tag("internal")));
//! # Ok::<(), weft::pointcut::PointcutSyntaxError>(())
//! ```

mod eval;
mod parser;
mod pattern;


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use eval::{evaluate, PointcutTable, Scope, MAX_REFERENCE_DEPTH};
pub(crate) use eval::find_cycle;
pub use pattern::{ExecutionPattern, NamePattern};

use crate::descriptor::MethodSignature;

static NEXT_POINTCUT_ID: AtomicU64 = AtomicU64::new(1);

/// Error for a malformed expression.
///
/// Carries the offending fragment and its byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pointcut at offset {position}: {message} (near '{fragment}')")]
pub struct PointcutSyntaxError {
    pub message: String,
    pub fragment: String,
    pub position: usize,
}

impl PointcutSyntaxError {
    pub(crate) fn new(message: impl Into<String>, fragment: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
            position,
        }
    }
}

/// Process-unique pointcut identity, used as the evaluation cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointcutId(u64);

impl fmt::Display for PointcutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pc#{}", self.0)
    }
}

/// Pointcut syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `execution(...)`
    Execution(ExecutionPattern),
    /// `@annotation(tag)`
    Annotation(String),
    /// `name()`
    Reference(String),
    /// A well-formed designator the engine does not support. Never matches.
    Unsupported { designator: String, body: String },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution(pattern) => write!(f, "execution({pattern})"),
            Self::Annotation(tag) => write!(f, "@annotation({tag})"),
            Self::Reference(name) => write!(f, "{name}()"),
            Self::Unsupported { designator, body } => write!(f, "{designator}({body})"),
            Self::Not(inner) => write!(f, "!({inner})"),
            Self::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Self::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
        }
    }
}

/// A parsed, immutable pointcut expression.
#[derive(Debug)]
pub struct Pointcut {
    id: PointcutId,
    source: String,
    root: Expr,
}

impl Pointcut {
    /// Parse `source`, failing on any malformed input.
    pub fn parse(source: &str) -> Result<Self, PointcutSyntaxError> {
        let root = parser::parse(source)?;
        Ok(Self::from_expr(source, root))
    }

    /// Wrap an already-built tree with a fresh identity.
    pub fn from_expr(source: impl Into<String>, root: Expr) -> Self {
        Self {
            id: PointcutId(NEXT_POINTCUT_ID.fetch_add(1, Ordering::Relaxed)),
            source: source.into(),
            root,
        }
    }

    pub fn id(&self) -> PointcutId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.root
    }

    /// Evaluate with no named pointcuts in scope.
    pub fn matches(&self, method: &MethodSignature) -> bool {
        evaluate(self, method, Scope::empty())
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
