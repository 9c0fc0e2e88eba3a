//! Invocation context and the Around continuation.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::advice::{AdviceBody, AdviceDescriptor};
use crate::descriptor::MethodSignature;
use crate::interfaces::{Fault, Target, Value};

/// One live call: target, method and arguments.
///
/// Created per call and never retained past it.
pub struct JoinPoint<'a> {
    target: &'a dyn Target,
    method: &'a MethodSignature,
    args: Vec<Value>,
}

impl<'a> JoinPoint<'a> {
    pub fn new(target: &'a dyn Target, method: &'a MethodSignature, args: Vec<Value>) -> Self {
        Self {
            target,
            method,
            args,
        }
    }

    pub fn target(&self) -> &'a dyn Target {
        self.target
    }

    pub fn method(&self) -> &'a MethodSignature {
        self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Name of the target's concrete type.
    pub fn type_name(&self) -> &'a str {
        &self.target.descriptor().name
    }

    pub(crate) fn invoke_target(&self) -> Result<Value, Fault> {
        self.target.call(self.method, &self.args)
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("type", &self.type_name())
            .field("method", &self.method.qualified_name())
            .field("args", &self.args)
            .finish()
    }
}

/// Continuation handed to an Around advice.
///
/// Each call to [`Proceed::proceed`] runs the next Around layer, or the real
/// method once the chain is exhausted. Calling it zero times suppresses
/// everything inside; calling it repeatedly re-runs everything inside.
pub struct Proceed<'a> {
    join_point: &'a JoinPoint<'a>,
    chain: &'a [Arc<AdviceDescriptor>],
    next: usize,
    reached: &'a Cell<bool>,
}

impl<'a> Proceed<'a> {
    pub(crate) fn new(
        join_point: &'a JoinPoint<'a>,
        chain: &'a [Arc<AdviceDescriptor>],
        reached: &'a Cell<bool>,
    ) -> Self {
        Self {
            join_point,
            chain,
            next: 0,
            reached,
        }
    }

    pub fn join_point(&self) -> &'a JoinPoint<'a> {
        self.join_point
    }

    pub fn args(&self) -> &[Value] {
        self.join_point.args()
    }

    /// Proceed with the current arguments.
    pub fn proceed(&self) -> Result<Value, Fault> {
        self.advance(self.join_point)
    }

    /// Proceed with replacement arguments.
    pub fn proceed_with(&self, args: Vec<Value>) -> Result<Value, Fault> {
        let join_point = JoinPoint::new(self.join_point.target, self.join_point.method, args);
        self.advance(&join_point)
    }

    fn advance(&self, join_point: &JoinPoint<'_>) -> Result<Value, Fault> {
        let mut next = self.next;
        while let Some(advice) = self.chain.get(next) {
            next += 1;
            if let AdviceBody::Around(body) = advice.body() {
                trace!(advice = %advice, method = %join_point.method(), "Entering around layer");
                let inner = Proceed {
                    join_point,
                    chain: self.chain,
                    next,
                    reached: self.reached,
                };
                return body(&inner);
            }
        }

        self.reached.set(true);
        join_point.invoke_target()
    }
}

impl fmt::Debug for Proceed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed")
            .field("join_point", self.join_point)
            .field("depth", &self.next)
            .field("layers", &self.chain.len())
            .finish()
    }
}
