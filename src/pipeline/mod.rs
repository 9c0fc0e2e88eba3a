//! Interception pipeline.
//!
//! Runs the advice protocol around one live call:
//!
//! ```text
//! Entering -> RunningBefore -> Invoking -> RunningAfterSuccess -> Done
//!                                      \-> RunningAfterFailure -> Done
//! ```
//!
//! When Around advice matches, the Before stage is replaced by a nested
//! continuation chain (lowest order outermost) whose innermost link is the
//! real method. Async-tagged methods leave the state machine entirely and go
//! to the [`AsyncDispatcher`](crate::dispatch::AsyncDispatcher).
//!
//! Failures of the real method always reach the caller as the original
//! [`Fault`]. Failures of advice bodies outside the Around chain are logged
//! and swallowed; an advice whose parameters cannot be bound is skipped.

mod join_point;

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use futures::future::{self, FutureExt};
use tracing::{debug, trace, warn};

pub use join_point::{JoinPoint, Proceed};

use crate::advice::{bind, AdviceBody, AdviceDescriptor, AdviceKind, Outcome};
use crate::descriptor::MethodSignature;
use crate::dispatch::AsyncDispatcher;
use crate::interfaces::{Deferred, Fault, Target, Value};
use crate::registry::{AdviceSet, Registry};

/// Stage of a single intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entering,
    RunningBefore,
    Invoking,
    RunningAfterSuccess,
    RunningAfterFailure,
    Done,
}

/// Synchronous outcome of an invocation.
pub enum Reply {
    /// The call completed on the caller's thread.
    Value(Value),
    /// Async-tagged method returning a future: the pending result.
    Future(Deferred),
    /// Async-tagged fire-and-forget method: nothing to wait for.
    Detached,
}

impl Reply {
    /// The synchronous value, if there is one.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_future(self) -> Option<Deferred> {
        match self {
            Self::Future(deferred) => Some(deferred),
            _ => None,
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Future(_) => f.write_str("Future(..)"),
            Self::Detached => f.write_str("Detached"),
        }
    }
}

/// Executes advice around calls, using the registry's match cache.
pub struct Pipeline {
    registry: Arc<Registry>,
    dispatcher: Option<AsyncDispatcher>,
}

impl Pipeline {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            dispatcher: None,
        }
    }

    /// Attach the adapter that executes async-tagged methods.
    pub fn with_dispatcher(mut self, dispatcher: AsyncDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> Option<&AsyncDispatcher> {
        self.dispatcher.as_ref()
    }

    /// Invoke `method` on `target` with aspects applied.
    ///
    /// Async-tagged methods are handed to the dispatcher and return
    /// [`Reply::Future`] or [`Reply::Detached`]. Without a dispatcher they
    /// run synchronously through the advice protocol instead.
    pub fn invoke(
        &self,
        target: &Arc<dyn Target>,
        method: &MethodSignature,
        args: Vec<Value>,
    ) -> Result<Reply, Fault> {
        if method.is_async() {
            match &self.dispatcher {
                Some(dispatcher) => return dispatcher.dispatch(Arc::clone(target), method, args),
                None => {
                    warn!(
                        method = %method,
                        "No async executor configured, running async method synchronously"
                    );
                    let value = self.invoke_sync(target.as_ref(), method, args)?;
                    if method.returns_future() {
                        return Ok(Reply::Future(future::ready(Ok(value)).boxed()));
                    }
                    return Ok(Reply::Value(value));
                }
            }
        }

        self.invoke_sync(target.as_ref(), method, args)
            .map(Reply::Value)
    }

    /// Run the synchronous advice protocol, ignoring any async tag.
    pub fn invoke_sync(
        &self,
        target: &dyn Target,
        method: &MethodSignature,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        let advice = self.registry.advice_set(method);
        let join_point = JoinPoint::new(target, method, args);
        trace_phase(&join_point, Phase::Entering);

        let around = advice.get(AdviceKind::Around);
        if !around.is_empty() {
            return self.run_around_chain(&join_point, around, &advice);
        }

        trace_phase(&join_point, Phase::RunningBefore);
        run_advice(
            AdviceKind::Before,
            advice.get(AdviceKind::Before),
            &join_point,
            Outcome::Pending,
        );

        trace_phase(&join_point, Phase::Invoking);
        let result = join_point.invoke_target();
        finish(&join_point, result, &advice, true)
    }

    fn run_around_chain(
        &self,
        join_point: &JoinPoint<'_>,
        around: &[Arc<AdviceDescriptor>],
        advice: &AdviceSet,
    ) -> Result<Value, Fault> {
        debug!(
            method = %join_point.method(),
            layers = around.len(),
            "Running around chain"
        );
        let reached = Cell::new(false);
        trace_phase(join_point, Phase::Invoking);
        let result = Proceed::new(join_point, around, &reached).proceed();
        if !reached.get() {
            trace!(method = %join_point.method(), "Around chain never reached the target");
        }
        finish(join_point, result, advice, reached.get())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("generation", &self.registry.generation())
            .field("async", &self.dispatcher.is_some())
            .finish()
    }
}

/// Run the After family on the call's outcome and hand it back unchanged.
///
/// On success, AfterReturning and After only run when the real method was
/// reached. On failure, AfterThrowing always runs.
fn finish(
    join_point: &JoinPoint<'_>,
    result: Result<Value, Fault>,
    advice: &AdviceSet,
    reached: bool,
) -> Result<Value, Fault> {
    match result {
        Ok(value) => {
            trace_phase(join_point, Phase::RunningAfterSuccess);
            if reached {
                run_advice(
                    AdviceKind::AfterReturning,
                    advice.get(AdviceKind::AfterReturning),
                    join_point,
                    Outcome::Returned(&value),
                );
                run_advice(
                    AdviceKind::After,
                    advice.get(AdviceKind::After),
                    join_point,
                    Outcome::Returned(&value),
                );
            }
            trace_phase(join_point, Phase::Done);
            Ok(value)
        }
        Err(fault) => {
            trace_phase(join_point, Phase::RunningAfterFailure);
            run_advice(
                AdviceKind::AfterThrowing,
                advice.get(AdviceKind::AfterThrowing),
                join_point,
                Outcome::Raised(&fault),
            );
            trace_phase(join_point, Phase::Done);
            Err(fault)
        }
    }
}

/// Run non-Around advice in order. Nothing here can fail the call.
fn run_advice(
    kind: AdviceKind,
    advice: &[Arc<AdviceDescriptor>],
    join_point: &JoinPoint<'_>,
    outcome: Outcome<'_>,
) {
    for descriptor in advice {
        let AdviceBody::Plain(body) = descriptor.body() else {
            continue;
        };

        let args = match bind(descriptor, join_point, outcome) {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    advice = %descriptor,
                    method = %join_point.method(),
                    error = %e,
                    "Skipping advice, parameters cannot be bound"
                );
                continue;
            }
        };

        if let Err(e) = body(&args) {
            warn!(
                kind = %kind,
                advice = %descriptor,
                method = %join_point.method(),
                error = %e,
                "Advice failed, continuing"
            );
        }
    }
}

fn trace_phase(join_point: &JoinPoint<'_>, phase: Phase) {
    trace!(method = %join_point.method(), phase = ?phase, "Pipeline phase");
}
