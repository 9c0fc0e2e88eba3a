//! Async dispatch adapter.
//!
//! Async-tagged methods skip the synchronous advice protocol. The real
//! invocation is packaged as a [`Job`] and submitted to a named pool of the
//! configured [`NamedExecutor`]; the executor starts the timeout clock when
//! the job begins running and flattens a future-returning method's own
//! future into the one handed back.
//!
//! What the caller sees depends on the method's return type and its
//! [`ExceptionPolicy`]:
//!
//! | return type | policy                  | caller receives                                     |
//! |-------------|-------------------------|-----------------------------------------------------|
//! | future      | `Propagate`             | submit errors as `Err`, run errors via the future   |
//! | future      | `CompleteExceptionally` | every error via the future                          |
//! | future      | `ReturnNull`            | a future that yields `Null` on any error            |
//! | other       | any                     | [`Reply::Detached`]; failures are logged only       |

mod executor;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, FutureExt};
use serde::Deserialize;
use tracing::{debug, error, warn};

pub use executor::TokioExecutor;

use crate::config::DispatchConfig;
use crate::descriptor::MethodSignature;
use crate::interfaces::{Deferred, Fault, Job, NamedExecutor, Target, Value};
use crate::pipeline::Reply;

/// What happens to a failed async invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Surface the failure to the caller.
    #[default]
    Propagate,
    /// Fail the returned future, never the call itself.
    #[serde(alias = "completeExceptionally")]
    CompleteExceptionally,
    /// Complete the returned future with `Null`.
    #[serde(alias = "returnNull")]
    ReturnNull,
}

impl fmt::Display for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Propagate => "propagate",
            Self::CompleteExceptionally => "complete_exceptionally",
            Self::ReturnNull => "return_null",
        };
        f.write_str(name)
    }
}

/// Per-method async settings. Unset fields fall back to [`DispatchConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AsyncOptions {
    pub executor: Option<String>,
    pub timeout: Option<Duration>,
    pub policy: Option<ExceptionPolicy>,
}

impl AsyncOptions {
    pub fn executor(mut self, name: impl Into<String>) -> Self {
        self.executor = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn policy(mut self, policy: ExceptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Errors that can occur while dispatching to a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsyncDispatchError {
    #[error("unknown executor '{name}'")]
    UnknownExecutor { name: String },

    #[error("task on executor '{pool}' timed out after {timeout:?}")]
    Timeout { pool: String, timeout: Duration },

    #[error("task on executor '{pool}' panicked")]
    Panicked { pool: String },

    #[error("executor '{pool}' rejected the task: {reason}")]
    Rejected { pool: String, reason: String },

    #[error("no async runtime available")]
    NoRuntime,
}

/// Settings resolved for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub executor: String,
    pub timeout: Option<Duration>,
    pub policy: ExceptionPolicy,
}

/// Runs async-tagged methods on a [`NamedExecutor`].
#[derive(Clone)]
pub struct AsyncDispatcher {
    executor: Arc<dyn NamedExecutor>,
    defaults: DispatchConfig,
}

impl AsyncDispatcher {
    pub fn new(executor: Arc<dyn NamedExecutor>, defaults: DispatchConfig) -> Self {
        Self { executor, defaults }
    }

    /// Merge a method's own settings over the configured defaults.
    pub fn plan(&self, method: &MethodSignature) -> DispatchPlan {
        let options = method.async_options.clone().unwrap_or_default();
        DispatchPlan {
            executor: options
                .executor
                .unwrap_or_else(|| self.defaults.default_executor.clone()),
            timeout: options.timeout.or_else(|| self.defaults.timeout()),
            policy: options.policy.unwrap_or(self.defaults.policy),
        }
    }

    /// Dispatch with the method's resolved settings.
    pub fn dispatch(
        &self,
        target: Arc<dyn Target>,
        method: &MethodSignature,
        args: Vec<Value>,
    ) -> Result<Reply, Fault> {
        let plan = self.plan(method);
        self.dispatch_async(target, method, args, &plan)
    }

    /// Submit the real invocation to `plan.executor`.
    pub fn dispatch_async(
        &self,
        target: Arc<dyn Target>,
        method: &MethodSignature,
        args: Vec<Value>,
        plan: &DispatchPlan,
    ) -> Result<Reply, Fault> {
        let returns_future = method.returns_future();
        let signature = method.clone();
        let job: Job = Box::new(move || {
            if returns_future {
                target.call_deferred(&signature, &args)
            } else {
                target
                    .call(&signature, &args)
                    .map(|value| future::ready(Ok(value)).boxed())
            }
        });

        debug!(
            method = %method,
            executor = %plan.executor,
            timeout = ?plan.timeout,
            policy = %plan.policy,
            "Dispatching async method"
        );
        let submitted = self.executor.submit(&plan.executor, job, plan.timeout);

        if !returns_future {
            self.detach(method, submitted);
            return Ok(Reply::Detached);
        }

        match submitted {
            Ok(deferred) => Ok(Reply::Future(apply_policy(method, plan.policy, deferred))),
            Err(e) => match plan.policy {
                ExceptionPolicy::Propagate => Err(Fault::new(e)),
                ExceptionPolicy::CompleteExceptionally => {
                    Ok(Reply::Future(future::ready(Err(Fault::new(e))).boxed()))
                }
                ExceptionPolicy::ReturnNull => {
                    warn!(method = %method, error = %e, "Async dispatch failed, returning null");
                    Ok(Reply::Future(future::ready(Ok(Value::Null)).boxed()))
                }
            },
        }
    }

    /// Fire-and-forget: observe completion only to log failures.
    fn detach(
        &self,
        method: &MethodSignature,
        submitted: Result<Deferred, AsyncDispatchError>,
    ) {
        let name = method.qualified_name();
        match submitted {
            Ok(deferred) => self.executor.detach(
                async move {
                    if let Err(e) = deferred.await {
                        error!(method = %name, error = %e, "Async method failed");
                    }
                }
                .boxed(),
            ),
            Err(e) => error!(method = %name, error = %e, "Async dispatch failed"),
        }
    }
}

impl fmt::Debug for AsyncDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

fn apply_policy(method: &MethodSignature, policy: ExceptionPolicy, deferred: Deferred) -> Deferred {
    match policy {
        ExceptionPolicy::Propagate | ExceptionPolicy::CompleteExceptionally => deferred,
        ExceptionPolicy::ReturnNull => {
            let name = method.qualified_name();
            deferred
                .map(move |result| {
                    result.or_else(|e| {
                        warn!(method = %name, error = %e, "Async method failed, returning null");
                        Ok(Value::Null)
                    })
                })
                .boxed()
        }
    }
}
