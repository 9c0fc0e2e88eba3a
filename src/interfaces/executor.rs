//! Named executor interface used by async dispatch.

use std::time::Duration;

use futures::future::BoxFuture;

use super::target::{Deferred, Fault};
use crate::dispatch::AsyncDispatchError;

/// Work handed to a pool.
///
/// The closure performs the real invocation on a worker; a future-returning
/// method yields its inner future, which the executor awaits before the
/// outer result completes.
pub type Job = Box<dyn FnOnce() -> Result<Deferred, Fault> + Send + 'static>;

/// A set of named worker pools.
///
/// The job starts independently of whether the returned future is polled;
/// dropping the future does not cancel it. The timeout clock starts when
/// the job starts executing, not when it is submitted. Cancellation on
/// timeout is cooperative: the job itself may keep running.
pub trait NamedExecutor: Send + Sync {
    /// Submit a job to the pool named `pool`.
    fn submit(
        &self,
        pool: &str,
        job: Job,
        timeout: Option<Duration>,
    ) -> Result<Deferred, AsyncDispatchError>;

    /// Drive a completion observer nobody waits on.
    fn detach(&self, task: BoxFuture<'static, ()>);
}
