//! Tokio-backed named executor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::AsyncDispatchError;
use crate::config::ExecutorConfig;
use crate::interfaces::{Deferred, Fault, Job, NamedExecutor, Value};

/// Named worker pools on a tokio runtime.
///
/// Each pool is a semaphore sized from configuration. A job waits for a
/// permit, then its synchronous part runs on the blocking thread pool and
/// any future it returns is awaited in place. The timeout covers both and
/// starts once the permit is held. On timeout the blocking thread is not
/// interrupted; the caller just stops waiting.
pub struct TokioExecutor {
    handle: Handle,
    pools: HashMap<String, Arc<Semaphore>>,
}

impl TokioExecutor {
    pub fn new(handle: Handle, config: &ExecutorConfig) -> Self {
        let pools = config
            .pools
            .iter()
            .map(|(name, size)| {
                if *size == 0 {
                    warn!(pool = %name, "Executor pool size 0, using 1");
                }
                (name.clone(), Arc::new(Semaphore::new((*size).max(1))))
            })
            .collect();
        Self { handle, pools }
    }

    /// Build on the runtime of the calling context.
    pub fn current(config: &ExecutorConfig) -> Result<Self, AsyncDispatchError> {
        let handle = Handle::try_current().map_err(|_| AsyncDispatchError::NoRuntime)?;
        Ok(Self::new(handle, config))
    }

    pub fn pool_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.pools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Permits currently free in `pool`.
    pub fn available(&self, pool: &str) -> Option<usize> {
        self.pools.get(pool).map(|s| s.available_permits())
    }
}

impl NamedExecutor for TokioExecutor {
    fn submit(
        &self,
        pool: &str,
        job: Job,
        timeout: Option<Duration>,
    ) -> Result<Deferred, AsyncDispatchError> {
        let semaphore = self
            .pools
            .get(pool)
            .cloned()
            .ok_or_else(|| AsyncDispatchError::UnknownExecutor {
                name: pool.to_string(),
            })?;

        let name = pool.to_string();
        let task = self.handle.spawn(run_job(name.clone(), semaphore, job, timeout));

        Ok(async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(Fault::new(AsyncDispatchError::Panicked { pool: name })),
                Err(e) => Err(Fault::new(AsyncDispatchError::Rejected {
                    pool: name,
                    reason: e.to_string(),
                })),
            }
        }
        .boxed())
    }

    fn detach(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

async fn run_job(
    pool: String,
    semaphore: Arc<Semaphore>,
    job: Job,
    timeout: Option<Duration>,
) -> Result<Value, Fault> {
    let _permit = semaphore.acquire_owned().await.map_err(|e| {
        Fault::new(AsyncDispatchError::Rejected {
            pool: pool.clone(),
            reason: e.to_string(),
        })
    })?;
    debug!(pool = %pool, "Async job started");

    let work = execute(pool.clone(), job);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
            warn!(pool = %pool, timeout = ?limit, "Async job timed out");
            Err(Fault::new(AsyncDispatchError::Timeout {
                pool,
                timeout: limit,
            }))
        }),
        None => work.await,
    }
}

async fn execute(pool: String, job: Job) -> Result<Value, Fault> {
    let deferred = match tokio::task::spawn_blocking(job).await {
        Ok(started) => started?,
        Err(_) => return Err(Fault::new(AsyncDispatchError::Panicked { pool })),
    };
    deferred.await
}
