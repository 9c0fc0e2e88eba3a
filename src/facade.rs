//! Weaver facade for in-process use.
//!
//! Bundles the registry, pipeline, async dispatcher and proxy factory behind
//! the three collaborator-facing APIs: registration, invocation and
//! wrapping.
//!
//! # Example
//!
//! ```ignore
//! use weft::facade::Weaver;
//! use weft::advice::Aspect;
//!
//! let weaver = Weaver::builder()
//!     .config(WeftConfig::load(None)?)
//!     .tokio_executor()
//!     .aspect(logging_aspect())
//!     .build()?;
//!
//! let foo = weaver.wrap(Arc::new(Foo::default()));
//! let reply = foo.invoke("bar", vec![])?;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::advice::Aspect;
use crate::config::{ConfigError, WeftConfig};
use crate::descriptor::MethodSignature;
use crate::dispatch::{AsyncDispatchError, AsyncDispatcher, TokioExecutor};
use crate::interfaces::{Fault, NamedExecutor, Target, Value};
use crate::pipeline::{Pipeline, Reply};
use crate::proxy::{ProxyFactory, Woven};
use crate::registry::{Registry, RegistryError};

/// Errors that can occur while building a [`Weaver`].
#[derive(Debug, thiserror::Error)]
pub enum WeaverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Dispatch(#[from] AsyncDispatchError),
}

enum ExecutorChoice {
    None,
    Tokio,
    Custom(Arc<dyn NamedExecutor>),
}

/// Builder for [`Weaver`].
pub struct WeaverBuilder {
    config: WeftConfig,
    executor: ExecutorChoice,
    aspects: Vec<Arc<Aspect>>,
}

impl WeaverBuilder {
    pub fn config(mut self, config: WeftConfig) -> Self {
        self.config = config;
        self
    }

    /// Run async-tagged methods on the given executor.
    pub fn executor(mut self, executor: Arc<dyn NamedExecutor>) -> Self {
        self.executor = ExecutorChoice::Custom(executor);
        self
    }

    /// Run async-tagged methods on tokio pools sized from configuration.
    /// Requires a runtime at [`WeaverBuilder::build`] time.
    pub fn tokio_executor(mut self) -> Self {
        self.executor = ExecutorChoice::Tokio;
        self
    }

    pub fn aspect(mut self, aspect: Arc<Aspect>) -> Self {
        self.aspects.push(aspect);
        self
    }

    pub fn build(self) -> Result<Weaver, WeaverError> {
        let registry = Arc::new(Registry::new());
        if let Some(rejected) = registry.set_aspects(self.aspects).into_iter().next() {
            return Err(rejected.into());
        }

        let executor: Option<Arc<dyn NamedExecutor>> = match self.executor {
            ExecutorChoice::None => None,
            ExecutorChoice::Tokio => Some(Arc::new(TokioExecutor::current(&self.config.executor)?)),
            ExecutorChoice::Custom(executor) => Some(executor),
        };

        let mut pipeline = Pipeline::new(Arc::clone(&registry));
        if let Some(executor) = executor {
            pipeline =
                pipeline.with_dispatcher(AsyncDispatcher::new(executor, self.config.dispatch.clone()));
        }
        let pipeline = Arc::new(pipeline);
        let proxies = ProxyFactory::new(Arc::clone(&pipeline)).enabled(self.config.proxy.enabled);

        info!(
            aspects = registry.aspects().len(),
            async_dispatch = pipeline.dispatcher().is_some(),
            proxy = self.config.proxy.enabled,
            "Weaver ready"
        );

        Ok(Weaver {
            config: self.config,
            registry,
            pipeline,
            proxies,
        })
    }
}

/// Entry point: register aspects, invoke with aspects, wrap instances.
pub struct Weaver {
    config: WeftConfig,
    registry: Arc<Registry>,
    pipeline: Arc<Pipeline>,
    proxies: ProxyFactory,
}

impl Weaver {
    pub fn builder() -> WeaverBuilder {
        WeaverBuilder {
            config: WeftConfig::default(),
            executor: ExecutorChoice::None,
            aspects: Vec::new(),
        }
    }

    /// Build from configuration loaded via [`WeftConfig::load`].
    pub fn from_config(path: Option<&str>) -> Result<Self, WeaverError> {
        Self::builder().config(WeftConfig::load(path)?).build()
    }

    pub fn config(&self) -> &WeftConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    // ========================================================================
    // Registration API
    // ========================================================================

    pub fn register_aspect(&self, aspect: Arc<Aspect>) -> Result<(), RegistryError> {
        self.registry.register(aspect)
    }

    /// Replace every aspect; returns the ones rejected for invalid pointcuts.
    pub fn set_aspects(&self, aspects: Vec<Arc<Aspect>>) -> Vec<RegistryError> {
        self.registry.set_aspects(aspects)
    }

    pub fn clear_aspects(&self) {
        self.registry.clear_aspects();
    }

    pub fn unregister_aspect(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    // ========================================================================
    // Invocation API
    // ========================================================================

    pub fn invoke(
        &self,
        target: &Arc<dyn Target>,
        method: &MethodSignature,
        args: Vec<Value>,
    ) -> Result<Reply, Fault> {
        self.pipeline.invoke(target, method, args)
    }

    // ========================================================================
    // Wrapping API
    // ========================================================================

    pub fn wrap(&self, target: Arc<dyn Target>) -> Woven {
        self.proxies.wrap(target)
    }
}
