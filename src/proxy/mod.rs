//! Proxy generator.
//!
//! A [`Proxy`] is a substitute for a target instance built from the
//! target's [`TypeDescriptor`]. Each method is routed once per type:
//! `Direct` methods call straight into the instance, `Intercepted` methods
//! go through the [`Pipeline`]. The routing table is a [`TypePlan`] cached by
//! the registry; a proxy notices a registry mutation through the generation
//! counter and fetches a fresh plan.
//!
//! Types that cannot be substituted (sealed, or nothing overridable) are
//! returned unwrapped as [`Woven::Plain`] with a warning, so aspects simply do
//! not apply to them.
//!
//! # Example
//!
//! ```ignore
//! let factory = ProxyFactory::new(pipeline);
//! let foo = factory.wrap(Arc::new(Foo::default()));
//! let reply = foo.invoke("bar", vec![json!(1)])?;
//! ```


use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::descriptor::{MethodSignature, TypeDescriptor};
use crate::interfaces::{Fault, Fields, Target, Value};
use crate::pipeline::{Pipeline, Reply};

/// Errors raised by the proxy layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("type '{type_name}' is sealed")]
    Sealed { type_name: String },

    #[error("type '{type_name}' has no public overridable methods")]
    NoOverridableMethods { type_name: String },

    #[error("type '{type_name}' has no method '{method}' taking {arity} argument(s)")]
    UnknownMethod {
        type_name: String,
        method: String,
        arity: usize,
    },
}

/// How a single method is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Call the instance directly; no added work.
    Direct,
    /// Route through the pipeline.
    Intercepted,
}

/// Routing decision for every method of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePlan {
    type_name: String,
    generation: u64,
    routes: Vec<Route>,
}

impl TypePlan {
    /// Route each overridable method through the pipeline when `advised`
    /// says so, or when it is async-tagged.
    pub(crate) fn build(
        descriptor: &TypeDescriptor,
        generation: u64,
        advised: impl Fn(&MethodSignature) -> bool,
    ) -> Self {
        let routes = descriptor
            .methods
            .iter()
            .map(|method| {
                if method.is_overridable() && (method.is_async() || advised(method)) {
                    Route::Intercepted
                } else {
                    Route::Direct
                }
            })
            .collect();
        Self {
            type_name: descriptor.name.clone(),
            generation,
            routes,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Registry generation the plan was computed at.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Route of the method at `index` in the type descriptor.
    pub fn route(&self, index: usize) -> Route {
        self.routes.get(index).copied().unwrap_or(Route::Direct)
    }

    pub fn intercepted(&self) -> usize {
        self.routes
            .iter()
            .filter(|r| **r == Route::Intercepted)
            .count()
    }
}

/// Builds substitutes for target instances.
#[derive(Clone)]
pub struct ProxyFactory {
    pipeline: Arc<Pipeline>,
    enabled: bool,
}

impl ProxyFactory {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            enabled: true,
        }
    }

    /// When disabled, every instance is returned unwrapped.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wrap `target`, falling back to the bare instance when it cannot be
    /// substituted.
    pub fn wrap(&self, target: Arc<dyn Target>) -> Woven {
        if !self.enabled {
            debug!(type_name = %target.descriptor().name, "Proxying disabled");
            return Woven::Plain(target);
        }
        match self.try_wrap(Arc::clone(&target)) {
            Ok(proxy) => Woven::Proxied(proxy),
            Err(e) => {
                warn!(error = %e, "Cannot generate proxy, aspects will not apply");
                Woven::Plain(target)
            }
        }
    }

    /// Wrap `target`, reporting why a substitute cannot be built.
    pub fn try_wrap(&self, target: Arc<dyn Target>) -> Result<Proxy, ProxyError> {
        let descriptor = target.descriptor();
        if descriptor.sealed {
            return Err(ProxyError::Sealed {
                type_name: descriptor.name.clone(),
            });
        }
        if !descriptor.has_overridable_methods() {
            return Err(ProxyError::NoOverridableMethods {
                type_name: descriptor.name.clone(),
            });
        }

        let plan = self.pipeline.registry().plan_for(descriptor);
        debug!(
            type_name = %descriptor.name,
            intercepted = plan.intercepted(),
            methods = descriptor.methods.len(),
            "Generated proxy"
        );
        let fields = target.fields();
        Ok(Proxy {
            target,
            pipeline: Arc::clone(&self.pipeline),
            plan: ArcSwap::new(plan),
            fields,
        })
    }
}

/// A substitute routing calls through the pipeline.
pub struct Proxy {
    target: Arc<dyn Target>,
    pipeline: Arc<Pipeline>,
    plan: ArcSwap<TypePlan>,
    fields: Fields,
}

impl Proxy {
    pub fn descriptor(&self) -> &TypeDescriptor {
        self.target.descriptor()
    }

    /// The wrapped instance.
    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    /// Field values copied from the instance at wrap time.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Current routing plan, refreshed if the registry changed.
    pub fn plan(&self) -> Arc<TypePlan> {
        let current = self.plan.load_full();
        let registry = self.pipeline.registry();
        if current.generation() == registry.generation() {
            return current;
        }
        let fresh = registry.plan_for(self.descriptor());
        self.plan.store(Arc::clone(&fresh));
        fresh
    }

    /// Call a method by name with the given arguments.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Reply, Fault> {
        let descriptor = self.descriptor();
        let (index, method) = resolve(descriptor, name, args.len())?;
        match self.plan().route(index) {
            Route::Intercepted => self.pipeline.invoke(&self.target, method, args),
            Route::Direct => call_direct(self.target.as_ref(), method, &args),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("type_name", &self.descriptor().name)
            .field("plan", &self.plan.load_full())
            .finish_non_exhaustive()
    }
}

/// Result of [`ProxyFactory::wrap`].
pub enum Woven {
    Proxied(Proxy),
    /// Fallback: the original instance, with no aspects applied.
    Plain(Arc<dyn Target>),
}

impl Woven {
    pub fn is_proxied(&self) -> bool {
        matches!(self, Self::Proxied(_))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        match self {
            Self::Proxied(proxy) => proxy.descriptor(),
            Self::Plain(target) => target.descriptor(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Proxied(proxy) => proxy.field(name).cloned(),
            Self::Plain(target) => target.fields().remove(name),
        }
    }

    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Reply, Fault> {
        match self {
            Self::Proxied(proxy) => proxy.invoke(name, args),
            Self::Plain(target) => {
                let (_, method) = resolve(target.descriptor(), name, args.len())?;
                call_direct(target.as_ref(), method, &args)
            }
        }
    }
}

impl fmt::Debug for Woven {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxied(proxy) => f.debug_tuple("Proxied").field(proxy).finish(),
            Self::Plain(target) => f
                .debug_tuple("Plain")
                .field(&target.descriptor().name)
                .finish(),
        }
    }
}

fn resolve<'d>(
    descriptor: &'d TypeDescriptor,
    name: &str,
    arity: usize,
) -> Result<(usize, &'d MethodSignature), Fault> {
    descriptor.resolve(name, arity).ok_or_else(|| {
        Fault::new(ProxyError::UnknownMethod {
            type_name: descriptor.name.clone(),
            method: name.to_string(),
            arity,
        })
    })
}

fn call_direct(target: &dyn Target, method: &MethodSignature, args: &[Value]) -> Result<Reply, Fault> {
    if method.returns_future() {
        return target.call_deferred(method, args).map(Reply::Future);
    }
    target.call(method, args).map(Reply::Value)
}
