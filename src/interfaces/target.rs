//! Target interface: the object a call is ultimately delivered to.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::descriptor::{MethodSignature, TypeDescriptor};

/// Dynamic argument and result payload.
pub type Value = serde_json::Value;

/// Field snapshot copied into substitutes at wrap time.
pub type Fields = BTreeMap<String, Value>;

/// A pending result produced by a future-returning method.
pub type Deferred = BoxFuture<'static, Result<Value, Fault>>;

/// A raised cause.
///
/// Cloning shares the underlying error, so the instance a target raised is
/// the instance every advice and the caller observe.
#[derive(Clone)]
pub struct Fault {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
    type_id: TypeId,
    type_name: &'static str,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Fault {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// A fault carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Whether both handles point at the same raised instance.
    pub fn same_as(&self, other: &Fault) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }

    /// Whether the concrete error type is `E`.
    pub fn is<E: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("type", &self.type_name)
            .field("error", &self.inner)
            .finish()
    }
}

/// An object whose methods can be intercepted.
///
/// Implementations dispatch `call` on the method name themselves; the engine
/// only ever hands back signatures taken from [`Target::descriptor`].
pub trait Target: Send + Sync + 'static {
    /// The type's public surface.
    fn descriptor(&self) -> &TypeDescriptor;

    /// Invoke the real method.
    fn call(&self, method: &MethodSignature, args: &[Value]) -> Result<Value, Fault>;

    /// Invoke a method whose declared return type is a future.
    ///
    /// The returned future must own everything it needs. The default runs
    /// [`Target::call`] and wraps its outcome in a ready future.
    fn call_deferred(&self, method: &MethodSignature, args: &[Value]) -> Result<Deferred, Fault> {
        let value = self.call(method, args)?;
        Ok(futures::future::ready(Ok(value)).boxed())
    }

    /// Snapshot of the instance's observable state.
    fn fields(&self) -> Fields {
        Fields::new()
    }
}
