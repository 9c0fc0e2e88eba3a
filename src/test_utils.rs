//! Test utilities: scriptable targets and a shared call journal.
//!
//! [`ScriptedTarget`] implements [`Target`] with per-method closures, so
//! tests can describe a type's surface and behavior inline. A [`Journal`] can
//! be shared between a target and advice bodies to assert on the order in
//! which things ran.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;

use crate::descriptor::{MethodSignature, TypeDescriptor};
use crate::interfaces::{Deferred, Fault, Fields, Target, Value};

/// Synchronous method body.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, Fault> + Send + Sync>;
/// Body of a method whose declared return type is a future.
pub type DeferredHandler = Arc<dyn Fn(&[Value]) -> Deferred + Send + Sync>;

/// Ordered, shareable record of events.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Snapshot of every entry so far.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Occurrences of `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A [`Target`] whose methods are closures.
///
/// Every real invocation records `call:<method>` in the journal.
pub struct ScriptedTarget {
    descriptor: TypeDescriptor,
    handlers: HashMap<String, Handler>,
    deferred: HashMap<String, DeferredHandler>,
    fields: Fields,
    journal: Journal,
}

impl ScriptedTarget {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            descriptor: TypeDescriptor::new(type_name),
            handlers: HashMap::new(),
            deferred: HashMap::new(),
            fields: Fields::new(),
            journal: Journal::new(),
        }
    }

    /// Declare a method and its body.
    pub fn method<F>(mut self, signature: MethodSignature, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.handlers.insert(signature.name.clone(), Arc::new(body));
        self.descriptor = self.descriptor.method(signature);
        self
    }

    /// Declare a future-returning method and its body.
    pub fn deferred<F>(mut self, signature: MethodSignature, body: F) -> Self
    where
        F: Fn(&[Value]) -> Deferred + Send + Sync + 'static,
    {
        self.deferred.insert(signature.name.clone(), Arc::new(body));
        self.descriptor = self.descriptor.method(signature);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn sealed(mut self) -> Self {
        self.descriptor = self.descriptor.sealed();
        self
    }

    /// Record into a journal shared with other parties.
    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = journal.clone();
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Number of real invocations of `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.journal.count(&format!("call:{method}"))
    }

    /// Signature of the first declared method named `name`.
    pub fn signature(&self, name: &str) -> Option<&MethodSignature> {
        self.descriptor.methods.iter().find(|m| m.name == name)
    }
}

impl Target for ScriptedTarget {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn call(&self, method: &MethodSignature, args: &[Value]) -> Result<Value, Fault> {
        self.journal.record(format!("call:{}", method.name));
        match self.handlers.get(&method.name) {
            Some(handler) => handler(args),
            None => Err(Fault::msg(format!(
                "{} has no synchronous method {}",
                self.descriptor.name, method.name
            ))),
        }
    }

    fn call_deferred(&self, method: &MethodSignature, args: &[Value]) -> Result<Deferred, Fault> {
        match self.deferred.get(&method.name) {
            Some(handler) => {
                self.journal.record(format!("call:{}", method.name));
                Ok(handler(args))
            }
            None => {
                let value = self.call(method, args)?;
                Ok(futures::future::ready(Ok(value)).boxed())
            }
        }
    }

    fn fields(&self) -> Fields {
        self.fields.clone()
    }
}
