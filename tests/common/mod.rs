//! Shared fixtures for interception tests.
//!
//! `Foo` is a hand-written target exercising the public `Target` contract the
//! way a front-end generated binding would.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;

use weft::descriptor::{MethodSignature, TypeDescriptor};
use weft::interfaces::{Deferred, Fields};
use weft::{Fault, Target, Value};

pub const FOO: &str = "com.x.Foo";

/// How long `Foo.slow` takes to complete.
pub const SLOW: Duration = Duration::from_millis(500);

/// Failure raised by `Foo.fail`.
#[derive(Debug, thiserror::Error)]
#[error("bar exploded")]
pub struct Exploded;

/// Ordered event log shared between a target and advice bodies.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

pub struct Foo {
    descriptor: TypeDescriptor,
    log: Log,
    fault: Fault,
}

impl Foo {
    pub fn new(log: &Log) -> Self {
        let descriptor = TypeDescriptor::new(FOO)
            .method(MethodSignature::new(FOO, "bar").returns("int"))
            .method(MethodSignature::new(FOO, "fail"))
            .method(
                MethodSignature::new(FOO, "slow")
                    .returns("CompletableFuture<Integer>")
                    .tag("async"),
            )
            .method(MethodSignature::new(FOO, "notify").params(["String"]).tag("async"));
        Self {
            descriptor,
            log: log.clone(),
            fault: Fault::new(Exploded),
        }
    }

    /// The exact cause `fail` raises on every call.
    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    pub fn signature(&self, name: &str) -> MethodSignature {
        self.descriptor
            .methods
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .unwrap()
    }
}

impl Target for Foo {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn call(&self, method: &MethodSignature, args: &[Value]) -> Result<Value, Fault> {
        self.log.push(format!("Foo.{}", method.name));
        match method.name.as_str() {
            "bar" => Ok(json!(21)),
            "fail" => Err(self.fault.clone()),
            "notify" => match args.first().and_then(Value::as_str) {
                Some("boom") => Err(Fault::new(Exploded)),
                _ => Ok(Value::Null),
            },
            other => Err(Fault::msg(format!("no method {other}"))),
        }
    }

    fn call_deferred(&self, method: &MethodSignature, args: &[Value]) -> Result<Deferred, Fault> {
        if method.name != "slow" {
            let value = self.call(method, args)?;
            return Ok(futures::future::ready(Ok(value)).boxed());
        }
        self.log.push("Foo.slow");
        Ok(async {
            tokio::time::sleep(SLOW).await;
            Ok(json!(7))
        }
        .boxed())
    }

    fn fields(&self) -> Fields {
        Fields::from([("kind".to_string(), json!("foo"))])
    }
}
