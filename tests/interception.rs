//! End-to-end interception scenarios through the `Weaver` facade.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::json;

use common::{Exploded, Foo, Log, FOO, SLOW};
use weft::advice::{AdviceArgs, AdviceDecl, AdviceKind, Aspect};
use weft::config::WeftConfig;
use weft::descriptor::MethodSignature;
use weft::dispatch::AsyncDispatchError;
use weft::pointcut::Pointcut;
use weft::{Fault, Target, Weaver};

fn logging(log: &Log, entry: &str) -> impl Fn(&AdviceArgs<'_>) -> Result<(), Fault> {
    let log = log.clone();
    let entry = entry.to_string();
    move |_| {
        log.push(entry.clone());
        Ok(())
    }
}

fn foo(log: &Log) -> Arc<dyn Target> {
    Arc::new(Foo::new(log))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn before_advice_runs_once_before_the_method() {
    let log = Log::default();
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("audit")
                .before("execution(* * com.x.Foo.bar(..))", logging(&log, "before"))
                .build(),
        )
        .build()
        .unwrap();

    let woven = weaver.wrap(foo(&log));
    assert!(woven.is_proxied());
    let reply = woven.invoke("bar", vec![]).unwrap();

    assert_eq!(reply.into_value(), Some(json!(21)));
    assert_eq!(log.entries(), vec!["before", "Foo.bar"]);
    assert_eq!(log.count("before"), 1);
}

#[test]
fn around_advice_doubles_the_result() {
    let log = Log::default();
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("double")
                .around("execution(* com.x.Foo.bar(..))", |proceed| {
                    let value = proceed.proceed()?;
                    Ok(json!(value.as_i64().unwrap_or_default() * 2))
                })
                .build(),
        )
        .build()
        .unwrap();

    let reply = weaver.wrap(foo(&log)).invoke("bar", vec![]).unwrap();
    assert_eq!(reply.into_value(), Some(json!(42)));
}

#[test]
fn after_throwing_observes_the_exact_cause() {
    let log = Log::default();
    let seen: Arc<Mutex<Vec<Fault>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("errors")
                .after_throwing("execution(* com.x.Foo.fail(..))", "ex", move |args| {
                    sink.lock().unwrap().extend(args.cause().cloned());
                    Ok(())
                })
                .build(),
        )
        .build()
        .unwrap();

    let target = Arc::new(Foo::new(&log));
    let expected = target.fault().clone();
    let err = weaver.wrap(target).invoke("fail", vec![]).unwrap_err();

    assert!(err.same_as(&expected));
    assert!(err.is::<Exploded>());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].same_as(&expected));
}

#[test]
fn explicit_order_wins_over_registration_order() {
    for reversed in [false, true] {
        let log = Log::default();
        let five = Aspect::builder("five")
            .order(5)
            .before("execution(* com.x.Foo.bar(..))", logging(&log, "order-5"))
            .build();
        let one = Aspect::builder("one")
            .order(1)
            .before("execution(* com.x.Foo.bar(..))", logging(&log, "order-1"))
            .build();
        let aspects = if reversed { vec![one, five] } else { vec![five, one] };

        let weaver = Weaver::builder().build().unwrap();
        for aspect in aspects {
            weaver.register_aspect(aspect).unwrap();
        }
        weaver.wrap(foo(&log)).invoke("bar", vec![]).unwrap();

        assert_eq!(log.entries(), vec!["order-1", "order-5", "Foo.bar"]);
    }
}

#[tokio::test]
async fn timed_out_async_method_returns_null() {
    let config = WeftConfig::from_yaml_str(
        "dispatch:\n  timeout_ms: 50\n  policy: returnNull\n",
    )
    .unwrap();
    let log = Log::default();
    let weaver = Weaver::builder()
        .config(config)
        .tokio_executor()
        .build()
        .unwrap();

    let reply = weaver.wrap(foo(&log)).invoke("slow", vec![]).unwrap();
    let pending = reply.into_future().unwrap();
    let value = tokio::time::timeout(SLOW, pending).await.unwrap().unwrap();

    assert_eq!(value, json!(null));
    assert_eq!(log.entries(), vec!["Foo.slow"]);
}

// ============================================================================
// Async dispatch
// ============================================================================

#[tokio::test]
async fn timed_out_async_method_fails_the_future() {
    let config = WeftConfig::from_yaml_str(
        "dispatch:\n  timeout_ms: 50\n  policy: complete_exceptionally\n",
    )
    .unwrap();
    let weaver = Weaver::builder()
        .config(config)
        .tokio_executor()
        .build()
        .unwrap();

    let reply = weaver
        .wrap(foo(&Log::default()))
        .invoke("slow", vec![])
        .unwrap();
    let err = reply.into_future().unwrap().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AsyncDispatchError>(),
        Some(AsyncDispatchError::Timeout { .. })
    ));
}

#[tokio::test]
async fn async_method_completes_within_timeout() {
    let config = WeftConfig::from_yaml_str("dispatch:\n  timeout_ms: 5000\n").unwrap();
    let weaver = Weaver::builder()
        .config(config)
        .tokio_executor()
        .build()
        .unwrap();

    let reply = weaver
        .wrap(foo(&Log::default()))
        .invoke("slow", vec![])
        .unwrap();
    assert_eq!(reply.into_future().unwrap().await.unwrap(), json!(7));
}

#[tokio::test]
async fn unknown_executor_propagates_synchronously() {
    let config = WeftConfig::from_yaml_str("dispatch:\n  default_executor: missing\n").unwrap();
    let weaver = Weaver::builder()
        .config(config)
        .tokio_executor()
        .build()
        .unwrap();

    let err = weaver
        .wrap(foo(&Log::default()))
        .invoke("slow", vec![])
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<AsyncDispatchError>(),
        Some(&AsyncDispatchError::UnknownExecutor {
            name: "missing".into()
        })
    );
}

#[tokio::test]
async fn fire_and_forget_never_fails_the_caller() {
    let log = Log::default();
    let weaver = Weaver::builder().tokio_executor().build().unwrap();
    let woven = weaver.wrap(foo(&log));

    let ok = woven.invoke("notify", vec![json!("hello")]).unwrap();
    let failed = woven.invoke("notify", vec![json!("boom")]).unwrap();
    assert!(ok.is_detached());
    assert!(failed.is_detached());

    tokio::time::timeout(Duration::from_secs(5), async {
        while log.count("Foo.notify") < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[test]
fn async_method_without_executor_runs_inline() {
    let log = Log::default();
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("audit")
                .before("@annotation(async)", logging(&log, "before"))
                .build(),
        )
        .build()
        .unwrap();

    let reply = weaver
        .wrap(foo(&log))
        .invoke("notify", vec![json!("hello")])
        .unwrap();
    assert_eq!(reply.into_value(), Some(json!(null)));
    assert_eq!(log.entries(), vec!["before", "Foo.notify"]);
}

// ============================================================================
// Laws
// ============================================================================

#[test]
fn pointcut_operators_follow_boolean_algebra() {
    let methods = [
        MethodSignature::new(FOO, "bar").returns("int"),
        MethodSignature::new(FOO, "baz").tag("tx"),
        MethodSignature::new("com.y.Bar", "bar").tag("tx"),
        MethodSignature::new("com.y.Bar", "qux"),
    ];
    let leaves = [
        "execution(* com.x.Foo.*(..))",
        "execution(* *.bar(..))",
        "@annotation(tx)",
    ];

    for method in &methods {
        for a in leaves {
            let pa = Pointcut::parse(a).unwrap();
            let not = Pointcut::parse(&format!("!{a}")).unwrap();
            assert_eq!(not.matches(method), !pa.matches(method), "!{a} on {method}");

            for b in leaves {
                let pb = Pointcut::parse(b).unwrap();
                let and = Pointcut::parse(&format!("{a} && {b}")).unwrap();
                let or = Pointcut::parse(&format!("{a} || {b}")).unwrap();
                assert_eq!(and.matches(method), pa.matches(method) && pb.matches(method));
                assert_eq!(or.matches(method), pa.matches(method) || pb.matches(method));
            }
        }
    }
}

#[test]
fn repeated_lookups_return_identical_lists() {
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("a")
                .advice(AdviceDecl::before("execution(* *.*(..))", |_| Ok(())).order(3))
                .build(),
        )
        .aspect(
            Aspect::builder("b")
                .advice(AdviceDecl::before("execution(* com.x.*.*(..))", |_| Ok(())).order(1))
                .build(),
        )
        .build()
        .unwrap();
    let method = MethodSignature::new(FOO, "bar");

    let first = weaver.registry().advices_for(&method, AdviceKind::Before);
    let second = weaver.registry().advices_for(&method, AdviceKind::Before);
    let key = |list: &[Arc<weft::advice::AdviceDescriptor>]| {
        list.iter().map(|a| (a.aspect_name().to_string(), a.order())).collect::<Vec<_>>()
    };
    assert_eq!(key(&first[..]), key(&second[..]));
    assert_eq!(
        key(&first[..]),
        vec![("b".to_string(), 1), ("a".to_string(), 3)]
    );
}

#[test]
fn around_without_proceed_skips_method_and_after_returning() {
    let log = Log::default();
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("short-circuit")
                .around("execution(* com.x.Foo.*(..))", |_| Ok(json!("skipped")))
                .after_returning("execution(* com.x.Foo.*(..))", "r", logging(&log, "after"))
                .build(),
        )
        .build()
        .unwrap();

    for method in ["bar", "fail"] {
        let reply = weaver.wrap(foo(&log)).invoke(method, vec![]).unwrap();
        assert_eq!(reply.into_value(), Some(json!("skipped")));
    }
    assert!(log.entries().is_empty());
}

#[test]
fn after_throwing_runs_once_per_advice_through_around_layers() {
    let log = Log::default();
    let weaver = Weaver::builder()
        .aspect(
            Aspect::builder("layers")
                .around("execution(* com.x.Foo.fail(..))", |p| p.proceed())
                .around("execution(* com.x.Foo.fail(..))", |p| p.proceed())
                .after_throwing("execution(* com.x.Foo.fail(..))", "ex", logging(&log, "first"))
                .after_throwing("execution(* com.x.Foo.fail(..))", "ex", logging(&log, "second"))
                .build(),
        )
        .build()
        .unwrap();

    let target = Arc::new(Foo::new(&log));
    let expected = target.fault().clone();
    let err = weaver.wrap(target).invoke("fail", vec![]).unwrap_err();

    assert!(err.same_as(&expected));
    assert_eq!(log.entries(), vec!["Foo.fail", "first", "second"]);
}

#[test]
fn wrapped_instance_keeps_field_values() {
    let weaver = Weaver::builder().build().unwrap();
    let woven = weaver.wrap(foo(&Log::default()));
    assert_eq!(woven.field("kind"), Some(json!("foo")));
    assert_eq!(woven.descriptor().name, FOO);
}

#[test]
fn readers_never_see_a_partial_aspect_set() {
    let method = MethodSignature::new(FOO, "bar");
    let pair = |name: &str| {
        Aspect::builder(name)
            .before("execution(* com.x.Foo.*(..))", |_| Ok(()))
            .before("execution(* *.bar(..))", |_| Ok(()))
            .build()
    };
    let weaver = Weaver::builder().aspect(pair("seed")).build().unwrap();
    let registry = Arc::clone(weaver.registry());
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..200 {
                assert!(registry.set_aspects(vec![pair(&format!("gen-{i}"))]).is_empty());
            }
            done.store(true, Ordering::Release);
        });
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let set = registry.advice_set(&method);
                    assert_eq!(set.get(AdviceKind::Before).len(), 2);
                }
            });
        }
    });

    assert_eq!(registry.aspects(), vec!["gen-199"]);
}
