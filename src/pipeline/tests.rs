use serde_json::json;

use super::*;
use crate::advice::{AdviceArgs, AdviceDecl, Aspect, CauseType, Param};
use crate::test_utils::{Journal, ScriptedTarget};

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

const FOO: &str = "execution(* com.x.Foo.*(..))";

fn pipeline(aspects: Vec<Arc<Aspect>>) -> Pipeline {
    let registry = Arc::new(Registry::new());
    assert!(registry.set_aspects(aspects).is_empty());
    Pipeline::new(registry)
}

fn foo(journal: &Journal, fault: Fault) -> ScriptedTarget {
    ScriptedTarget::new("com.x.Foo")
        .method(MethodSignature::new("", "bar").returns("int"), |_| Ok(json!(21)))
        .method(MethodSignature::new("", "fail"), move |_| Err(fault.clone()))
        .method(MethodSignature::new("", "echo").params(["int"]), |args| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        })
        .with_journal(journal)
}

fn sig(target: &ScriptedTarget, name: &str) -> MethodSignature {
    target.signature(name).unwrap().clone()
}

fn record(journal: &Journal, entry: &str) -> impl Fn(&AdviceArgs<'_>) -> Result<(), Fault> {
    let journal = journal.clone();
    let entry = entry.to_string();
    move |_| {
        journal.record(entry.clone());
        Ok(())
    }
}

#[test]
fn test_success_runs_before_target_then_after_family() {
    let journal = Journal::new();
    let aspect = Aspect::builder("trace")
        .after(FOO, record(&journal, "after"))
        .after_returning(FOO, "result", record(&journal, "after-returning"))
        .before(FOO, record(&journal, "before"))
        .after_throwing(FOO, "ex", record(&journal, "after-throwing"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();

    assert_eq!(value, json!(21));
    assert_eq!(
        journal.entries(),
        vec!["before", "call:bar", "after-returning", "after"]
    );
}

#[test]
fn test_failure_runs_after_throwing_with_original_cause() {
    let journal = Journal::new();
    let fault = Fault::new(Boom);
    let observed = Arc::new(std::sync::Mutex::new(None));
    let sink = Arc::clone(&observed);
    let aspect = Aspect::builder("errors")
        .after_throwing(FOO, "ex", move |args| {
            *sink.lock().unwrap() = args.cause().cloned();
            Ok(())
        })
        .after(FOO, record(&journal, "after"))
        .after_returning(FOO, "result", record(&journal, "after-returning"))
        .build();
    let target = foo(&journal, fault.clone());

    let err = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "fail"), vec![])
        .unwrap_err();

    assert!(err.same_as(&fault));
    assert!(observed.lock().unwrap().as_ref().unwrap().same_as(&fault));
    assert_eq!(journal.entries(), vec!["call:fail"]);
}

#[test]
fn test_after_throwing_runs_once_per_advice() {
    let journal = Journal::new();
    let aspect = Aspect::builder("errors")
        .after_throwing(FOO, "ex", record(&journal, "first"))
        .after_throwing(FOO, "ex", record(&journal, "second"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let _ = pipeline(vec![aspect]).invoke_sync(&target, &sig(&target, "fail"), vec![]);
    assert_eq!(journal.count("first"), 1);
    assert_eq!(journal.count("second"), 1);
}

#[test]
fn test_failing_before_advice_does_not_block_target() {
    let journal = Journal::new();
    let aspect = Aspect::builder("buggy")
        .before(FOO, |_| Err(Fault::msg("advice bug")))
        .before(FOO, record(&journal, "second-before"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!(21));
    assert_eq!(journal.entries(), vec!["second-before", "call:bar"]);
}

#[test]
fn test_failing_after_advice_keeps_result() {
    let journal = Journal::new();
    let aspect = Aspect::builder("buggy")
        .after_returning(FOO, "result", |_| Err(Fault::msg("advice bug")))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!(21));
}

#[test]
fn test_unbindable_advice_is_skipped() {
    let journal = Journal::new();
    let aspect = Aspect::builder("binding")
        .advice(
            AdviceDecl::after_returning(FOO, "result", record(&journal, "wants-cause"))
                .params([Param::Cause(CauseType::Any)]),
        )
        .after_returning(FOO, "result", record(&journal, "ok"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!(21));
    assert_eq!(journal.entries(), vec!["call:bar", "ok"]);
}

#[test]
fn test_after_returning_sees_returned_value() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let aspect = Aspect::builder("values")
        .after_returning(FOO, "result", move |args| {
            sink.lock().unwrap().extend(args.returned().cloned());
            Ok(())
        })
        .build();
    let target = foo(&Journal::new(), Fault::new(Boom));

    pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "echo"), vec![json!(7)])
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![json!(7)]);
}

#[test]
fn test_around_transforms_result() {
    let aspect = Aspect::builder("double")
        .around(FOO, |proceed| {
            let value = proceed.proceed()?;
            Ok(json!(value.as_i64().unwrap_or(0) * 2))
        })
        .build();
    let target = foo(&Journal::new(), Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!(42));
}

#[test]
fn test_around_without_proceed_suppresses_target_and_after_returning() {
    let journal = Journal::new();
    let aspect = Aspect::builder("gate")
        .around(FOO, |_| Ok(json!("cached")))
        .after_returning(FOO, "result", record(&journal, "after-returning"))
        .after(FOO, record(&journal, "after"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!("cached"));
    assert!(journal.entries().is_empty());
}

#[test]
fn test_around_may_proceed_many_times() {
    let journal = Journal::new();
    let aspect = Aspect::builder("retry")
        .around(FOO, |proceed| {
            proceed.proceed()?;
            proceed.proceed()
        })
        .build();
    let target = foo(&journal, Fault::new(Boom));

    pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(target.calls("bar"), 2);
}

#[test]
fn test_around_layers_nest_by_order() {
    let journal = Journal::new();
    let layer = |name: &'static str, journal: &Journal| {
        let journal = journal.clone();
        move |proceed: &Proceed<'_>| {
            journal.record(format!("enter:{name}"));
            let result = proceed.proceed();
            journal.record(format!("exit:{name}"));
            result
        }
    };
    let outer = Aspect::builder("outer")
        .advice(AdviceDecl::around(FOO, layer("1", &journal)).order(1))
        .build();
    let inner = Aspect::builder("inner")
        .advice(AdviceDecl::around(FOO, layer("5", &journal)).order(5))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    pipeline(vec![inner, outer])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(
        journal.entries(),
        vec!["enter:1", "enter:5", "call:bar", "exit:5", "exit:1"]
    );
}

#[test]
fn test_proceed_with_replaces_arguments() {
    let aspect = Aspect::builder("rewrite")
        .around(FOO, |proceed| {
            assert_eq!(proceed.args(), &[json!(1)]);
            proceed.proceed_with(vec![json!(99)])
        })
        .build();
    let target = foo(&Journal::new(), Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "echo"), vec![json!(1)])
        .unwrap();
    assert_eq!(value, json!(99));
}

#[test]
fn test_around_failure_runs_after_throwing_and_propagates() {
    let journal = Journal::new();
    let fault = Fault::new(Boom);
    let aspect = Aspect::builder("observe")
        .around(FOO, |proceed| proceed.proceed())
        .after_throwing(FOO, "ex", record(&journal, "after-throwing"))
        .build();
    let target = foo(&journal, fault.clone());

    let err = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "fail"), vec![])
        .unwrap_err();
    assert!(err.same_as(&fault));
    assert_eq!(journal.entries(), vec!["call:fail", "after-throwing"]);
}

#[test]
fn test_around_may_recover_from_failure() {
    let journal = Journal::new();
    let aspect = Aspect::builder("recover")
        .around(FOO, |proceed| proceed.proceed().or(Ok(json!("fallback"))))
        .after_returning(FOO, "result", record(&journal, "after-returning"))
        .after_throwing(FOO, "ex", record(&journal, "after-throwing"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "fail"), vec![])
        .unwrap();
    assert_eq!(value, json!("fallback"));
    assert_eq!(journal.entries(), vec!["call:fail", "after-returning"]);
}

#[test]
fn test_before_is_not_run_when_around_matches() {
    let journal = Journal::new();
    let aspect = Aspect::builder("mixed")
        .before(FOO, record(&journal, "before"))
        .around(FOO, |proceed| proceed.proceed())
        .build();
    let target = foo(&journal, Fault::new(Boom));

    pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(journal.entries(), vec!["call:bar"]);
}

#[test]
fn test_unmatched_method_runs_plain() {
    let journal = Journal::new();
    let aspect = Aspect::builder("elsewhere")
        .before("execution(* com.y.*.*(..))", record(&journal, "before"))
        .build();
    let target = foo(&journal, Fault::new(Boom));

    let value = pipeline(vec![aspect])
        .invoke_sync(&target, &sig(&target, "bar"), vec![])
        .unwrap();
    assert_eq!(value, json!(21));
    assert_eq!(journal.entries(), vec!["call:bar"]);
}

#[test]
fn test_async_method_without_dispatcher_runs_inline() {
    let journal = Journal::new();
    let aspect = Aspect::builder("trace")
        .before(FOO, record(&journal, "before"))
        .build();
    let target: Arc<dyn Target> = Arc::new(
        ScriptedTarget::new("com.x.Foo")
            .method(MethodSignature::new("", "run").tag("async"), |_| Ok(json!("ran")))
            .with_journal(&journal),
    );
    let method = target.descriptor().methods[0].clone();

    let reply = pipeline(vec![aspect]).invoke(&target, &method, vec![]).unwrap();
    assert_eq!(reply.into_value(), Some(json!("ran")));
    assert_eq!(journal.entries(), vec!["before", "call:run"]);
}

#[test]
fn test_plain_method_returns_value_reply() {
    let target: Arc<dyn Target> = Arc::new(foo(&Journal::new(), Fault::new(Boom)));
    let method = target.descriptor().methods[0].clone();

    let reply = pipeline(vec![]).invoke(&target, &method, vec![]).unwrap();
    assert!(matches!(reply, Reply::Value(ref v) if *v == json!(21)));
}
