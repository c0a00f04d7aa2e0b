// tests/modules.rs
// Module tree behavior: namespacing, local contexts, root escapes and the
// dynamic module lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use statetree::{
    ActionContext, ActionHooks, ActionOutcome, CallOptions, GettersView, ModuleDefinition,
    ModuleOptions, Store, StoreError, StoreOptions,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn increment(state: &mut Value, n: Option<Value>) {
    let n = n.and_then(|v| v.as_i64()).unwrap_or(1);
    state["count"] = json!(state["count"].as_i64().unwrap_or(0) + n);
}

fn cart_module() -> ModuleDefinition {
    ModuleDefinition::new()
        .namespaced(true)
        .state(json!({ "count": 0 }))
        .mutation("increment", increment)
        .action("add", |ctx: ActionContext, n| {
            ctx.commit(("increment", n.unwrap_or(json!(1)))).unwrap();
            ActionOutcome::Value(Value::Null)
        })
        .getter("doubled", |state: &Value, _getters, _root, _root_getters| {
            json!(state["count"].as_i64().unwrap_or(0) * 2)
        })
        .getter(
            "quadrupled",
            |_state: &Value, getters: &GettersView, _root, _root_getters| {
                json!(getters.get("doubled").and_then(|v| v.as_i64()).unwrap_or(0) * 2)
            },
        )
}

#[tokio::test]
async fn namespaced_module_registers_prefixed_handlers() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "version": 1 }))
            .module("cart", cart_module()),
    );

    store.commit(("cart/increment", json!(2))).unwrap();
    assert_eq!(store.state()["cart"]["count"], json!(2));

    store.dispatch(("cart/add", json!(3))).unwrap();
    assert_eq!(store.state()["cart"]["count"], json!(5));

    assert_eq!(store.getters().get("cart/doubled"), Some(json!(10)));
    // Getters may depend on other getters through the local view.
    assert_eq!(store.getters().get("cart/quadrupled"), Some(json!(20)));

    // Unprefixed names do not exist at the root.
    assert!(store.dispatch("add").unwrap().is_none());
    assert_eq!(store.state()["cart"]["count"], json!(5));
}

#[tokio::test]
async fn non_namespaced_module_registers_at_parent_namespace() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({}))
            .module(
                "inventory",
                ModuleDefinition::new()
                    .state(json!({ "count": 10 }))
                    .mutation("restock", increment),
            ),
    );

    // The handler is global, the state slice stays nested.
    store.commit(("restock", json!(5))).unwrap();
    assert_eq!(store.state()["inventory"]["count"], json!(15));
}

#[tokio::test]
async fn local_context_scopes_state_and_getters() {
    let observed = Arc::new(AtomicUsize::new(0));
    let observed_in_action = Arc::clone(&observed);

    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "version": 7 }))
            .module(
                "cart",
                cart_module().action("inspect", move |ctx: ActionContext, _n| {
                    assert_eq!(ctx.state()["count"], json!(1));
                    assert_eq!(ctx.root_state()["version"], json!(7));
                    // Local view strips the namespace prefix.
                    assert_eq!(ctx.getters().get("doubled"), Some(json!(2)));
                    assert_eq!(ctx.root_getters().get("cart/doubled"), Some(json!(2)));
                    observed_in_action.fetch_add(1, Ordering::SeqCst);
                    ActionOutcome::Value(Value::Null)
                }),
            ),
    );

    store.commit(("cart/increment", json!(1))).unwrap();
    store.dispatch("cart/inspect").unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn root_escape_targets_global_handlers() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 0 }))
            .mutation("increment", increment)
            .module(
                "cart",
                cart_module().action("spill", |ctx: ActionContext, n| {
                    let n = n.unwrap_or(json!(1));
                    ctx.commit(("increment", n, CallOptions::root())).unwrap();
                    ActionOutcome::Value(Value::Null)
                }),
            ),
    );

    store.dispatch(("cart/spill", json!(4))).unwrap();
    assert_eq!(store.state()["count"], json!(4));
    assert_eq!(store.state()["cart"]["count"], json!(0));
}

#[tokio::test]
async fn unknown_local_type_is_reported_without_delegating() {
    init_tracing();
    let store = Store::new(
        ModuleDefinition::new().state(json!({})).module(
            "cart",
            cart_module().action("broken", |ctx: ActionContext, _n| {
                // Resolves against "cart/missing", which does not exist.
                assert!(ctx.dispatch("missing").unwrap().is_none());
                assert!(ctx.commit("missing").is_ok());
                ActionOutcome::Value(Value::Null)
            }),
        ),
    );

    store.dispatch("cart/broken").unwrap();
    assert_eq!(store.state()["cart"]["count"], json!(0));
}

#[tokio::test]
async fn root_actions_register_unprefixed() {
    let store = Store::new(
        ModuleDefinition::new().state(json!({})).module(
            "deep",
            ModuleDefinition::new()
                .namespaced(true)
                .state(json!({ "count": 0 }))
                .mutation("increment", increment)
                .root_action("ping", |ctx: ActionContext, _n| {
                    // The context is still module-scoped even though the
                    // registration escaped the namespace.
                    ctx.commit(("increment", json!(1))).unwrap();
                    ActionOutcome::Value(Value::Null)
                }),
        ),
    );

    store.dispatch("ping").unwrap();
    assert!(store.dispatch("deep/ping").unwrap().is_none());
    assert_eq!(store.state()["deep"]["count"], json!(1));
}

#[test]
fn multiple_modules_may_register_the_same_mutation_type() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 0 }))
            .mutation("tick", increment)
            .module(
                "meter",
                ModuleDefinition::new()
                    .state(json!({ "count": 100 }))
                    .mutation("tick", increment),
            ),
    );

    store.commit("tick").unwrap();
    assert_eq!(store.state()["count"], json!(1));
    assert_eq!(store.state()["meter"]["count"], json!(101));
}

#[tokio::test]
async fn dispatch_settles_after_every_handler_and_keeps_the_first_result() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 0 }))
            .mutation("increment", increment)
            .action("work", |ctx: ActionContext, _n| {
                ActionOutcome::future(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    ctx.commit("increment")?;
                    Ok(json!("first"))
                })
            })
            .module(
                "meter",
                ModuleDefinition::new()
                    .state(json!({ "count": 0 }))
                    .mutation("bump", increment)
                    .action("work", |ctx: ActionContext, _n| {
                        ActionOutcome::future(async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            ctx.commit("bump")?;
                            Ok(json!("second"))
                        })
                    }),
            ),
    );

    let result = store.dispatch("work").unwrap().unwrap().await.unwrap();
    assert_eq!(result, json!("first"));
    assert_eq!(store.state()["count"], json!(1));
    assert_eq!(store.state()["meter"]["count"], json!(1));
}

#[test]
fn duplicate_getter_keys_are_rejected_not_merged() {
    init_tracing();
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({}))
            .getter("label", |_state: &Value, _getters, _root, _root_getters| {
                json!("root")
            })
            .module(
                "shadow",
                ModuleDefinition::new().state(json!({})).getter(
                    "label",
                    |_state: &Value, _getters, _root, _root_getters| json!("shadow"),
                ),
            ),
    );

    assert_eq!(store.getters().get("label"), Some(json!("root")));
}

#[test]
fn getters_recompute_after_replace_state() {
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 1 }))
            .getter("doubled", |state: &Value, _getters, _root, _root_getters| {
                json!(state["count"].as_i64().unwrap_or(0) * 2)
            }),
    );
    assert_eq!(store.getters().get("doubled"), Some(json!(2)));

    store.replace_state(json!({ "count": 21 }));
    assert_eq!(store.getters().get("doubled"), Some(json!(42)));
}

#[tokio::test]
async fn register_module_installs_handlers_and_state() {
    let store = Store::new(ModuleDefinition::new().state(json!({})));

    store.register_module("session", cart_module()).unwrap();

    assert_eq!(store.state()["session"]["count"], json!(0));
    store.commit(("session/increment", json!(2))).unwrap();
    assert_eq!(store.state()["session"]["count"], json!(2));
    assert_eq!(store.getters().get("session/doubled"), Some(json!(4)));
}

#[tokio::test]
async fn unregister_module_removes_state_and_handlers() {
    init_tracing();
    let store = Store::new(ModuleDefinition::new().state(json!({ "version": 1 })));
    store.register_module("session", cart_module()).unwrap();
    store.commit(("session/increment", json!(2))).unwrap();

    store.unregister_module("session").unwrap();

    assert!(store.state().get("session").is_none());
    assert_eq!(store.state()["version"], json!(1));
    assert!(store.getters().get("session/doubled").is_none());

    // Unknown after removal: a reported no-op, not an error.
    store.commit(("session/increment", json!(2))).unwrap();
    assert!(store.dispatch("session/add").unwrap().is_none());
    assert!(store.state().get("session").is_none());
}

#[test]
fn unregister_of_unknown_path_is_a_warned_no_op() {
    init_tracing();
    let store = Store::new(ModuleDefinition::new().state(json!({ "a": 1 })));
    store.unregister_module("ghost").unwrap();
    assert_eq!(store.state()["a"], json!(1));
}

#[test]
fn module_path_invariants() {
    let store = Store::new(ModuleDefinition::new().state(json!({})));

    let err = store
        .register_module(Vec::<String>::new(), ModuleDefinition::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::RootModuleRegistration));

    let err = store
        .register_module(vec!["missing", "child"], ModuleDefinition::new())
        .unwrap_err();
    assert!(matches!(err, StoreError::ParentModuleNotFound { .. }));

    let err = store.unregister_module(Vec::<String>::new()).unwrap_err();
    assert!(matches!(err, StoreError::EmptyModulePath));
}

#[test]
fn register_module_can_preserve_existing_state() {
    let store = Store::new(ModuleDefinition::new().state(json!({})));
    store.replace_state(json!({ "profile": { "count": 40 } }));

    store
        .register_module_with(
            "profile",
            ModuleDefinition::new()
                .namespaced(true)
                .state(json!({ "count": 0 }))
                .mutation("increment", increment),
            ModuleOptions { preserve_state: true },
        )
        .unwrap();

    assert_eq!(store.state()["profile"]["count"], json!(40));
    store.commit(("profile/increment", json!(2))).unwrap();
    assert_eq!(store.state()["profile"]["count"], json!(42));
}

#[tokio::test]
async fn action_hooks_fire_around_dispatch() {
    let before_calls = Arc::new(AtomicUsize::new(0));
    let after_calls = Arc::new(AtomicUsize::new(0));

    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 0 }))
            .mutation("increment", increment)
            .action("work", |ctx: ActionContext, _n| {
                ActionOutcome::future(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    ctx.commit("increment")?;
                    Ok(Value::Null)
                })
            }),
    );

    let hooks = {
        let before_calls = Arc::clone(&before_calls);
        let after_calls = Arc::clone(&after_calls);
        ActionHooks::new()
            .before(move |record, state| {
                assert_eq!(record.action_type, "work");
                assert_eq!(state["count"], json!(0));
                before_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .after(move |record, state| {
                assert_eq!(record.action_type, "work");
                assert_eq!(state["count"], json!(1));
                after_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    };
    let subscription = store.subscribe_action(hooks);

    let dispatched = store.dispatch("work").unwrap().unwrap();
    assert_eq!(before_calls.load(Ordering::SeqCst), 1);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);

    dispatched.await.unwrap();
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    store.dispatch("work").unwrap().unwrap().await.unwrap();
    assert_eq!(before_calls.load(Ordering::SeqCst), 1);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn faulty_hooks_never_block_dispatch() {
    init_tracing();
    let store = Store::new(
        ModuleDefinition::new()
            .state(json!({ "count": 0 }))
            .mutation("increment", increment)
            .action("work", |ctx: ActionContext, _n| {
                ctx.commit("increment").unwrap();
                ActionOutcome::Value(Value::Null)
            }),
    );

    store.subscribe_action(
        ActionHooks::new()
            .before(|_record, _state| Err("before hook failed".into()))
            .after(|_record, _state| Err("after hook failed".into())),
    );

    store.dispatch("work").unwrap().unwrap().await.unwrap();
    assert_eq!(store.state()["count"], json!(1));
}

#[test]
fn plugins_run_once_against_the_constructed_store() {
    let seen = Arc::new(AtomicUsize::new(0));
    let plugin_seen = Arc::clone(&seen);

    let store = Store::new(
        StoreOptions::new(
            ModuleDefinition::new()
                .state(json!({ "count": 0 }))
                .mutation("increment", increment),
        )
        .plugin(move |store| {
            // The store is fully installed by the time plugins run.
            store.commit(("increment", json!(5))).unwrap();
            plugin_seen.fetch_add(1, Ordering::SeqCst);
        }),
    );

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(store.state()["count"], json!(5));
}
