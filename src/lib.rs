//! Hierarchical application-state container.
//!
//! A [`Store`] owns a tree of named modules, each a slice of JSON state plus
//! the mutation/action/getter handlers that read and transform it. Nested
//! modules are assembled into flat, namespace-qualified handler registries;
//! [`Store::commit`] and [`Store::dispatch`] route through those registries
//! with auto-prefixing local contexts and an explicit root escape, derived
//! getters are re-evaluated on every access, and modules can be registered
//! and unregistered at runtime without leaving stale handlers behind.
//!
//! ```ignore
//! let store = Store::new(
//!     ModuleDefinition::new()
//!         .state(json!({ "count": 0 }))
//!         .mutation("increment", |state, n| {
//!             let n = n.and_then(|v| v.as_i64()).unwrap_or(1);
//!             state["count"] = json!(state["count"].as_i64().unwrap_or(0) + n);
//!         }),
//! );
//! store.commit(("increment", json!(2)))?;
//! assert_eq!(store.state()["count"], json!(2));
//! ```

pub mod binding;
pub mod context;
pub mod handler;
pub mod module;
pub mod store;

mod install;
mod util;

pub use binding::{Attachment, BindOptions, StoreBinding};
pub use context::{ActionContext, GettersView};
pub use handler::{
    ActionHookFn, ActionOutcome, ActionRecord, BoxError, DispatchError, DispatchFuture,
    MutationRecord, SubscriberFn,
};
pub use module::{ModuleDefinition, ModulePath, StateSource};
pub use store::{
    ActionHooks, CallArgs, CallOptions, ModuleOptions, PluginFn, Store, StoreError, StoreOptions,
    Subscription,
};

/// Crate version, exposed for host integrations.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
