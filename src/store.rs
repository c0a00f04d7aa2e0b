// src/store.rs
// The store engine: flat handler registries, dispatch/commit protocol,
// subscriptions and the dynamic module lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::context::{make_local_context, root_getters_view, GettersView, WrappedGetter};
use crate::handler::{
    ActionFn, ActionHookFn, ActionRecord, BoxError, DispatchError, DispatchFuture, MutationFn,
    MutationRecord, SubscriberFn,
};
use crate::install::{install_module, reset_store};
use crate::module::tree::ModuleTree;
use crate::module::{ModuleDefinition, ModulePath};
use crate::util::{json_kind, nested_mut};

/// Hard invariant violations. These indicate programmer error; soft routing
/// failures (unknown types, duplicate keys) are reported as diagnostics and
/// degrade to no-ops instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("expects string as the type, but found {found}.")]
    InvalidCallType { found: &'static str },

    #[error("cannot register the root module by using register_module.")]
    RootModuleRegistration,

    #[error("module path must not be empty.")]
    EmptyModulePath,

    #[error("parent module not found for path \"{path}\"")]
    ParentModuleNotFound { path: String },
}

/// Options on a commit or dispatch call. `root` escapes namespace
/// prefixing inside a module's local context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub root: bool,
}

impl CallOptions {
    pub fn root() -> Self {
        CallOptions { root: true }
    }
}

/// Arguments to `commit`/`dispatch` in either calling convention:
/// positional `(type, payload[, options])`, or a single object whose
/// `"type"` field names the handler and which is itself the payload.
#[derive(Debug, Clone)]
pub enum CallArgs {
    Positional {
        call_type: String,
        payload: Option<Value>,
        options: Option<CallOptions>,
    },
    Object {
        payload: Value,
        options: Option<CallOptions>,
    },
}

impl From<&str> for CallArgs {
    fn from(call_type: &str) -> Self {
        CallArgs::Positional { call_type: call_type.to_string(), payload: None, options: None }
    }
}

impl From<String> for CallArgs {
    fn from(call_type: String) -> Self {
        CallArgs::Positional { call_type, payload: None, options: None }
    }
}

impl From<(&str, Value)> for CallArgs {
    fn from((call_type, payload): (&str, Value)) -> Self {
        CallArgs::Positional {
            call_type: call_type.to_string(),
            payload: Some(payload),
            options: None,
        }
    }
}

impl From<(String, Value)> for CallArgs {
    fn from((call_type, payload): (String, Value)) -> Self {
        CallArgs::Positional { call_type, payload: Some(payload), options: None }
    }
}

impl From<(&str, Value, CallOptions)> for CallArgs {
    fn from((call_type, payload, options): (&str, Value, CallOptions)) -> Self {
        CallArgs::Positional {
            call_type: call_type.to_string(),
            payload: Some(payload),
            options: Some(options),
        }
    }
}

impl From<(String, Value, CallOptions)> for CallArgs {
    fn from((call_type, payload, options): (String, Value, CallOptions)) -> Self {
        CallArgs::Positional { call_type, payload: Some(payload), options: Some(options) }
    }
}

impl From<Value> for CallArgs {
    fn from(payload: Value) -> Self {
        CallArgs::Object { payload, options: None }
    }
}

impl From<(Value, CallOptions)> for CallArgs {
    fn from((payload, options): (Value, CallOptions)) -> Self {
        CallArgs::Object { payload, options: Some(options) }
    }
}

/// A normalized `(type, payload, root)` triple.
#[derive(Debug, Clone)]
pub(crate) struct TypedCall {
    pub call_type: String,
    pub payload: Option<Value>,
    pub root: bool,
}

/// Normalize both calling conventions into a [`TypedCall`]. Object-style
/// arguments must carry a string `"type"` field; the whole object is the
/// payload.
pub(crate) fn unify_call_style(args: CallArgs) -> Result<TypedCall, StoreError> {
    match args {
        CallArgs::Positional { call_type, payload, options } => Ok(TypedCall {
            call_type,
            payload,
            root: options.map(|o| o.root).unwrap_or(false),
        }),
        CallArgs::Object { payload, options } => {
            let root = options.map(|o| o.root).unwrap_or(false);
            match &payload {
                Value::String(call_type) => Ok(TypedCall {
                    call_type: call_type.clone(),
                    payload: None,
                    root,
                }),
                Value::Object(map) => match map.get("type") {
                    Some(Value::String(call_type)) => Ok(TypedCall {
                        call_type: call_type.clone(),
                        payload: Some(payload.clone()),
                        root,
                    }),
                    Some(Value::Null) | None => {
                        Err(StoreError::InvalidCallType { found: "undefined" })
                    }
                    Some(other) => Err(StoreError::InvalidCallType { found: json_kind(other) }),
                },
                other => Err(StoreError::InvalidCallType { found: json_kind(other) }),
            }
        }
    }
}

/// A mutation handler bound to its module path. Commit resolves the local
/// state slice by path under the state write lock.
#[derive(Clone)]
pub(crate) struct MutationEntry {
    pub path: Vec<String>,
    pub handler: Arc<MutationFn>,
}

/// An action handler bound to its module's namespace and path; the local
/// context is rebuilt from these on every dispatch.
#[derive(Clone)]
pub(crate) struct ActionEntry {
    pub namespace: String,
    pub path: Vec<String>,
    pub handler: Arc<ActionFn>,
}

struct SubscriberEntry {
    id: Uuid,
    handler: Arc<SubscriberFn>,
}

/// Before/after hooks around dispatch. A bare hook converts into a
/// before-only pair.
#[derive(Clone, Default)]
pub struct ActionHooks {
    pub before: Option<Arc<ActionHookFn>>,
    pub after: Option<Arc<ActionHookFn>>,
}

impl ActionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ActionRecord, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }
}

impl From<Arc<ActionHookFn>> for ActionHooks {
    fn from(before: Arc<ActionHookFn>) -> Self {
        ActionHooks { before: Some(before), after: None }
    }
}

struct ActionSubscriberEntry {
    id: Uuid,
    hooks: ActionHooks,
}

/// Shared engine state: the live root state document plus the flat,
/// namespace-qualified handler registries rebuilt by the installer.
pub(crate) struct StoreInner {
    pub state: RwLock<Value>,
    pub modules: RwLock<ModuleTree>,
    pub mutations: RwLock<HashMap<String, Vec<MutationEntry>>>,
    pub actions: RwLock<HashMap<String, Vec<ActionEntry>>>,
    pub wrapped_getters: RwLock<HashMap<String, Arc<WrappedGetter>>>,
    pub namespace_map: RwLock<HashMap<String, Vec<String>>>,
    pub local_getters_cache: RwLock<HashMap<String, Arc<Vec<String>>>>,
    subscribers: RwLock<Vec<SubscriberEntry>>,
    action_subscribers: RwLock<Vec<ActionSubscriberEntry>>,
}

impl StoreInner {
    /// Run every handler registered for the mutation type, synchronously and
    /// in registration order, then notify mutation subscribers.
    pub(crate) fn commit_call(&self, call: TypedCall) {
        let entries: Vec<MutationEntry> = match self.mutations.read().get(&call.call_type) {
            Some(entries) if !entries.is_empty() => entries.clone(),
            _ => {
                tracing::error!("unknown mutation type: {}", call.call_type);
                return;
            }
        };

        {
            let mut state = self.state.write();
            for entry in &entries {
                match nested_mut(&mut state, &entry.path) {
                    Some(slice) => (entry.handler)(slice, call.payload.clone()),
                    None => tracing::warn!(
                        "mutation {} skipped: state slice at \"{}\" is gone",
                        call.call_type,
                        entry.path.join(".")
                    ),
                }
            }
        }

        let record = MutationRecord { mutation_type: call.call_type, payload: call.payload };
        let snapshot = self.state.read().clone();
        let handlers: Vec<Arc<SubscriberFn>> = self
            .subscribers
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect();
        for handler in handlers {
            handler(&record, &snapshot);
        }
    }

    fn notify_action_hooks(&self, phase: HookPhase, record: &ActionRecord) {
        let snapshot = self.state.read().clone();
        let hooks: Vec<Arc<ActionHookFn>> = self
            .action_subscribers
            .read()
            .iter()
            .filter_map(|entry| match phase {
                HookPhase::Before => entry.hooks.before.clone(),
                HookPhase::After => entry.hooks.after.clone(),
            })
            .collect();
        for hook in hooks {
            if let Err(err) = hook(record, &snapshot) {
                match phase {
                    HookPhase::Before => {
                        tracing::warn!("error in before action subscribers: {err}")
                    }
                    HookPhase::After => tracing::warn!("error in after action subscribers: {err}"),
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum HookPhase {
    Before,
    After,
}

/// Invoke every handler registered for the action type and return a future
/// settling once all of them have settled. `None` when the type has no
/// registered handler.
///
/// Handler bodies run eagerly inside this call; deferred work is spawned
/// onto the ambient tokio runtime so it is hot whether or not the caller
/// awaits the returned future, and so after hooks fire on settlement either
/// way.
pub(crate) fn dispatch_call(inner: &Arc<StoreInner>, call: TypedCall) -> Option<DispatchFuture> {
    let entries: Vec<ActionEntry> = match inner.actions.read().get(&call.call_type) {
        Some(entries) if !entries.is_empty() => entries.clone(),
        _ => {
            tracing::error!("unknown action type: {}", call.call_type);
            return None;
        }
    };

    let record = ActionRecord { action_type: call.call_type, payload: call.payload };
    inner.notify_action_hooks(HookPhase::Before, &record);

    let futures: Vec<_> = entries
        .iter()
        .map(|entry| {
            let context =
                make_local_context(inner, entry.namespace.clone(), entry.path.clone());
            (entry.handler)(context, record.payload.clone()).into_future()
        })
        .collect();

    let driver_inner = Arc::clone(inner);
    let driver = tokio::spawn(async move {
        let results = futures::future::join_all(futures).await;
        driver_inner.notify_action_hooks(HookPhase::After, &record);

        let mut first_value = None;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(value) => {
                    if first_value.is_none() {
                        first_value = Some(value);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(DispatchError::Handler(err)),
            None => Ok(first_value.unwrap_or(Value::Null)),
        }
    });

    Some(Box::pin(async move {
        match driver.await {
            Ok(result) => result,
            Err(err) => Err(DispatchError::Join(err.to_string())),
        }
    }))
}

/// Plugin invoked once, synchronously, right after the initial install.
pub type PluginFn = Box<dyn FnOnce(&Store) + Send>;

/// Store construction options: the root module definition plus plugins.
#[derive(Default)]
pub struct StoreOptions {
    root: ModuleDefinition,
    plugins: Vec<PluginFn>,
}

impl StoreOptions {
    pub fn new(root: ModuleDefinition) -> Self {
        StoreOptions { root, plugins: Vec::new() }
    }

    pub fn plugin<F>(mut self, plugin: F) -> Self
    where
        F: FnOnce(&Store) + Send + 'static,
    {
        self.plugins.push(Box::new(plugin));
        self
    }
}

impl From<ModuleDefinition> for StoreOptions {
    fn from(root: ModuleDefinition) -> Self {
        StoreOptions::new(root)
    }
}

/// Options for dynamic module registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleOptions {
    /// Skip linking the new subtree's state into the parent state object,
    /// resuming over previously restored state instead.
    pub preserve_state: bool,
}

/// Handle to a subscription; `unsubscribe` is a no-op after the first call
/// and dropping the handle does not unsubscribe.
pub struct Subscription {
    inner: Weak<StoreInner>,
    id: Uuid,
    kind: SubscriptionKind,
}

#[derive(Clone, Copy)]
enum SubscriptionKind {
    Mutation,
    Action,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.inner.upgrade() else { return };
        match self.kind {
            SubscriptionKind::Mutation => {
                inner.subscribers.write().retain(|entry| entry.id != self.id)
            }
            SubscriptionKind::Action => inner
                .action_subscribers
                .write()
                .retain(|entry| entry.id != self.id),
        }
    }
}

/// The centralized, hierarchical application-state container.
///
/// Cloning a `Store` clones a handle to the same engine.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Build a store from a root module definition (or full
    /// [`StoreOptions`]): resolve the module tree, install every module into
    /// the flat registries, then run the plugins.
    pub fn new(options: impl Into<StoreOptions>) -> Store {
        let StoreOptions { root, plugins } = options.into();
        let tree = ModuleTree::new(root);
        let root_state = tree.root.state.clone();

        let inner = Arc::new(StoreInner {
            state: RwLock::new(root_state),
            modules: RwLock::new(tree),
            mutations: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            wrapped_getters: RwLock::new(HashMap::new()),
            namespace_map: RwLock::new(HashMap::new()),
            local_getters_cache: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            action_subscribers: RwLock::new(Vec::new()),
        });

        {
            let tree = inner.modules.read();
            install_module(&inner, &tree, &[], &tree.root, false);
        }

        let store = Store { inner };
        for plugin in plugins {
            plugin(&store);
        }
        store
    }

    /// Snapshot of the current root state. The root document is only
    /// replaced wholesale through [`Store::replace_state`]; mutations go
    /// through [`Store::commit`].
    pub fn state(&self) -> Value {
        self.inner.state.read().clone()
    }

    /// The root getters view, always reflecting the current registry.
    pub fn getters(&self) -> GettersView {
        root_getters_view(&self.inner)
    }

    /// Commit a mutation: run every handler registered for the type
    /// synchronously and in registration order, then notify subscribers.
    /// An unknown type is reported and the commit is a no-op.
    pub fn commit(&self, args: impl Into<CallArgs>) -> Result<(), StoreError> {
        let call = unify_call_style(args.into())?;
        self.inner.commit_call(call);
        Ok(())
    }

    /// Dispatch an action. Returns `Ok(None)` for an unknown type (reported
    /// as a diagnostic, state untouched); otherwise a future settling once
    /// every handler for the type has settled, resolving with the single
    /// (or first-registered) handler's value and failing with the first
    /// handler failure.
    ///
    /// Must be called within a tokio runtime; deferred handler work is
    /// spawned so it runs whether or not the returned future is awaited.
    pub fn dispatch(&self, args: impl Into<CallArgs>) -> Result<Option<DispatchFuture>, StoreError> {
        let call = unify_call_style(args.into())?;
        Ok(dispatch_call(&self.inner, call))
    }

    /// Subscribe to mutations. Re-subscribing the same handler (same `Arc`)
    /// is a no-op returning a handle to the existing registration.
    pub fn subscribe(&self, handler: Arc<SubscriberFn>) -> Subscription {
        let mut subscribers = self.inner.subscribers.write();
        let existing = subscribers
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.handler, &handler))
            .map(|entry| entry.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                subscribers.push(SubscriberEntry { id, handler });
                id
            }
        };
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Mutation,
        }
    }

    /// Subscribe before/after hooks around dispatch. Hook failures are
    /// logged and never abort the dispatch in progress.
    pub fn subscribe_action(&self, hooks: impl Into<ActionHooks>) -> Subscription {
        let hooks = hooks.into();
        let id = Uuid::new_v4();
        self.inner
            .action_subscribers
            .write()
            .push(ActionSubscriberEntry { id, hooks });
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            kind: SubscriptionKind::Action,
        }
    }

    /// Register a module at `path` at runtime. All but the last path
    /// segment must already exist.
    pub fn register_module(
        &self,
        path: impl Into<ModulePath>,
        definition: ModuleDefinition,
    ) -> Result<(), StoreError> {
        self.register_module_with(path, definition, ModuleOptions::default())
    }

    /// [`Store::register_module`] with explicit [`ModuleOptions`].
    pub fn register_module_with(
        &self,
        path: impl Into<ModulePath>,
        definition: ModuleDefinition,
        options: ModuleOptions,
    ) -> Result<(), StoreError> {
        let path = path.into();
        if path.is_empty() {
            return Err(StoreError::RootModuleRegistration);
        }

        self.inner
            .modules
            .write()
            .register(path.segments(), definition)?;

        {
            let tree = self.inner.modules.read();
            match tree.get(path.segments()) {
                Some(node) => install_module(
                    &self.inner,
                    &tree,
                    path.segments(),
                    node,
                    options.preserve_state,
                ),
                None => unreachable!("module registered above"),
            }
        }

        // Local getter views snapshot the registry key set.
        self.inner.local_getters_cache.write().clear();
        Ok(())
    }

    /// Unregister the module at `path`: remove it from the tree, delete its
    /// field from the parent's live state object and fully rebuild every
    /// registry from the remaining tree. A path that resolves to nothing is
    /// a warned no-op.
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> Result<(), StoreError> {
        let path = path.into();
        if path.is_empty() {
            return Err(StoreError::EmptyModulePath);
        }

        let removed = self.inner.modules.write().unregister(path.segments());
        if !removed {
            tracing::warn!("unregister_module: no module registered at \"{}\"", path.display());
            return Ok(());
        }

        {
            let segments = path.segments();
            let (key, parent_path) = match segments.split_last() {
                Some(split) => split,
                None => unreachable!("path checked non-empty"),
            };
            let mut state = self.inner.state.write();
            if let Some(parent) = nested_mut(&mut state, parent_path).and_then(Value::as_object_mut)
            {
                parent.remove(key);
            }
        }

        reset_store(&self.inner);
        Ok(())
    }

    /// Replace the root state document wholesale, bypassing mutation
    /// tracking. The escape hatch for bulk restoration.
    pub fn replace_state(&self, state: Value) {
        *self.inner.state.write() = state;
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("mutations", &self.inner.mutations.read().len())
            .field("actions", &self.inner.actions.read().len())
            .field("getters", &self.inner.wrapped_getters.read().len())
            .field("subscribers", &self.inner.subscribers.read().len())
            .finish()
    }
}
