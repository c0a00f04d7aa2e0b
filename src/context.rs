// src/context.rs
// Namespace-scoped views: the local context handed to action handlers and
// the lazily-evaluated getter views.

use std::sync::Arc;

use serde_json::Value;

use crate::handler::{DispatchFuture, GetterFn};
use crate::store::{dispatch_call, unify_call_style, CallArgs, StoreError, StoreInner};
use crate::util::nested;

/// A read-only view over the registered getters, optionally filtered to one
/// namespace with the prefix stripped.
///
/// Every access re-runs the underlying getter against the current root
/// state; nothing about the computed values is cached.
#[derive(Clone)]
pub struct GettersView {
    inner: Arc<StoreInner>,
    namespace: String,
    keys: Arc<Vec<String>>,
}

impl GettersView {
    /// Evaluate the getter registered under `name` (local to this view's
    /// namespace). `None` when no such getter exists.
    pub fn get(&self, name: &str) -> Option<Value> {
        let qualified = format!("{}{}", self.namespace, name);
        let wrapped = self.inner.wrapped_getters.read().get(&qualified).cloned()?;
        Some(wrapped.evaluate(&self.inner))
    }

    /// Local getter names visible through this view, as captured when the
    /// view was built.
    pub fn keys(&self) -> Vec<String> {
        self.keys.as_ref().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        let qualified = format!("{}{}", self.namespace, name);
        self.inner.wrapped_getters.read().contains_key(&qualified)
    }
}

impl std::fmt::Debug for GettersView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GettersView")
            .field("namespace", &self.namespace)
            .field("keys", &self.keys)
            .finish()
    }
}

/// The root getters view, always reflecting the current registry.
pub(crate) fn root_getters_view(inner: &Arc<StoreInner>) -> GettersView {
    let keys: Vec<String> = inner.wrapped_getters.read().keys().cloned().collect();
    GettersView {
        inner: Arc::clone(inner),
        namespace: String::new(),
        keys: Arc::new(keys),
    }
}

/// The namespace-filtered view: key list memoized per namespace until the
/// next registry rebuild clears the cache.
pub(crate) fn local_getters_view(inner: &Arc<StoreInner>, namespace: &str) -> GettersView {
    if let Some(keys) = inner.local_getters_cache.read().get(namespace) {
        return GettersView {
            inner: Arc::clone(inner),
            namespace: namespace.to_string(),
            keys: Arc::clone(keys),
        };
    }
    let keys: Vec<String> = inner
        .wrapped_getters
        .read()
        .keys()
        .filter_map(|key| key.strip_prefix(namespace))
        .map(|local| local.to_string())
        .collect();
    let keys = Arc::new(keys);
    inner
        .local_getters_cache
        .write()
        .insert(namespace.to_string(), Arc::clone(&keys));
    GettersView {
        inner: Arc::clone(inner),
        namespace: namespace.to_string(),
        keys,
    }
}

/// A registered getter bound to its module's namespace and path.
pub(crate) struct WrappedGetter {
    pub namespace: String,
    pub path: Vec<String>,
    pub handler: Arc<GetterFn>,
}

impl WrappedGetter {
    /// Run the raw getter with `(local_state, local_getters, root_state,
    /// root_getters)` resolved from the store's current state and registry.
    pub(crate) fn evaluate(&self, inner: &Arc<StoreInner>) -> Value {
        let root_state = inner.state.read().clone();
        let local_state = nested(&root_state, &self.path).cloned().unwrap_or(Value::Null);
        let root_getters = root_getters_view(inner);
        if self.namespace.is_empty() {
            (self.handler)(&local_state, &root_getters, &root_state, &root_getters)
        } else {
            let local_getters = local_getters_view(inner, &self.namespace);
            (self.handler)(&local_state, &local_getters, &root_state, &root_getters)
        }
    }
}

/// The namespace-scoped context handed to every action handler: `dispatch`
/// and `commit` auto-prefix types with the module's namespace unless the
/// call opts into the root escape, `getters` and `state` expose the
/// module's own slice, and `root_state`/`root_getters` are always the
/// store's own.
#[derive(Clone)]
pub struct ActionContext {
    inner: Arc<StoreInner>,
    namespace: String,
    path: Vec<String>,
}

impl ActionContext {
    /// Dispatch an action. The type is prefixed with this module's
    /// namespace unless `CallOptions::root()` is given; a prefixed type
    /// with no registered handler is reported and yields `Ok(None)` without
    /// delegating.
    pub fn dispatch(
        &self,
        args: impl Into<CallArgs>,
    ) -> Result<Option<DispatchFuture>, StoreError> {
        let mut call = unify_call_style(args.into())?;
        if !self.namespace.is_empty() && !call.root {
            let local_type = call.call_type;
            call.call_type = format!("{}{}", self.namespace, local_type);
            if !self.inner.actions.read().contains_key(&call.call_type) {
                tracing::error!(
                    "unknown local action type: {}, global type: {}",
                    local_type,
                    call.call_type
                );
                return Ok(None);
            }
        }
        Ok(dispatch_call(&self.inner, call))
    }

    /// Commit a mutation, with the same prefixing contract as
    /// [`ActionContext::dispatch`] but fully synchronous.
    pub fn commit(&self, args: impl Into<CallArgs>) -> Result<(), StoreError> {
        let mut call = unify_call_style(args.into())?;
        if !self.namespace.is_empty() && !call.root {
            let local_type = call.call_type;
            call.call_type = format!("{}{}", self.namespace, local_type);
            if !self.inner.mutations.read().contains_key(&call.call_type) {
                tracing::error!(
                    "unknown local mutation type: {}, global type: {}",
                    local_type,
                    call.call_type
                );
                return Ok(());
            }
        }
        self.inner.commit_call(call);
        Ok(())
    }

    /// This module's getters view; the root view when the module is not
    /// under any namespace.
    pub fn getters(&self) -> GettersView {
        if self.namespace.is_empty() {
            root_getters_view(&self.inner)
        } else {
            local_getters_view(&self.inner, &self.namespace)
        }
    }

    /// This module's own state slice, resolved by walking the module path
    /// from the current root state on every access.
    pub fn state(&self) -> Value {
        let root = self.inner.state.read();
        nested(&root, &self.path).cloned().unwrap_or(Value::Null)
    }

    /// The store's root state.
    pub fn root_state(&self) -> Value {
        self.inner.state.read().clone()
    }

    /// The store's root getters view.
    pub fn root_getters(&self) -> GettersView {
        root_getters_view(&self.inner)
    }
}

/// Build the local context for `(namespace, path)`.
pub(crate) fn make_local_context(
    inner: &Arc<StoreInner>,
    namespace: String,
    path: Vec<String>,
) -> ActionContext {
    ActionContext { inner: Arc::clone(inner), namespace, path }
}
