// src/install.rs
// Walks the module tree, links module state into the parent state object
// and registers every handler into the flat registries.

use std::sync::Arc;

use serde_json::Value;

use crate::context::WrappedGetter;
use crate::module::tree::ModuleTree;
use crate::module::ModuleNode;
use crate::store::{ActionEntry, MutationEntry, StoreInner};
use crate::util::nested_mut;

/// Install `module` and its subtree. `preserve_state` skips state linking
/// for the whole subtree (dynamic registration over restored state, and the
/// full reset after an unregistration).
pub(crate) fn install_module(
    inner: &Arc<StoreInner>,
    tree: &ModuleTree,
    path: &[String],
    module: &ModuleNode,
    preserve_state: bool,
) {
    let is_root = path.is_empty();
    let namespace = tree.get_namespace(path);

    if module.namespaced {
        let mut namespace_map = inner.namespace_map.write();
        if namespace_map.contains_key(&namespace) {
            tracing::error!(
                "duplicate namespace {} for the namespaced module {}",
                namespace,
                path.join("/")
            );
        }
        namespace_map.insert(namespace.clone(), path.to_vec());
    }

    if !is_root && !preserve_state {
        let (key, parent_path) = match path.split_last() {
            Some(split) => split,
            None => unreachable!("non-root path has a last segment"),
        };
        let mut state = inner.state.write();
        match nested_mut(&mut state, parent_path).and_then(Value::as_object_mut) {
            Some(parent) => {
                if parent.contains_key(key) {
                    tracing::warn!(
                        "state field \"{}\" was overridden by a module with the same name at \"{}\"",
                        key,
                        path.join(".")
                    );
                }
                parent.insert(key.clone(), module.state.clone());
            }
            None => tracing::warn!(
                "cannot link module state at \"{}\": parent state is not an object",
                path.join(".")
            ),
        }
    }

    for (key, handler) in &module.mutations {
        let qualified = format!("{namespace}{key}");
        inner
            .mutations
            .write()
            .entry(qualified)
            .or_default()
            .push(MutationEntry { path: path.to_vec(), handler: Arc::clone(handler) });
    }

    for (key, definition) in &module.actions {
        let qualified = if definition.root {
            key.clone()
        } else {
            format!("{namespace}{key}")
        };
        inner.actions.write().entry(qualified).or_default().push(ActionEntry {
            namespace: namespace.clone(),
            path: path.to_vec(),
            handler: Arc::clone(&definition.handler),
        });
    }

    for (key, getter) in &module.getters {
        let qualified = format!("{namespace}{key}");
        let mut wrapped_getters = inner.wrapped_getters.write();
        if wrapped_getters.contains_key(&qualified) {
            tracing::error!("duplicate getter key: {qualified}");
            continue;
        }
        wrapped_getters.insert(
            qualified,
            Arc::new(WrappedGetter {
                namespace: namespace.clone(),
                path: path.to_vec(),
                handler: Arc::clone(getter),
            }),
        );
    }

    for (key, child) in &module.children {
        let mut child_path = path.to_vec();
        child_path.push(key.clone());
        install_module(inner, tree, &child_path, child, preserve_state);
    }
}

/// Full reset: clear every registry and reinstall from the root over the
/// existing state. The only way to guarantee no stale handler from a
/// removed subtree remains reachable, since the mutation and action
/// registries are append-only during partial installs.
pub(crate) fn reset_store(inner: &Arc<StoreInner>) {
    inner.mutations.write().clear();
    inner.actions.write().clear();
    inner.wrapped_getters.write().clear();
    inner.namespace_map.write().clear();
    inner.local_getters_cache.write().clear();

    let tree = inner.modules.read();
    install_module(inner, &tree, &[], &tree.root, true);
}
