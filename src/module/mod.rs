// src/module/mod.rs
// Module definitions and resolved module nodes.

pub(crate) mod tree;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::handler::{ActionFn, GetterFn, MutationFn};

/// Initial state of a module: a plain value, or a zero-argument producer
/// invoked exactly once when the module node is constructed.
pub enum StateSource {
    Value(Value),
    Producer(Box<dyn FnOnce() -> Value + Send>),
}

impl StateSource {
    fn resolve(self) -> Value {
        match self {
            StateSource::Value(value) => value,
            StateSource::Producer(producer) => producer(),
        }
    }
}

/// An action handler plus its registration mode. `root` registers the
/// handler unprefixed regardless of the module's namespace.
pub(crate) struct ActionDefinition {
    pub handler: Arc<ActionFn>,
    pub root: bool,
}

/// User-supplied definition of a module: a named slice of state plus the
/// mutation/action/getter handlers that read and transform it, and any
/// nested child modules.
///
/// Built by value:
///
/// ```ignore
/// ModuleDefinition::new()
///     .state(json!({ "count": 0 }))
///     .mutation("increment", |state, n| { /* ... */ })
///     .module("cart", ModuleDefinition::new().namespaced(true) /* ... */)
/// ```
#[derive(Default)]
pub struct ModuleDefinition {
    pub(crate) state: Option<StateSource>,
    pub(crate) namespaced: bool,
    pub(crate) mutations: HashMap<String, Arc<MutationFn>>,
    pub(crate) actions: HashMap<String, ActionDefinition>,
    pub(crate) getters: HashMap<String, Arc<GetterFn>>,
    pub(crate) modules: HashMap<String, ModuleDefinition>,
}

impl ModuleDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state value. Defaults to an empty object when omitted.
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(StateSource::Value(state));
        self
    }

    /// Initial state as a producer closure, invoked exactly once at node
    /// construction.
    pub fn state_with<F>(mut self, producer: F) -> Self
    where
        F: FnOnce() -> Value + Send + 'static,
    {
        self.state = Some(StateSource::Producer(Box::new(producer)));
        self
    }

    /// When true, handler names registered from this subtree are prefixed
    /// with this module's key and the local context auto-prefixes.
    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Register a mutation handler under `name`.
    pub fn mutation<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Value, Option<Value>) + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register an action handler under `name`.
    pub fn action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(crate::context::ActionContext, Option<Value>) -> crate::handler::ActionOutcome
            + Send
            + Sync
            + 'static,
    {
        self.actions.insert(
            name.into(),
            ActionDefinition { handler: Arc::new(handler), root: false },
        );
        self
    }

    /// Register an action that escapes namespacing: it is keyed globally
    /// under `name` no matter how deep the module sits.
    pub fn root_action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(crate::context::ActionContext, Option<Value>) -> crate::handler::ActionOutcome
            + Send
            + Sync
            + 'static,
    {
        self.actions.insert(
            name.into(),
            ActionDefinition { handler: Arc::new(handler), root: true },
        );
        self
    }

    /// Register a getter under `name`. The getter receives
    /// `(local_state, local_getters, root_state, root_getters)`.
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Value, &crate::context::GettersView, &Value, &crate::context::GettersView) -> Value
            + Send
            + Sync
            + 'static,
    {
        self.getters.insert(name.into(), Arc::new(getter));
        self
    }

    /// Attach a child module under `key`.
    pub fn module(mut self, key: impl Into<String>, definition: ModuleDefinition) -> Self {
        self.modules.insert(key.into(), definition);
        self
    }
}

/// A resolved module: state produced, children resolved, handlers shared so
/// a registry rebuild can re-wrap them.
pub(crate) struct ModuleNode {
    pub namespaced: bool,
    pub state: Value,
    pub mutations: HashMap<String, Arc<MutationFn>>,
    pub actions: HashMap<String, ActionDefinition>,
    pub getters: HashMap<String, Arc<GetterFn>>,
    pub children: HashMap<String, ModuleNode>,
}

impl ModuleNode {
    pub(crate) fn from_definition(definition: ModuleDefinition) -> Self {
        let state = definition
            .state
            .map(StateSource::resolve)
            .unwrap_or_else(|| Value::Object(Default::default()));
        let children = definition
            .modules
            .into_iter()
            .map(|(key, child)| (key, ModuleNode::from_definition(child)))
            .collect();
        ModuleNode {
            namespaced: definition.namespaced,
            state,
            mutations: definition.mutations,
            actions: definition.actions,
            getters: definition.getters,
            children,
        }
    }
}

/// Path addressing a module in the tree. A bare string is a single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn display(&self) -> String {
        self.0.join("/")
    }
}

impl From<&str> for ModulePath {
    fn from(segment: &str) -> Self {
        ModulePath(vec![segment.to_string()])
    }
}

impl From<String> for ModulePath {
    fn from(segment: String) -> Self {
        ModulePath(vec![segment])
    }
}

impl From<Vec<String>> for ModulePath {
    fn from(segments: Vec<String>) -> Self {
        ModulePath(segments)
    }
}

impl From<Vec<&str>> for ModulePath {
    fn from(segments: Vec<&str>) -> Self {
        ModulePath(segments.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[&str]> for ModulePath {
    fn from(segments: &[&str]) -> Self {
        ModulePath(segments.iter().map(|s| s.to_string()).collect())
    }
}
