// src/binding.rs
// Attachment surface for an external component-binding layer. The store
// stays an opaque collaborator to the host framework; all reactivity
// mechanics live on the other side of this boundary.

use serde_json::Value;

use crate::store::Store;

/// Which named component instances receive the store. A non-empty `apply`
/// list takes priority; otherwise every named component not in `exclude`
/// is attached.
#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    pub apply: Vec<String>,
    pub exclude: Vec<String>,
}

impl BindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply = components.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = components.into_iter().map(Into::into).collect();
        self
    }
}

/// What an attached component instance receives: a handle to the store and
/// the root state as of attachment. Live reads go through the store handle.
pub struct Attachment {
    pub store: Store,
    pub state: Value,
}

/// Binds a store to host component instances by name, once per consuming
/// instance.
pub struct StoreBinding {
    store: Store,
    options: BindOptions,
}

impl StoreBinding {
    pub fn new(store: &Store, options: BindOptions) -> Self {
        StoreBinding { store: store.clone(), options }
    }

    /// Attach the store to the component named `component`. Unnamed
    /// components and components filtered out by the options get nothing.
    pub fn attach(&self, component: &str) -> Option<Attachment> {
        if component.is_empty() {
            return None;
        }
        let applies = if self.options.apply.is_empty() {
            !self.options.exclude.iter().any(|name| name == component)
        } else {
            self.options.apply.iter().any(|name| name == component)
        };
        applies.then(|| Attachment {
            store: self.store.clone(),
            state: self.store.state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleDefinition;
    use serde_json::json;

    fn store() -> Store {
        Store::new(ModuleDefinition::new().state(json!({ "a": 1 })))
    }

    #[test]
    fn apply_list_takes_priority() {
        let store = store();
        let binding = BindOptions::new().apply(["home"]).exclude(["home"]);
        let binding = StoreBinding::new(&store, binding);
        assert!(binding.attach("home").is_some());
        assert!(binding.attach("settings").is_none());
    }

    #[test]
    fn exclude_list_filters_when_no_apply() {
        let store = store();
        let binding = StoreBinding::new(&store, BindOptions::new().exclude(["settings"]));
        assert!(binding.attach("home").is_some());
        assert!(binding.attach("settings").is_none());
    }

    #[test]
    fn unnamed_components_are_skipped() {
        let store = store();
        let binding = StoreBinding::new(&store, BindOptions::new());
        assert!(binding.attach("").is_none());
    }

    #[test]
    fn attachment_carries_current_state() {
        let store = store();
        let binding = StoreBinding::new(&store, BindOptions::new());
        let attachment = binding.attach("home").unwrap();
        assert_eq!(attachment.state["a"], json!(1));
    }
}
