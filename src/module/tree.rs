// src/module/tree.rs
// The module tree: path-addressed lookup, dynamic registration and
// namespace computation.

use crate::module::{ModuleDefinition, ModuleNode};
use crate::store::StoreError;

pub(crate) struct ModuleTree {
    pub root: ModuleNode,
}

impl ModuleTree {
    pub fn new(root: ModuleDefinition) -> Self {
        ModuleTree { root: ModuleNode::from_definition(root) }
    }

    /// Resolve the node at `path`, walking children from the root.
    pub fn get(&self, path: &[String]) -> Option<&ModuleNode> {
        path.iter().try_fold(&self.root, |node, key| node.children.get(key))
    }

    fn get_mut(&mut self, path: &[String]) -> Option<&mut ModuleNode> {
        path.iter()
            .try_fold(&mut self.root, |node, key| node.children.get_mut(key))
    }

    /// Namespace string for `path`: every namespaced ancestor contributes
    /// `key + "/"`, non-namespaced ancestors contribute nothing.
    ///
    /// Recomputed from the `namespaced` flags on every call; unmaterialized
    /// trailing segments contribute nothing and the root path is the empty
    /// string.
    pub fn get_namespace(&self, path: &[String]) -> String {
        let mut node = &self.root;
        let mut namespace = String::new();
        for key in path {
            match node.children.get(key) {
                Some(child) => {
                    if child.namespaced {
                        namespace.push_str(key);
                        namespace.push('/');
                    }
                    node = child;
                }
                None => break,
            }
        }
        namespace
    }

    /// Insert a module at `path`. All but the last segment must already
    /// exist; state linking and handler installation are the installer's
    /// job, not the tree's.
    pub fn register(&mut self, path: &[String], definition: ModuleDefinition) -> Result<(), StoreError> {
        let (key, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return Err(StoreError::EmptyModulePath),
        };
        let parent = self
            .get_mut(parent_path)
            .ok_or_else(|| StoreError::ParentModuleNotFound { path: path.join("/") })?;
        parent
            .children
            .insert(key.clone(), ModuleNode::from_definition(definition));
        Ok(())
    }

    /// Remove the module at `path` from its parent. Returns whether a module
    /// was actually removed.
    pub fn unregister(&mut self, path: &[String]) -> bool {
        let (key, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return false,
        };
        match self.get_mut(parent_path) {
            Some(parent) => parent.children.remove(key).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn sample_tree() -> ModuleTree {
        ModuleTree::new(
            ModuleDefinition::new()
                .state(json!({}))
                .module(
                    "a",
                    ModuleDefinition::new()
                        .namespaced(true)
                        .module("b", ModuleDefinition::new())
                        .module("c", ModuleDefinition::new().namespaced(true)),
                ),
        )
    }

    #[test]
    fn namespace_skips_non_namespaced_modules() {
        let tree = sample_tree();
        assert_eq!(tree.get_namespace(&[]), "");
        assert_eq!(tree.get_namespace(&path(&["a"])), "a/");
        assert_eq!(tree.get_namespace(&path(&["a", "b"])), "a/");
        assert_eq!(tree.get_namespace(&path(&["a", "c"])), "a/c/");
    }

    #[test]
    fn namespace_tolerates_unmaterialized_paths() {
        let tree = sample_tree();
        assert_eq!(tree.get_namespace(&path(&["a", "missing", "deep"])), "a/");
        assert_eq!(tree.get_namespace(&path(&["nowhere"])), "");
    }

    #[test]
    fn register_requires_existing_parent() {
        let mut tree = sample_tree();
        tree.register(&path(&["a", "d"]), ModuleDefinition::new()).unwrap();
        assert!(tree.get(&path(&["a", "d"])).is_some());

        let err = tree
            .register(&path(&["x", "y"]), ModuleDefinition::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::ParentModuleNotFound { .. }));
    }

    #[test]
    fn unregister_reports_removal() {
        let mut tree = sample_tree();
        assert!(tree.unregister(&path(&["a", "b"])));
        assert!(!tree.unregister(&path(&["a", "b"])));
        assert!(!tree.unregister(&path(&["ghost"])));
        assert!(tree.get(&path(&["a", "b"])).is_none());
    }
}
