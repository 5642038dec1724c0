//! Keyed resource bindings scoped to one logical unit of work.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::trace;

use crate::error::{ContextError, ContextResult};
use crate::key::ResourceKey;

/// Resources bound to the current logical execution context.
///
/// At most one resource is bound per key. Binding over an occupied key is
/// rejected; the previous resource stays bound.
#[derive(Debug)]
pub struct ResourceContext<R> {
    resources: HashMap<ResourceKey, R>,
}

impl<R> Default for ResourceContext<R> {
    fn default() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }
}

impl<R> ResourceContext<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resource bound for `key`, if any.
    pub fn get(&self, key: &ResourceKey) -> Option<&R> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    /// Binds `resource` for `key`.
    ///
    /// Fails with [`ContextError::AlreadyBound`] if the key is occupied; the
    /// existing binding is left in place.
    pub fn bind(&mut self, key: ResourceKey, resource: R) -> ContextResult<()> {
        match self.resources.entry(key) {
            Entry::Occupied(entry) => Err(ContextError::AlreadyBound(entry.key().clone())),
            Entry::Vacant(entry) => {
                trace!(key = %entry.key(), "bound resource to context");
                entry.insert(resource);
                Ok(())
            }
        }
    }

    /// Removes and returns the resource bound for `key`.
    pub fn unbind(&mut self, key: &ResourceKey) -> Option<R> {
        let resource = self.resources.remove(key);
        if resource.is_some() {
            trace!(%key, "removed resource from context");
        }
        resource
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_get() {
        let mut context = ResourceContext::new();
        let key = ResourceKey::new("orders");
        context.bind(key.clone(), 7).unwrap();

        assert_eq!(context.get(&key), Some(&7));
        assert!(context.contains(&key));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_bind_occupied_key_keeps_existing() {
        let mut context = ResourceContext::new();
        let key = ResourceKey::new("orders");
        context.bind(key.clone(), 1).unwrap();

        let err = context.bind(key.clone(), 2).unwrap_err();
        assert!(matches!(err, ContextError::AlreadyBound(ref k) if *k == key));
        assert_eq!(context.get(&key), Some(&1));
    }

    #[test]
    fn test_unbind() {
        let mut context = ResourceContext::new();
        let key = ResourceKey::from("orders");
        context.bind(key.clone(), "holder").unwrap();

        assert_eq!(context.unbind(&key), Some("holder"));
        assert_eq!(context.unbind(&key), None);
        assert!(context.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut context = ResourceContext::new();
        context.bind(ResourceKey::new("a"), 1).unwrap();
        context.bind(ResourceKey::new("b"), 2).unwrap();

        context.unbind(&ResourceKey::new("a"));
        assert_eq!(context.get(&ResourceKey::new("b")), Some(&2));
        assert_eq!(context.keys().count(), 1);
    }
}
