// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent, insertion-ordered property maps.
//!
//! A map is a chain of immutable nodes, each holding one property and a
//! shared back-reference to the map it was added onto. Appending is O(1) and
//! shares the entire parent chain; replacing or removing a property rebuilds
//! only the nodes added after it, re-appending them in their original
//! relative order. Nodes below the edit point are shared by reference
//! between the old and new map.

use std::sync::Arc;

use crate::intern::PropertyKey;
use crate::object::property::Property;

#[derive(Debug)]
struct Node {
    parent: PropertyMap,
    property: Property,
    size: u32,
}

/// An immutable, insertion-ordered map from keys to [`Property`] bindings.
///
/// The empty map is the `None`-chain and therefore a process-wide singleton
/// by construction. Cloning a map is an `Arc` clone.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    node: Option<Arc<Node>>,
}

impl PropertyMap {
    /// The empty map.
    pub fn empty() -> Self {
        Self { node: None }
    }

    pub fn len(&self) -> usize {
        self.node.as_ref().map_or(0, |n| n.size as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    /// The most recently added property.
    pub fn last(&self) -> Option<&Property> {
        self.node.as_ref().map(|n| &n.property)
    }

    /// The map this map was derived from by its last append.
    pub fn parent_map(&self) -> Option<PropertyMap> {
        self.node.as_ref().map(|n| n.parent.clone())
    }

    /// Look up a key, returning the most recently added binding for it.
    pub fn get(&self, key: PropertyKey) -> Option<&Property> {
        let mut node = self.node.as_deref();
        while let Some(n) = node {
            if n.property.key() == key {
                return Some(&n.property);
            }
            node = n.parent.node.as_deref();
        }
        None
    }

    pub fn contains_key(&self, key: PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// Append a property, sharing the whole receiver chain. The caller is
    /// responsible for key uniqueness where it matters; shadow properties
    /// intentionally duplicate a key.
    pub(crate) fn push(&self, property: Property) -> PropertyMap {
        let size = self.len() as u32 + 1;
        PropertyMap {
            node: Some(Arc::new(Node {
                parent: self.clone(),
                property,
                size,
            })),
        }
    }

    /// Add or replace the binding for `property`'s key.
    pub fn put_copy(&self, property: Property) -> PropertyMap {
        if let Some(existing) = self.get(property.key()) {
            let existing = existing.clone();
            self.replace_copy(&existing, property)
        } else {
            self.push(property)
        }
    }

    /// Replace `old` with `new` in place, rebuilding the nodes added after
    /// it and sharing everything below.
    ///
    /// `old` is located by key; if it is absent the map is returned
    /// unchanged.
    pub fn replace_copy(&self, old: &Property, new: Property) -> PropertyMap {
        let Some((base, suffix)) = self.split_at(old.key()) else {
            return self.clone();
        };
        let mut map = base.push(new);
        for property in suffix.into_iter().rev() {
            map = map.push(property);
        }
        map
    }

    /// Remove the binding for `key`, rebuilding the nodes added after it.
    /// Returns `None` if the key is absent.
    pub fn remove_copy(&self, key: PropertyKey) -> Option<PropertyMap> {
        let (base, suffix) = self.split_at(key)?;
        let mut map = base;
        for property in suffix.into_iter().rev() {
            map = map.push(property);
        }
        Some(map)
    }

    /// Split the chain at the newest binding of `key`: the map below it and
    /// the properties added after it, newest first.
    fn split_at(&self, key: PropertyKey) -> Option<(PropertyMap, Vec<Property>)> {
        let mut suffix = Vec::new();
        let mut map = self.clone();
        loop {
            let node = map.node.as_deref()?;
            if node.property.key() == key {
                return Some((node.parent.clone(), suffix));
            }
            suffix.push(node.property.clone());
            map = node.parent.clone();
        }
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Property> {
        let mut properties: Vec<Property> = self.iter_rev().collect();
        properties.reverse();
        properties.into_iter()
    }

    /// Properties in reverse insertion order (newest first).
    pub fn iter_rev(&self) -> impl Iterator<Item = Property> {
        ReverseIter {
            node: self.node.clone(),
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = PropertyKey> {
        self.iter().map(|p| p.key())
    }

    /// Structural sharing check used by tests: is the node `self_depth`
    /// nodes below `self`'s top the very node `other_depth` nodes below
    /// `other`'s top? The depths differ whenever the maps have different
    /// lengths.
    #[cfg(test)]
    fn shares_node_with(&self, self_depth: usize, other: &PropertyMap, other_depth: usize) -> bool {
        fn descend(map: &PropertyMap, depth: usize) -> Option<&Arc<Node>> {
            let mut node = map.node.as_ref()?;
            for _ in 0..depth {
                node = node.parent.node.as_ref()?;
            }
            Some(node)
        }
        match (descend(self, self_depth), descend(other, other_depth)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for PropertyMap {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut a = self.node.as_deref();
        let mut b = other.node.as_deref();
        while let (Some(x), Some(y)) = (a, b) {
            if core::ptr::eq(x, y) {
                // Shared tail, no need to compare further.
                return true;
            }
            if x.property != y.property {
                return false;
            }
            a = x.parent.node.as_deref();
            b = y.parent.node.as_deref();
        }
        true
    }
}

impl Eq for PropertyMap {}

struct ReverseIter {
    node: Option<Arc<Node>>,
}

impl Iterator for ReverseIter {
    type Item = Property;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node.take()?;
        let property = node.property.clone();
        self.node = node.parent.node.clone();
        Some(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use crate::object::location::{InstanceLocation, Location, SlotIndex};

    fn property(name: &str, index: u32) -> Property {
        Property::new(
            intern(name),
            Location::Int(InstanceLocation::new(SlotIndex::field(index))),
            0,
        )
    }

    fn keys_of(map: &PropertyMap) -> Vec<String> {
        map.keys().map(|k| k.as_str().to_string()).collect()
    }

    #[test]
    fn empty_map_is_empty() {
        let map = PropertyMap::empty();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert!(map.last().is_none());
        assert!(map.get(intern("x")).is_none());
    }

    #[test]
    fn append_preserves_insertion_order() {
        let map = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1))
            .put_copy(property("c", 2));
        assert_eq!(map.len(), 3);
        assert_eq!(keys_of(&map), ["a", "b", "c"]);
        assert_eq!(map.last().unwrap().key(), intern("c"));
    }

    #[test]
    fn append_shares_parent_chain() {
        let base = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1));
        let extended = base.put_copy(property("c", 2));
        // The node one below `extended`'s top is `base`'s top node itself.
        assert!(extended.shares_node_with(1, &base, 0));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn replace_rebuilds_only_the_suffix() {
        let map = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1))
            .put_copy(property("c", 2));
        let old = map.get(intern("b")).unwrap().clone();
        let replaced = map.replace_copy(&old, property("b", 7));
        assert_eq!(keys_of(&replaced), ["a", "b", "c"]);
        assert_eq!(
            replaced.get(intern("b")).unwrap().location(),
            property("b", 7).location()
        );
        // The node below the replacement is shared with the original map.
        assert!(replaced.shares_node_with(2, &map, 2));
        // The original map is untouched.
        assert_eq!(map.get(intern("b")).unwrap(), &old);
    }

    #[test]
    fn remove_from_middle_preserves_relative_order() {
        let map = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1))
            .put_copy(property("c", 2))
            .put_copy(property("d", 3));
        let removed = map.remove_copy(intern("b")).unwrap();
        assert_eq!(keys_of(&removed), ["a", "c", "d"]);
        assert_eq!(removed.len(), 3);
        assert!(map.remove_copy(intern("nope")).is_none());
    }

    #[test]
    fn remove_tail_shares_everything() {
        let base = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1));
        let map = base.put_copy(property("c", 2));
        let removed = map.remove_copy(intern("c")).unwrap();
        assert_eq!(removed, base);
        assert!(removed.shares_node_with(0, &base, 0));
    }

    #[test]
    fn put_copy_replaces_existing_key() {
        let map = PropertyMap::empty()
            .put_copy(property("a", 0))
            .put_copy(property("b", 1))
            .put_copy(property("a", 9));
        assert_eq!(map.len(), 2);
        assert_eq!(keys_of(&map), ["a", "b"]);
        assert_eq!(
            map.get(intern("a")).unwrap().location(),
            property("a", 9).location()
        );
    }

    #[test]
    fn shadow_push_keeps_both_bindings() {
        let map = PropertyMap::empty()
            .put_copy(property("a", 0))
            .push(property("a", 5).into_shadow());
        assert_eq!(map.len(), 2);
        // Lookup finds the newest binding.
        assert_eq!(
            map.get(intern("a")).unwrap().location(),
            property("a", 5).location()
        );
    }
}
