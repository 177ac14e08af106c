// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shapes: immutable descriptions of one concrete object layout.
//!
//! ## What is a shape?
//!
//! A shape describes the property set of an object, the storage location of
//! every property value, and the cumulative storage sizes an object of this
//! layout needs. Objects with the same history of property definitions share
//! one shape, which cuts per-object memory (keys and layout live in the
//! shape, values in the object) and enables inline caching: a consumer that
//! found property `x` of shape `S` at location `L` may skip the lookup for
//! any object whose shape is identity-equal to `S`.
//!
//! ## Transitions
//!
//! Shapes form a tree rooted at one empty shape per object-type family.
//! Every structural change is an edge labeled with a [`Transition`]; edges
//! are cached on the source shape so that replaying the same change returns
//! the same child shape by reference. A shape is immutable except for its
//! transition cache and two monotonic latches: the validity flag (flipped
//! once when the shape is deprecated by a generalization elsewhere) and the
//! leaf flag (flipped once when the first outgoing transition is recorded).

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use hashbrown::hash_table::{Entry, HashTable};
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::{LayoutError, Result};
use crate::intern::PropertyKey;
use crate::layout::Layout;
use crate::object::DynamicObject;
use crate::object::property::Property;
use crate::object::property_map::PropertyMap;
use crate::object::strategy;
use crate::object::transition::Transition;
use crate::stats;
use crate::value::{ObjectType, Value};

const LEAF_UNKNOWN: u8 = 0;
const LEAF: u8 = 1;
const NOT_LEAF: u8 = 2;

/// Cumulative storage sizes of one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ShapeSizing {
    pub object_field_size: u32,
    pub object_array_size: u32,
    pub primitive_field_size: u32,
    pub primitive_array_size: u32,
    pub has_primitive_array: bool,
}

/// An immutable node of the shape tree.
///
/// Obtained from [`Layout::root_shape`] and derived from there through the
/// structural operations. Shape identity (`Arc` pointer equality) is the
/// fundamental inline-cache guard; see [`Shape::check`].
pub struct Shape {
    layout: Arc<Layout>,
    object_type: ObjectType,
    property_map: PropertyMap,
    parent: Option<Arc<Shape>>,
    /// Edge label that produced this shape from its parent; `None` for
    /// roots. Used to replay chains during removal and cloning.
    transition_from_parent: Option<Transition>,
    /// One mutex per shape tree, shared down from the root. Serializes
    /// structural mutation across the whole family; coarse, but immune to
    /// cross-shape lock-ordering deadlocks.
    root_lock: Arc<Mutex<()>>,
    sizing: ShapeSizing,
    depth: u32,
    id: u32,
    /// One-way latch: valid until a generalization elsewhere deprecates
    /// this shape.
    valid: AtomicBool,
    /// The shape that replaced this one, recorded at invalidation time.
    successor: RwLock<Option<Arc<Shape>>>,
    /// Lazily computed leaf latch; moves only leaf -> non-leaf.
    leaf: AtomicU8,
    /// Transition cache, lazily created on first edge.
    transitions: RwLock<Option<HashTable<(Transition, Arc<Shape>)>>>,
}

impl Shape {
    pub(crate) fn new_root(layout: Arc<Layout>, object_type: ObjectType) -> Arc<Shape> {
        let id = layout.next_shape_id();
        stats::SHAPES_ALLOCATED.inc();
        trace!(id, ?object_type, "new root shape");
        Arc::new(Shape {
            layout,
            object_type,
            property_map: PropertyMap::empty(),
            parent: None,
            transition_from_parent: None,
            root_lock: Arc::new(Mutex::new(())),
            sizing: ShapeSizing::default(),
            depth: 0,
            id,
            valid: AtomicBool::new(true),
            successor: RwLock::new(None),
            leaf: AtomicU8::new(LEAF_UNKNOWN),
            transitions: RwLock::new(None),
        })
    }

    pub(crate) fn make_child(
        parent: &Arc<Shape>,
        object_type: ObjectType,
        property_map: PropertyMap,
        sizing: ShapeSizing,
        transition: Transition,
    ) -> Arc<Shape> {
        let id = parent.layout.next_shape_id();
        stats::SHAPES_ALLOCATED.inc();
        trace!(id, parent = parent.id, ?transition, "new shape");
        Arc::new(Shape {
            layout: parent.layout.clone(),
            object_type,
            property_map,
            parent: Some(parent.clone()),
            transition_from_parent: Some(transition),
            root_lock: parent.root_lock.clone(),
            sizing,
            depth: parent.depth + 1,
            id,
            valid: AtomicBool::new(true),
            successor: RwLock::new(None),
            leaf: AtomicU8::new(LEAF_UNKNOWN),
            transitions: RwLock::new(None),
        })
    }

    // -- identity and simple accessors --------------------------------------

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn property_map(&self) -> &PropertyMap {
        &self.property_map
    }

    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn property_count(&self) -> u32 {
        self.property_map.len() as u32
    }

    pub fn object_field_size(&self) -> u32 {
        self.sizing.object_field_size
    }

    pub fn object_array_size(&self) -> u32 {
        self.sizing.object_array_size
    }

    pub fn primitive_field_size(&self) -> u32 {
        self.sizing.primitive_field_size
    }

    pub fn primitive_array_size(&self) -> u32 {
        self.sizing.primitive_array_size
    }

    pub fn has_primitive_array(&self) -> bool {
        self.sizing.has_primitive_array
    }

    pub(crate) fn sizing(&self) -> ShapeSizing {
        self.sizing
    }

    pub(crate) fn root_lock(&self) -> &Arc<Mutex<()>> {
        &self.root_lock
    }

    pub(crate) fn transition_from_parent(&self) -> Option<&Transition> {
        self.transition_from_parent.as_ref()
    }

    /// The root of this shape's tree.
    pub fn root(self: &Arc<Self>) -> Arc<Shape> {
        let mut shape = self.clone();
        while let Some(parent) = shape.parent.clone() {
            shape = parent;
        }
        shape
    }

    /// The fundamental inline-cache guard: is `object`'s current shape
    /// identity-equal to this shape?
    pub fn check(self: &Arc<Self>, object: &DynamicObject) -> bool {
        Arc::ptr_eq(self, object.shape())
    }

    // -- property queries ---------------------------------------------------

    /// The newest binding for `key`, if any.
    pub fn get_property(&self, key: PropertyKey) -> Option<Property> {
        self.property_map.get(key).cloned()
    }

    pub fn has_property(&self, key: PropertyKey) -> bool {
        self.property_map.contains_key(key)
    }

    /// The most recently added property.
    pub fn last_property(&self) -> Option<Property> {
        self.property_map.last().cloned()
    }

    /// Properties in enumeration order: insertion order, with a shadowed
    /// declared property appearing at its shadow position rather than its
    /// original declaration position.
    pub fn property_list(&self) -> Vec<Property> {
        let mut seen = ahash::AHashSet::new();
        let mut properties: Vec<Property> = self
            .property_map
            .iter_rev()
            .filter(|p| seen.insert(p.key()))
            .collect();
        properties.reverse();
        properties
    }

    /// Keys in enumeration order.
    pub fn key_list(&self) -> Vec<PropertyKey> {
        self.property_list().iter().map(|p| p.key()).collect()
    }

    // -- validity and leaf latches ------------------------------------------

    /// True until the shape is deprecated by a generalization elsewhere in
    /// the graph. Consumers seeing `false` must take the slow path and
    /// resolve the shape's valid successor.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Flip the validity latch. Idempotent; the latch never resets.
    pub fn invalidate_valid_assumption(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            stats::SHAPES_INVALIDATED.inc();
            trace!(id = self.id, "shape invalidated");
        }
    }

    pub(crate) fn invalidate_with_successor(&self, successor: Arc<Shape>) {
        *self.successor.write() = Some(successor);
        self.invalidate_valid_assumption();
    }

    pub(crate) fn successor(&self) -> Option<Arc<Shape>> {
        self.successor.read().clone()
    }

    /// Resolve this shape to its designated valid successor, following the
    /// replacement chain left behind by generalizations. A shape with no
    /// recorded successor is returned unchanged.
    pub fn ensure_valid(self: &Arc<Self>) -> Arc<Shape> {
        let mut shape = self.clone();
        while !shape.is_valid() {
            let Some(successor) = shape.successor() else {
                break;
            };
            shape = successor;
        }
        shape
    }

    /// True while no outgoing transition has been recorded. Computed lazily
    /// under the root lock on first query, then tracked incrementally.
    pub fn is_leaf(&self) -> bool {
        match self.leaf.load(Ordering::Acquire) {
            LEAF => true,
            NOT_LEAF => false,
            _ => {
                let _guard = self.root_lock.lock();
                // A transition may have been recorded while we waited.
                match self.leaf.load(Ordering::Acquire) {
                    LEAF => true,
                    NOT_LEAF => false,
                    _ => {
                        let leaf = self.transition_count() == 0;
                        self.leaf.store(
                            if leaf { LEAF } else { NOT_LEAF },
                            Ordering::Release,
                        );
                        leaf
                    }
                }
            }
        }
    }

    // -- transition cache ---------------------------------------------------

    /// Look up a cached child for `transition`.
    pub(crate) fn lookup_transition(&self, transition: &Transition) -> Option<Arc<Shape>> {
        let guard = self.transitions.read();
        let table = guard.as_ref()?;
        let hash = self.layout.hasher().hash_one(transition);
        table
            .find(hash, |(t, _)| t == transition)
            .map(|(_, shape)| shape.clone())
    }

    /// Record an edge. Callers serialize through the root lock; a racing
    /// duplicate insert degrades to last-writer-wins, which is acceptable
    /// because both children are structurally interchangeable.
    pub(crate) fn insert_transition(&self, transition: Transition, child: Arc<Shape>) {
        let mut guard = self.transitions.write();
        let table = guard.get_or_insert_with(HashTable::new);
        let hasher = self.layout.hasher();
        let hash = hasher.hash_one(&transition);
        match table.entry(hash, |(t, _)| *t == transition, |(t, _)| hasher.hash_one(t)) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().1 = child;
            }
            Entry::Vacant(entry) => {
                entry.insert((transition, child));
            }
        }
        drop(guard);
        self.leaf.store(NOT_LEAF, Ordering::Release);
    }

    /// Number of outgoing transitions recorded so far.
    pub fn transition_count(&self) -> usize {
        self.transitions.read().as_ref().map_or(0, |t| t.len())
    }

    // -- structural operations ----------------------------------------------

    /// Define (add, update, or generalize) `key` for `value` under `flags`.
    ///
    /// When the property already exists with equal flags and a location that
    /// accepts the value, this returns `self` by reference, which is what
    /// keeps inline caches stable.
    pub fn define_property(
        self: &Arc<Self>,
        key: PropertyKey,
        value: &Value,
        flags: u32,
    ) -> Arc<Shape> {
        self.layout.notify_property_transition(self, key);
        strategy::define_property(self, key, value, flags)
    }

    /// Append a property that must not already exist.
    ///
    /// # Panics
    ///
    /// Panics if a binding for the key is already present; callers wanting
    /// upsert semantics go through [`Shape::define_property`].
    pub fn add_property(self: &Arc<Self>, property: Property) -> Arc<Shape> {
        assert!(
            !self.property_map.contains_key(property.key()),
            "add_property: key {:?} already present, use define_property",
            property.key()
        );
        self.layout.notify_property_transition(self, property.key());
        strategy::add_property(self, property)
    }

    /// Remove the binding for `key`. Returns `None` when the property is
    /// not present (or not reachable through this chain), which callers
    /// treat as "no removal occurred".
    pub fn remove_property(self: &Arc<Self>, key: PropertyKey) -> Option<Arc<Shape>> {
        self.layout.notify_property_transition(self, key);
        strategy::remove_property(self, key)
    }

    /// Replace `old` with `new` in place (flag changes and generalization).
    pub fn replace_property(self: &Arc<Self>, old: &Property, new: Property) -> Arc<Shape> {
        self.layout.notify_property_transition(self, new.key());
        strategy::replace_property(self, old, new)
    }

    /// Move to the same layout under a different object-type tag.
    pub fn change_type(self: &Arc<Self>, object_type: ObjectType) -> Arc<Shape> {
        strategy::change_type(self, object_type)
    }

    /// Reserve the primitive extension array so objects allocate it
    /// eagerly.
    pub fn reserve_primitive_array(self: &Arc<Self>) -> Arc<Shape> {
        strategy::reserve_primitive_array(self)
    }

    /// Replay this shape's whole transition chain onto fresh root metadata,
    /// producing a structurally equal but unrelated shape tree. Used for
    /// per-instance specialization.
    pub fn create_separate_shape(self: &Arc<Self>) -> Arc<Shape> {
        let mut chain = Vec::with_capacity(self.depth as usize);
        let mut cursor = self.clone();
        while let Some(transition) = cursor.transition_from_parent.clone() {
            chain.push(transition);
            let parent = cursor.parent.clone().expect("non-root shape has a parent");
            cursor = parent;
        }
        // `cursor` is now the root.
        let mut shape = Shape::new_root(self.layout.clone(), cursor.object_type);
        for transition in chain.into_iter().rev() {
            shape = strategy::apply_transition(&shape, &transition, false);
            stats::SHAPES_CLONED.inc();
        }
        shape
    }

    /// Two shapes are related iff they belong to the same shape tree.
    pub fn is_related(a: &Arc<Shape>, b: &Arc<Shape>) -> bool {
        Arc::ptr_eq(&a.root_lock, &b.root_lock)
    }

    /// Depth-synchronized dual walk up two related chains. Fails fast with
    /// [`LayoutError::UnrelatedShapes`] when the chains do not share a
    /// root.
    pub fn common_ancestor(a: &Arc<Shape>, b: &Arc<Shape>) -> Result<Arc<Shape>> {
        if !Shape::is_related(a, b) {
            return Err(LayoutError::UnrelatedShapes);
        }
        let mut a = a.clone();
        let mut b = b.clone();
        while a.depth > b.depth {
            a = a.parent.clone().expect("depth > 0 implies a parent");
        }
        while b.depth > a.depth {
            b = b.parent.clone().expect("depth > 0 implies a parent");
        }
        while !Arc::ptr_eq(&a, &b) {
            match (a.parent.clone(), b.parent.clone()) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => return Err(LayoutError::UnrelatedShapes),
            }
        }
        Ok(a)
    }
}

impl core::fmt::Debug for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("object_type", &self.object_type)
            .field("depth", &self.depth)
            .field("property_count", &self.property_count())
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
