// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layout strategy: location allocation and the transition algorithms.
//!
//! This module owns the policy side of the shape graph: which location a
//! fresh property gets, how an incompatible write widens an existing
//! location, and how the cached transition edges are built. The lock
//! discipline is uniform: optimistic cache lookup without a lock, then the
//! family's root lock for the re-check and the actual structural mutation.

use std::sync::Arc;

use tracing::debug;

use crate::intern::PropertyKey;
use crate::layout::LayoutOptions;
use crate::object::location::{
    DualLocation, DualType, InstanceLocation, Location, ObjectLocation, PrimitiveLocation,
    SlotIndex,
};
use crate::object::property::Property;
use crate::object::shape::{Shape, ShapeSizing};
use crate::object::transition::Transition;
use crate::stats;
use crate::value::Value;

/// Allocates storage slots on top of an existing shape's sizing.
///
/// The allocator never reuses a slot that any live location already claims:
/// it only ever grows the high-water marks. This is what makes it safe for
/// a parent and several divergent children to coexist over the same object
/// storage prefix.
pub(crate) struct LocationAllocator {
    options: LayoutOptions,
    sizing: ShapeSizing,
}

impl LocationAllocator {
    pub(crate) fn from_shape(shape: &Shape) -> Self {
        Self {
            options: *shape.layout().options(),
            sizing: shape.sizing(),
        }
    }

    pub(crate) fn sizing(&self) -> ShapeSizing {
        self.sizing
    }

    fn next_object_slot(&mut self) -> SlotIndex {
        if self.sizing.object_field_size < self.options.object_field_capacity {
            let index = self.sizing.object_field_size;
            self.sizing.object_field_size += 1;
            SlotIndex::field(index)
        } else {
            let index = self.sizing.object_array_size;
            self.sizing.object_array_size += 1;
            SlotIndex::array(index)
        }
    }

    fn next_primitive_slot(&mut self) -> SlotIndex {
        if self.sizing.primitive_field_size < self.options.primitive_field_capacity {
            let index = self.sizing.primitive_field_size;
            self.sizing.primitive_field_size += 1;
            SlotIndex::field(index)
        } else {
            let index = self.sizing.primitive_array_size;
            self.sizing.primitive_array_size += 1;
            self.sizing.has_primitive_array = true;
            SlotIndex::array(index)
        }
    }

    pub(crate) fn reserve_primitive_array(&mut self) {
        self.sizing.has_primitive_array = true;
    }

    fn new_int(&mut self) -> Location {
        Location::Int(InstanceLocation::new(self.next_primitive_slot()))
    }

    fn new_long(&mut self, implicit_int_cast: bool) -> Location {
        Location::Long(PrimitiveLocation {
            base: InstanceLocation::new(self.next_primitive_slot()),
            implicit_int_cast,
        })
    }

    fn new_double(&mut self, implicit_int_cast: bool) -> Location {
        Location::Double(PrimitiveLocation {
            base: InstanceLocation::new(self.next_primitive_slot()),
            implicit_int_cast,
        })
    }

    fn new_boolean(&mut self) -> Location {
        Location::Boolean(InstanceLocation::new(self.next_primitive_slot()))
    }

    fn new_object(&mut self, expected: Option<core::any::TypeId>, non_null: bool) -> Location {
        Location::Object(ObjectLocation {
            base: InstanceLocation::new(self.next_object_slot()),
            expected,
            non_null,
        })
    }

    fn new_dual(&mut self, tag: DualType) -> Location {
        Location::Dual(DualLocation::new(
            self.next_object_slot(),
            self.next_primitive_slot(),
            tag,
            self.options.implicit_cast_int_to_long,
            self.options.implicit_cast_int_to_double,
        ))
    }

    /// The most specialized fresh location able to store `value`.
    pub(crate) fn location_for_value(&mut self, value: &Value) -> Location {
        match value {
            Value::Int(_) => self.new_int(),
            Value::Long(_) => self.new_long(self.options.implicit_cast_int_to_long),
            Value::Double(_) => self.new_double(self.options.implicit_cast_int_to_double),
            Value::Boolean(_) => self.new_boolean(),
            Value::Object(o) if self.options.typed_object_locations => {
                self.new_object(Some(o.payload_type()), true)
            }
            Value::Object(_) | Value::Null => self.new_object(None, false),
        }
    }

    /// One step up the generalization lattice from `old`, wide enough for
    /// `value`.
    ///
    /// Single-slot primitives widen to a dual tagged with the incoming
    /// value's representation; duals widen in place to the object tag;
    /// narrowed object locations drop their narrowing without moving.
    /// Each step is strictly monotone, so repeated widening terminates at
    /// the generic dual/object representation.
    pub(crate) fn generalized_location(&mut self, old: &Location, value: &Value) -> Location {
        match old {
            Location::Int(_) | Location::Long(_) | Location::Double(_) | Location::Boolean(_) => {
                let tag = match value {
                    Value::Int(_) => DualType::Int,
                    Value::Long(_) => DualType::Long,
                    Value::Double(_) => DualType::Double,
                    Value::Boolean(_) => DualType::Boolean,
                    Value::Object(_) | Value::Null => DualType::Object,
                };
                self.new_dual(tag)
            }
            Location::Dual(l) => Location::Dual(l.retag(DualType::Object)),
            Location::Object(l) => Location::Object(ObjectLocation {
                base: l.base.clone(),
                expected: None,
                non_null: false,
            }),
            Location::Constant(_) | Location::Declared(_) => self.location_for_value(value),
        }
    }

    /// A fresh location of the same kind as `old`, for chain replays that
    /// rebuild storage from scratch.
    pub(crate) fn move_location(&mut self, old: &Location) -> Location {
        match old {
            Location::Int(_) => self.new_int(),
            Location::Long(l) => self.new_long(l.implicit_int_cast),
            Location::Double(l) => self.new_double(l.implicit_int_cast),
            Location::Boolean(_) => self.new_boolean(),
            Location::Object(l) => self.new_object(l.expected, l.non_null),
            Location::Dual(l) => self.new_dual(l.tag()),
            Location::Constant(_) | Location::Declared(_) => old.clone(),
        }
    }

    /// Grow the high-water marks to cover every slot `location` touches.
    /// Used when a caller brings its own location instead of allocating
    /// through this allocator.
    pub(crate) fn advance(&mut self, location: &Location) {
        match location {
            Location::Int(l) | Location::Boolean(l) => self.cover_primitive(l.slot),
            Location::Long(l) | Location::Double(l) => self.cover_primitive(l.base.slot),
            Location::Object(l) => self.cover_object(l.base.slot),
            Location::Dual(l) => {
                self.cover_object(l.object_slot);
                self.cover_primitive(l.primitive_slot);
            }
            Location::Constant(_) | Location::Declared(_) => {}
        }
    }

    fn cover_object(&mut self, slot: SlotIndex) {
        match slot.placement {
            crate::object::location::Placement::Field => {
                self.sizing.object_field_size = self.sizing.object_field_size.max(slot.index + 1);
            }
            crate::object::location::Placement::Array => {
                self.sizing.object_array_size = self.sizing.object_array_size.max(slot.index + 1);
            }
        }
    }

    fn cover_primitive(&mut self, slot: SlotIndex) {
        match slot.placement {
            crate::object::location::Placement::Field => {
                self.sizing.primitive_field_size =
                    self.sizing.primitive_field_size.max(slot.index + 1);
            }
            crate::object::location::Placement::Array => {
                self.sizing.primitive_array_size =
                    self.sizing.primitive_array_size.max(slot.index + 1);
                self.sizing.has_primitive_array = true;
            }
        }
    }
}

/// The full define algorithm, value-driven.
pub(crate) fn define_property(
    shape: &Arc<Shape>,
    key: PropertyKey,
    value: &Value,
    flags: u32,
) -> Arc<Shape> {
    let shape = shape.ensure_valid();
    let Some(existing) = shape.get_property(key) else {
        let mut allocator = LocationAllocator::from_shape(&shape);
        let location = allocator.location_for_value(value);
        return add_property(&shape, Property::new(key, location, flags));
    };
    if existing.flags() == flags {
        if existing.location().can_store(value) {
            // Identity result: same shape object, which is what keeps
            // inline caches valid across redundant defines.
            return shape;
        }
        if existing.location().is_declared() {
            // First real assignment over a declared default: append a
            // shadow binding at a fresh real location. The declaration
            // stays in the chain so derived shapes keep diffing against it.
            let mut allocator = LocationAllocator::from_shape(&shape);
            let location = allocator.location_for_value(value);
            let shadow = Property::new(key, location, flags).into_shadow();
            return add_property(&shape, shadow);
        }
        generalize_property(&shape, &existing, value, None)
    } else if existing.location().can_store(value) {
        replace_property(&shape, &existing, existing.copy_with_flags(flags))
    } else {
        generalize_property(&shape, &existing, value, Some(flags))
    }
}

/// Widen `existing`'s location for `value`, replace it in the chain, and
/// deprecate the source shape in favor of the widened one.
fn generalize_property(
    shape: &Arc<Shape>,
    existing: &Property,
    value: &Value,
    flags: Option<u32>,
) -> Arc<Shape> {
    let mut allocator = LocationAllocator::from_shape(shape);
    let location = allocator.generalized_location(existing.location(), value);
    let mut replacement = existing.relocate(location);
    if let Some(flags) = flags {
        replacement = replacement.copy_with_flags(flags);
    }
    let new_shape = replace_property(shape, existing, replacement);
    stats::PROPERTIES_GENERALIZED.inc();
    debug!(
        key = %existing.key(),
        from = shape.id(),
        to = new_shape.id(),
        "generalized property location"
    );
    shape.invalidate_with_successor(new_shape.clone());
    new_shape
}

/// Append `property`, going through the transition cache.
pub(crate) fn add_property(shape: &Arc<Shape>, property: Property) -> Arc<Shape> {
    let transition = Transition::AddProperty(property.clone());
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    let _guard = shape.root_lock().lock();
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    stats::TRANSITION_CACHE_MISSES.inc();
    let mut allocator = LocationAllocator::from_shape(shape);
    allocator.advance(property.location());
    let map = shape.property_map().push(property);
    let child = Shape::make_child(
        shape,
        shape.object_type(),
        map,
        allocator.sizing(),
        transition.clone(),
    );
    shape.insert_transition(transition, child.clone());
    child
}

/// Replace `old` with `new` in place, going through the transition cache.
pub(crate) fn replace_property(shape: &Arc<Shape>, old: &Property, new: Property) -> Arc<Shape> {
    let transition = Transition::DirectReplaceProperty {
        old: old.clone(),
        new: new.clone(),
    };
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    let _guard = shape.root_lock().lock();
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    stats::TRANSITION_CACHE_MISSES.inc();
    let mut allocator = LocationAllocator::from_shape(shape);
    allocator.advance(new.location());
    let map = shape.property_map().replace_copy(old, new);
    let child = Shape::make_child(
        shape,
        shape.object_type(),
        map,
        allocator.sizing(),
        transition.clone(),
    );
    shape.insert_transition(transition, child.clone());
    child
}

/// Remove the binding for `key` by rebuilding the transition chain without
/// the edge that added it. Properties added after the removed one keep
/// their relative order but are relocated onto the ancestor's storage, so
/// removing the same property from the same shape converges on the same
/// result shape through the cache.
pub(crate) fn remove_property(shape: &Arc<Shape>, key: PropertyKey) -> Option<Arc<Shape>> {
    let shape = shape.ensure_valid();
    let property = shape.get_property(key)?;
    let transition = Transition::RemoveProperty(property.clone());
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return Some(child.ensure_valid());
    }
    stats::TRANSITION_CACHE_MISSES.inc();

    // Walk up to the shape just below the edge that introduced `key`,
    // collecting every unrelated edge on the way for replay.
    let mut replay = Vec::new();
    let mut cursor = shape.clone();
    let ancestor = loop {
        let Some(edge) = cursor.transition_from_parent().cloned() else {
            // Hit the root without finding the add edge: the binding came
            // from outside this chain, treat as not removable.
            return None;
        };
        let parent = cursor.parent().cloned().expect("non-root shape has a parent");
        match &edge {
            Transition::AddProperty(p) if p.key() == key => break parent,
            // Replaces of the removed key (generalizations, flag changes)
            // vanish along with the property itself.
            Transition::DirectReplaceProperty { new, .. } if new.key() == key => cursor = parent,
            _ => {
                replay.push(edge);
                cursor = parent;
            }
        }
    };

    let mut result = ancestor;
    for edge in replay.iter().rev() {
        result = apply_transition(&result, edge, true);
    }
    if property.is_shadow() && result.has_property(key) {
        // A shadow binding covers a declared one; both go.
        if let Some(stripped) = remove_property(&result, key) {
            result = stripped;
        }
    }
    debug!(key = %key, from = shape.id(), to = result.id(), "removed property");

    // Publish the remove edge; if another thread raced us to it, share its
    // result instead of ours.
    let _guard = shape.root_lock().lock();
    if let Some(child) = shape.lookup_transition(&transition) {
        return Some(child.ensure_valid());
    }
    shape.insert_transition(transition, result.clone());
    Some(result)
}

/// Move to the same layout under a different object-type tag.
pub(crate) fn change_type(shape: &Arc<Shape>, object_type: crate::value::ObjectType) -> Arc<Shape> {
    if shape.object_type() == object_type {
        return shape.clone();
    }
    let transition = Transition::ObjectTypeChange(object_type);
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    let _guard = shape.root_lock().lock();
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    stats::TRANSITION_CACHE_MISSES.inc();
    let child = Shape::make_child(
        shape,
        object_type,
        shape.property_map().clone(),
        shape.sizing(),
        transition.clone(),
    );
    shape.insert_transition(transition, child.clone());
    child
}

/// Mark the layout as carrying the primitive extension array from object
/// allocation time.
pub(crate) fn reserve_primitive_array(shape: &Arc<Shape>) -> Arc<Shape> {
    if shape.has_primitive_array() {
        return shape.clone();
    }
    let transition = Transition::ReservePrimitiveArray;
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    let _guard = shape.root_lock().lock();
    if let Some(child) = shape.lookup_transition(&transition) {
        stats::TRANSITION_CACHE_HITS.inc();
        return child.ensure_valid();
    }
    stats::TRANSITION_CACHE_MISSES.inc();
    let mut allocator = LocationAllocator::from_shape(shape);
    allocator.reserve_primitive_array();
    let child = Shape::make_child(
        shape,
        shape.object_type(),
        shape.property_map().clone(),
        allocator.sizing(),
        transition.clone(),
    );
    shape.insert_transition(transition, child.clone());
    child
}

/// Replay one recorded edge onto `shape`.
///
/// In `append` mode (chain rebuilds after a removal) properties are
/// relocated onto fresh slots allocated from the receiving shape, since the
/// recorded slots belonged to the old chain's storage layout.
pub(crate) fn apply_transition(
    shape: &Arc<Shape>,
    transition: &Transition,
    append: bool,
) -> Arc<Shape> {
    match transition {
        Transition::AddProperty(property) => {
            if append {
                let mut allocator = LocationAllocator::from_shape(shape);
                let location = allocator.move_location(property.location());
                add_property(shape, property.relocate(location))
            } else {
                add_property(shape, property.clone())
            }
        }
        Transition::DirectReplaceProperty { old, new } => {
            // The key's current binding on the receiving chain may differ
            // from the recorded `old` after earlier replays; replace
            // whatever is actually there.
            let Some(current) = shape.get_property(old.key()) else {
                return shape.clone();
            };
            let location = match (current.location(), new.location()) {
                (Location::Dual(current_dual), Location::Dual(new_dual)) => {
                    // Keep the representation the receiving chain already
                    // widened to; never narrow below the recorded target.
                    let tag = if current_dual.tag() == new_dual.tag() {
                        current_dual.tag()
                    } else {
                        DualType::Object
                    };
                    Location::Dual(current_dual.retag(tag))
                }
                _ if append => {
                    let mut allocator = LocationAllocator::from_shape(shape);
                    allocator.move_location(new.location())
                }
                _ => new.location().clone(),
            };
            replace_property(shape, &current, new.relocate(location))
        }
        Transition::RemoveProperty(property) => {
            remove_property(shape, property.key()).unwrap_or_else(|| shape.clone())
        }
        Transition::ObjectTypeChange(object_type) => change_type(shape, *object_type),
        Transition::ReservePrimitiveArray => reserve_primitive_array(shape),
    }
}
