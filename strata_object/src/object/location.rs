// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property locations.
//!
//! A [`Location`] describes one storage slot for a property value: its
//! representation (primitive, dual, or object reference), its placement
//! (in-object field or extension array), and the capability to test and
//! accept a candidate value. Locations are immutable: a location never
//! changes its slot assignment once created. "Moving" a property always
//! means binding its key to a new `Location`, never mutating an old one.
//!
//! Equality and hashing cover representation and slot assignment but ignore
//! the final-write assumption latch, which is shared state carried along for
//! diagnostics and inline-cache consumers.

use core::any::TypeId;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{LayoutError, Result};
use crate::object::DynamicObject;
use crate::stats;
use crate::value::Value;

/// Whether a slot lives in the object itself or in an extension array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Field,
    Array,
}

/// One storage slot: a placement plus an index into the matching store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIndex {
    pub placement: Placement,
    pub index: u32,
}

impl SlotIndex {
    pub(crate) fn field(index: u32) -> Self {
        Self {
            placement: Placement::Field,
            index,
        }
    }

    pub(crate) fn array(index: u32) -> Self {
        Self {
            placement: Placement::Array,
            index,
        }
    }
}

const ASSUMPTION_UNSET: u8 = 0;
const ASSUMPTION_VALID: u8 = 1;
const ASSUMPTION_INVALID: u8 = 2;

/// One-way "never overwritten after initialization" latch.
///
/// Starts unset, may be observed (moving to valid) and is invalidated by the
/// first non-initializing write through the location. All clones of a
/// location share the same latch.
#[derive(Debug, Clone)]
pub struct FinalAssumption(Arc<AtomicU8>);

impl FinalAssumption {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ASSUMPTION_UNSET)))
    }

    /// True while no non-initializing write has gone through the location.
    pub fn is_valid(&self) -> bool {
        let state = self.0.load(Ordering::Acquire);
        if state == ASSUMPTION_UNSET {
            // First observation: latch to valid unless a writer got there
            // first. Losing the race is fine, we re-read the winner's state.
            return match self.0.compare_exchange(
                ASSUMPTION_UNSET,
                ASSUMPTION_VALID,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => true,
                Err(state) => state != ASSUMPTION_INVALID,
            };
        }
        state != ASSUMPTION_INVALID
    }

    fn invalidate(&self) {
        if self.0.swap(ASSUMPTION_INVALID, Ordering::AcqRel) != ASSUMPTION_INVALID {
            stats::FINAL_ASSUMPTIONS_INVALIDATED.inc();
        }
    }
}

/// Common state of every location that owns actual storage.
#[derive(Debug, Clone)]
pub struct InstanceLocation {
    pub(crate) slot: SlotIndex,
    assumption: FinalAssumption,
}

impl InstanceLocation {
    pub(crate) fn new(slot: SlotIndex) -> Self {
        Self {
            slot,
            assumption: FinalAssumption::new(),
        }
    }
}

impl PartialEq for InstanceLocation {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl Eq for InstanceLocation {}

impl Hash for InstanceLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
    }
}

/// A primitive slot with an optional implicit int upcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveLocation {
    pub(crate) base: InstanceLocation,
    pub(crate) implicit_int_cast: bool,
}

/// An object-reference slot, optionally narrowed to one payload type and
/// optionally rejecting null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub(crate) base: InstanceLocation,
    pub(crate) expected: Option<TypeId>,
    pub(crate) non_null: bool,
}

/// Current representation of a dual slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DualType {
    Int,
    Long,
    Double,
    Boolean,
    Object,
}

/// A paired long-storage and object-storage slot.
///
/// While the tag is a primitive representation, values live unboxed in the
/// long slot; once the tag widens to [`DualType::Object`], values live in
/// the object slot. Widening retags the location without moving either slot.
#[derive(Debug, Clone)]
pub struct DualLocation {
    pub(crate) object_slot: SlotIndex,
    pub(crate) primitive_slot: SlotIndex,
    pub(crate) tag: DualType,
    pub(crate) int_to_long: bool,
    pub(crate) int_to_double: bool,
    assumption: FinalAssumption,
}

impl DualLocation {
    pub(crate) fn new(
        object_slot: SlotIndex,
        primitive_slot: SlotIndex,
        tag: DualType,
        int_to_long: bool,
        int_to_double: bool,
    ) -> Self {
        Self {
            object_slot,
            primitive_slot,
            tag,
            int_to_long,
            int_to_double,
            assumption: FinalAssumption::new(),
        }
    }

    /// The same pair of slots under a different representational tag.
    pub(crate) fn retag(&self, tag: DualType) -> Self {
        Self::new(
            self.object_slot,
            self.primitive_slot,
            tag,
            self.int_to_long,
            self.int_to_double,
        )
    }

    pub fn tag(&self) -> DualType {
        self.tag
    }
}

impl PartialEq for DualLocation {
    fn eq(&self, other: &Self) -> bool {
        self.object_slot == other.object_slot
            && self.primitive_slot == other.primitive_slot
            && self.tag == other.tag
            && self.int_to_long == other.int_to_long
            && self.int_to_double == other.int_to_double
    }
}

impl Eq for DualLocation {}

impl Hash for DualLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.object_slot.hash(state);
        self.primitive_slot.hash(state);
        self.tag.hash(state);
        self.int_to_long.hash(state);
        self.int_to_double.hash(state);
    }
}

/// The storage descriptor for one property's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Unboxed 32-bit integer in a primitive slot.
    Int(InstanceLocation),
    /// Unboxed 64-bit integer in a primitive slot.
    Long(PrimitiveLocation),
    /// Unboxed double (bit pattern) in a primitive slot.
    Double(PrimitiveLocation),
    /// Boolean in a primitive slot.
    Boolean(InstanceLocation),
    /// Object reference slot, possibly type-narrowed.
    Object(ObjectLocation),
    /// Paired long/object slot with a representational tag.
    Dual(DualLocation),
    /// A value fixed forever; contributes no storage.
    Constant(Value),
    /// A declared default, fixed until the first real assignment forces a
    /// relocation; contributes no storage.
    Declared(Value),
}

impl Location {
    /// Pure predicate: can this location represent `value` without relayout?
    ///
    /// Never errors and never mutates; callers use it to pick between the
    /// fast path and the shape-generalization slow path.
    pub fn can_store(&self, value: &Value) -> bool {
        match self {
            Location::Int(_) => matches!(value, Value::Int(_)),
            Location::Long(l) => {
                matches!(value, Value::Long(_))
                    || (l.implicit_int_cast && matches!(value, Value::Int(_)))
            }
            Location::Double(l) => {
                matches!(value, Value::Double(_))
                    || (l.implicit_int_cast && matches!(value, Value::Int(_)))
            }
            Location::Boolean(_) => matches!(value, Value::Boolean(_)),
            Location::Object(l) => match &l.expected {
                Some(expected) => match value {
                    Value::Object(o) => o.payload_type() == *expected,
                    Value::Null => !l.non_null,
                    _ => false,
                },
                None => !(l.non_null && value.is_null()),
            },
            Location::Dual(l) => match l.tag {
                DualType::Object => true,
                DualType::Int => matches!(value, Value::Int(_)),
                DualType::Long => {
                    matches!(value, Value::Long(_))
                        || (l.int_to_long && matches!(value, Value::Int(_)))
                }
                DualType::Double => {
                    matches!(value, Value::Double(_))
                        || (l.int_to_double && matches!(value, Value::Int(_)))
                }
                DualType::Boolean => matches!(value, Value::Boolean(_)),
            },
            Location::Constant(v) | Location::Declared(v) => value == v,
        }
    }

    /// Read the value through this location. The object's shape is assumed
    /// to contain a property bound to this location.
    pub fn get(&self, object: &DynamicObject) -> Value {
        match self {
            Location::Int(l) => Value::Int(object.primitive(l.slot) as i32),
            Location::Long(l) => Value::Long(object.primitive(l.base.slot)),
            Location::Double(l) => {
                Value::Double(f64::from_bits(object.primitive(l.base.slot) as u64))
            }
            Location::Boolean(l) => Value::Boolean(object.primitive(l.slot) != 0),
            Location::Object(l) => object.object(l.base.slot).clone(),
            Location::Dual(l) => match l.tag {
                DualType::Object => object.object(l.object_slot).clone(),
                DualType::Int => Value::Int(object.primitive(l.primitive_slot) as i32),
                DualType::Long => Value::Long(object.primitive(l.primitive_slot)),
                DualType::Double => {
                    Value::Double(f64::from_bits(object.primitive(l.primitive_slot) as u64))
                }
                DualType::Boolean => Value::Boolean(object.primitive(l.primitive_slot) != 0),
            },
            Location::Constant(v) | Location::Declared(v) => v.clone(),
        }
    }

    /// Write `value` through this location.
    ///
    /// Fails with [`LayoutError::IncompatibleLocation`] when [`can_store`]
    /// is false, or [`LayoutError::FinalLocation`] when the slot holds a
    /// constant. `init` marks the initializing write after a relayout; only
    /// non-initializing writes invalidate the final-write assumption.
    ///
    /// [`can_store`]: Location::can_store
    pub fn set(&self, object: &mut DynamicObject, value: &Value, init: bool) -> Result<()> {
        if !self.can_store(value) {
            return Err(match self {
                Location::Constant(_) => LayoutError::FinalLocation,
                _ => LayoutError::IncompatibleLocation,
            });
        }
        match self {
            Location::Constant(_) | Location::Declared(_) => {
                // Value equality was already established; nothing is stored.
                Ok(())
            }
            Location::Int(l) => {
                if !init {
                    l.assumption.invalidate();
                }
                let Value::Int(i) = value else { unreachable!() };
                object.set_primitive(l.slot, *i as i64);
                Ok(())
            }
            Location::Long(l) => {
                if !init {
                    l.base.assumption.invalidate();
                }
                object.set_primitive(l.base.slot, long_bits(value));
                Ok(())
            }
            Location::Double(l) => {
                if !init {
                    l.base.assumption.invalidate();
                }
                object.set_primitive(l.base.slot, double_bits(value));
                Ok(())
            }
            Location::Boolean(l) => {
                if !init {
                    l.assumption.invalidate();
                }
                let Value::Boolean(b) = value else { unreachable!() };
                object.set_primitive(l.slot, *b as i64);
                Ok(())
            }
            Location::Object(l) => {
                if !init {
                    l.base.assumption.invalidate();
                }
                object.set_object(l.base.slot, value.clone());
                Ok(())
            }
            Location::Dual(l) => {
                if !init {
                    l.assumption.invalidate();
                }
                match l.tag {
                    DualType::Object => object.set_object(l.object_slot, value.clone()),
                    DualType::Int => {
                        let Value::Int(i) = value else { unreachable!() };
                        object.set_primitive(l.primitive_slot, *i as i64);
                    }
                    DualType::Long => object.set_primitive(l.primitive_slot, long_bits(value)),
                    DualType::Double => object.set_primitive(l.primitive_slot, double_bits(value)),
                    DualType::Boolean => {
                        let Value::Boolean(b) = value else { unreachable!() };
                        object.set_primitive(l.primitive_slot, *b as i64);
                    }
                }
                Ok(())
            }
        }
    }

    /// A constant location's value is fixed forever.
    pub fn is_constant(&self) -> bool {
        matches!(self, Location::Constant(_))
    }

    /// A declared location's value is fixed until the first real assignment.
    pub fn is_declared(&self) -> bool {
        matches!(self, Location::Declared(_))
    }

    /// Value locations contribute no storage.
    pub fn is_value(&self) -> bool {
        matches!(self, Location::Constant(_) | Location::Declared(_))
    }

    /// True while no non-initializing write has gone through this location.
    /// Value locations are final by construction.
    pub fn is_assumed_final(&self) -> bool {
        match self {
            Location::Int(l) | Location::Boolean(l) => l.assumption.is_valid(),
            Location::Long(l) | Location::Double(l) => l.base.assumption.is_valid(),
            Location::Object(l) => l.base.assumption.is_valid(),
            Location::Dual(l) => l.assumption.is_valid(),
            Location::Constant(_) | Location::Declared(_) => true,
        }
    }

}

fn long_bits(value: &Value) -> i64 {
    match value {
        Value::Long(l) => *l,
        Value::Int(i) => *i as i64,
        _ => unreachable!(),
    }
}

fn double_bits(value: &Value) -> i64 {
    match value {
        Value::Double(d) => d.to_bits() as i64,
        Value::Int(i) => (*i as f64).to_bits() as i64,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    fn int_location(index: u32) -> Location {
        Location::Int(InstanceLocation::new(SlotIndex::field(index)))
    }

    #[test]
    fn can_store_never_mutates() {
        let loc = int_location(0);
        assert!(loc.can_store(&Value::Int(1)));
        assert!(!loc.can_store(&Value::Double(1.0)));
        assert!(!loc.can_store(&Value::Null));
        // Still answers the same afterwards.
        assert!(loc.can_store(&Value::Int(1)));
    }

    #[test]
    fn double_location_implicit_int_cast() {
        let strict = Location::Double(PrimitiveLocation {
            base: InstanceLocation::new(SlotIndex::field(0)),
            implicit_int_cast: false,
        });
        let casting = Location::Double(PrimitiveLocation {
            base: InstanceLocation::new(SlotIndex::field(0)),
            implicit_int_cast: true,
        });
        assert!(!strict.can_store(&Value::Int(1)));
        assert!(casting.can_store(&Value::Int(1)));
        assert!(casting.can_store(&Value::Double(1.5)));
    }

    #[test]
    fn typed_object_location_narrows() {
        let narrowed = Location::Object(ObjectLocation {
            base: InstanceLocation::new(SlotIndex::field(0)),
            expected: Some(core::any::TypeId::of::<String>()),
            non_null: true,
        });
        assert!(narrowed.can_store(&Value::Object(ObjectRef::new("s".to_string()))));
        assert!(!narrowed.can_store(&Value::Object(ObjectRef::new(1u64))));
        assert!(!narrowed.can_store(&Value::Null));
        assert!(!narrowed.can_store(&Value::Int(1)));

        let generic = Location::Object(ObjectLocation {
            base: InstanceLocation::new(SlotIndex::field(0)),
            expected: None,
            non_null: false,
        });
        assert!(generic.can_store(&Value::Int(1)));
        assert!(generic.can_store(&Value::Null));
    }

    #[test]
    fn dual_location_tags() {
        let dual = DualLocation::new(
            SlotIndex::field(0),
            SlotIndex::field(0),
            DualType::Double,
            false,
            true,
        );
        let loc = Location::Dual(dual.clone());
        assert!(loc.can_store(&Value::Double(3.5)));
        assert!(loc.can_store(&Value::Int(3)));
        assert!(!loc.can_store(&Value::Boolean(true)));

        let widened = Location::Dual(dual.retag(DualType::Object));
        assert!(widened.can_store(&Value::Boolean(true)));
        assert!(widened.can_store(&Value::Null));
        assert_ne!(loc, widened);
    }

    #[test]
    fn value_locations_compare_by_value() {
        let constant = Location::Constant(Value::Int(7));
        assert!(constant.can_store(&Value::Int(7)));
        assert!(!constant.can_store(&Value::Int(8)));
        let declared = Location::Declared(Value::Null);
        assert!(declared.can_store(&Value::Null));
        assert!(!declared.can_store(&Value::Int(0)));
        assert!(constant.is_value() && declared.is_value());
    }

    #[test]
    fn equality_ignores_final_assumption() {
        let a = int_location(3);
        let b = int_location(3);
        let c = int_location(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
