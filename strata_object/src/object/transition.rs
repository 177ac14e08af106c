// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transitions: labeled edges in the shape graph.
//!
//! A transition describes one structural change and doubles as the lookup
//! key in a shape's transition cache, hence the value equality and hashing
//! over the full property (location included).

use crate::intern::PropertyKey;
use crate::object::property::Property;
use crate::value::ObjectType;

/// One edge in the shape graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Append a property at the end of the chain.
    AddProperty(Property),
    /// Replace a property in place, typically after generalizing its
    /// location or changing its flags.
    DirectReplaceProperty { old: Property, new: Property },
    /// Remove a property.
    RemoveProperty(Property),
    /// Change the object-type tag without touching the property layout.
    ObjectTypeChange(ObjectType),
    /// Reserve the primitive extension array so freshly allocated objects
    /// carry it from the start.
    ReservePrimitiveArray,
}

impl Transition {
    /// The key this transition concerns, if any. This is what the
    /// property-transition listener hook observes.
    pub fn key(&self) -> Option<PropertyKey> {
        match self {
            Transition::AddProperty(p) | Transition::RemoveProperty(p) => Some(p.key()),
            Transition::DirectReplaceProperty { new, .. } => Some(new.key()),
            Transition::ObjectTypeChange(_) | Transition::ReservePrimitiveArray => None,
        }
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

    #[test]
    fn transitions_distinguish_locations() {
        // Same logical property at a different slot must be a different
        // cache key.
        let a = Transition::AddProperty(property("x", 0));
        let b = Transition::AddProperty(property("x", 1));
        let c = Transition::AddProperty(property("x", 0));
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn transition_keys() {
        assert_eq!(
            Transition::AddProperty(property("x", 0)).key(),
            Some(intern("x"))
        );
        assert_eq!(Transition::ReservePrimitiveArray.key(), None);
        assert_eq!(Transition::ObjectTypeChange(ObjectType(1)).key(), None);
    }
}
