// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Properties: an immutable binding of a key to a location plus flags.

use bitflags::bitflags;

use crate::error::Result;
use crate::intern::PropertyKey;
use crate::object::location::Location;
use crate::object::DynamicObject;
use crate::value::Value;

bitflags! {
    /// Internal property attributes, orthogonal to the user-visible flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct PropertyAttributes: u8 {
        /// The property may be rebound to a different location.
        const RELOCATABLE = 1 << 0;
        /// The property shadows an earlier declared property with the same
        /// key; it must keep its own location for chain-diffing purposes.
        const SHADOW = 1 << 1;
    }
}

/// An immutable binding of a key to a [`Location`] and a small flag set.
///
/// Full equality (`Eq`/`Hash`) covers the location and is what transition
/// caches key on; [`Property::is_same`] compares only key and flags and is
/// what structural shape diffing uses. Two properties with the same key and
/// flags but different locations are the same logical property at a
/// different physical slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Property {
    key: PropertyKey,
    location: Location,
    flags: u32,
    attributes: PropertyAttributes,
}

impl Property {
    pub fn new(key: PropertyKey, location: Location, flags: u32) -> Self {
        Self {
            key,
            location,
            flags,
            attributes: PropertyAttributes::RELOCATABLE,
        }
    }

    pub fn key(&self) -> PropertyKey {
        self.key
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Same logical property: key and flags only, storage ignored.
    pub fn is_same(&self, other: &Property) -> bool {
        self.key == other.key && self.flags == other.flags
    }

    pub(crate) fn is_shadow(&self) -> bool {
        self.attributes.contains(PropertyAttributes::SHADOW)
    }

    pub(crate) fn is_relocatable(&self) -> bool {
        self.attributes.contains(PropertyAttributes::RELOCATABLE)
    }

    /// Mark this property as shadowing an earlier declaration of its key.
    pub(crate) fn into_shadow(mut self) -> Self {
        self.attributes |= PropertyAttributes::SHADOW;
        self
    }

    /// Rebind to a new location, preserving key and flags.
    ///
    /// Non-relocatable properties are returned unchanged; shadow properties
    /// must keep their original location for chain compatibility, so callers
    /// treat an identity result as "nothing to do".
    pub fn relocate(&self, location: Location) -> Self {
        if !self.is_relocatable() {
            return self.clone();
        }
        Self {
            key: self.key,
            location,
            flags: self.flags,
            attributes: self.attributes,
        }
    }

    /// Same key and location under a different flag set.
    pub fn copy_with_flags(&self, flags: u32) -> Self {
        Self {
            key: self.key,
            location: self.location.clone(),
            flags,
            attributes: self.attributes,
        }
    }

    /// Read this property's value from `object`.
    pub fn get(&self, object: &DynamicObject) -> Value {
        self.location.get(object)
    }

    /// Write this property's value, failing when the location rejects it.
    /// Generic write paths catch the failure and take the shape
    /// generalization slow path instead.
    pub fn set(&self, object: &mut DynamicObject, value: &Value, init: bool) -> Result<()> {
        self.location.set(object, value, init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use crate::object::location::{InstanceLocation, SlotIndex};

    fn int_location(index: u32) -> Location {
        Location::Int(InstanceLocation::new(SlotIndex::field(index)))
    }

    #[test]
    fn is_same_ignores_location() {
        let a = Property::new(intern("x"), int_location(0), 0);
        let b = Property::new(intern("x"), int_location(5), 0);
        let c = Property::new(intern("x"), int_location(0), 1);
        assert!(a.is_same(&b));
        assert!(!a.is_same(&c));
        // Full equality distinguishes the relocated property.
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn relocate_preserves_key_and_flags() {
        let p = Property::new(intern("y"), int_location(0), 3);
        let moved = p.relocate(int_location(7));
        assert_eq!(moved.key(), p.key());
        assert_eq!(moved.flags(), 3);
        assert!(p.is_same(&moved));
        assert_ne!(p, moved);
    }

    #[test]
    fn copy_with_flags_keeps_location() {
        let p = Property::new(intern("z"), int_location(2), 0);
        let q = p.copy_with_flags(9);
        assert_eq!(q.flags(), 9);
        assert_eq!(q.location(), p.location());
        assert!(!p.is_same(&q));
    }
}
