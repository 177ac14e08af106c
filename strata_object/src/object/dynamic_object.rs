// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dynamic objects: a shape pointer plus flat value storage.
//!
//! An object is intentionally dumb: all layout knowledge lives in its shape.
//! Storage is split into primitive stores (unboxed `i64` bit patterns) and
//! object stores, each with a fixed in-object field area and a growable
//! extension array, exactly mirroring the slot space the shape's locations
//! index into.

use std::sync::Arc;

use crate::intern::PropertyKey;
use crate::object::location::{Placement, SlotIndex};
use crate::object::shape::Shape;
use crate::object::transition::Transition;
use crate::value::{ObjectType, Value};

/// One dynamically-shaped object.
#[derive(Debug)]
pub struct DynamicObject {
    shape: Arc<Shape>,
    object_fields: Vec<Value>,
    object_array: Vec<Value>,
    primitive_fields: Vec<i64>,
    primitive_array: Vec<i64>,
}

impl DynamicObject {
    /// Allocate an object of `shape`, all slots zero-initialized.
    pub fn new(shape: Arc<Shape>) -> Self {
        Self {
            object_fields: vec![Value::Null; shape.object_field_size() as usize],
            object_array: vec![Value::Null; shape.object_array_size() as usize],
            primitive_fields: vec![0; shape.primitive_field_size() as usize],
            primitive_array: vec![0; shape.primitive_array_size() as usize],
            shape,
        }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    // -- raw slot access, used by locations only ----------------------------

    pub(crate) fn primitive(&self, slot: SlotIndex) -> i64 {
        match slot.placement {
            Placement::Field => self.primitive_fields[slot.index as usize],
            Placement::Array => self.primitive_array[slot.index as usize],
        }
    }

    pub(crate) fn set_primitive(&mut self, slot: SlotIndex, bits: i64) {
        match slot.placement {
            Placement::Field => self.primitive_fields[slot.index as usize] = bits,
            Placement::Array => self.primitive_array[slot.index as usize] = bits,
        }
    }

    pub(crate) fn object(&self, slot: SlotIndex) -> &Value {
        match slot.placement {
            Placement::Field => &self.object_fields[slot.index as usize],
            Placement::Array => &self.object_array[slot.index as usize],
        }
    }

    pub(crate) fn set_object(&mut self, slot: SlotIndex, value: Value) {
        match slot.placement {
            Placement::Field => self.object_fields[slot.index as usize] = value,
            Placement::Array => self.object_array[slot.index as usize] = value,
        }
    }

    // -- property access -----------------------------------------------------

    /// Read `key`, or `None` when the object has no such property.
    pub fn get(&self, key: PropertyKey) -> Option<Value> {
        let property = self.shape.get_property(key)?;
        Some(property.get(self))
    }

    pub fn contains_key(&self, key: PropertyKey) -> bool {
        self.shape.has_property(key)
    }

    /// Keys in enumeration order.
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.shape.key_list()
    }

    /// Write `key`, adding the property or migrating to a wider layout as
    /// needed. Existing flags are preserved.
    pub fn put(&mut self, key: PropertyKey, value: Value) {
        self.put_internal(key, value, None);
    }

    /// Write `key` under explicit `flags`, adding or updating the property
    /// and migrating as needed.
    pub fn define(&mut self, key: PropertyKey, value: Value, flags: u32) {
        self.put_internal(key, value, Some(flags));
    }

    fn put_internal(&mut self, key: PropertyKey, value: Value, flags: Option<u32>) {
        // The write is an initializing store exactly when this call brought
        // the location into existence, either by adding the property or by
        // migrating to a widened layout. Only genuine overwrites may kill a
        // location's final-write assumption.
        let mut init = !self.shape.has_property(key);
        loop {
            let shape = self.shape.clone();
            if let Some(property) = shape.get_property(key) {
                if flags.is_none_or(|f| f == property.flags())
                    && property.location().can_store(&value)
                    && property.set(self, &value, init).is_ok()
                {
                    return;
                }
                let new_shape =
                    shape.define_property(key, &value, flags.unwrap_or(property.flags()));
                if Arc::ptr_eq(&new_shape, &self.shape) {
                    // A racing generalization already widened for us.
                    continue;
                }
                self.migrate(&new_shape);
                init = true;
                // Retry the write against the migrated layout; each round
                // strictly widens the location, so this terminates.
            } else {
                let new_shape = shape.define_property(key, &value, flags.unwrap_or(0));
                self.migrate(&new_shape);
                init = true;
            }
        }
    }

    /// Remove `key`. Returns false (and changes nothing) when the property
    /// is absent.
    pub fn delete(&mut self, key: PropertyKey) -> bool {
        let shape = self.shape.clone();
        match shape.remove_property(key) {
            Some(new_shape) => {
                // Surviving properties may have been relocated, so this is
                // always a full relayout.
                self.relayout(&new_shape);
                true
            }
            None => false,
        }
    }

    /// Retag the object without touching its storage.
    pub fn change_object_type(&mut self, object_type: ObjectType) {
        // A type change never moves a slot, so the storage carries over.
        self.shape = self.shape.change_type(object_type);
    }

    /// Move to a layout that carries the primitive extension array from
    /// allocation time.
    pub fn reserve_primitive_array(&mut self) {
        let new_shape = self.shape.reserve_primitive_array();
        self.migrate(&new_shape);
    }

    /// If this object's shape was deprecated by a generalization elsewhere,
    /// migrate to the designated valid successor. Returns whether a
    /// migration happened.
    pub fn update_shape(&mut self) -> bool {
        if self.shape.is_valid() {
            return false;
        }
        let new_shape = self.shape.ensure_valid();
        if Arc::ptr_eq(&new_shape, &self.shape) {
            return false;
        }
        self.migrate(&new_shape);
        true
    }

    // -- migration -----------------------------------------------------------

    fn migrate(&mut self, new_shape: &Arc<Shape>) {
        if Arc::ptr_eq(&self.shape, new_shape) {
            return;
        }
        if self.grow_only_path(new_shape) {
            self.grow(new_shape);
        } else {
            self.relayout(new_shape);
        }
    }

    /// Is `new_shape` derived from the current shape purely by appends?
    /// Then every existing slot keeps its meaning and migration is just
    /// growing the stores.
    fn grow_only_path(&self, new_shape: &Arc<Shape>) -> bool {
        let mut cursor = new_shape.clone();
        while !Arc::ptr_eq(&cursor, &self.shape) {
            if cursor.depth() <= self.shape.depth() {
                return false;
            }
            match cursor.transition_from_parent() {
                Some(Transition::AddProperty(_)) | Some(Transition::ReservePrimitiveArray) => {}
                _ => return false,
            }
            let Some(parent) = cursor.parent().cloned() else {
                return false;
            };
            cursor = parent;
        }
        true
    }

    fn grow(&mut self, new_shape: &Arc<Shape>) {
        self.object_fields
            .resize(new_shape.object_field_size() as usize, Value::Null);
        self.object_array
            .resize(new_shape.object_array_size() as usize, Value::Null);
        self.primitive_fields
            .resize(new_shape.primitive_field_size() as usize, 0);
        self.primitive_array
            .resize(new_shape.primitive_array_size() as usize, 0);
        self.shape = new_shape.clone();
    }

    /// Rebuild storage from scratch under `new_shape`, copying every
    /// surviving property value across location kinds. A value the new
    /// location cannot represent (a narrower replay target) is re-put after
    /// the swap, which widens the layout once more.
    fn relayout(&mut self, new_shape: &Arc<Shape>) {
        let old_shape = self.shape.clone();
        let mut fresh = DynamicObject::new(new_shape.clone());
        let mut pending = Vec::new();
        for old_property in old_shape.property_list() {
            let Some(new_property) = new_shape.get_property(old_property.key()) else {
                continue;
            };
            if new_property.location().is_value() {
                continue;
            }
            let value = old_property.get(self);
            if new_property.set(&mut fresh, &value, true).is_err() {
                pending.push((old_property.key(), value));
            }
        }
        *self = fresh;
        for (key, value) in pending {
            self.put(key, value);
        }
    }
}
