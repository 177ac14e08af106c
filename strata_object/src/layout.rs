// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layout: the shared metadata behind every shape family.
//!
//! A [`Layout`] owns the policy knobs for location allocation, the shape id
//! counter, the table of root shapes per object type, and the optional
//! property-transition listener. All shapes derived from its roots share it
//! by reference.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::intern::PropertyKey;
use crate::object::Shape;
use crate::value::ObjectType;

/// Policy knobs consulted by location allocation and generalization.
#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions {
    /// Let long-slot locations accept ints without relayout.
    pub implicit_cast_int_to_long: bool,
    /// Let double-slot locations accept ints without relayout.
    pub implicit_cast_int_to_double: bool,
    /// Narrow freshly allocated object locations to the first stored
    /// payload type instead of going generic immediately.
    pub typed_object_locations: bool,
    /// In-object object-reference slots before spilling to the extension
    /// array.
    pub object_field_capacity: u32,
    /// In-object primitive slots before spilling to the extension array.
    pub primitive_field_capacity: u32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            implicit_cast_int_to_long: false,
            implicit_cast_int_to_double: false,
            typed_object_locations: false,
            object_field_capacity: 8,
            primitive_field_capacity: 8,
        }
    }
}

/// Observer of upcoming property transitions.
///
/// Invoked with the source shape and the affected key before the structural
/// mutation happens; external caches use this for invalidation.
pub trait TransitionListener: Send + Sync {
    fn on_property_transition(&self, shape: &Arc<Shape>, key: PropertyKey);
}

/// Shared metadata for a family of shape trees.
pub struct Layout {
    options: LayoutOptions,
    next_shape_id: AtomicU32,
    hasher: ahash::RandomState,
    roots: Mutex<AHashMap<ObjectType, Arc<Shape>>>,
    listener: RwLock<Option<Arc<dyn TransitionListener>>>,
}

impl Layout {
    pub fn new(options: LayoutOptions) -> Arc<Layout> {
        Arc::new(Layout {
            options,
            next_shape_id: AtomicU32::new(0),
            hasher: ahash::RandomState::new(),
            roots: Mutex::new(AHashMap::new()),
            listener: RwLock::new(None),
        })
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Get or create the root shape for `object_type`. Repeated calls with
    /// the same tag return the same root by reference.
    pub fn root_shape(self: &Arc<Self>, object_type: ObjectType) -> Arc<Shape> {
        let mut roots = self.roots.lock();
        if let Some(shape) = roots.get(&object_type) {
            return shape.clone();
        }
        let shape = Shape::new_root(self.clone(), object_type);
        roots.insert(object_type, shape.clone());
        shape
    }

    /// Register the property-transition listener, replacing any previous
    /// one.
    pub fn set_transition_listener(&self, listener: Arc<dyn TransitionListener>) {
        *self.listener.write() = Some(listener);
    }

    pub fn clear_transition_listener(&self) {
        *self.listener.write() = None;
    }

    pub(crate) fn notify_property_transition(&self, shape: &Arc<Shape>, key: PropertyKey) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_property_transition(shape, key);
        }
    }

    pub(crate) fn next_shape_id(&self) -> u32 {
        self.next_shape_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn hasher(&self) -> &ahash::RandomState {
        &self.hasher
    }
}

impl core::fmt::Debug for Layout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Layout")
            .field("options", &self.options)
            .field("shape_count", &self.next_shape_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
