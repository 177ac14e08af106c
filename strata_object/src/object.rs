// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The object model: locations, properties, shapes, and dynamic objects.

mod dynamic_object;
pub mod location;
mod property;
mod property_map;
mod shape;
mod strategy;
mod transition;

pub use dynamic_object::DynamicObject;
pub use location::{DualType, Location, Placement, SlotIndex};
pub use property::Property;
pub use property_map::PropertyMap;
pub use shape::Shape;
pub use transition::Transition;
