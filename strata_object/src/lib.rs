// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shape-based storage for dynamic objects.
//!
//! Objects whose property sets evolve at runtime share immutable layout
//! descriptions called [shapes](Shape). A shape records which properties an
//! object has and where each value lives; objects built by the same sequence
//! of property definitions share one shape, and shape identity doubles as an
//! inline-cache guard for language implementations built on top.
//!
//! The building blocks, bottom up:
//!
//! - [`Value`] and [`PropertyKey`]: the stored values and interned keys.
//! - [`Location`](object::Location): one storage slot, specialized to the
//!   first value it saw and widened monotonically on incompatible writes.
//! - [`Property`](object::Property) and
//!   [`PropertyMap`](object::PropertyMap): immutable key/location bindings
//!   in a persistent, insertion-ordered chain.
//! - [`Shape`]: a node in the transition tree, caching outgoing edges so
//!   equal histories yield pointer-equal shapes.
//! - [`DynamicObject`]: a shape pointer plus flat storage, migrating between
//!   layouts as its shape evolves.
//! - [`Layout`]: shared policy and root-shape registry for one shape family.
//!
//! ```
//! use strata_object::{Layout, LayoutOptions, DynamicObject, Value, ObjectType, intern};
//!
//! let layout = Layout::new(LayoutOptions::default());
//! let root = layout.root_shape(ObjectType(0));
//!
//! let mut a = DynamicObject::new(root.clone());
//! a.put(intern("x"), Value::Int(1));
//! a.put(intern("y"), Value::Int(2));
//!
//! let mut b = DynamicObject::new(root);
//! b.put(intern("x"), Value::Int(10));
//! b.put(intern("y"), Value::Int(20));
//!
//! // Same definition history, same shape by identity.
//! assert!(std::sync::Arc::ptr_eq(a.shape(), b.shape()));
//! assert_eq!(a.get(intern("y")), Some(Value::Int(2)));
//! ```

mod error;
mod intern;
mod layout;
pub mod object;
pub mod stats;
mod value;

pub use error::{LayoutError, Result};
pub use intern::{PropertyKey, intern};
pub use layout::{Layout, LayoutOptions, TransitionListener};
pub use object::{DynamicObject, Shape};
pub use value::{ObjectRef, ObjectType, Value};
