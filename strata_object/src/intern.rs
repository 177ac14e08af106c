// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property key interning.
//!
//! Property keys are interned process-wide: equality and hashing of a
//! [`PropertyKey`] are a `u32` comparison, which keeps property lookup and
//! transition-cache keys cheap. The interner itself is only touched when a
//! key is first seen or when its text is needed for display.

use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

/// An interned property name.
///
/// Two keys interned from the same text are equal and share one id for the
/// lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PropertyKey(u32);

impl PropertyKey {
    /// The interned text of this key.
    pub fn as_str(self) -> Arc<str> {
        interner().read().names[self.0 as usize].clone()
    }
}

impl core::fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PropertyKey({:?})", &*self.as_str())
    }
}

impl core::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[derive(Default)]
struct Interner {
    names: Vec<Arc<str>>,
    table: AHashMap<Arc<str>, u32>,
}

static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();

fn interner() -> &'static RwLock<Interner> {
    INTERNER.get_or_init(|| RwLock::new(Interner::default()))
}

/// Intern a property name.
pub fn intern(name: &str) -> PropertyKey {
    let interner = interner();
    if let Some(&id) = interner.read().table.get(name) {
        return PropertyKey(id);
    }
    let mut interner = interner.write();
    // Racing interners may have inserted the name while we were upgrading.
    if let Some(&id) = interner.table.get(name) {
        return PropertyKey(id);
    }
    let id = u32::try_from(interner.names.len()).expect("property key space exhausted");
    let name: Arc<str> = Arc::from(name);
    interner.names.push(name.clone());
    interner.table.insert(name, id);
    PropertyKey(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = intern("x");
        let b = intern("x");
        let c = intern("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*a.as_str(), "x");
        assert_eq!(&*c.as_str(), "y");
    }

    #[test]
    fn empty_and_unicode_names() {
        assert_eq!(&*intern("").as_str(), "");
        assert_eq!(&*intern("名前").as_str(), "名前");
    }
}
