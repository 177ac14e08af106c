// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy of the shape engine.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, LayoutError>;

/// Errors surfaced by shape and location operations.
///
/// `IncompatibleLocation` and `FinalLocation` are always locally recoverable:
/// every generic write path catches them and falls back to the shape
/// generalization slow path. `UnrelatedShapes` is a usage error and fails
/// fast.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// The value cannot be represented by the location without a relayout.
    #[error("value cannot be stored in this location without relayout")]
    IncompatibleLocation,
    /// The location holds a fixed value and cannot be written.
    #[error("location holds a final value and cannot be written")]
    FinalLocation,
    /// The two shapes do not share a common root.
    #[error("shapes do not share a common root")]
    UnrelatedShapes,
}
