//! Common functionality for `symbolic`.
//!
//! This crate exposes a set of key types:
//!
//!  - [`ContentHasher`]: A streaming 128-bit hash used to identify files by content.
//!  - [`CancellationToken`]: A shared flag to abort long running I/O.
//!  - [`Sniff`]: The result of probing a source for a specific file format.
//!
//! The identifier types of [`debugid`] and [`uuid`] are re-exported.
//!
//! This module is part of the `symbolic` crate.

#![warn(missing_docs)]

mod cancel;
mod hash;
mod sniff;

pub use crate::cancel::*;
pub use crate::hash::*;
pub use crate::sniff::*;

pub use debugid::*;
pub use uuid::Uuid;
