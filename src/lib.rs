//! An in-memory FAST (Fast Architecture-Sensitive Tree) index over sorted
//! `i32` keys.
//!
//! The index is built once from a sorted array and answers predecessor and
//! lower-bound queries by walking a hierarchically blocked implicit binary
//! tree laid out to match SIMD register width, cache-line size, and page
//! size, so a lookup touches as few cache lines and TLB entries as the
//! tree's depth allows. See [`FastIndex`] for the entry point.

mod build;
mod error;
pub mod geometry;
mod index;
mod layout;
mod search;

pub use error::{FastError, Result};
pub use geometry::{Geometry, PageSizeSource, SystemPageSize};
pub use index::FastIndex;
