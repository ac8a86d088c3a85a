//! The public-facing, read-only ordered-key index.

use crate::build::build_layout;
use crate::error::{FastError, Result};
use crate::geometry::{Geometry, PageSizeSource, SystemPageSize, SENTINEL};
use crate::layout::AlignedSlots;
use crate::search::{lower_bound, predecessor};

/// An immutable, cache- and TLB-conscious index over a sorted array of
/// `i32` keys, built once and queried many times.
///
/// Construction validates and copies the input; queries never allocate and
/// never fail, returning `None`/`len()` sentinels for out-of-range input
/// rather than an error.
pub struct FastIndex {
    sorted_keys: Vec<i32>,
    layout: AlignedSlots,
    rank: AlignedSlots,
    geometry: Geometry,
}

impl FastIndex {
    /// Build an index over `sorted_keys`, using the host's reported page
    /// size to pick the page-blocking granularity.
    ///
    /// `sorted_keys` must be non-decreasing and must not contain
    /// [`i32::MAX`], which is reserved as the internal sentinel.
    pub fn create(sorted_keys: &[i32]) -> Result<Self> {
        Self::create_with_page_size(sorted_keys, &SystemPageSize)
    }

    /// Build an index, querying the page size from `source` instead of the
    /// operating system. Exists so callers running on huge pages (or
    /// wanting to exercise that layout in tests) can supply it directly.
    pub fn create_with_page_size<S: PageSizeSource>(
        sorted_keys: &[i32],
        source: &S,
    ) -> Result<Self> {
        validate(sorted_keys)?;

        let geometry = Geometry::from_source(sorted_keys.len(), source)?;
        let (layout, rank) = build_layout(sorted_keys, &geometry)?;

        Ok(FastIndex {
            sorted_keys: sorted_keys.to_vec(),
            layout,
            rank,
            geometry,
        })
    }

    /// The predecessor of `query`: the largest index `i` with
    /// `key_at(i) <= query`, or `None` if `query` is smaller than every key.
    pub fn search(&self, query: i32) -> Option<usize> {
        predecessor(
            &self.sorted_keys,
            self.layout.as_slice(),
            self.rank.as_slice(),
            &self.geometry,
            query,
        )
    }

    /// The index of the first key `>= query`, or [`Self::size`] if no such
    /// key exists.
    pub fn lower_bound(&self, query: i32) -> usize {
        lower_bound(&self.sorted_keys, query)
    }

    /// Number of keys in the index.
    pub fn size(&self) -> usize {
        self.sorted_keys.len()
    }

    /// The key at sorted position `idx`. Returns `0` if `idx >= size()`: a
    /// defined but meaningless value, not an error, matching the total
    /// behavior of every other query on this index.
    pub fn key_at(&self, idx: usize) -> i32 {
        self.sorted_keys.get(idx).copied().unwrap_or(0)
    }
}

fn validate(sorted_keys: &[i32]) -> Result<()> {
    if sorted_keys.is_empty() {
        return Err(FastError::InvalidInput(
            "sorted_keys must contain at least one key".to_string(),
        ));
    }
    if sorted_keys.len() > i32::MAX as usize {
        return Err(FastError::InvalidInput(format!(
            "sorted_keys length {} exceeds i32::MAX",
            sorted_keys.len()
        )));
    }
    if let Some(bad) = sorted_keys.windows(2).find(|w| w[0] > w[1]) {
        return Err(FastError::InvalidInput(format!(
            "sorted_keys must be non-decreasing, found {} before {}",
            bad[0], bad[1]
        )));
    }
    if sorted_keys.iter().any(|&k| k == SENTINEL) {
        return Err(FastError::InvalidInput(
            "sorted_keys must not contain i32::MAX, reserved as the internal sentinel"
                .to_string(),
        ));
    }
    Ok(())
}
