//! Layout geometry: tree depth, node counts, and the page-blocking depth.
//!
//! `Geometry::compute` is a pure function of `(n, page_size)`; the runtime
//! page-size query is isolated behind [`PageSizeSource`] so huge-page
//! environments (and arbitrary page sizes) can be exercised in tests without
//! touching the OS.

use crate::error::{FastError, Result};

/// SIMD-block depth: a complete 2-level subtree (root + 2 children).
pub const D_K: u32 = 2;
/// Keys per SIMD block (`2^D_K - 1`).
pub const N_K: usize = 3;

/// Cache-line-block depth: a complete 4-level subtree.
pub const D_L: u32 = 4;
/// Keys per cache-line block (`2^D_L - 1`).
pub const N_L: usize = 15;

/// Sentinel value padding incomplete subtrees. Must not appear in input keys.
pub const SENTINEL: i32 = i32::MAX;

const DEFAULT_PAGE_SIZE: usize = 4096;
const HUGE_PAGE_THRESHOLD: usize = 2 * 1024 * 1024;
/// Page-blocking depth used whenever the reported page size is a huge page.
const HUGE_PAGE_DEPTH: u32 = 19;

/// Source of the runtime page size used to derive the page-blocking depth.
///
/// Production code uses [`SystemPageSize`]; tests inject fixed or huge-page
/// sizes directly via [`Geometry::from_page_size`] instead of implementing
/// this trait, but the trait exists so a hosting process can plug in its own
/// page-size policy (e.g. a process that always maps huge pages).
pub trait PageSizeSource {
    fn page_size(&self) -> usize;
}

/// Queries the operating system's page size via `sysconf`, falling back to
/// 4 KiB if the query fails or the platform has no such concept.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPageSize;

impl PageSizeSource for SystemPageSize {
    #[cfg(unix)]
    fn page_size(&self) -> usize {
        let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if ps > 0 {
            ps as usize
        } else {
            DEFAULT_PAGE_SIZE
        }
    }

    #[cfg(not(unix))]
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }
}

/// Geometry of the implicit complete binary tree and its blocked layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Tree depth: `ceil(log2(n+1))`.
    pub d_n: u32,
    /// Total padded node count, `2^d_n - 1`.
    pub tree_nodes: usize,
    /// Page-blocking depth derived from the page size.
    pub d_p: u32,
    /// Keys per page block, `2^d_p - 1`.
    pub n_p: usize,
    /// Page size this geometry was derived from.
    pub page_size: usize,
}

impl Geometry {
    /// Compute geometry for `n` keys given an explicit page size.
    ///
    /// `page_size` of zero is treated as "no page-scale alignment available"
    /// and collapses to cache-line-only blocking (`d_p` degenerates to the
    /// smallest legal depth).
    pub fn from_page_size(n: usize, page_size: usize) -> Result<Self> {
        if n == 0 {
            return Err(FastError::InvalidInput("n must be >= 1".to_string()));
        }
        let d_n = depth_for_count(n);
        let tree_nodes = node_count(d_n);
        let d_p = page_block_depth(page_size);
        let n_p = node_count(d_p);
        Ok(Geometry {
            d_n,
            tree_nodes,
            d_p,
            n_p,
            page_size,
        })
    }

    /// Compute geometry for `n` keys, querying the page size from `source`.
    pub fn from_source<S: PageSizeSource>(n: usize, source: &S) -> Result<Self> {
        Self::from_page_size(n, source.page_size())
    }

    /// Block depths at each blocking granularity: `[SIMD, cache-line, page]`.
    pub(crate) fn depths(&self) -> [u32; 3] {
        [D_K, D_L, self.d_p]
    }

    /// The coarsest blocking granularity the whole tree needs: 0 (SIMD-only)
    /// when it fits in a single SIMD block's depth, 1 (cache-line) when it
    /// fits in a cache-line block, 2 (page) otherwise.
    pub(crate) fn blocking_level(&self) -> u32 {
        if self.d_n <= D_K {
            0
        } else if self.d_n <= D_L {
            1
        } else {
            2
        }
    }
}

/// Smallest `d` with `2^d - 1 >= n`.
fn depth_for_count(n: usize) -> u32 {
    let mut d = 0u32;
    let mut tmp: u128 = 1;
    while tmp - 1 < n as u128 {
        d += 1;
        tmp <<= 1;
    }
    d
}

fn node_count(d: u32) -> usize {
    (1usize << d) - 1
}

/// Largest `d` with `(2^d - 1) * 4 <= page_size`, pinned to 19 for huge
/// pages regardless of the exact huge-page size reported, and clamped up to
/// `D_L` for a page size too small to hold even one cache-line block (which
/// includes `page_size == 0`, "no page-scale alignment available").
fn page_block_depth(page_size: usize) -> u32 {
    if page_size >= HUGE_PAGE_THRESHOLD {
        return HUGE_PAGE_DEPTH;
    }
    let max_nodes = page_size / 4;
    let mut d = 1u32;
    while ((1usize << (d + 1)) - 1) <= max_nodes {
        d += 1;
    }
    d.max(D_L)
}
