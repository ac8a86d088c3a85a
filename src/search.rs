//! Tree traversal and leaf resolution.
//!
//! The traversal descends the hierarchically blocked layout using the same
//! recursive decomposition [`crate::build`] used to write it: a block's top
//! `depths[level]` levels are consumed (possibly by recursing one level
//! finer, when that block is itself sub-blocked), which yields a rank
//! (0..2^depth) used to jump straight to the right child block with fixed
//! arithmetic -- no pointer chasing. Once the whole tree's depth is
//! consumed, the stored rank map resolves the landing block directly to a
//! sorted-array index, with a short bounded scan to correct the at-most-a-
//! few-off error inherent to the block-granularity comparison.

use crate::geometry::Geometry;

/// Branch-free map from a 3-bit `movemask` result (bit 0: `query > root`,
/// bit 1: `query > left`, bit 2: `query > right`; lane 3, the next block
/// over, is masked off before lookup) to the 0..=3 child index. `left <
/// root < right` within a block, so only 4 of the 8 masks are reachable:
/// `000` (query <= left), `010` (left < query <= root), `011` (root <
/// query <= right), `111` (right < query). The other 4 masks can't occur
/// and are never read.
const FAST_LOOKUP: [i8; 8] = [0, 0, 1, 2, 0, 0, 0, 3];

fn block_size(depth: u32) -> usize {
    (1usize << depth) - 1
}

/// Find the predecessor of `query` in `sorted_keys`: the largest index `i`
/// with `sorted_keys[i] <= query`, or `None` if `query` is smaller than
/// every key. `layout`/`rank` are the blocked buffers from [`crate::build`].
pub(crate) fn predecessor(
    sorted_keys: &[i32],
    layout: &[i32],
    rank: &[i32],
    geometry: &Geometry,
    query: i32,
) -> Option<usize> {
    if sorted_keys.is_empty() {
        return None;
    }
    if query < sorted_keys[0] {
        return None;
    }
    if query >= *sorted_keys.last().unwrap() {
        return Some(sorted_keys.len() - 1);
    }
    if geometry.d_n == 0 {
        return None;
    }

    let depths = geometry.depths();
    let blocking_level = geometry.blocking_level();
    let (leaf, _rank) = walk(layout, 0, geometry.d_n, blocking_level, &depths, query);
    resolve_leaf(sorted_keys, rank, query, leaf)
}

/// Result of a single flat-block (or single-key) comparison step.
struct LeafStep {
    offset: usize,
    child_index: i32,
    is_single: bool,
}

/// Walk `depth` levels from `base_offset`, mirroring [`crate::build::build_layout`]'s
/// own recursive block structure exactly: at the SIMD level (`blocking_level
/// == 0`) the layout is nothing but nested 3-key blocks, which
/// [`traverse_flat`] reads directly; at a coarser level, the top
/// `depths[blocking_level]` levels were written by recursing one level
/// finer (possibly producing a deeply nested SIMD chain, not a single flat
/// block), and anything deeper than that lives in one of `2^actual_depth`
/// sibling blocks placed back-to-back immediately after it.
///
/// Returns the terminal [`LeafStep`] (for leaf resolution) and the full
/// `0..2^depth` rank among this block's real keys (for an enclosing call
/// addressing its own children).
fn walk(
    layout: &[i32],
    base_offset: usize,
    depth: u32,
    blocking_level: u32,
    depths: &[u32; 3],
    query: i32,
) -> (LeafStep, i64) {
    if blocking_level == 0 {
        return traverse_flat(layout, base_offset, depth, query);
    }

    let this_depth = depths[blocking_level as usize];
    let actual_depth = depth.min(this_depth);

    let (top_step, top_rank) = walk(layout, base_offset, actual_depth, blocking_level - 1, depths, query);

    if depth > actual_depth {
        let remaining = depth - actual_depth;
        let new_base = base_offset + block_size(actual_depth) + top_rank as usize * block_size(remaining);
        let (sub_step, sub_rank) = walk(layout, new_base, remaining, blocking_level, depths, query);
        (sub_step, top_rank * (1i64 << remaining) + sub_rank)
    } else {
        (top_step, top_rank)
    }
}

/// Descend a flat (physically contiguous BFS-order) complete binary block
/// of `depth` levels rooted at `base_offset`, two levels at a time via a
/// single SIMD/scalar compare, chaining to the next pair of levels with
/// the fixed `offset + N_K + child_index * child_subtree_size` jump. This
/// is the "all SIMD blocking" case and is also how the innermost levels of
/// any larger cache-line/page block are addressed. Returns both the
/// terminal step (for leaf resolution) and the full 0..2^depth rank
/// (for an enclosing call to address its own children).
fn traverse_flat(layout: &[i32], base_offset: usize, depth: u32, query: i32) -> (LeafStep, i64) {
    let mut offset = base_offset;
    let mut remaining = depth;
    let mut acc: i64 = 0;

    loop {
        if remaining == 1 {
            let key = layout[offset];
            let child_index = if query > key { 1 } else { 0 };
            acc = acc * 2 + child_index as i64;
            return (
                LeafStep {
                    offset,
                    child_index,
                    is_single: true,
                },
                acc,
            );
        }

        let child_index = compare_block2(layout, offset, query);
        acc = acc * 4 + child_index as i64;
        remaining -= 2;

        if remaining == 0 {
            return (
                LeafStep {
                    offset,
                    child_index,
                    is_single: false,
                },
                acc,
            );
        }

        let child_subtree_size = block_size(remaining);
        offset += crate::geometry::N_K + child_index as usize * child_subtree_size;
    }
}

/// Compare a 3-key SIMD block (root + 2 children, BFS order) against
/// `query`, returning the 0..=3 child index.
fn compare_block2(layout: &[i32], offset: usize, query: i32) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        // Safety: every block is within `layout`'s allocated length plus its
        // guaranteed 16 bytes of trailing padding, so the unaligned 128-bit
        // load never reads past the allocation even for the last block.
        use std::arch::x86_64::*;
        unsafe {
            let needle = _mm_set1_epi32(query);
            let block_ptr = layout.as_ptr().add(offset) as *const __m128i;
            let block = _mm_loadu_si128(block_ptr);
            // `query > block[lane]`, one bit per lane. The 4th lane is the
            // next block over (or trailing padding at the last leaf), not
            // part of this 3-key block, so it's masked off before lookup
            // rather than folded into the popcount.
            let cmp = _mm_cmpgt_epi32(needle, block);
            let mask = _mm_movemask_ps(_mm_castsi128_ps(cmp)) as usize;
            FAST_LOOKUP[mask & 0x7] as i32
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let root = layout[offset];
        let left = layout[offset + 1];
        let right = layout[offset + 2];
        if query <= root {
            if query <= left {
                0
            } else {
                1
            }
        } else if query <= right {
            2
        } else {
            3
        }
    }
}

/// Recover the predecessor index from the block the traversal landed on,
/// mirroring the original algorithm's `resolve_simd_leaf`/
/// `resolve_single_leaf`: the rank map gives an approximate starting index
/// directly (no further search over the tree), and a short forward scan
/// (bounded by the block width) corrects it to the exact predecessor.
fn resolve_leaf(sorted_keys: &[i32], rank: &[i32], query: i32, leaf: LeafStep) -> Option<usize> {
    let n = sorted_keys.len() as i64;
    let LeafStep {
        offset,
        child_index,
        is_single,
    } = leaf;

    let mut lo: i64 = if is_single {
        if child_index == 0 {
            rank[offset] as i64 - 1
        } else {
            rank[offset] as i64
        }
    } else {
        match child_index {
            0 => rank[offset + 1] as i64 - 1,
            1 => rank[offset + 1] as i64,
            2 => rank[offset] as i64,
            _ => rank[offset + 2] as i64,
        }
    };

    if lo < -1 {
        lo = -1;
    }
    if lo >= n {
        lo = n - 1;
    }

    let scan_budget = if is_single { 2 } else { 3 };
    for _ in 0..scan_budget {
        if lo + 1 < n && sorted_keys[(lo + 1) as usize] <= query {
            lo += 1;
        } else {
            break;
        }
    }

    if lo < 0 {
        None
    } else {
        Some(lo as usize)
    }
}

/// Index of the first key `>= query`, or `sorted_keys.len()` if none exists.
/// This is a plain binary search: lower-bound resolution does not benefit
/// from the blocked layout since it targets an exact boundary rather than
/// a predecessor.
pub(crate) fn lower_bound(sorted_keys: &[i32], query: i32) -> usize {
    sorted_keys.partition_point(|&k| k < query)
}
