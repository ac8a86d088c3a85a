//! Property and fuzz tests for [`fasttree::FastIndex`].
//!
//! Runs randomized query workloads over randomly generated sorted key sets
//! and verifies:
//! - Every `search` result matches a naive linear predecessor scan
//! - `lower_bound` matches a naive linear scan
//! - Results are consistent whether or not duplicate keys are present
//! - Geometry injected via a fixed or huge page size produces the same
//!   answers as the default, OS-reported page size
use fasttree::{FastIndex, PageSizeSource};

/// Simple deterministic PRNG (xorshift64) for reproducible tests without
/// requiring an external RNG crate.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
    fn next_range(&mut self, max: u64) -> u64 {
        self.next() % max
    }
}

fn naive_predecessor(keys: &[i32], query: i32) -> Option<usize> {
    keys.iter().rposition(|&k| k <= query)
}

struct FixedPageSize(usize);
impl PageSizeSource for FixedPageSize {
    fn page_size(&self) -> usize {
        self.0
    }
}

fn random_sorted_keys(rng: &mut Rng, n: usize, spread: i64) -> Vec<i32> {
    let mut keys: Vec<i32> = (0..n)
        .map(|_| (rng.next_range(spread as u64) as i64 - spread / 2) as i32)
        .collect();
    keys.sort_unstable();
    keys
}

#[test]
fn random_workloads_match_naive_predecessor() {
    let mut rng = Rng::new(0xC0FFEE_u64);

    for trial in 0..40 {
        let n = 1 + rng.next_range(3000) as usize;
        let keys = random_sorted_keys(&mut rng, n, 1_000_000);
        let idx = FastIndex::create(&keys).unwrap();

        for _ in 0..200 {
            let query = (rng.next_range(1_000_200) as i64 - 100) as i32;
            let expected = naive_predecessor(&keys, query);
            let actual = idx.search(query);
            assert_eq!(
                actual, expected,
                "trial {trial}: search({query}) over {} keys",
                keys.len()
            );
        }
    }
}

#[test]
fn random_workloads_match_naive_lower_bound() {
    let mut rng = Rng::new(0xDEADBEEF_u64);

    for trial in 0..40 {
        let n = 1 + rng.next_range(3000) as usize;
        let keys = random_sorted_keys(&mut rng, n, 1_000_000);
        let idx = FastIndex::create(&keys).unwrap();

        for _ in 0..200 {
            let query = (rng.next_range(1_000_200) as i64 - 100) as i32;
            let expected = keys.partition_point(|&k| k < query);
            let actual = idx.lower_bound(query);
            assert_eq!(
                actual, expected,
                "trial {trial}: lower_bound({query}) over {} keys",
                keys.len()
            );
        }
    }
}

#[test]
fn dense_duplicate_runs_resolve_to_last_occurrence() {
    let mut rng = Rng::new(0x5EED);

    for _ in 0..20 {
        let distinct = 1 + rng.next_range(200) as usize;
        let mut keys = Vec::new();
        for v in 0..distinct {
            let run = 1 + rng.next_range(8) as usize;
            keys.extend(std::iter::repeat(v as i32 * 3).take(run));
        }
        let idx = FastIndex::create(&keys).unwrap();

        for _ in 0..100 {
            let query = (rng.next_range(distinct as u64 * 3 + 10) as i32) - 5;
            let expected = naive_predecessor(&keys, query);
            assert_eq!(idx.search(query), expected, "query={query} keys={keys:?}");
        }
    }
}

#[test]
fn huge_page_geometry_matches_default_geometry() {
    let mut rng = Rng::new(0x1357_9BDF);

    for _ in 0..10 {
        let n = 1 + rng.next_range(5000) as usize;
        let keys = random_sorted_keys(&mut rng, n, 2_000_000);

        let default_idx = FastIndex::create(&keys).unwrap();
        let huge_idx =
            FastIndex::create_with_page_size(&keys, &FixedPageSize(2 * 1024 * 1024)).unwrap();
        let tiny_idx = FastIndex::create_with_page_size(&keys, &FixedPageSize(64)).unwrap();

        for _ in 0..150 {
            let query = (rng.next_range(2_000_200) as i64 - 100) as i32;
            let expected = naive_predecessor(&keys, query);
            assert_eq!(default_idx.search(query), expected);
            assert_eq!(huge_idx.search(query), expected);
            assert_eq!(tiny_idx.search(query), expected);
        }
    }
}
