//! Worker PRNG seeding.
//!
//! Each worker owns a `SmallRng` stream; no two workers may share one.
//! The per-worker seed mixes the run's base seed with the worker index
//! and a thread-id salt through a SplitMix64 finalizer, so streams stay
//! decorrelated even for adjacent seeds.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// SplitMix64 finalizer. Single multiply-xor-shift chain; enough to
/// whiten structured seed inputs like small consecutive integers.
#[inline]
pub fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed for worker `worker_id`, salted with the current thread's id.
pub fn worker_seed(base_seed: u64, worker_id: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    let salt = hasher.finish();
    splitmix64(base_seed ^ splitmix64(worker_id as u64 + 1) ^ salt.rotate_left(17))
}

/// Seed for worker `worker_id` without the thread salt. Used by the
/// single-threaded path where byte-identical reruns are required.
pub fn deterministic_worker_seed(base_seed: u64, worker_id: usize) -> u64 {
    splitmix64(base_seed ^ splitmix64(worker_id as u64 + 1))
}
