//! Randomized reviewer selection.
//!
//! All selection is uniform over the eligible pool and never repeats a
//! candidate. The functions take the random source as a parameter so tests
//! can drive them with a seeded generator; the engine passes `rand::rng()`.

use std::collections::HashSet;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::model::{User, UserId};

/// Most reviewers a pull request is ever created with.
pub const MAX_REVIEWERS: usize = 2;

/// Build the candidate pool from directory users.
///
/// Keeps active users whose id is not in `excluded`, dropping repeated ids
/// while preserving the directory's order.
pub fn candidate_pool(users: &[User], excluded: &HashSet<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(users.len());
    users
        .iter()
        .filter(|u| u.is_active && !excluded.contains(&u.id))
        .filter(|u| seen.insert(u.id.clone()))
        .map(|u| u.id.clone())
        .collect()
}

/// Choose up to `max` distinct reviewers from `pool`.
///
/// Shuffles a copy of the pool and takes a prefix, so every subset of the
/// resulting size is equally likely.
pub fn select_reviewers<R: Rng + ?Sized>(pool: &[UserId], max: usize, rng: &mut R) -> Vec<UserId> {
    let count = max.min(pool.len());
    if count == 0 {
        return Vec::new();
    }

    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate(count);
    shuffled
}

/// Choose a single replacement reviewer, or `None` if the pool is empty.
pub fn select_replacement<R: Rng + ?Sized>(pool: &[UserId], rng: &mut R) -> Option<UserId> {
    pool.choose(rng).cloned()
}
