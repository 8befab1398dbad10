//! Benchmark utilities.

use invdb_core::{labels, Labels};
use invdb_testkit::{Item, Tagged};
use rand::seq::SliceRandom;
use rand::Rng;

/// Random lowercase name of `len` characters.
pub fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Items `first..first + count` with random names.
pub fn generate_items(first: i64, count: usize) -> Vec<Item> {
    (0..count as i64)
        .map(|n| Item::new(first + n, &random_name(12)))
        .collect()
}

/// Random labels over a small vocabulary.
pub fn random_labels() -> Labels {
    let mut rng = rand::thread_rng();
    let role = ["web", "db", "cache"].choose(&mut rng).copied().unwrap_or("web");
    let env = ["prod", "dev"].choose(&mut rng).copied().unwrap_or("dev");
    labels(&[("role", role), ("env", env)])
}

/// Tagged rows `1..=count` with random labels.
pub fn generate_tagged(count: usize) -> Vec<Tagged> {
    (1..=count as i64)
        .map(|id| Tagged::new(id, &random_name(8), random_labels()))
        .collect()
}
