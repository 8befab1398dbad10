//! Stress helpers for concurrent access.
//!
//! These verify behavior with many readers running while the writer commits.

use crate::models::Item;
use invdb_core::{Engine, ListOptions, StoreError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressResult {
    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.successful_ops + self.failed_ops) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions committed by the writer.
    pub transactions: usize,
    /// Rows inserted per transaction.
    pub batch: usize,
    /// Concurrent reader threads.
    pub readers: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 50,
            batch: 10,
            readers: 4,
        }
    }
}

/// Commits batches of items while readers list them.
///
/// Readers must only ever see whole batches: every observed count is a
/// multiple of the batch size.
pub fn stress_readers_see_whole_batches(engine: &Engine, config: &StressConfig) -> StressResult {
    let start = Instant::now();
    let done = Arc::new(AtomicBool::new(false));
    let torn = Arc::new(AtomicUsize::new(0));
    let reads = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..config.readers)
        .map(|_| {
            let engine = engine.clone();
            let done = Arc::clone(&done);
            let torn = Arc::clone(&torn);
            let reads = Arc::clone(&reads);
            let batch = config.batch;
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let seen = engine
                        .list::<Item>(&ListOptions::new())
                        .expect("reader list failed")
                        .len();
                    if seen % batch != 0 {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                    reads.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let mut next_id = 1i64;
    for _ in 0..config.transactions {
        engine
            .with(&["stress"], |tx| {
                for _ in 0..config.batch {
                    tx.insert(&mut Item::new(next_id, "stress"))?;
                    next_id += 1;
                }
                Ok::<_, StoreError>(())
            })
            .expect("writer transaction failed");
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    StressResult {
        successful_ops: config.transactions + reads.load(Ordering::SeqCst),
        failed_ops: torn.load(Ordering::SeqCst),
        duration: start.elapsed(),
    }
}

/// Updates one item from several threads; each thread retries on conflict.
///
/// Returns the number of conflicts observed.
pub fn stress_conflicting_updates(engine: &Engine, threads: usize, updates: usize) -> usize {
    engine
        .insert(&mut Item::new(1, "contended"))
        .expect("seed insert failed");
    let conflicts = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..threads)
        .map(|t| {
            let engine = engine.clone();
            let conflicts = Arc::clone(&conflicts);
            thread::spawn(move || {
                for n in 0..updates {
                    loop {
                        let mut item = engine.get_pk::<Item>(1).expect("get failed");
                        item.name = format!("t{t}-{n}");
                        match engine.update(&mut item) {
                            Ok(()) => break,
                            Err(err) if err.is_conflict() => {
                                conflicts.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(err) => panic!("update failed: {err}"),
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }
    conflicts.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn readers_never_see_partial_transactions() {
        let store = TestStore::new();
        let config = StressConfig {
            transactions: 20,
            batch: 5,
            readers: 3,
        };
        let result = stress_readers_see_whole_batches(&store, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(store.count::<Item>(None).unwrap(), 100);
    }

    #[test]
    fn conflicting_updates_all_land() {
        let store = TestStore::new();
        stress_conflicting_updates(&store, 4, 10);
        let item = store.get_pk::<Item>(1).unwrap();
        assert_eq!(item.rev, 1 + 40);
    }
}
