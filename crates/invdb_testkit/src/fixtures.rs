//! Test fixtures and store helpers.
//!
//! Provides convenience functions for opening engines on temporary files
//! and seeding common scenarios.

use crate::models::{sample_model, Child, Host, Item, Leaf, Parent, Vm, VmSpec};
use invdb_core::{Config, DataModel, Engine, StoreError};
use std::path::PathBuf;
use tempfile::TempDir;

/// An engine on a temporary database file, removed on drop.
pub struct TestStore {
    /// The engine.
    pub engine: Engine,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestStore {
    /// Opens the sample model with default settings.
    pub fn new() -> Self {
        Self::with_model(sample_model())
    }

    /// Opens `model` with default settings.
    pub fn with_model(model: DataModel) -> Self {
        Self::with_config(model, |config| config)
    }

    /// Opens `model`, letting `configure` adjust the settings.
    pub fn with_config(model: DataModel, configure: impl FnOnce(Config) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(Config::new()).path(temp_dir.path().join("inventory.db"));
        let engine = Engine::open(config, model).expect("Failed to open engine");
        Self { engine, temp_dir }
    }

    /// Path of the database file.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("inventory.db")
    }

    /// Closes the engine and opens a fresh one on the same file.
    pub fn reopen(&mut self, model: DataModel) {
        self.engine.close(false).expect("Failed to close engine");
        self.engine =
            Engine::open(Config::new().path(self.path()), model).expect("Failed to reopen engine");
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        let _ = self.engine.close(false);
    }
}

/// Runs a test against a temporary store holding the sample model.
///
/// # Example
///
/// ```rust,ignore
/// use invdb_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store.insert(&mut Item::new(1, "alpha")).unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let store = TestStore::new();
    f(&store.engine)
}

/// Scenario seeding helpers.
pub mod scenarios {
    use super::*;

    /// Inserts items `1..=count` named `item-<id>`.
    pub fn seed_items(engine: &Engine, count: i64) -> Vec<Item> {
        engine
            .with(&["seed"], |tx| {
                (1..=count)
                    .map(|id| {
                        let mut item = Item::new(id, &format!("item-{id}"));
                        tx.insert(&mut item)?;
                        Ok(item)
                    })
                    .collect::<Result<Vec<_>, StoreError>>()
            })
            .expect("Failed to seed items")
    }

    /// Inserts one parent with `children` children, each with `leaves` leaves.
    ///
    /// Child ids are `parent * 100 + n`; leaf ids are `child * 100 + n`.
    pub fn seed_family(engine: &Engine, parent: i64, children: i64, leaves: i64) {
        engine
            .with(&["seed"], |tx| {
                tx.insert(&mut Parent::new(parent))?;
                for c in 1..=children {
                    let child = parent * 100 + c;
                    tx.insert(&mut Child::new(child, parent))?;
                    for l in 1..=leaves {
                        tx.insert(&mut Leaf::new(child * 100 + l, child))?;
                    }
                }
                Ok::<_, StoreError>(())
            })
            .expect("Failed to seed family");
    }

    /// Inserts `hosts` hosts in cluster `c1`, each running `vms` VMs.
    pub fn seed_datacenter(engine: &Engine, hosts: usize, vms: usize) {
        engine
            .with(&["seed"], |tx| {
                for h in 0..hosts {
                    let id = format!("host-{h}");
                    tx.insert(&mut Host::new(&id, "c1", 8))?;
                    for v in 0..vms {
                        let spec = VmSpec {
                            cpus: 2,
                            memory_mb: 2048,
                            disks: vec![format!("disk-{v}")],
                        };
                        tx.insert(&mut Vm::new(&id, &format!("vm-{v}"), spec))?;
                    }
                }
                Ok::<_, StoreError>(())
            })
            .expect("Failed to seed datacenter");
    }
}
