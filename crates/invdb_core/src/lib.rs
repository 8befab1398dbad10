//! # invdb Core
//!
//! Embedded typed inventory store.
//!
//! This crate provides:
//! - Declarative model definitions with role tags (`pk`, `fk(..)`, `incremented`, ...)
//! - DDL and parameterized DML synthesis for an embedded SQLite database (WAL)
//! - A single-writer / multi-reader session pool
//! - Transactional CRUD with optimistic revisions, labels and cascading deletes
//! - A predicate query layer with label matching, detail projection and paging
//! - A change journal delivering ordered events to watches (snapshot, then live)
//! - Path building and tree navigation over foreign-key links
//!
//! ## Example
//!
//! ```rust,ignore
//! use invdb_core::{Config, DataModel, Engine, ListOptions, predicate::eq};
//!
//! let model = DataModel::builder().with::<Item>().build()?;
//! let engine = Engine::open(Config::default().path("inventory.db"), model)?;
//!
//! let mut item = Item { id: 1, name: "alpha".into(), rev: 0 };
//! engine.insert(&mut item)?;
//! assert_eq!(item.rev, 1);
//!
//! let found: Vec<Item> = engine.list(&ListOptions::new().predicate(eq("name", "alpha")))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cascade;
mod config;
mod cursor;
mod engine;
mod error;
mod journal;
mod model;
mod path;
mod pool;
pub mod predicate;
mod row;
pub mod sql;
mod store;
mod transaction;
mod tree;
mod types;
mod value;

pub use cascade::{FkGraph, Relation};
pub use config::Config;
pub use cursor::Cursor;
pub use engine::Engine;
pub use error::{StoreError, StoreResult};
pub use journal::{Action, Event, EventHandler, LabelFilter, Watch, WatchOptions};
pub use model::{
    DataModel, DataModelBuilder, Definition, Field, FieldType, ForeignKey, Model, Schema,
    MAX_DETAIL,
};
pub use path::{PathBuilder, PathRule};
pub use pool::CancelToken;
pub use predicate::{FieldRef, ListOptions, Operand, Page, Predicate};
pub use row::{labels, Labels, Row};
pub use transaction::Tx;
pub use tree::{Navigator, Record, RelationNavigator, Tree, TreeNode};
pub use types::{SessionId, WatchId};
pub use value::{FromValue, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
