//! # invdb Testkit
//!
//! Test utilities for invdb.
//!
//! This crate provides:
//! - Temporary stores that clean up after themselves
//! - Sample models covering keys, links, labels and encoded fields
//! - A recording watch handler
//! - Property-based test generators using proptest
//! - Stress helpers for concurrent readers and writers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use invdb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         store.insert(&mut Item::new(1, "alpha")).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod handlers;
pub mod models;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::handlers::*;
    pub use crate::models::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use handlers::*;
pub use models::*;
pub use stress::*;
