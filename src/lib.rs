//!
//! Scoped, hierarchical, graph-based authorization.
//!
//! Models subjects, groups, permissions, scopes and abilities as a labeled
//! directed graph and answers two questions over it: *is entity E allowed
//! permission P within scope S?* and *which permissions are allowed to E
//! within S?* The answer is decided by the shortest polarized path from the
//! subject to the permission under a scope filter, so closer links win:
//! direct entity links outrank group links, child-group links outrank
//! inherited parent-group links, and a nearby `DENY` overrides a farther
//! `ALLOW`.
//!
//! Mutators take `&mut PermGraph` and validate before touching the graph;
//! readers take `&self`. Rust's aliasing rules therefore give every
//! operation the single-writer / multi-reader snapshot discipline the engine
//! requires. Wrap the graph in an `RwLock` to share it across threads.
#![deny(missing_docs)]

pub mod error;
pub mod logging;
pub mod perm_graph;

pub use error::{AuthzError, Result};
pub use perm_graph::{PermGraph, Subject};
