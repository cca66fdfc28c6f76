//! Memory service (C9): the high-level store/retrieve/list/update/delete
//! surface, plus its two small durable side-stores.
//!
//! [`active_project`] and [`relationships`] are leaf, store-free-of-each-
//! other pieces; [`service`] is the orchestrator that wires them, C3, C5,
//! and C8 together.

pub mod active_project;
pub mod relationships;
pub mod service;

pub use active_project::ActiveProjectStore;
pub use relationships::RelationshipStore;
pub use service::{MemoryPatch, MemoryService, ProjectStats, StoreRequest};
