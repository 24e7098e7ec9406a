//! Persistence layer for the volunteer report engine.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL repositories implementing the domain store traits
//! - The in-memory store and the artifact storage backends

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;
pub mod storage;

pub use memory::InMemoryReportStore;
pub use storage::{InMemoryArtifactStorage, LocalArtifactStorage};
