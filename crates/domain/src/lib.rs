//! Domain layer for the volunteer reports backend.
//!
//! This crate contains:
//! - Report models and the job lifecycle state machine
//! - Row adapters and export strategies
//! - Store and artifact storage abstractions
//! - The report error taxonomy

pub mod error;
pub mod models;
pub mod services;

pub use error::ReportError;
