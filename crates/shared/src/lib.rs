//! Shared utilities and common types for the volunteer reports backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Share token generation
//! - Secret hashing with Argon2id (share passwords)
//! - Page-based listing helpers

pub mod crypto;
pub mod pagination;
pub mod password;
