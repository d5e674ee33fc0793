//! Shared utilities: content hashing and filesystem helpers.

pub mod fs;
pub mod hash;
