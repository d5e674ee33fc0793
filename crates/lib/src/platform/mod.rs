//! Host-specific locations.

pub mod paths;
