//! Internal utilities.
//!
//! Kept minimal and dependency-free so the deterministic lab reactor stays
//! deterministic.

pub mod arena;

pub use arena::{Arena, ArenaIndex};
