//! Traits and definitions shared by the GPU staging crates.
//!
//! # Modules
//!
//! - [`memory_owner`]: Describing aligned host memory that a GPU API may read
//!   in place, without knowing the concrete owner type.

pub mod memory_owner;
