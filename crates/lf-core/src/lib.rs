//! lost-found/crates/lf-core/src/lib.rs
//!
//! The central domain types and interface definitions for the Lost & Found
//! board.

pub mod error;
pub mod listeners;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use listeners::*;
pub use models::*;
pub use traits::*;
