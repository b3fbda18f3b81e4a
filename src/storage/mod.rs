//! Byte-level storage for the embedded engine.
//!
//! `engine` defines the key/value interface, `memory` and `disk` implement it,
//! `mvcc` layers versioned transactions on top and `keycode` provides the
//! order-preserving key encoding both layers rely on.

pub mod disk;
pub mod engine;
pub mod keycode;
pub mod memory;
pub mod mvcc;
