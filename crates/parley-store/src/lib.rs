//! # Parley Store
//!
//! Persistence boundary for channel state. The [`Store`] trait is the
//! only way the rest of the system touches canonical channel objects;
//! [`MemoryStore`] is the mandated in-process implementation.
//!
//! Everything handed out by a store is an owned deep copy. The store is
//! the single owner of canonical state; callers mutate by writing whole
//! entities back.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::Store;
