// # Pending Store Implementations
//
// This module provides implementations of the PendingStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FilePendingStore;
pub use memory::MemoryPendingStore;
