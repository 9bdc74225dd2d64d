//! Artifact storage backends.

pub mod local;
pub mod memory;
pub mod object;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use object::ObjectStorage;
