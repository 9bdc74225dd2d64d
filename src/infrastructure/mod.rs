//! Infrastructure adapters: configuration, logging, the planning service
//! client, and artifact storage backends.

pub mod config;
pub mod logging;
pub mod planning_api;
pub mod storage;

pub use config::ConfigLoader;
pub use planning_api::PlanningApiClient;
pub use storage::{LocalStorage, MemoryStorage, ObjectStorage};
