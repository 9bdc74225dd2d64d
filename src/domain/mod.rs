//! Domain layer: models, errors, and outbound ports.

pub mod errors;
pub mod models;
pub mod ports;
