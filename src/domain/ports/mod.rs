//! Outbound ports: the traits infrastructure adapters implement.

pub mod document_store;
pub mod proposer;
pub mod storage;
pub mod validation_service;

pub use document_store::{DocumentStore, UploadAck};
pub use proposer::{ProposalRequest, Proposer, RevisionRequest};
pub use storage::ArtifactStorage;
pub use validation_service::ValidationService;
