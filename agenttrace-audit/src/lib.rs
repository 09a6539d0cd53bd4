pub mod batch;
pub mod canonical;
pub mod chain;
pub mod checkpoint;
pub mod dedup;
pub mod log;
pub mod merkle;
pub mod model;
pub mod storage;
pub mod verify;

pub use checkpoint::{NoTimestamper, Timestamper};
pub use log::{AuditLog, QueryFilter};
pub use merkle::{verify_proof, MerkleTree};
pub use model::{
    Action, Actor, ActorType, AuditEvent, AuditEventDraft, Checkpoint, Classification, Direction,
    EventCategory, MerkleProof, Resource, Severity, TimestampToken, VerifyChainReport,
};
pub use storage::{AuditStorage, LocalAuditStorage, ObjectStoreAuditStorage};
