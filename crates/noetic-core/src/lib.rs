//! ABOUTME: Shared types, error taxonomy, and envelope formats for the noetic kernel
//! ABOUTME: Every other crate in the workspace depends on this one and nothing else upstream

pub mod artifacts;
pub mod auto_wire;
pub mod collaborators;
pub mod envelope;
pub mod error;
pub mod ids;

pub use artifacts::{ArtifactEntry, ArtifactStore};
pub use auto_wire::{wire_missing_args, WiringMatch};
pub use collaborators::{AuditSink, Embedder, LlmCaller, NullAuditSink, Reranker, VectorStore};
pub use envelope::{EnvelopeMetadata, StderrBundle, StdioEnvelope, StdoutPayload, TaskFailure, Warning, WorkPackage};
pub use error::{ErrorKind, KernelError, Result};
pub use ids::CellId;
