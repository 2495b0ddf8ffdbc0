#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod content_client;
pub mod orchestrator;
pub mod reporter;

pub use content_client::{ContentClient, GenerationFailure, OpenAiContentClient};
pub use orchestrator::{BulkJobOrchestrator, OrchestratorTuning, StartJobRequest};
pub use reporter::ProgressReporter;
