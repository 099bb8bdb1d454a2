//! Built-in command handlers.

pub mod pipeline;
pub mod query;

pub use pipeline::{PipelineStartHandler, PIPELINE_START};
pub use query::{QueryByRagHandler, QUERY_BY_RAG};
