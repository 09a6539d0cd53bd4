pub mod dead_letter;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod sampler;
pub mod shutdown;
pub mod sinks;

pub use pipeline::{ExportMode, ExportPipeline, PipelineConfig};
pub use sampler::Sampler;
