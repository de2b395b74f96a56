pub mod pipeline;
pub mod signature;
pub mod validation;

pub use pipeline::{IngestOutcome, IngestionPipeline};
