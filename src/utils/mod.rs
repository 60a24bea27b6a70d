pub mod error;
pub mod fs;
pub mod ids;

pub use error::{ErrorCode, ErrorDetails, PipelineError, PipelineResult, ValidationError};
pub use ids::CorrelationId;
