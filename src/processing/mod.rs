mod optimizer;
mod validation;

pub use optimizer::{ReceiptOptimizer, cleanup};
pub use validation::{ValidationReport, validate_source};
