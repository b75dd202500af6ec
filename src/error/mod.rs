//! Provider error classification.
//!
//! Raw provider errors are matched against an ordered signal table and folded into
//! a closed taxonomy that the join workflow can branch on.

pub mod classification;
pub mod detector;

// Re-export main types for convenient access
pub use classification::{ClassifiedError, ErrorKind};
pub use detector::{ErrorClassifier, ErrorPattern};
