//! Training module for parser models
//!
//! This module contains the components needed to train dependency parsers:
//! vocabulary collection over appended gold trees, the optimization loops
//! and model serialization.

pub(crate) mod model_writer;
mod trainer;

// Re-export public types
pub use self::trainer::{
    unlabeled_attachment_score, Adam, AdamParams, Sgd, SgdParams, Trainer, TrainingAlgorithm,
};
