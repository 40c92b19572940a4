//! Pure Rust implementation of a graph-based neural dependency parser
//!
//! This library provides both training and prediction. A sentence and its
//! part-of-speech tags are embedded, encoded with a multi-layer
//! bidirectional LSTM, every head-modifier pair is scored with a small
//! feed-forward network and the highest-scoring dependency tree is decoded
//! with the Chu-Liu-Edmonds algorithm.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use bist::train::Trainer;
//!
//! let mut trainer = Trainer::sgd().with_learning_rate(0.01)?.with_shuffle_seed(1);
//! trainer.verbose(true);
//!
//! let words = ["the", "dog", "barks"];
//! let tags = ["DT", "NN", "VB"];
//! let heads = [2, 3, 0];
//! trainer.append(&words, &tags, &heads)?;
//!
//! let parser = trainer.train()?;
//! parser.save("model.bdep")?;
//! # Ok::<(), bist::Error>(())
//! ```
//!
//! ## Prediction
//!
//! ```no_run
//! use bist::Model;
//!
//! let model = Model::load("model.bdep")?;
//! let parser = model.into_parser()?;
//!
//! let words = ["the", "dog", "barks"];
//! let tags = ["DT", "NN", "VB"];
//! let heads = parser.parse_tokens(&words, &tags)?;
//! # Ok::<(), bist::Error>(())
//! ```

mod dataset;
mod decoder;
mod embed;
mod error;
mod loss;
mod lstm;
mod model;
mod parser;
mod scorer;
mod vocab;

/// Training module containing all components for training parser models
pub mod train;

// Re-export main types
pub use self::dataset::Instance;
pub use self::decoder::maximum_spanning_tree;
pub use self::error::{Error, Result};
pub use self::model::Model;
pub use self::parser::{ForwardTrace, Parser, ParserConfig, ParserParams, TrainOutput};
pub use self::vocab::{Dictionary, Vocabulary, ROOT_ID, ROOT_TOKEN, UNKNOWN_ID, UNKNOWN_TOKEN};

// Re-export training types for convenience
pub use self::train::{unlabeled_attachment_score, Trainer};
