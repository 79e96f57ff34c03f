mod boundary;
mod chunker;
mod detect;
mod driver;
mod error;
mod index_builder;
mod indexer;
mod lexer;
mod merge;
mod mover;
mod queue;
mod record;
mod symbols;

pub use driver::{CancelToken, ImportConfig, Importer, Stats};
pub use error::{AtomicityPolicy, ImportError, Phase, Result};

pub use detect::{DetectResult, DetectedColumn, FieldValue};
pub use lexer::detect_delimiter;
pub use mover::TargetOrigin;
