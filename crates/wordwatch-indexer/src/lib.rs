//! Wordwatch Indexer
//!
//! This crate provides a live, incremental word index over watched files:
//! - Admission filtering of paths during the initial scan
//! - Content fingerprinting with deduplication of identical files
//! - A bidirectional word <-> fingerprint index
//! - An ordered change-event pipeline with deferred eviction of stale content
//! - Watch root management on top of filesystem notifications

pub mod clock;
pub mod config;
mod error;
pub mod filter;
pub mod fingerprint;
pub mod indexer;
pub mod manager;
pub mod scanner;
pub mod tokenizer;
pub mod watcher;
pub mod word_index;

pub use clock::Timestamp;
pub use config::{IndexerConfig, TokenizerKind};
pub use error::IndexerError;
pub use filter::{AdmissionFilter, AdmissionOptions, AdmissionPolicy};
pub use fingerprint::{ContentFingerprinter, Fingerprint, Sha256Fingerprinter};
pub use indexer::{
    ChangeEvent, ChangeKind, EventSink, FileChangeIndexer, IndexStats, IndexerOptions,
};
pub use manager::{WatchManager, WatchOutcome, WatchRejection};
pub use scanner::{InitialScan, ProgressSnapshot, ScanProgress, Walker};
pub use tokenizer::{DelimiterTokenizer, RegexTokenizer, Tokenizer};
pub use word_index::WordIndex;
