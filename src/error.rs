//! Error types for the store, the loaders and the bootstrap pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::bootstrap::Stage;

/// Failures reported by a document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("[{operation}] store unavailable: {detail}")]
    Unavailable { operation: String, detail: String },

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an unavailable error from any transport or protocol failure.
    pub fn unavailable<E: std::fmt::Display>(operation: &str, err: E) -> Self {
        Self::Unavailable {
            operation: operation.to_string(),
            detail: err.to_string(),
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// Stable failure kind, suitable for log fields and exit reporting.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "store-unavailable",
            Self::DocumentNotFound { .. } => "document-not-found",
            Self::Serialization(_) => "serialization-error",
        }
    }
}

/// Failures while streaming a source file into the store.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open source file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {} at line {line}: {source}", .path.display())]
    Read {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("{} line {line}: expected {expected} fields, found {found}", .path.display())]
    MissingFields {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{} line {line}: empty id", .path.display())]
    EmptyId { path: PathBuf, line: u64 },

    #[error("{} line {line}: id {id:?} cannot be used as a document id", .path.display())]
    UnaddressableId { path: PathBuf, line: u64, id: String },

    #[error("Source reader for {} stopped unexpectedly", .path.display())]
    ReaderStopped { path: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoadError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store(e) => e.kind(),
            _ => "source-read-error",
        }
    }
}

/// A failure that halted the bootstrap, tagged with the stage it happened in.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("[{stage}] {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("[{stage}] {source}")]
    Load {
        stage: Stage,
        #[source]
        source: LoadError,
    },
}

impl BootstrapError {
    pub const fn store(stage: Stage, source: StoreError) -> Self {
        Self::Store { stage, source }
    }

    pub const fn load(stage: Stage, source: LoadError) -> Self {
        Self::Load { stage, source }
    }

    pub const fn stage(&self) -> Stage {
        match self {
            Self::Store { stage, .. } | Self::Load { stage, .. } => *stage,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store { source, .. } => source.kind(),
            Self::Load { source, .. } => source.kind(),
        }
    }
}
