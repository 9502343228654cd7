//! Error types shared across the papercut pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::syntax::ParseError;

/// Errors raised while locating, rewriting, verifying and consolidating papercuts.
#[derive(Error, Debug)]
pub enum PapercutError {
    /// A piece of design structure the pipeline relies on is missing.
    #[error("structural element not found: {what}")]
    StructuralNotFound { what: String },

    /// Two rewrites claimed the same syntax node.
    #[error("conflicting rewrites at {location}: {first} and {second}")]
    ConflictingRewrite {
        location: String,
        first: String,
        second: String,
    },

    /// A site was located but cannot be rewritten.
    #[error("unsupported construct at {location}: {reason}")]
    UnsupportedConstruct { location: String, reason: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A site or rewrite was used with a tree other than the one it was located on.
    #[error("site belongs to a different syntax tree")]
    ForeignTree,

    #[error("branch {branch} is not valid for a {category} rewrite")]
    InvalidBranch { category: String, branch: String },

    #[error("run '{run}' already has an outcome")]
    OutcomeAlreadyRecorded { run: String },

    #[error("exhaustive enumeration over {sites} sites exceeds the limit of {limit}")]
    TooManyCombinations { sites: usize, limit: usize },

    #[error("text edits overlap at byte {offset}")]
    OverlappingEdits { offset: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PapercutError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::StructuralNotFound { what: what.into() }
    }

    pub fn unsupported(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PapercutError>;
