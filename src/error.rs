//! Error Types Module
//!
//! Typed errors raised by the detection pipeline.
//!
//! # Taxonomy
//! - `ConfigurationError`: bad thresholds, unsupported organism, missing input
//! - `DatabaseLoadError`: reference data missing or corrupt
//! - `AlignmentError`: external aligner failure or malformed query
//! - `UnknownVariantError`: uncatalogued allele (recorded on calls, never raised)
//!
//! Configuration and database errors abort a run before any alignment starts.
//! A single alignment error aborts the whole run.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Configuration Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{name} must be between 0 and 100, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(usize),

    #[error("no pointfinder database for organism '{organism}' (available: {})", available.join(", "))]
    UnsupportedOrganism {
        organism: String,
        available: Vec<String>,
    },

    #[error("must pass at least one fasta file to process")]
    MissingInput,

    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("genome identifier '{id}' is shared by more than one input file ({} and {})", first.display(), second.display())]
    DuplicateGenome {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
}

// ============================================================================
// Database Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum DatabaseLoadError {
    #[error("database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no reference sequences (*.fsa) in {}", .0.display())]
    Empty(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("no sequence file for cataloged gene '{gene}' in {}", dir.display())]
    MissingSequence { gene: String, dir: PathBuf },

    #[error("invalid database info {}: {source}", path.display())]
    Info {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Alignment Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("{0} not found in PATH. Please install it or add it to your PATH.")]
    EngineNotFound(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed (exit code: {code:?}) on {}: {stderr}", query.display())]
    EngineFailed {
        program: String,
        query: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("malformed aligner output: {0}")]
    MalformedOutput(String),
}

// ============================================================================
// Unknown Variants
// ============================================================================

/// An observed allele at a cataloged position that is neither the wild type
/// nor a known resistance allele.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allele '{observed}' at {reference_id}:{position} is not cataloged")]
pub struct UnknownVariantError {
    pub reference_id: String,
    pub position: usize,
    pub observed: String,
}

// ============================================================================
// Pipeline Error
// ============================================================================

/// Any error that aborts a detection run.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    DatabaseLoad(#[from] DatabaseLoadError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: crate::detection::DetectionState,
    },
}

pub type Result<T, E = DetectionError> = std::result::Result<T, E>;
