//! amrsearch - Antimicrobial Resistance Detection in Genome Assemblies
//!
//! Aligns assembled genomes against a ResFinder-style gene database and a
//! PointFinder-style point mutation database, then reports resistance genes,
//! resistance mutations and a per-genome summary.
//!
//! # Modules
//! - `config`: run parameters and database locations
//! - `error`: typed pipeline errors
//! - `seqio`: FASTA input with gzip support
//! - `paf`: PAF parsing and `cs` tag decoding
//! - `database`: common front for both reference database kinds
//! - `resfinder`: acquired resistance gene database
//! - `pointfinder`: per-organism point mutation catalog
//! - `alignment`: `Aligner` trait and the minimap2 implementation
//! - `filter`: identity and length overlap thresholds
//! - `mutation`: point mutation calling from gapped alignments
//! - `scheduler`: bounded fail-fast worker pool
//! - `detection`: run state machine and result assembly
//! - `report`: result table rows and TSV output

pub mod alignment;
pub mod config;
pub mod database;
pub mod detection;
pub mod error;
pub mod filter;
pub mod mutation;
pub mod paf;
pub mod pointfinder;
pub mod report;
pub mod resfinder;
pub mod scheduler;
pub mod seqio;

pub use alignment::{Aligner, AlignmentHit, Minimap2Aligner};
pub use config::{DatabaseLayout, DetectionConfig};
pub use database::{DatabaseKind, ReferenceDatabase};
pub use detection::{run_detection, Detection, DetectionResults, DetectionState, SampleResult};
pub use error::{AlignmentError, ConfigurationError, DatabaseLoadError, DetectionError};
