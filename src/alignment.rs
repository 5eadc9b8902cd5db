//! Alignment Module
//!
//! Wraps the external aligner behind the [`Aligner`] trait. The pipeline only
//! ever sees raw [`AlignmentHit`]s; thresholds are applied later.
//!
//! # minimap2 Invocation
//! ```text
//! minimap2 -c --cs=long -x asm20 -t 1 <reference.fsa> <genome.fasta>
//! ```
//! The reference database is the minimap2 target, so PAF target coordinates
//! are gene coordinates and the `cs` string is in gene orientation.

use log::debug;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::database::ReferenceDatabase;
use crate::error::AlignmentError;
use crate::paf::{decode_cs_long, GappedAlignment, PafReader, PafRecord};
use crate::seqio;

// ============================================================================
// Alignment Hit
// ============================================================================

/// One alignment between a genome contig and a reference sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHit {
    /// Contig identifier.
    pub query_id: String,
    pub query_len: usize,
    /// Reference sequence identifier.
    pub reference_id: String,
    pub reference_len: usize,
    /// Percent identity (0-100).
    pub pident: f64,
    /// Percent of the reference length covered (0-100).
    pub plength: f64,
    /// Query span, 0-based half-open.
    pub query_start: usize,
    pub query_end: usize,
    /// Reference span, 0-based half-open.
    pub reference_start: usize,
    pub reference_end: usize,
    pub strand: char,
    pub score: i64,
    /// Gapped rows in reference orientation, when the aligner reports them.
    pub alignment: Option<GappedAlignment>,
}

impl AlignmentHit {
    /// Builds a hit from a PAF record, decoding its `cs` tag if present.
    pub fn from_paf(record: PafRecord) -> Result<Self, AlignmentError> {
        let pident = record.calculate_identity();
        let plength = record.calculate_coverage();
        let alignment = record.cs.as_deref().map(decode_cs_long).transpose()?;

        if let Some(aln) = &alignment {
            let ref_bases = aln.reference.bytes().filter(|&b| b != b'-').count();
            if ref_bases != record.target_end - record.target_start {
                return Err(AlignmentError::MalformedOutput(format!(
                    "cs string of {} vs {} spans {} reference bases, expected {}",
                    record.query_name,
                    record.target_name,
                    ref_bases,
                    record.target_end - record.target_start
                )));
            }
        }

        Ok(Self {
            score: record.score.unwrap_or(record.matches as i64),
            query_id: record.query_name,
            query_len: record.query_len,
            reference_id: record.target_name,
            reference_len: record.target_len,
            pident,
            plength,
            query_start: record.query_start,
            query_end: record.query_end,
            reference_start: record.target_start,
            reference_end: record.target_end,
            strand: record.strand,
            alignment,
        })
    }

    /// Aligned reference span over total reference length, e.g. `861/861`.
    pub fn hsp_fraction(&self) -> String {
        format!("{}/{}", self.reference_end - self.reference_start, self.reference_len)
    }
}

// ============================================================================
// Aligner Trait
// ============================================================================

/// External alignment capability.
///
/// Implementations must be safe to call concurrently on disjoint
/// (query, database) pairs.
pub trait Aligner: Send + Sync {
    /// Aligns every sequence of `query` against `database`.
    ///
    /// Returns all reported alignments, unfiltered, in the engine's order.
    fn search(&self, query: &Path, database: &ReferenceDatabase) -> Result<Vec<AlignmentHit>, AlignmentError>;
}

impl<A: Aligner + ?Sized> Aligner for &A {
    fn search(&self, query: &Path, database: &ReferenceDatabase) -> Result<Vec<AlignmentHit>, AlignmentError> {
        (**self).search(query, database)
    }
}

impl<A: Aligner + ?Sized> Aligner for Box<A> {
    fn search(&self, query: &Path, database: &ReferenceDatabase) -> Result<Vec<AlignmentHit>, AlignmentError> {
        (**self).search(query, database)
    }
}

// ============================================================================
// minimap2
// ============================================================================

/// Runs minimap2 as a subprocess, one process per reference file.
#[derive(Debug, Clone)]
pub struct Minimap2Aligner {
    program: PathBuf,
    preset: String,
}

impl Minimap2Aligner {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            preset: "asm20".to_string(),
        }
    }

    /// Locates `minimap2` on `PATH`.
    pub fn locate() -> Result<Self, AlignmentError> {
        find_executable("minimap2").map(Self::new)
    }

    /// Overrides the minimap2 preset (`-x`).
    pub fn with_preset(mut self, preset: &str) -> Self {
        self.preset = preset.to_string();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, reference: &Path, query: &Path) -> Result<Vec<AlignmentHit>, AlignmentError> {
        let program = self.program.display().to_string();

        let output = Command::new(&self.program)
            .args(["-c", "--cs=long", "-x", &self.preset, "-t", "1"])
            .arg(reference)
            .arg(query)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| AlignmentError::Spawn { program: program.clone(), source })?;

        if !output.status.success() {
            return Err(AlignmentError::EngineFailed {
                program,
                query: query.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        PafReader::new(&output.stdout[..])
            .map(|record| record.and_then(AlignmentHit::from_paf))
            .collect()
    }
}

impl Aligner for Minimap2Aligner {
    fn search(&self, query: &Path, database: &ReferenceDatabase) -> Result<Vec<AlignmentHit>, AlignmentError> {
        seqio::validate_fasta(query)?;

        let mut hits = Vec::new();
        for reference in database.reference_files() {
            let file_hits = self.run(reference, query)?;
            debug!(
                "{} vs {}: {} alignments",
                query.display(),
                reference.display(),
                file_hits.len()
            );
            hits.extend(file_hits);
        }
        Ok(hits)
    }
}

/// Finds an executable by absolute path or on `PATH`.
pub fn find_executable(name: &str) -> Result<PathBuf, AlignmentError> {
    let path = Path::new(name);
    if path.is_absolute() && path.is_file() {
        return Ok(path.to_path_buf());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    Err(AlignmentError::EngineNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_from_paf() {
        let line = "contig_7\t5000\t100\t109\t+\tgyrA\t9\t0\t9\t8\t9\t60\tAS:i:14\tcs:Z:=ATG*ct=TTGGG";
        let hit = AlignmentHit::from_paf(PafRecord::parse_line(line).unwrap()).unwrap();

        assert_eq!(hit.query_id, "contig_7");
        assert_eq!(hit.reference_id, "gyrA");
        assert_eq!(hit.score, 14);
        assert!((hit.pident - 88.888).abs() < 0.01);
        assert_eq!(hit.plength, 100.0);
        assert_eq!(hit.hsp_fraction(), "9/9");

        let aln = hit.alignment.unwrap();
        assert_eq!(aln.reference, "ATGCTTGGG");
        assert_eq!(aln.query, "ATGTTTGGG");
    }

    #[test]
    fn test_score_falls_back_to_matches() {
        let line = "c\t50\t0\t10\t+\tr\t20\t5\t15\t9\t10\t60";
        let hit = AlignmentHit::from_paf(PafRecord::parse_line(line).unwrap()).unwrap();
        assert_eq!(hit.score, 9);
        assert_eq!(hit.plength, 50.0);
        assert!(hit.alignment.is_none());
    }

    #[test]
    fn test_cs_span_mismatch_rejected() {
        let line = "c\t50\t0\t10\t+\tr\t20\t0\t10\t3\t3\t60\tcs:Z:=ACG";
        let err = AlignmentHit::from_paf(PafRecord::parse_line(line).unwrap()).unwrap_err();
        assert!(matches!(err, AlignmentError::MalformedOutput(_)));
    }

    #[test]
    fn test_find_executable_missing() {
        assert!(matches!(
            find_executable("definitely-not-an-aligner-binary"),
            Err(AlignmentError::EngineNotFound(_))
        ));
    }
}
