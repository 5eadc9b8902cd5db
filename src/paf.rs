//! PAF (Pairwise mApping Format) Parser Module
//!
//! Parses minimap2 PAF output, including the optional `AS:i` alignment score
//! and the long-form `cs:Z` difference string.
//!
//! # PAF Format (12 mandatory columns)
//! ```text
//! Col  Type    Description
//! 1    string  Query sequence name
//! 2    int     Query sequence length
//! 3    int     Query start (0-based)
//! 4    int     Query end
//! 5    char    Relative strand: '+' or '-'
//! 6    string  Target sequence name
//! 7    int     Target sequence length
//! 8    int     Target start
//! 9    int     Target end
//! 10   int     Number of matching bases
//! 11   int     Alignment block length
//! 12   int     Mapping quality (0-255; 255 for missing)
//! 13+  tags    SAM-like TAG:TYPE:VALUE fields
//! ```
//!
//! # Long cs Strings
//! `--cs=long` encodes the alignment in target forward orientation:
//! `=ACGT` identical bases, `*ag` substitution (target a, query g),
//! `+ac` insertion in the query, `-ac` deletion from the query.
//! [`decode_cs_long`] turns this into two gapped rows.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::AlignmentError;

// ============================================================================
// PAF Record
// ============================================================================

/// A single PAF alignment record.
#[derive(Debug, Clone)]
pub struct PafRecord {
    /// Query sequence name (column 1).
    pub query_name: String,
    /// Query sequence length (column 2).
    pub query_len: usize,
    /// Query start position, 0-based (column 3).
    pub query_start: usize,
    /// Query end position (column 4).
    pub query_end: usize,
    /// Relative strand: '+' or '-' (column 5).
    pub strand: char,
    /// Target sequence name (column 6).
    pub target_name: String,
    /// Target sequence length (column 7).
    pub target_len: usize,
    /// Target start position (column 8).
    pub target_start: usize,
    /// Target end position (column 9).
    pub target_end: usize,
    /// Number of matching bases (column 10).
    pub matches: usize,
    /// Alignment block length (column 11).
    pub block_len: usize,
    /// DP alignment score (`AS:i`), if present.
    pub score: Option<i64>,
    /// Difference string (`cs:Z`), if present.
    pub cs: Option<String>,
}

impl PafRecord {
    /// Parses a PAF record from a tab-separated line.
    ///
    /// # Errors
    /// Returns `MalformedOutput` if the line has fewer than 12 fields, a
    /// numeric field cannot be parsed, or the target span is inverted.
    pub fn parse_line(line: &str) -> Result<Self, AlignmentError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            return Err(AlignmentError::MalformedOutput(format!(
                "PAF line has {} fields, expected at least 12",
                fields.len()
            )));
        }

        let mut score = None;
        let mut cs = None;
        for tag in &fields[12..] {
            if let Some(value) = tag.strip_prefix("AS:i:") {
                score = Some(parse_field(value, "alignment score")?);
            } else if let Some(value) = tag.strip_prefix("cs:Z:") {
                cs = Some(value.to_string());
            }
        }

        let record = Self {
            query_name: fields[0].to_string(),
            query_len: parse_field(fields[1], "query length")?,
            query_start: parse_field(fields[2], "query start")?,
            query_end: parse_field(fields[3], "query end")?,
            strand: fields[4].chars().next().unwrap_or('+'),
            target_name: fields[5].to_string(),
            target_len: parse_field(fields[6], "target length")?,
            target_start: parse_field(fields[7], "target start")?,
            target_end: parse_field(fields[8], "target end")?,
            matches: parse_field(fields[9], "matches count")?,
            block_len: parse_field(fields[10], "block length")?,
            score,
            cs,
        };

        if record.target_end < record.target_start || record.query_end < record.query_start {
            return Err(AlignmentError::MalformedOutput(format!(
                "inverted coordinates in PAF line for {}",
                record.query_name
            )));
        }

        Ok(record)
    }

    /// Calculates alignment identity percentage.
    ///
    /// Identity = (matching bases / alignment block length) × 100
    pub fn calculate_identity(&self) -> f64 {
        if self.block_len == 0 {
            return 0.0;
        }
        (self.matches as f64 / self.block_len as f64) * 100.0
    }

    /// Calculates target coverage percentage.
    ///
    /// Coverage = (aligned target length / total target length) × 100
    pub fn calculate_coverage(&self) -> f64 {
        if self.target_len == 0 {
            return 0.0;
        }
        ((self.target_end - self.target_start) as f64 / self.target_len as f64) * 100.0
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, AlignmentError> {
    value
        .parse()
        .map_err(|_| AlignmentError::MalformedOutput(format!("invalid {}: '{}'", what, value)))
}

// ============================================================================
// PAF Reader
// ============================================================================

/// Sequential reader for PAF data from a file or captured process output.
pub struct PafReader<R: BufRead> {
    reader: R,
    line_buf: String,
}

impl PafReader<BufReader<File>> {
    /// Opens a PAF file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::with_capacity(1024 * 1024, file)))
    }
}

impl<R: BufRead> PafReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(512),
        }
    }

    /// Reads the next PAF record, skipping empty lines.
    pub fn read_next(&mut self) -> Result<Option<PafRecord>, AlignmentError> {
        loop {
            self.line_buf.clear();
            let read = self.reader
                .read_line(&mut self.line_buf)
                .map_err(|e| AlignmentError::MalformedOutput(e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }

            let line = self.line_buf.trim_end();
            if !line.is_empty() {
                return PafRecord::parse_line(line).map(Some);
            }
        }
    }
}

impl<R: BufRead> Iterator for PafReader<R> {
    type Item = Result<PafRecord, AlignmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

// ============================================================================
// cs Decoding
// ============================================================================

/// Alignment rows in reference forward orientation. `-` marks a gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GappedAlignment {
    pub reference: String,
    pub query: String,
}

/// Decodes a long-form `cs` string into gapped reference and query rows.
///
/// Bases are upper-cased. The short form (`:N` runs) carries no bases and is
/// rejected.
pub fn decode_cs_long(cs: &str) -> Result<GappedAlignment, AlignmentError> {
    let mut reference = String::with_capacity(cs.len());
    let mut query = String::with_capacity(cs.len());
    let bytes = cs.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let op = bytes[i];
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let run = cs[start..i].to_ascii_uppercase();

        match op {
            b'=' => {
                reference.push_str(&run);
                query.push_str(&run);
            }
            b'*' => {
                let mut bases = run.chars();
                match (bases.next(), bases.next(), bases.next()) {
                    (Some(r), Some(q), None) => {
                        reference.push(r);
                        query.push(q);
                    }
                    _ => {
                        return Err(AlignmentError::MalformedOutput(format!(
                            "bad substitution '*{}' in cs string",
                            run.to_ascii_lowercase()
                        )))
                    }
                }
            }
            b'+' => {
                reference.extend(std::iter::repeat('-').take(run.len()));
                query.push_str(&run);
            }
            b'-' => {
                reference.push_str(&run);
                query.extend(std::iter::repeat('-').take(run.len()));
            }
            b':' => {
                return Err(AlignmentError::MalformedOutput(
                    "short-form cs string; run the aligner with --cs=long".to_string(),
                ))
            }
            other => {
                return Err(AlignmentError::MalformedOutput(format!(
                    "unexpected '{}' in cs string",
                    other as char
                )))
            }
        }
    }

    Ok(GappedAlignment { reference, query })
}

// ============================================================================
// Tests
// ============================================================================
