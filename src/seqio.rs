//! Sequence I/O Module
//!
//! Reads FASTA files (plain or gzip-compressed) for reference databases and
//! validates genome assemblies before they are handed to the aligner.
//!
//! # Examples
//! ```no_run
//! use amrsearch::seqio::FastaReader;
//!
//! let mut reader = FastaReader::open("genome.fasta").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} bp", record.name, record.seq.len());
//! }
//! ```

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::AlignmentError;

const VALID_NUCLEOTIDES: &[u8] = b"ACGTNUacgtnuRYSWKMBDHVryswkmbdhv-";

// ============================================================================
// Input Opening
// ============================================================================

/// Opens a file for buffered reading, decompressing `.gz` files.
pub fn open_input<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    if ext == "gz" {
        Ok(Box::new(BufReader::with_capacity(1024 * 1024, MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(1024 * 1024, file)))
    }
}

// ============================================================================
// FASTA Format
// ============================================================================

/// A FASTA record containing sequence name and nucleotide sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Sequence identifier (text after '>' up to first whitespace).
    pub name: String,
    /// Sequence, concatenated from all sequence lines.
    pub seq: String,
}

/// Sequential reader for FASTA data.
///
/// Handles multi-line sequences and strips line endings. Anything before the
/// first header line is ignored.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    current_name: Option<String>,
}

impl FastaReader<Box<dyn BufRead + Send>> {
    /// Opens a FASTA file, plain or gzipped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(open_input(path)?)
    }
}

impl<R: BufRead> FastaReader<R> {
    /// Wraps an already buffered source.
    pub fn new(reader: R) -> io::Result<Self> {
        let mut reader = Self {
            reader,
            line_buf: String::with_capacity(256),
            current_name: None,
        };

        loop {
            reader.line_buf.clear();
            if reader.reader.read_line(&mut reader.line_buf)? == 0 {
                break;
            }
            if reader.line_buf.starts_with('>') {
                reader.current_name = Some(header_name(&reader.line_buf));
                break;
            }
        }

        Ok(reader)
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error occurred
    pub fn read_next(&mut self) -> io::Result<Option<FastaRecord>> {
        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(4096);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if self.line_buf.starts_with('>') {
                self.current_name = Some(header_name(&self.line_buf));
                break;
            }
            seq.push_str(self.line_buf.trim_end());
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = io::Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

fn header_name(line: &str) -> String {
    line[1..].split_whitespace().next().unwrap_or("").to_string()
}

// ============================================================================
// Validation
// ============================================================================

/// Checks that a query file looks like nucleotide FASTA.
///
/// Rejects unreadable files, binary content, a first non-blank line that is
/// not a header, headers without sequence, and sequence lines that are mostly
/// non-nucleotide characters.
pub fn validate_fasta(path: &Path) -> Result<(), AlignmentError> {
    let invalid = |reason: String| AlignmentError::InvalidInput {
        path: path.to_path_buf(),
        reason,
    };

    let reader = open_input(path).map_err(|e| invalid(e.to_string()))?;
    let mut lines = reader.lines();

    let header_line = loop {
        match lines.next() {
            Some(Ok(line)) if !line.trim().is_empty() => break line,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(invalid(e.to_string())),
            None => return Err(invalid("empty file".to_string())),
        }
    };

    if header_line.contains('\0') {
        return Err(invalid("binary content".to_string()));
    }
    if !header_line.starts_with('>') {
        return Err(invalid(format!(
            "first line must start with '>', found: {}",
            header_line.chars().take(50).collect::<String>()
        )));
    }

    let seq_line = match lines.next() {
        Some(Ok(line)) if !line.trim().is_empty() => line,
        Some(Ok(_)) | None => return Err(invalid("no sequence after header".to_string())),
        Some(Err(e)) => return Err(invalid(e.to_string())),
    };

    let seq_line = seq_line.trim_end();
    let invalid_count = seq_line.bytes()
        .filter(|b| !VALID_NUCLEOTIDES.contains(b))
        .count();

    if invalid_count > seq_line.len() / 10 {
        return Err(invalid(format!(
            "too many non-nucleotide characters ({}/{})",
            invalid_count,
            seq_line.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    #[test]
    fn test_read_multiline_records() {
        let data = "\n>contig_1 len=12\nACGTAC\nGTACGT\n>contig_2\nTTTT\n";
        let records: Vec<FastaRecord> = FastaReader::new(Cursor::new(data))
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "contig_1");
        assert_eq!(records[0].seq, "ACGTACGTACGT");
        assert_eq!(records[1].name, "contig_2");
        assert_eq!(records[1].seq, "TTTT");
    }

    #[test]
    fn test_open_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.fasta.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b">c1\nACGT\n").unwrap();
        encoder.finish().unwrap();

        let mut reader = FastaReader::open(&path).unwrap();
        let record = reader.read_next().unwrap().unwrap();
        assert_eq!(record.name, "c1");
        assert_eq!(record.seq, "ACGT");
        assert!(reader.read_next().unwrap().is_none());
        assert!(validate_fasta(&path).is_ok());
    }

    #[test]
    fn test_validate_fasta() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.fasta");
        std::fs::write(&good, ">c1\nACGTNACGT\n").unwrap();
        assert!(validate_fasta(&good).is_ok());

        let no_header = dir.path().join("no_header.fasta");
        std::fs::write(&no_header, "ACGT\n").unwrap();
        assert!(matches!(validate_fasta(&no_header), Err(AlignmentError::InvalidInput { .. })));

        let protein = dir.path().join("protein.fasta");
        std::fs::write(&protein, ">p1\nMEEPQSDPSVEPPLSQETFSDLWKLL\n").unwrap();
        assert!(validate_fasta(&protein).is_err());

        let empty = dir.path().join("empty.fasta");
        std::fs::write(&empty, "").unwrap();
        assert!(validate_fasta(&empty).is_err());

        assert!(validate_fasta(&dir.path().join("missing.fasta")).is_err());
    }
}
