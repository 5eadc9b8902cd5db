//! Gene Database Module (ResFinder-style)
//!
//! A directory of FASTA files, one per drug class. The file stem names the
//! predicted phenotype of every gene it contains.
//!
//! # Layout
//! ```text
//! resfinder/
//!   aminoglycoside.fsa
//!   beta-lactam.fsa
//!   ...
//!   database-info.json   (optional)
//! ```
//!
//! # Header Format
//! `<gene>_<variant>_<accession>`, e.g. `blaTEM-1_1_AY458016` or
//! `aac(6')-Ib_2_M23634`. Gene names may contain underscores; the variant is
//! the last all-digit field that still leaves an accession after it.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::DatabaseInfo;
use crate::error::DatabaseLoadError;
use crate::seqio::FastaReader;

const FASTA_EXTENSION: &str = "fsa";

// ============================================================================
// Gene Entry
// ============================================================================

/// One resistance gene reference sequence.
#[derive(Debug, Clone)]
pub struct GeneEntry {
    /// Full FASTA identifier (`blaTEM-1_1_AY458016`).
    pub id: String,
    /// Gene name (`blaTEM-1`).
    pub gene: String,
    /// Variant number (`1`).
    pub variant: Option<String>,
    /// Sequence accession (`AY458016`).
    pub accession: Option<String>,
    /// Predicted phenotype, from the drug class file name.
    pub phenotype: String,
    pub sequence: String,
}

/// Splits a ResFinder identifier into gene, variant and accession.
///
/// Identifiers that do not follow the pattern are returned whole as the
/// gene name.
pub fn parse_gene_header(id: &str) -> (String, Option<String>, Option<String>) {
    let parts: Vec<&str> = id.split('_').collect();

    let variant_idx = (1..parts.len().saturating_sub(1))
        .rev()
        .find(|&i| !parts[i].is_empty() && parts[i].bytes().all(|b| b.is_ascii_digit()));

    match variant_idx {
        Some(i) => (
            parts[..i].join("_"),
            Some(parts[i].to_string()),
            Some(parts[i + 1..].join("_")),
        ),
        None => (id.to_string(), None, None),
    }
}

// ============================================================================
// Gene Database
// ============================================================================

#[derive(Debug)]
pub struct ResfinderDatabase {
    dir: PathBuf,
    info: DatabaseInfo,
    files: Vec<PathBuf>,
    entries: Vec<GeneEntry>,
    index: FxHashMap<String, usize>,
}

impl ResfinderDatabase {
    /// Loads every `*.fsa` file in `dir`.
    ///
    /// # Errors
    /// - `NotFound` if `dir` is not a directory
    /// - `Empty` if it contains no `*.fsa` file
    /// - `Io` if a file cannot be read
    pub fn load(dir: &Path) -> Result<Self, DatabaseLoadError> {
        if !dir.is_dir() {
            return Err(DatabaseLoadError::NotFound(dir.to_path_buf()));
        }

        let files = list_fasta_files(dir)?;
        if files.is_empty() {
            return Err(DatabaseLoadError::Empty(dir.to_path_buf()));
        }

        let mut entries = Vec::new();
        let mut index = FxHashMap::default();

        for path in &files {
            let phenotype = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let io_err = |source| DatabaseLoadError::Io { path: path.clone(), source };

            let reader = FastaReader::open(path).map_err(io_err)?;
            for record in reader {
                let record = record.map_err(io_err)?;
                if index.contains_key(&record.name) {
                    warn!("Duplicate gene {} in {}, keeping first", record.name, path.display());
                    continue;
                }

                let (gene, variant, accession) = parse_gene_header(&record.name);
                index.insert(record.name.clone(), entries.len());
                entries.push(GeneEntry {
                    id: record.name,
                    gene,
                    variant,
                    accession,
                    phenotype: phenotype.clone(),
                    sequence: record.seq,
                });
            }
            debug!("Loaded {}", path.display());
        }

        let info = DatabaseInfo::load(dir)?;
        info!("Gene database {}: {} genes in {} files", info, entries.len(), files.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            info,
            files,
            entries,
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn entries(&self) -> impl Iterator<Item = &GeneEntry> + '_ {
        self.entries.iter()
    }

    pub fn entry(&self, id: &str) -> Option<&GeneEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lists `*.fsa` files of a directory, sorted by name.
pub(crate) fn list_fasta_files(dir: &Path) -> Result<Vec<PathBuf>, DatabaseLoadError> {
    let io_err = |source| DatabaseLoadError::Io { path: dir.to_path_buf(), source };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(FASTA_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
