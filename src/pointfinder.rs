//! Mutation Database Module (PointFinder-style)
//!
//! Per-organism catalog of chromosomal positions where specific alleles
//! confer resistance, together with the reference sequence of every
//! cataloged gene.
//!
//! # Layout
//! ```text
//! pointfinder/
//!   salmonella/
//!     resistens-overview.txt
//!     RNA_genes.txt          (optional)
//!     gyrA.fsa
//!     parC.fsa
//!     ...
//! ```
//!
//! # Catalog Format (`resistens-overview.txt`)
//! Tab separated, `#` lines are comments:
//! ```text
//! Gene_ID  Gene_name  Codon_pos  Ref_nuc  Ref_codon  Res_codon  Resistance  PMID
//! gyrA     gyrA       83         TCC      S          F,Y        Ciprofloxacin,Nalidixic acid  ...
//! ```
//! For genes listed in `RNA_genes.txt` the position is a nucleotide position
//! and the alleles are nucleotides; otherwise the position is a codon
//! (amino acid) position and the alleles are amino acids. Rows with
//! non-positive positions describe promoter offsets and are skipped.

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::DatabaseInfo;
use crate::error::{ConfigurationError, DatabaseLoadError, DetectionError, UnknownVariantError};
use crate::seqio::FastaReader;

const OVERVIEW_FILE: &str = "resistens-overview.txt";
const RNA_GENES_FILE: &str = "RNA_genes.txt";

// ============================================================================
// Catalog Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Amino acid change at a codon position.
    Codon,
    /// Base change at a nucleotide position (rRNA genes).
    Nucleotide,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Codon => write!(f, "codon"),
            MutationKind::Nucleotide => write!(f, "nucleotide"),
        }
    }
}

/// Classification of an observed allele at a cataloged position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationClass {
    Resistant { phenotype: String },
    NonResistant,
}

impl MutationClass {
    pub fn is_resistant(&self) -> bool {
        matches!(self, MutationClass::Resistant { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResistantAllele {
    pub allele: char,
    pub phenotype: String,
}

/// A position where resistance alleles are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogedPosition {
    /// 1-based codon or nucleotide position.
    pub position: usize,
    pub kind: MutationKind,
    /// Wild-type amino acid or base.
    pub reference_allele: char,
    pub resistant: Vec<ResistantAllele>,
}

impl CatalogedPosition {
    /// 0-based half-open nucleotide range of this position in the gene.
    pub fn nucleotide_range(&self) -> (usize, usize) {
        match self.kind {
            MutationKind::Codon => {
                let start = (self.position - 1) * 3;
                (start, start + 3)
            }
            MutationKind::Nucleotide => (self.position - 1, self.position),
        }
    }
}

/// A cataloged gene with its reference sequence.
#[derive(Debug, Clone)]
pub struct MutationGene {
    /// Gene_ID column, also the stem of its sequence file.
    pub id: String,
    /// Display name (Gene_name column).
    pub name: String,
    /// Identifier of the reference sequence in alignment output.
    pub reference_id: String,
    pub kind: MutationKind,
    pub sequence: String,
    /// Sorted by position.
    pub positions: Vec<CatalogedPosition>,
}

impl MutationGene {
    pub fn position(&self, position: usize) -> Option<&CatalogedPosition> {
        self.positions
            .binary_search_by_key(&position, |p| p.position)
            .ok()
            .map(|i| &self.positions[i])
    }
}

// ============================================================================
// Mutation Database
// ============================================================================

#[derive(Debug)]
pub struct PointfinderDatabase {
    dir: PathBuf,
    organism: String,
    info: DatabaseInfo,
    files: Vec<PathBuf>,
    genes: Vec<MutationGene>,
    by_reference: FxHashMap<String, usize>,
}

impl PointfinderDatabase {
    /// Loads the database for `organism` under the PointFinder root.
    ///
    /// # Errors
    /// - `DatabaseLoadError::NotFound` if `root` is not a directory
    /// - `ConfigurationError::UnsupportedOrganism` if there is no directory
    ///   for the organism
    /// - `DatabaseLoadError` if the catalog or a gene sequence is missing or
    ///   malformed
    pub fn load(root: &Path, organism: &str) -> Result<Self, DetectionError> {
        if !root.is_dir() {
            return Err(DatabaseLoadError::NotFound(root.to_path_buf()).into());
        }

        let organism = organism.to_lowercase();
        let dir = root.join(&organism);
        if !dir.is_dir() {
            return Err(ConfigurationError::UnsupportedOrganism {
                organism,
                available: available_organisms(root)?,
            }
            .into());
        }

        let overview = dir.join(OVERVIEW_FILE);
        if !overview.is_file() {
            return Err(DatabaseLoadError::NotFound(overview).into());
        }

        let rna_genes = read_rna_genes(&dir.join(RNA_GENES_FILE))?;
        let catalog = parse_overview(&overview, &rna_genes)?;

        let mut files = Vec::with_capacity(catalog.len());
        let mut genes = Vec::with_capacity(catalog.len());
        let mut by_reference = FxHashMap::default();

        for (id, (name, kind, positions)) in catalog {
            let path = dir.join(format!("{}.fsa", id));
            if !path.is_file() {
                return Err(DatabaseLoadError::MissingSequence { gene: id, dir: dir.clone() }.into());
            }
            let io_err = |source| DatabaseLoadError::Io { path: path.clone(), source };

            let record = FastaReader::open(&path)
                .map_err(io_err)?
                .next()
                .transpose()
                .map_err(io_err)?
                .ok_or_else(|| DatabaseLoadError::MissingSequence { gene: id.clone(), dir: dir.clone() })?;

            by_reference.insert(record.name.clone(), genes.len());
            genes.push(MutationGene {
                id,
                name,
                reference_id: record.name,
                kind,
                sequence: record.seq,
                positions: positions.into_values().collect(),
            });
            files.push(path);
        }

        let info = DatabaseInfo::load(&dir)?;
        info!(
            "Mutation database {} [{}]: {} genes, {} cataloged positions",
            info,
            organism,
            genes.len(),
            genes.iter().map(|g| g.positions.len()).sum::<usize>()
        );

        Ok(Self {
            dir,
            organism,
            info,
            files,
            genes,
            by_reference,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn organism(&self) -> &str {
        &self.organism
    }

    pub fn info(&self) -> &DatabaseInfo {
        &self.info
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn genes(&self) -> impl Iterator<Item = &MutationGene> + '_ {
        self.genes.iter()
    }

    /// Looks up a gene by the reference identifier reported by the aligner.
    pub fn gene(&self, reference_id: &str) -> Option<&MutationGene> {
        self.by_reference.get(reference_id).map(|&i| &self.genes[i])
    }

    /// Classifies `observed_allele` at a 1-based `position` of a gene.
    ///
    /// # Returns
    /// - `Resistant` for a cataloged resistance allele
    /// - `NonResistant` for the wild-type allele
    /// - `UnknownVariantError` for anything else, including positions that
    ///   are not cataloged
    pub fn resolve_mutation(
        &self,
        reference_id: &str,
        position: usize,
        observed_allele: char,
    ) -> Result<MutationClass, UnknownVariantError> {
        let observed = observed_allele.to_ascii_uppercase();
        let unknown = || UnknownVariantError {
            reference_id: reference_id.to_string(),
            position,
            observed: observed.to_string(),
        };

        let cataloged = self
            .gene(reference_id)
            .and_then(|g| g.position(position))
            .ok_or_else(unknown)?;

        if observed == cataloged.reference_allele {
            return Ok(MutationClass::NonResistant);
        }

        cataloged
            .resistant
            .iter()
            .find(|r| r.allele == observed)
            .map(|r| MutationClass::Resistant { phenotype: r.phenotype.clone() })
            .ok_or_else(unknown)
    }
}

// ============================================================================
// Parsing
// ============================================================================

type Catalog = BTreeMap<String, (String, MutationKind, BTreeMap<usize, CatalogedPosition>)>;

fn available_organisms(root: &Path) -> Result<Vec<String>, DatabaseLoadError> {
    let io_err = |source| DatabaseLoadError::Io { path: root.to_path_buf(), source };

    let mut organisms = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.path().is_dir() {
            organisms.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    organisms.sort();
    Ok(organisms)
}

fn read_rna_genes(path: &Path) -> Result<FxHashSet<String>, DatabaseLoadError> {
    if !path.is_file() {
        return Ok(FxHashSet::default());
    }
    let text = fs::read_to_string(path)
        .map_err(|source| DatabaseLoadError::Io { path: path.to_path_buf(), source })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn parse_overview(path: &Path, rna_genes: &FxHashSet<String>) -> Result<Catalog, DatabaseLoadError> {
    let text = fs::read_to_string(path)
        .map_err(|source| DatabaseLoadError::Io { path: path.to_path_buf(), source })?;

    let mut catalog: Catalog = BTreeMap::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = |reason: String| DatabaseLoadError::Malformed {
            path: path.to_path_buf(),
            line: line_no + 1,
            reason,
        };

        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(malformed(format!("expected at least 7 columns, found {}", fields.len())));
        }

        let gene_id = fields[0];
        let position: i64 = fields[2]
            .parse()
            .map_err(|_| malformed(format!("invalid position '{}'", fields[2])))?;
        if position <= 0 {
            debug!("Skipping promoter position {} of {}", position, gene_id);
            continue;
        }

        let reference_allele = match single_allele(fields[4]) {
            Some(a) => a,
            None => {
                debug!("Skipping {} {}: reference '{}' is not a single residue", gene_id, position, fields[4]);
                continue;
            }
        };

        let phenotype = fields[6]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let kind = if rna_genes.contains(gene_id) {
            MutationKind::Nucleotide
        } else {
            MutationKind::Codon
        };

        let (_, _, positions) = catalog
            .entry(gene_id.to_string())
            .or_insert_with(|| (fields[1].to_string(), kind, BTreeMap::new()));

        let cataloged = positions
            .entry(position as usize)
            .or_insert_with(|| CatalogedPosition {
                position: position as usize,
                kind,
                reference_allele,
                resistant: Vec::new(),
            });

        if cataloged.reference_allele != reference_allele {
            return Err(malformed(format!(
                "conflicting reference allele at {} {}: {} vs {}",
                gene_id, position, cataloged.reference_allele, reference_allele
            )));
        }

        for allele in fields[5].split(',').filter_map(single_allele) {
            if !cataloged.resistant.iter().any(|r| r.allele == allele) {
                cataloged.resistant.push(ResistantAllele { allele, phenotype: phenotype.clone() });
            }
        }
    }

    Ok(catalog)
}

fn single_allele(s: &str) -> Option<char> {
    let mut chars = s.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() || c == '*' => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERVIEW: &str = "\
#Gene_ID\tGene_name\tCodon_pos\tRef_nuc\tRef_codon\tRes_codon\tResistance\tPMID
gyrA\tgyrA\t83\tTCC\tS\tF,Y\tCiprofloxacin,Nalidixic acid\t123
gyrA\tgyrA\t87\tGAC\tD\tN\tCiprofloxacin\t123
gyrA\tgyrA\t83\tTCC\tS\tL\tNalidixic acid\t456
gyrA\tgyrA\t-10\tA\tA\tG\tCiprofloxacin\t789
23S\t23S\t2075\tA\tA\tG\tAzithromycin\t111
";

    fn write_db(root: &Path) -> PathBuf {
        let dir = root.join("salmonella");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(OVERVIEW_FILE), OVERVIEW).unwrap();
        fs::write(dir.join(RNA_GENES_FILE), "23S\n").unwrap();
        fs::write(dir.join("gyrA.fsa"), ">gyrA\nATGAGCGACCTTGCG\n").unwrap();
        fs::write(dir.join("23S.fsa"), ">23S_rrlB\nGGTTAAGCGACTAAGCG\n").unwrap();
        dir
    }

    #[test]
    fn test_load_catalog() {
        let root = tempfile::tempdir().unwrap();
        write_db(root.path());

        let db = PointfinderDatabase::load(root.path(), "Salmonella").unwrap();
        assert_eq!(db.organism(), "salmonella");
        assert_eq!(db.genes().count(), 2);
        assert_eq!(db.files().len(), 2);

        let gyra = db.gene("gyrA").unwrap();
        assert_eq!(gyra.kind, MutationKind::Codon);
        assert_eq!(gyra.positions.len(), 2);
        let s83 = gyra.position(83).unwrap();
        assert_eq!(s83.reference_allele, 'S');
        let alleles: Vec<char> = s83.resistant.iter().map(|r| r.allele).collect();
        assert_eq!(alleles, vec!['F', 'Y', 'L']);
        assert_eq!(s83.nucleotide_range(), (246, 249));

        let rrl = db.gene("23S_rrlB").unwrap();
        assert_eq!(rrl.id, "23S");
        assert_eq!(rrl.kind, MutationKind::Nucleotide);
        assert_eq!(rrl.position(2075).unwrap().nucleotide_range(), (2074, 2075));
    }

    #[test]
    fn test_resolve_mutation() {
        let root = tempfile::tempdir().unwrap();
        write_db(root.path());
        let db = PointfinderDatabase::load(root.path(), "salmonella").unwrap();

        assert_eq!(
            db.resolve_mutation("gyrA", 83, 'F'),
            Ok(MutationClass::Resistant { phenotype: "Ciprofloxacin, Nalidixic acid".into() })
        );
        assert_eq!(
            db.resolve_mutation("gyrA", 83, 'l'),
            Ok(MutationClass::Resistant { phenotype: "Nalidixic acid".into() })
        );
        assert_eq!(db.resolve_mutation("gyrA", 83, 'S'), Ok(MutationClass::NonResistant));

        let err = db.resolve_mutation("gyrA", 83, 'W').unwrap_err();
        assert_eq!(err.observed, "W");
        assert!(db.resolve_mutation("gyrA", 84, 'A').is_err());
        assert!(db.resolve_mutation("parC", 80, 'I').is_err());
    }

    #[test]
    fn test_unsupported_organism() {
        let root = tempfile::tempdir().unwrap();
        write_db(root.path());

        match PointfinderDatabase::load(root.path(), "X") {
            Err(DetectionError::Configuration(ConfigurationError::UnsupportedOrganism { organism, available })) => {
                assert_eq!(organism, "x");
                assert_eq!(available, vec!["salmonella".to_string()]);
            }
            other => panic!("expected unsupported organism, got {:?}", other),
        }

        assert!(matches!(
            PointfinderDatabase::load(&root.path().join("missing"), "salmonella"),
            Err(DetectionError::DatabaseLoad(DatabaseLoadError::NotFound(_)))
        ));
    }

    #[test]
    fn test_missing_gene_sequence() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_db(root.path());
        fs::remove_file(dir.join("gyrA.fsa")).unwrap();

        assert!(matches!(
            PointfinderDatabase::load(root.path(), "salmonella"),
            Err(DetectionError::DatabaseLoad(DatabaseLoadError::MissingSequence { .. }))
        ));
    }

    #[test]
    fn test_malformed_row() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_db(root.path());
        fs::write(dir.join(OVERVIEW_FILE), "gyrA\tgyrA\tx83\tTCC\tS\tF\tCiprofloxacin\n").unwrap();

        match PointfinderDatabase::load(root.path(), "salmonella") {
            Err(DetectionError::DatabaseLoad(DatabaseLoadError::Malformed { line, .. })) => assert_eq!(line, 1),
            other => panic!("expected malformed row, got {:?}", other),
        }
    }
}
