//! Detection Orchestrator Module
//!
//! Drives one detection run through its states:
//!
//! ```text
//! Idle -> DatabasesLoaded -> Running -> Aggregated -> Done
//!   \__________\_______________\___________\______-> Failed
//! ```
//!
//! # Run Steps
//! 1. Load the gene database and, when an organism is set, the mutation database
//! 2. Check inputs: at least one, all present, unique genome identifiers
//! 3. Align every (genome, database) pair on the scheduler pool
//! 4. Filter hits, drop overlapping gene hits, resolve point mutations
//! 5. Sort calls within each genome and build the summary
//!
//! Rows always follow input file order, whatever order the jobs finish in.

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::alignment::{Aligner, AlignmentHit};
use crate::config::{DatabaseLayout, DetectionConfig};
use crate::database::{DatabaseKind, ReferenceDatabase};
use crate::error::{ConfigurationError, DetectionError, Result};
use crate::filter::{FilteredHit, ThresholdFilter};
use crate::mutation::{self, MutationCall};
use crate::report::{GeneRow, MutationRow, SummaryRow};
use crate::scheduler::Scheduler;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Idle,
    DatabasesLoaded,
    Running,
    Aggregated,
    Done,
    Failed,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionState::Idle => "idle",
            DetectionState::DatabasesLoaded => "databases loaded",
            DetectionState::Running => "running",
            DetectionState::Aggregated => "aggregated",
            DetectionState::Done => "done",
            DetectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Calls
// ============================================================================

/// Presence of an acquired resistance gene on a contig.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneCall {
    pub gene: String,
    pub variant: Option<String>,
    pub accession: Option<String>,
    pub phenotype: String,
    pub reference_id: String,
    pub pident: f64,
    pub plength: f64,
    pub hsp_fraction: String,
    pub contig: String,
    /// 1-based contig coordinates; reversed for minus strand hits.
    pub start: usize,
    pub end: usize,
}

impl GeneCall {
    fn from_hit(hit: &AlignmentHit, database: &ReferenceDatabase) -> Option<Self> {
        let ReferenceDatabase::Gene(db) = database else {
            return None;
        };
        let entry = db.entry(&hit.reference_id)?;
        let (start, end) = match hit.strand {
            '-' => (hit.query_end, hit.query_start + 1),
            _ => (hit.query_start + 1, hit.query_end),
        };

        Some(Self {
            gene: entry.gene.clone(),
            variant: entry.variant.clone(),
            accession: entry.accession.clone(),
            phenotype: entry.phenotype.clone(),
            reference_id: hit.reference_id.clone(),
            pident: hit.pident,
            plength: hit.plength,
            hsp_fraction: hit.hsp_fraction(),
            contig: hit.query_id.clone(),
            start,
            end,
        })
    }
}

/// Either kind of resistance evidence found in a genome.
#[derive(Debug, Clone, Copy)]
pub enum ResistanceCall<'a> {
    Gene(&'a GeneCall),
    PointMutation(&'a MutationCall),
}

impl ResistanceCall<'_> {
    /// Name used in the genotype column.
    pub fn name(&self) -> String {
        match self {
            ResistanceCall::Gene(call) => call.gene.clone(),
            ResistanceCall::PointMutation(call) => call.name(),
        }
    }

    pub fn phenotype(&self) -> &str {
        match self {
            ResistanceCall::Gene(call) => &call.phenotype,
            ResistanceCall::PointMutation(call) => call.phenotype(),
        }
    }

    /// Gene presence always counts; point mutations only when cataloged as
    /// resistant.
    pub fn is_resistant(&self) -> bool {
        match self {
            ResistanceCall::Gene(_) => true,
            ResistanceCall::PointMutation(call) => call.is_resistant(),
        }
    }
}

/// Calls for one input genome.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub genome_id: String,
    pub gene_calls: Vec<GeneCall>,
    pub mutation_calls: Vec<MutationCall>,
}

impl SampleResult {
    pub fn calls(&self) -> impl Iterator<Item = ResistanceCall<'_>> + '_ {
        self.gene_calls
            .iter()
            .map(ResistanceCall::Gene)
            .chain(self.mutation_calls.iter().map(ResistanceCall::PointMutation))
    }

    /// True when nothing in the genome confers resistance.
    pub fn is_negative(&self) -> bool {
        !self.calls().any(|call| call.is_resistant())
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResults {
    pub samples: Vec<SampleResult>,
    pub resfinder: Vec<GeneRow>,
    pub pointfinder: Vec<MutationRow>,
    pub summary: Vec<SummaryRow>,
}

// ============================================================================
// Orchestrator
// ============================================================================

type JobKey = (usize, DatabaseKind);

pub struct Detection<A: Aligner> {
    config: DetectionConfig,
    filter: ThresholdFilter,
    aligner: A,
    state: DetectionState,
    gene_db: Option<ReferenceDatabase>,
    mutation_db: Option<ReferenceDatabase>,
}

impl<A: Aligner> Detection<A> {
    /// Validates `config` and returns an idle orchestrator.
    pub fn new(config: DetectionConfig, aligner: A) -> Result<Self> {
        config.validate()?;
        let filter = ThresholdFilter::new(config.pid_threshold, config.plength_threshold)?;
        Ok(Self {
            config,
            filter,
            aligner,
            state: DetectionState::Idle,
            gene_db: None,
            mutation_db: None,
        })
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn gene_database(&self) -> Option<&ReferenceDatabase> {
        self.gene_db.as_ref()
    }

    pub fn mutation_database(&self) -> Option<&ReferenceDatabase> {
        self.mutation_db.as_ref()
    }

    /// Loads the databases named by `layout`.
    ///
    /// The mutation database is loaded only when an organism is configured.
    pub fn load_databases(&mut self, layout: &DatabaseLayout) -> Result<()> {
        self.expect_state(DetectionState::Idle, "load databases")?;

        let gene_db = match ReferenceDatabase::load(&layout.resfinder_dir, None) {
            Ok(db) => db,
            Err(e) => return self.fail(e),
        };
        info!("Loaded {} from {}", gene_db.info(), gene_db.location().display());

        if let Some(organism) = self.config.pointfinder_organism.clone() {
            let mutation_db = match ReferenceDatabase::load(&layout.pointfinder_root, Some(&organism)) {
                Ok(db) => db,
                Err(e) => return self.fail(e),
            };
            info!("Loaded {} for organism {}", mutation_db.info(), organism);
            self.mutation_db = Some(mutation_db);
        }

        self.gene_db = Some(gene_db);
        self.transition(DetectionState::DatabasesLoaded);
        Ok(())
    }

    /// Searches every input genome and builds the result tables.
    pub fn run(&mut self, inputs: &[PathBuf]) -> Result<DetectionResults> {
        self.expect_state(DetectionState::DatabasesLoaded, "run detection")?;

        let genomes = match genome_ids(inputs) {
            Ok(ids) => ids,
            Err(e) => return self.fail(e.into()),
        };

        self.transition(DetectionState::Running);
        let mut hits = match self.align(inputs) {
            Ok(hits) => hits,
            Err(e) => return self.fail(e),
        };

        let samples: Vec<SampleResult> = genomes
            .into_iter()
            .enumerate()
            .map(|(index, genome_id)| {
                let gene_hits = hits.remove(&(index, DatabaseKind::Gene)).unwrap_or_default();
                let mutation_hits = hits.remove(&(index, DatabaseKind::Mutation)).unwrap_or_default();
                self.sample_result(genome_id, gene_hits, mutation_hits)
            })
            .collect();
        self.transition(DetectionState::Aggregated);

        let results = DetectionResults {
            resfinder: samples
                .iter()
                .flat_map(|s| s.gene_calls.iter().map(move |c| GeneRow::new(&s.genome_id, c)))
                .collect(),
            pointfinder: samples
                .iter()
                .flat_map(|s| s.mutation_calls.iter().map(move |c| MutationRow::new(&s.genome_id, c)))
                .collect(),
            summary: summarize(&samples, self.config.include_negatives),
            samples,
        };
        info!(
            "{} gene rows, {} point mutation rows, {} summary rows",
            results.resfinder.len(),
            results.pointfinder.len(),
            results.summary.len()
        );
        self.transition(DetectionState::Done);
        Ok(results)
    }

    fn align(&self, inputs: &[PathBuf]) -> Result<FxHashMap<JobKey, Vec<AlignmentHit>>> {
        let gene_db = self.gene_db.as_ref().ok_or(DetectionError::InvalidState {
            action: "align without a gene database",
            state: self.state,
        })?;
        let mutation_db = self.mutation_db.as_ref();

        let mut jobs: Vec<(JobKey, &Path)> = Vec::with_capacity(inputs.len() * 2);
        for (index, input) in inputs.iter().enumerate() {
            jobs.push(((index, DatabaseKind::Gene), input.as_path()));
            if mutation_db.is_some() {
                jobs.push(((index, DatabaseKind::Mutation), input.as_path()));
            }
        }

        let scheduler = Scheduler::new(self.config.threads)?;
        info!(
            "Running {} alignment jobs on {} worker(s)",
            jobs.len(),
            scheduler.workers()
        );

        let aligner = &self.aligner;
        let hits = scheduler.run(jobs, |&(_, kind), query| {
            let database = match kind {
                DatabaseKind::Gene => gene_db,
                DatabaseKind::Mutation => mutation_db.unwrap_or(gene_db),
            };
            aligner.search(query, database)
        })?;
        Ok(hits)
    }

    fn sample_result(
        &self,
        genome_id: String,
        gene_hits: Vec<AlignmentHit>,
        mutation_hits: Vec<AlignmentHit>,
    ) -> SampleResult {
        let mut gene_calls: Vec<GeneCall> = match &self.gene_db {
            Some(db) => remove_overlapping(self.passing(&genome_id, gene_hits))
                .iter()
                .filter_map(|f| GeneCall::from_hit(&f.hit, db))
                .collect(),
            None => Vec::new(),
        };
        gene_calls.sort_by_cached_key(|c| (c.gene.to_lowercase(), c.contig.clone(), c.start.min(c.end)));

        let mut mutation_calls = match &self.mutation_db {
            Some(db) => mutation::resolve(&self.passing(&genome_id, mutation_hits), db),
            None => Vec::new(),
        };
        mutation_calls.sort_by_cached_key(|c| {
            (c.name().to_lowercase(), c.contig.clone(), c.contig_start)
        });

        debug!(
            "{}: {} gene calls, {} point mutation calls",
            genome_id,
            gene_calls.len(),
            mutation_calls.len()
        );
        SampleResult {
            genome_id,
            gene_calls,
            mutation_calls,
        }
    }

    fn passing(&self, genome_id: &str, hits: Vec<AlignmentHit>) -> Vec<FilteredHit> {
        let (passed, rejected): (Vec<_>, Vec<_>) =
            self.filter.evaluate(hits).into_iter().partition(|f| f.passed);
        for f in &rejected {
            debug!(
                "{}: rejected {} on {} ({:.2}% identity, {:.2}% overlap)",
                genome_id, f.hit.reference_id, f.hit.query_id, f.hit.pident, f.hit.plength
            );
        }
        passed
    }

    fn expect_state(&self, expected: DetectionState, action: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(DetectionError::InvalidState {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: DetectionState) {
        debug!("Detection state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail<T>(&mut self, err: DetectionError) -> Result<T> {
        self.transition(DetectionState::Failed);
        Err(err)
    }
}

/// Loads the databases, searches `inputs` and returns the result tables.
pub fn run_detection<A: Aligner>(
    layout: &DatabaseLayout,
    inputs: &[PathBuf],
    config: &DetectionConfig,
    aligner: A,
) -> Result<DetectionResults> {
    let mut detection = Detection::new(config.clone(), aligner)?;
    detection.load_databases(layout)?;
    detection.run(inputs)
}

// ============================================================================
// Helpers
// ============================================================================

/// Genome identifier of an input file: its name without `.gz` and without
/// the last extension.
pub fn genome_id(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn genome_ids(inputs: &[PathBuf]) -> std::result::Result<Vec<String>, ConfigurationError> {
    if inputs.is_empty() {
        return Err(ConfigurationError::MissingInput);
    }

    let mut seen: FxHashMap<String, &Path> = FxHashMap::default();
    let mut ids = Vec::with_capacity(inputs.len());
    for input in inputs {
        if !input.is_file() {
            return Err(ConfigurationError::InputNotFound(input.clone()));
        }
        let id = genome_id(input);
        if let Some(first) = seen.insert(id.clone(), input) {
            return Err(ConfigurationError::DuplicateGenome {
                id,
                first: first.to_path_buf(),
                second: input.clone(),
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Keeps the best (identity, then overlap) of any gene hits overlapping on
/// the same contig.
fn remove_overlapping(hits: Vec<FilteredHit>) -> Vec<FilteredHit> {
    let mut ranked = hits;
    ranked.sort_by(|a, b| {
        b.hit
            .pident
            .total_cmp(&a.hit.pident)
            .then(b.hit.plength.total_cmp(&a.hit.plength))
            .then_with(|| a.hit.reference_id.cmp(&b.hit.reference_id))
            .then(a.hit.query_start.cmp(&b.hit.query_start))
    });

    let mut kept: Vec<FilteredHit> = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        let shadowed_by = kept.iter().find(|k| {
            k.hit.query_id == candidate.hit.query_id
                && k.hit.query_start < candidate.hit.query_end
                && candidate.hit.query_start < k.hit.query_end
        });
        match shadowed_by {
            Some(best) => debug!(
                "{} on {} overlaps better hit {}",
                candidate.hit.reference_id, candidate.hit.query_id, best.hit.reference_id
            ),
            None => kept.push(candidate),
        }
    }
    kept
}

/// Unique values, sorted case-insensitively, joined with `, `.
fn join_sorted<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = FxHashSet::default();
    let mut unique: Vec<String> = values
        .into_iter()
        .map(Into::into)
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect();
    unique.sort_by_cached_key(|v| (v.to_lowercase(), v.clone()));
    unique.join(", ")
}

fn summarize(samples: &[SampleResult], include_negatives: bool) -> Vec<SummaryRow> {
    samples
        .iter()
        .filter_map(|sample| {
            if sample.is_negative() {
                return include_negatives.then(|| SummaryRow::negative(&sample.genome_id));
            }
            let resistant: Vec<ResistanceCall> = sample.calls().filter(|c| c.is_resistant()).collect();
            let genotype = join_sorted(resistant.iter().map(ResistanceCall::name));
            let phenotype = join_sorted(
                resistant
                    .iter()
                    .flat_map(|c| c.phenotype().split(','))
                    .map(str::trim),
            );
            Some(SummaryRow {
                isolate_id: sample.genome_id.clone(),
                genotype,
                phenotype,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlignmentError;
    use crate::pointfinder::{MutationClass, MutationKind};
    use std::fs;

    struct NoHits;

    impl Aligner for NoHits {
        fn search(&self, _query: &Path, _database: &ReferenceDatabase) -> std::result::Result<Vec<AlignmentHit>, AlignmentError> {
            Ok(Vec::new())
        }
    }

    fn hit(reference_id: &str, contig: &str, start: usize, end: usize, pident: f64) -> FilteredHit {
        FilteredHit {
            hit: AlignmentHit {
                query_id: contig.to_string(),
                query_len: 10_000,
                reference_id: reference_id.to_string(),
                reference_len: end - start,
                pident,
                plength: 100.0,
                query_start: start,
                query_end: end,
                reference_start: 0,
                reference_end: end - start,
                strand: '+',
                score: 100,
                alignment: None,
            },
            passed: true,
        }
    }

    fn gene_call(gene: &str, phenotype: &str) -> GeneCall {
        GeneCall {
            gene: gene.to_string(),
            variant: Some("1".to_string()),
            accession: None,
            phenotype: phenotype.to_string(),
            reference_id: format!("{}_1", gene),
            pident: 100.0,
            plength: 100.0,
            hsp_fraction: "10/10".to_string(),
            contig: "contig_1".to_string(),
            start: 1,
            end: 10,
        }
    }

    fn mutation_call(gene: &str, class: MutationClass) -> MutationCall {
        MutationCall {
            reference_id: gene.to_string(),
            gene: gene.to_string(),
            kind: MutationKind::Codon,
            position: 83,
            reference_allele: 'S',
            observed_allele: 'L',
            reference_bases: "TCG".to_string(),
            observed_bases: "TTG".to_string(),
            class,
            unknown_variant: None,
            contig: "contig_2".to_string(),
            contig_start: 0,
            contig_end: 2000,
            pident: 99.0,
            plength: 100.0,
            hsp_fraction: "2637/2637".to_string(),
        }
    }

    #[test]
    fn test_genome_id() {
        assert_eq!(genome_id(Path::new("/data/A.fasta")), "A");
        assert_eq!(genome_id(Path::new("B.fna.gz")), "B");
        assert_eq!(genome_id(Path::new("sample.1.fa")), "sample.1");
        assert_eq!(genome_id(Path::new("noext")), "noext");
    }

    #[test]
    fn test_genome_ids_rejects_duplicates_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A.fasta");
        let a_gz = dir.path().join("A.fasta.gz");
        fs::write(&a, ">c\nACGT\n").unwrap();
        fs::write(&a_gz, "").unwrap();

        assert!(matches!(genome_ids(&[]), Err(ConfigurationError::MissingInput)));
        assert!(matches!(
            genome_ids(&[a.clone(), a_gz]),
            Err(ConfigurationError::DuplicateGenome { ref id, .. }) if id == "A"
        ));
        assert!(matches!(
            genome_ids(&[dir.path().join("missing.fasta")]),
            Err(ConfigurationError::InputNotFound(_))
        ));
        assert_eq!(genome_ids(&[a]).unwrap(), vec!["A"]);
    }

    #[test]
    fn test_remove_overlapping_keeps_best() {
        let kept = remove_overlapping(vec![
            hit("blaTEM-1_1_AY458016", "c1", 100, 961, 99.0),
            hit("blaTEM-116_1_AY425988", "c1", 100, 961, 100.0),
            hit("blaTEM-1_1_AY458016", "c2", 100, 961, 99.0),
            hit("sul1_5_EU780013", "c1", 2000, 2840, 100.0),
        ]);
        let ids: Vec<(&str, &str)> = kept
            .iter()
            .map(|f| (f.hit.reference_id.as_str(), f.hit.query_id.as_str()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("blaTEM-116_1_AY425988", "c1"),
                ("sul1_5_EU780013", "c1"),
                ("blaTEM-1_1_AY458016", "c2"),
            ]
        );
    }

    #[test]
    fn test_summarize() {
        let positive = SampleResult {
            genome_id: "A".to_string(),
            gene_calls: vec![
                gene_call("tet(M)", "tetracycline"),
                gene_call("blaTEM-1", "ampicillin"),
                gene_call("blaTEM-1", "ampicillin"),
            ],
            mutation_calls: vec![mutation_call(
                "gyrA",
                MutationClass::Resistant { phenotype: "ciprofloxacin I/R, nalidixic acid".to_string() },
            )],
        };
        let unknown_only = SampleResult {
            genome_id: "B".to_string(),
            gene_calls: Vec::new(),
            mutation_calls: vec![mutation_call("gyrA", MutationClass::NonResistant)],
        };

        let samples = vec![positive, unknown_only];
        let summary = summarize(&samples, false);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].genotype, "blaTEM-1, gyrA (S83L), tet(M)");
        assert_eq!(summary[0].phenotype, "ampicillin, ciprofloxacin I/R, nalidixic acid, tetracycline");

        let summary = summarize(&samples, true);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1], SummaryRow::negative("B"));
    }

    #[test]
    fn test_state_guards() {
        let mut detection = Detection::new(DetectionConfig::default(), NoHits).unwrap();
        assert_eq!(detection.state(), DetectionState::Idle);

        let err = detection.run(&[PathBuf::from("A.fasta")]).unwrap_err();
        assert!(matches!(
            err,
            DetectionError::InvalidState { state: DetectionState::Idle, .. }
        ));
        assert_eq!(detection.state(), DetectionState::Idle);

        let missing = tempfile::tempdir().unwrap();
        let layout = DatabaseLayout::from_root(missing.path());
        assert!(detection.load_databases(&layout).is_err());
        assert_eq!(detection.state(), DetectionState::Failed);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectionConfig {
            pid_threshold: 101.0,
            ..Default::default()
        };
        assert!(matches!(
            Detection::new(config, NoHits),
            Err(DetectionError::Configuration(ConfigurationError::InvalidThreshold { .. }))
        ));
    }
}
