#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use amrsearch::detection::genome_id;
use amrsearch::error::AlignmentError;
use amrsearch::paf::GappedAlignment;
use amrsearch::{Aligner, AlignmentHit, DatabaseKind, DatabaseLayout, ReferenceDatabase};

/// gyrA stand-in: codon 2 is S (TCC), cataloged as S -> F for ciprofloxacin.
pub const GYRA: &str = "ATGTCCGACCTTGGG";
pub const GYRA_S2F: &str = "ATGTTCGACCTTGGG";

/// Aligner returning canned hits keyed by genome identifier and database kind.
#[derive(Default)]
pub struct FakeAligner {
    hits: HashMap<(String, DatabaseKind), Vec<AlignmentHit>>,
    failing: Option<String>,
    delays: HashMap<String, u64>,
    calls: AtomicUsize,
}

impl FakeAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, genome: &str, kind: DatabaseKind, hits: Vec<AlignmentHit>) -> Self {
        self.hits.insert((genome.to_string(), kind), hits);
        self
    }

    /// Searches of `genome` fail with an engine error.
    pub fn failing_on(mut self, genome: &str) -> Self {
        self.failing = Some(genome.to_string());
        self
    }

    /// Searches of `genome` sleep before returning.
    pub fn with_delay(mut self, genome: &str, millis: u64) -> Self {
        self.delays.insert(genome.to_string(), millis);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Aligner for FakeAligner {
    fn search(&self, query: &Path, database: &ReferenceDatabase) -> Result<Vec<AlignmentHit>, AlignmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let genome = genome_id(query);

        if let Some(&millis) = self.delays.get(&genome) {
            thread::sleep(Duration::from_millis(millis));
        }
        if self.failing.as_deref() == Some(genome.as_str()) {
            return Err(AlignmentError::EngineFailed {
                program: "fake-aligner".to_string(),
                query: query.to_path_buf(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }

        Ok(self
            .hits
            .get(&(genome, database.kind()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Gene hit of a full-length reference on `contig`.
pub fn gene_hit(reference_id: &str, contig: &str, start: usize, pident: f64, plength: f64) -> AlignmentHit {
    let reference_len = 861;
    let span = (reference_len as f64 * plength / 100.0).round() as usize;
    AlignmentHit {
        query_id: contig.to_string(),
        query_len: 50_000,
        reference_id: reference_id.to_string(),
        reference_len,
        pident,
        plength,
        query_start: start,
        query_end: start + span,
        reference_start: 0,
        reference_end: span,
        strand: '+',
        score: span as i64,
        alignment: None,
    }
}

/// Full-length gyrA hit whose query row is `observed`.
pub fn gyra_hit(contig: &str, observed: &str) -> AlignmentHit {
    AlignmentHit {
        query_id: contig.to_string(),
        query_len: 50_000,
        reference_id: "gyrA".to_string(),
        reference_len: GYRA.len(),
        pident: 100.0,
        plength: 100.0,
        query_start: 1000,
        query_end: 1000 + GYRA.len(),
        reference_start: 0,
        reference_end: GYRA.len(),
        strand: '+',
        score: 30,
        alignment: Some(GappedAlignment {
            reference: GYRA.to_string(),
            query: observed.to_string(),
        }),
    }
}

/// Writes a small database tree under `root` and returns its layout.
pub fn write_databases(root: &Path) -> DatabaseLayout {
    let layout = DatabaseLayout::from_root(root);

    fs::create_dir_all(&layout.resfinder_dir).unwrap();
    fs::write(
        layout.resfinder_dir.join("beta-lactam.fsa"),
        ">blaTEM-1_1_AY458016\nATGAGTATTCAACATTTCCGTGTCGCCCTTATTCCC\n\
         >blaCTX-M-15_1_AY044436\nATGGTTAAAAAATCACTGCGCCAGTTCACGCTGATG\n",
    )
    .unwrap();
    fs::write(
        layout.resfinder_dir.join("tetracycline.fsa"),
        ">tet(M)_1_X92947\nATGAAAATTATTAATATTGGAGTTTTAGCTCATGTT\n",
    )
    .unwrap();

    let salmonella = layout.pointfinder_root.join("salmonella");
    fs::create_dir_all(&salmonella).unwrap();
    fs::write(
        salmonella.join("resistens-overview.txt"),
        "#Gene_ID\tGene_name\tCodon_pos\tRef_nuc\tRef_codon\tRes_codon\tResistance\tPMID\n\
         gyrA\tgyrA\t2\tTCC\tS\tF\tCiprofloxacin\t1\n",
    )
    .unwrap();
    fs::write(salmonella.join("gyrA.fsa"), format!(">gyrA\n{}\n", GYRA)).unwrap();

    layout
}

/// Writes one placeholder genome per name and returns their paths in order.
pub fn write_genomes(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(format!("{}.fasta", name));
            fs::write(&path, ">contig_1\nACGTACGTACGTACGT\n").unwrap();
            path
        })
        .collect()
}
