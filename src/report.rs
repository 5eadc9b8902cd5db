//! Result Table Module
//!
//! Row types of the three result tables and a tab-separated writer.
//!
//! | Table | File |
//! |-------|------|
//! | gene presence | `results_tab.tsv` |
//! | point mutations | `results_tab.pointfinder.tsv` |
//! | summary | `summary.tsv` |
//!
//! Floats are written with two decimals.

use std::io::{self, Write};

use crate::detection::GeneCall;
use crate::mutation::MutationCall;

pub const RESFINDER_FILE: &str = "results_tab.tsv";
pub const POINTFINDER_FILE: &str = "results_tab.pointfinder.tsv";
pub const SUMMARY_FILE: &str = "summary.tsv";

const NEGATIVE_GENOTYPE: &str = "None";
const NEGATIVE_PHENOTYPE: &str = "Sensitive";

/// A row that can be written as one line of a TSV table.
pub trait TsvRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

fn format_float(value: f64) -> String {
    format!("{:.2}", value)
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GeneRow {
    pub isolate_id: String,
    pub gene: String,
    pub phenotype: String,
    pub pident: f64,
    pub plength: f64,
    pub hsp_fraction: String,
    pub contig: String,
    pub start: usize,
    pub end: usize,
    pub accession: String,
}

impl GeneRow {
    pub fn new(isolate_id: &str, call: &GeneCall) -> Self {
        Self {
            isolate_id: isolate_id.to_string(),
            gene: call.gene.clone(),
            phenotype: call.phenotype.clone(),
            pident: call.pident,
            plength: call.plength,
            hsp_fraction: call.hsp_fraction.clone(),
            contig: call.contig.clone(),
            start: call.start,
            end: call.end,
            accession: call.accession.clone().unwrap_or_default(),
        }
    }
}

impl TsvRow for GeneRow {
    const HEADER: &'static [&'static str] = &[
        "Isolate ID",
        "Gene",
        "Predicted Phenotype",
        "%Identity",
        "%Overlap",
        "HSP Length/Total Length",
        "Contig",
        "Start",
        "End",
        "Accession",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.isolate_id.clone(),
            self.gene.clone(),
            self.phenotype.clone(),
            format_float(self.pident),
            format_float(self.plength),
            self.hsp_fraction.clone(),
            self.contig.clone(),
            self.start.to_string(),
            self.end.to_string(),
            self.accession.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRow {
    pub isolate_id: String,
    /// Gene with mutation, e.g. `gyrA (S83L)`.
    pub gene: String,
    pub phenotype: String,
    pub kind: String,
    pub position: usize,
    /// e.g. `TCG -> TTG (S -> L)`.
    pub mutation: String,
    pub status: String,
    pub pident: f64,
    pub plength: f64,
    pub hsp_fraction: String,
    pub contig: String,
    pub start: usize,
    pub end: usize,
}

impl MutationRow {
    pub fn new(isolate_id: &str, call: &MutationCall) -> Self {
        let status = if call.is_resistant() {
            "Resistant"
        } else if call.unknown_variant.is_some() {
            "Unknown"
        } else {
            "Susceptible"
        };

        Self {
            isolate_id: isolate_id.to_string(),
            gene: call.name(),
            phenotype: call.phenotype().to_string(),
            kind: call.kind.to_string(),
            position: call.position,
            mutation: call.descriptor(),
            status: status.to_string(),
            pident: call.pident,
            plength: call.plength,
            hsp_fraction: call.hsp_fraction.clone(),
            contig: call.contig.clone(),
            start: call.contig_start + 1,
            end: call.contig_end,
        }
    }
}

impl TsvRow for MutationRow {
    const HEADER: &'static [&'static str] = &[
        "Isolate ID",
        "Gene",
        "Predicted Phenotype",
        "Type",
        "Position",
        "Mutation",
        "Status",
        "%Identity",
        "%Overlap",
        "HSP Length/Total Length",
        "Contig",
        "Start",
        "End",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.isolate_id.clone(),
            self.gene.clone(),
            self.phenotype.clone(),
            self.kind.clone(),
            self.position.to_string(),
            self.mutation.clone(),
            self.status.clone(),
            format_float(self.pident),
            format_float(self.plength),
            self.hsp_fraction.clone(),
            self.contig.clone(),
            self.start.to_string(),
            self.end.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub isolate_id: String,
    pub genotype: String,
    pub phenotype: String,
}

impl SummaryRow {
    /// Row for a genome without resistance calls.
    pub fn negative(isolate_id: &str) -> Self {
        Self {
            isolate_id: isolate_id.to_string(),
            genotype: NEGATIVE_GENOTYPE.to_string(),
            phenotype: NEGATIVE_PHENOTYPE.to_string(),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.genotype == NEGATIVE_GENOTYPE
    }
}

impl TsvRow for SummaryRow {
    const HEADER: &'static [&'static str] = &["Isolate ID", "Genotype", "Predicted Phenotype"];

    fn fields(&self) -> Vec<String> {
        vec![self.isolate_id.clone(), self.genotype.clone(), self.phenotype.clone()]
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writes a header line followed by one line per row.
pub fn write_table<W: Write, R: TsvRow>(writer: &mut W, rows: &[R]) -> io::Result<()> {
    writeln!(writer, "{}", R::HEADER.join("\t"))?;
    for row in rows {
        writeln!(writer, "{}", row.fields().join("\t"))?;
    }
    Ok(())
}
