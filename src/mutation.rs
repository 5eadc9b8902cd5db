//! Point Mutation Resolver Module
//!
//! Turns passing alignments against a mutation database into point mutation
//! calls. For every cataloged position inside an alignment, the observed
//! codon (translated) or base is read from the gapped alignment and
//! classified against the catalog.
//!
//! # Outcomes per Cataloged Position
//! - wild-type allele observed: no call
//! - cataloged resistance allele: resistant call
//! - any other allele: non-resistant call carrying an `UnknownVariantError`
//! - gap, insertion inside the codon, or untranslatable codon: skipped
//!
//! Calls are not deduplicated; two hits covering the same position both
//! produce calls.

use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::sync::LazyLock;

use crate::database::ReferenceDatabase;
use crate::error::UnknownVariantError;
use crate::filter::FilteredHit;
use crate::paf::GappedAlignment;
use crate::pointfinder::{CatalogedPosition, MutationClass, MutationKind};

// ============================================================================
// Codon Table
// ============================================================================

/// Standard genetic code codon table.
static CODON_TABLE: LazyLock<FxHashMap<&'static str, char>> = LazyLock::new(|| {
    let mut table = FxHashMap::default();
    // Phenylalanine (F)
    table.insert("TTT", 'F'); table.insert("TTC", 'F');
    // Leucine (L)
    table.insert("TTA", 'L'); table.insert("TTG", 'L');
    table.insert("CTT", 'L'); table.insert("CTC", 'L');
    table.insert("CTA", 'L'); table.insert("CTG", 'L');
    // Isoleucine (I)
    table.insert("ATT", 'I'); table.insert("ATC", 'I'); table.insert("ATA", 'I');
    // Methionine (M)
    table.insert("ATG", 'M');
    // Valine (V)
    table.insert("GTT", 'V'); table.insert("GTC", 'V');
    table.insert("GTA", 'V'); table.insert("GTG", 'V');
    // Serine (S)
    table.insert("TCT", 'S'); table.insert("TCC", 'S');
    table.insert("TCA", 'S'); table.insert("TCG", 'S');
    table.insert("AGT", 'S'); table.insert("AGC", 'S');
    // Proline (P)
    table.insert("CCT", 'P'); table.insert("CCC", 'P');
    table.insert("CCA", 'P'); table.insert("CCG", 'P');
    // Threonine (T)
    table.insert("ACT", 'T'); table.insert("ACC", 'T');
    table.insert("ACA", 'T'); table.insert("ACG", 'T');
    // Alanine (A)
    table.insert("GCT", 'A'); table.insert("GCC", 'A');
    table.insert("GCA", 'A'); table.insert("GCG", 'A');
    // Tyrosine (Y)
    table.insert("TAT", 'Y'); table.insert("TAC", 'Y');
    // Stop codons (*)
    table.insert("TAA", '*'); table.insert("TAG", '*'); table.insert("TGA", '*');
    // Histidine (H)
    table.insert("CAT", 'H'); table.insert("CAC", 'H');
    // Glutamine (Q)
    table.insert("CAA", 'Q'); table.insert("CAG", 'Q');
    // Asparagine (N)
    table.insert("AAT", 'N'); table.insert("AAC", 'N');
    // Lysine (K)
    table.insert("AAA", 'K'); table.insert("AAG", 'K');
    // Aspartic acid (D)
    table.insert("GAT", 'D'); table.insert("GAC", 'D');
    // Glutamic acid (E)
    table.insert("GAA", 'E'); table.insert("GAG", 'E');
    // Cysteine (C)
    table.insert("TGT", 'C'); table.insert("TGC", 'C');
    // Tryptophan (W)
    table.insert("TGG", 'W');
    // Arginine (R)
    table.insert("CGT", 'R'); table.insert("CGC", 'R');
    table.insert("CGA", 'R'); table.insert("CGG", 'R');
    table.insert("AGA", 'R'); table.insert("AGG", 'R');
    // Glycine (G)
    table.insert("GGT", 'G'); table.insert("GGC", 'G');
    table.insert("GGA", 'G'); table.insert("GGG", 'G');
    table
});

/// Translates a codon (3 nucleotides) to amino acid.
pub fn translate_codon(codon: &str) -> Option<char> {
    let upper = codon.to_uppercase().replace('U', "T");
    CODON_TABLE.get(upper.as_str()).copied()
}

// ============================================================================
// Mutation Call
// ============================================================================

/// A point mutation observed at a cataloged position.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationCall {
    pub reference_id: String,
    /// Gene display name.
    pub gene: String,
    pub kind: MutationKind,
    /// 1-based codon or nucleotide position.
    pub position: usize,
    pub reference_allele: char,
    pub observed_allele: char,
    /// Reference and observed bases at the position (the codon for codon
    /// mutations, one base otherwise).
    pub reference_bases: String,
    pub observed_bases: String,
    pub class: MutationClass,
    /// Set when the observed allele is not in the catalog.
    pub unknown_variant: Option<UnknownVariantError>,
    pub contig: String,
    pub contig_start: usize,
    pub contig_end: usize,
    pub pident: f64,
    pub plength: f64,
    pub hsp_fraction: String,
}

impl MutationCall {
    /// Short name, e.g. `gyrA (S83L)` or `23S (A2075G)`.
    pub fn name(&self) -> String {
        format!("{} ({}{}{})", self.gene, self.reference_allele, self.position, self.observed_allele)
    }

    /// Base-level description, e.g. `TCG -> TTG (S -> L)` or `A -> G`.
    pub fn descriptor(&self) -> String {
        match self.kind {
            MutationKind::Codon => format!(
                "{} -> {} ({} -> {})",
                self.reference_bases, self.observed_bases, self.reference_allele, self.observed_allele
            ),
            MutationKind::Nucleotide => format!("{} -> {}", self.reference_allele, self.observed_allele),
        }
    }

    pub fn is_resistant(&self) -> bool {
        self.class.is_resistant()
    }

    /// Predicted phenotype, `unknown` for uncataloged alleles.
    pub fn phenotype(&self) -> &str {
        match &self.class {
            MutationClass::Resistant { phenotype } => phenotype,
            MutationClass::NonResistant => "unknown",
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolves passing mutation-database hits into point mutation calls.
///
/// Hits against references without cataloged positions, hits without
/// alignment rows, and hits covering no cataloged position yield nothing.
pub fn resolve(hits: &[FilteredHit], database: &ReferenceDatabase) -> Vec<MutationCall> {
    let mut calls = Vec::new();

    for FilteredHit { hit, passed } in hits {
        if !passed {
            continue;
        }
        let entry = match database.entry(&hit.reference_id) {
            Some(e) => e,
            None => {
                debug!("No catalog entry for {}", hit.reference_id);
                continue;
            }
        };
        let (positions, alignment) = match (entry.mutations, &hit.alignment) {
            (Some(p), Some(a)) => (p, a),
            _ => {
                debug!("Hit {} vs {} has no alignment rows", hit.query_id, hit.reference_id);
                continue;
            }
        };

        for cataloged in positions {
            let (start, end) = cataloged.nucleotide_range();
            if start < hit.reference_start || end > hit.reference_end {
                continue;
            }

            let Some((reference_bases, observed_bases)) =
                bases_at(alignment, hit.reference_start, start, end)
            else {
                debug!(
                    "{} {}: gap or insertion at position {} in {}",
                    entry.name, cataloged.kind, cataloged.position, hit.query_id
                );
                continue;
            };

            let Some(observed_allele) = observed_allele(cataloged, &observed_bases) else {
                debug!("{} {}: untranslatable codon {}", entry.name, cataloged.position, observed_bases);
                continue;
            };

            if observed_allele == cataloged.reference_allele {
                continue;
            }

            let (class, unknown_variant) =
                match database.resolve_mutation(&hit.reference_id, cataloged.position, observed_allele) {
                    Ok(class) => (class, None),
                    Err(unknown) => {
                        warn!("{} in {}: {}", entry.name, hit.query_id, unknown);
                        (MutationClass::NonResistant, Some(unknown))
                    }
                };

            calls.push(MutationCall {
                reference_id: hit.reference_id.clone(),
                gene: entry.name.to_string(),
                kind: cataloged.kind,
                position: cataloged.position,
                reference_allele: cataloged.reference_allele,
                observed_allele,
                reference_bases,
                observed_bases,
                class,
                unknown_variant,
                contig: hit.query_id.clone(),
                contig_start: hit.query_start,
                contig_end: hit.query_end,
                pident: hit.pident,
                plength: hit.plength,
                hsp_fraction: hit.hsp_fraction(),
            });
        }
    }

    calls
}

fn observed_allele(cataloged: &CatalogedPosition, observed_bases: &str) -> Option<char> {
    match cataloged.kind {
        MutationKind::Codon => translate_codon(observed_bases),
        MutationKind::Nucleotide => observed_bases
            .chars()
            .next()
            .filter(|c| matches!(c, 'A' | 'C' | 'G' | 'T')),
    }
}

/// Reads reference and query bases for the reference range `[start, end)`
/// from alignment rows beginning at reference coordinate `aln_start`.
///
/// Returns None if a query gap or an insertion falls inside the range.
fn bases_at(
    alignment: &GappedAlignment,
    aln_start: usize,
    start: usize,
    end: usize,
) -> Option<(String, String)> {
    let mut reference = String::with_capacity(end - start);
    let mut query = String::with_capacity(end - start);
    let mut ref_pos = aln_start;

    for (r, q) in alignment.reference.bytes().zip(alignment.query.bytes()) {
        if ref_pos >= end {
            break;
        }
        if r == b'-' {
            if ref_pos > start {
                return None;
            }
            continue;
        }
        if ref_pos >= start {
            if q == b'-' {
                return None;
            }
            reference.push(r.to_ascii_uppercase() as char);
            query.push(q.to_ascii_uppercase() as char);
        }
        ref_pos += 1;
    }

    (query.len() == end - start).then_some((reference, query))
}

// ============================================================================
// Tests
// ============================================================================
