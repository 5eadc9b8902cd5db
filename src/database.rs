//! Reference Database Module
//!
//! Common front for the two reference database kinds searched by the
//! pipeline:
//! - **Gene database** (ResFinder-style): acquired resistance gene sequences
//! - **Mutation database** (PointFinder-style): per-organism chromosomal
//!   genes with cataloged resistance positions
//!
//! Databases are loaded once per run and are read-only afterwards, so a
//! `&ReferenceDatabase` is shared freely between alignment workers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DatabaseLoadError, DetectionError, UnknownVariantError};
use crate::pointfinder::{CatalogedPosition, MutationClass, PointfinderDatabase};
use crate::resfinder::ResfinderDatabase;

const INFO_FILE: &str = "database-info.json";

// ============================================================================
// Database Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatabaseKind {
    Gene,
    Mutation,
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Gene => write!(f, "resfinder"),
            DatabaseKind::Mutation => write!(f, "pointfinder"),
        }
    }
}

// ============================================================================
// Database Info
// ============================================================================

/// Version metadata, read from `database-info.json` when present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseInfo {
    pub name: String,
    pub version: Option<String>,
    pub date: Option<String>,
}

impl DatabaseInfo {
    /// Reads `database-info.json` from `dir`, falling back to the directory
    /// name with no version.
    pub fn load(dir: &Path) -> Result<Self, DatabaseLoadError> {
        let path = dir.join(INFO_FILE);
        let fallback_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_file() {
            return Ok(Self { name: fallback_name, ..Default::default() });
        }

        let text = fs::read_to_string(&path)
            .map_err(|source| DatabaseLoadError::Io { path: path.clone(), source })?;
        let mut info: DatabaseInfo = serde_json::from_str(&text)
            .map_err(|source| DatabaseLoadError::Info { path, source })?;
        if info.name.is_empty() {
            info.name = fallback_name;
        }
        Ok(info)
    }
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, " {}", version)?;
        }
        if let Some(date) = &self.date {
            write!(f, " ({})", date)?;
        }
        Ok(())
    }
}

// ============================================================================
// Reference Entries
// ============================================================================

/// Borrowed view of one reference sequence.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEntry<'a> {
    /// Sequence identifier as it appears in alignment output.
    pub id: &'a str,
    /// Gene name used in reports.
    pub name: &'a str,
    pub sequence: &'a str,
    /// Cataloged resistance positions (mutation databases only).
    pub mutations: Option<&'a [CatalogedPosition]>,
}

// ============================================================================
// Reference Database
// ============================================================================

#[derive(Debug)]
pub enum ReferenceDatabase {
    Gene(ResfinderDatabase),
    Mutation(PointfinderDatabase),
}

impl ReferenceDatabase {
    /// Loads a gene database from `path`, or the mutation database for
    /// `organism` under the PointFinder root `path`.
    pub fn load(path: &Path, organism: Option<&str>) -> Result<Self, DetectionError> {
        match organism {
            None => Ok(Self::Gene(ResfinderDatabase::load(path)?)),
            Some(organism) => Ok(Self::Mutation(PointfinderDatabase::load(path, organism)?)),
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            Self::Gene(_) => DatabaseKind::Gene,
            Self::Mutation(_) => DatabaseKind::Mutation,
        }
    }

    pub fn info(&self) -> &DatabaseInfo {
        match self {
            Self::Gene(db) => db.info(),
            Self::Mutation(db) => db.info(),
        }
    }

    /// On-disk location of the database.
    pub fn location(&self) -> &Path {
        match self {
            Self::Gene(db) => db.dir(),
            Self::Mutation(db) => db.dir(),
        }
    }

    /// The organism of a mutation database.
    pub fn organism(&self) -> Option<&str> {
        match self {
            Self::Gene(_) => None,
            Self::Mutation(db) => Some(db.organism()),
        }
    }

    /// FASTA files the aligner searches, in a fixed order.
    pub fn reference_files(&self) -> &[PathBuf] {
        match self {
            Self::Gene(db) => db.files(),
            Self::Mutation(db) => db.files(),
        }
    }

    /// Iterates over all reference entries. Each call starts a fresh pass.
    pub fn entries(&self) -> Box<dyn Iterator<Item = ReferenceEntry<'_>> + '_> {
        match self {
            Self::Gene(db) => Box::new(db.entries().map(|e| ReferenceEntry {
                id: &e.id,
                name: &e.gene,
                sequence: &e.sequence,
                mutations: None,
            })),
            Self::Mutation(db) => Box::new(db.genes().map(|g| ReferenceEntry {
                id: &g.reference_id,
                name: &g.name,
                sequence: &g.sequence,
                mutations: Some(&g.positions),
            })),
        }
    }

    /// Looks up a reference entry by identifier.
    pub fn entry(&self, reference_id: &str) -> Option<ReferenceEntry<'_>> {
        match self {
            Self::Gene(db) => db.entry(reference_id).map(|e| ReferenceEntry {
                id: &e.id,
                name: &e.gene,
                sequence: &e.sequence,
                mutations: None,
            }),
            Self::Mutation(db) => db.gene(reference_id).map(|g| ReferenceEntry {
                id: &g.reference_id,
                name: &g.name,
                sequence: &g.sequence,
                mutations: Some(&g.positions),
            }),
        }
    }

    /// Classifies an observed allele. Gene databases catalog no positions,
    /// so every allele is unknown to them.
    pub fn resolve_mutation(
        &self,
        reference_id: &str,
        position: usize,
        observed_allele: char,
    ) -> Result<MutationClass, UnknownVariantError> {
        match self {
            Self::Mutation(db) => db.resolve_mutation(reference_id, position, observed_allele),
            Self::Gene(_) => Err(UnknownVariantError {
                reference_id: reference_id.to_string(),
                position,
                observed: observed_allele.to_string(),
            }),
        }
    }
}
