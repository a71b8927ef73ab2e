//! Per-ion rate databases.
//!
//! A database prefix `p` names the files `p.en`, `p.tr`, `p.ce`, `p.ci`,
//! `p.rr` and `p.ai`. All of them are JSON documents already in host
//! representation. The energy file is mandatory; a missing rate file only
//! means the ion contributes no edges of that kind.

use crate::domain::{CrmError, CrmResult, LoadResult, RateKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabasePrefix(PathBuf);

impl DatabasePrefix {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self(prefix.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn energy_file(&self) -> PathBuf {
        self.with_extension("en")
    }

    pub fn rate_file(&self, kind: RateKind) -> PathBuf {
        self.with_extension(kind.extension())
    }

    /// Resolves a relative prefix against `base`.
    pub fn resolved_against(&self, base: &Path) -> Self {
        if self.0.is_absolute() {
            self.clone()
        } else {
            Self(base.join(&self.0))
        }
    }

    fn with_extension(&self, extension: &str) -> PathBuf {
        let mut name = self.0.clone().into_os_string();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyFile {
    pub atom: u32,
    #[serde(default)]
    pub symbol: String,
    pub blocks: Vec<EnergyBlock>,
}

impl EnergyFile {
    pub fn level_count(&self) -> usize {
        self.blocks.iter().map(|block| block.levels.len()).sum()
    }

    pub fn blocks_with_nele(&self, nele: u32) -> impl Iterator<Item = &EnergyBlock> {
        self.blocks.iter().filter(move |block| block.nele == nele)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyBlock {
    pub nele: u32,
    pub levels: Vec<LevelRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRecord {
    pub ilev: usize,
    /// Shell occupations, `"n*nq n*nq ..."`.
    pub ncomplex: String,
    #[serde(default)]
    pub name: String,
    /// Doubled total angular momentum.
    pub j: i32,
    #[serde(default)]
    pub p: i32,
    /// Hartree.
    pub energy: f64,
}

/// Excitation and radiative records, keyed by the lower and upper level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinePairRecord {
    pub lower: usize,
    pub upper: usize,
    #[serde(default)]
    pub params: Vec<f64>,
}

/// Ionization, recombination and autoionization records, keyed by the bound
/// level of the ion and the free level of its ionized stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundFreeRecord {
    pub bound: usize,
    pub free: usize,
    #[serde(default)]
    pub params: Vec<f64>,
}

const fn dipole_multipole() -> i32 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBlock<R> {
    pub nele: u32,
    /// Only meaningful for radiative files.
    #[serde(default = "dipole_multipole")]
    pub multipole: i32,
    pub transitions: Vec<R>,
}

impl<R> RateBlock<R> {
    /// Higher multipoles add onto an existing rate of the same level pair.
    pub fn merges_multipoles(&self) -> bool {
        self.multipole.abs() != 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateFile<R> {
    pub blocks: Vec<RateBlock<R>>,
}

pub type LinePairFile = RateFile<LinePairRecord>;
pub type BoundFreeFile = RateFile<BoundFreeRecord>;

pub fn read_energy_file(path: &Path) -> LoadResult<EnergyFile> {
    let source = fs::read_to_string(path).map_err(|source| {
        CrmError::io_system(
            "IO.ENERGY_FILE",
            format!("failed to read level file '{}': {}", path.display(), source),
        )
    })?;
    parse_document(path, &source)
}

/// `Ok(None)` when the file does not exist.
pub fn read_rate_file<R>(path: &Path) -> LoadResult<Option<RateFile<R>>>
where
    R: DeserializeOwned,
{
    if !path.is_file() {
        tracing::warn!(file = %path.display(), "rate file does not exist, skipping");
        return Ok(None);
    }
    let source = fs::read_to_string(path).map_err(|source| {
        CrmError::io_system(
            "IO.RATE_FILE",
            format!("failed to read rate file '{}': {}", path.display(), source),
        )
    })?;
    parse_document(path, &source).map(Some)
}

fn parse_document<T>(path: &Path, source: &str) -> CrmResult<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(source).map_err(|error| {
        CrmError::input_validation(
            "INPUT.DATABASE_FORMAT",
            format!("failed to parse '{}': {}", path.display(), error),
        )
    })
}

pub fn write_document<T>(path: &Path, document: &T) -> CrmResult<()>
where
    T: Serialize,
{
    let rendered = serde_json::to_string_pretty(document).map_err(|error| {
        CrmError::internal(
            "SYS.SERIALIZE",
            format!("failed to serialize '{}': {}", path.display(), error),
        )
    })?;
    fs::write(path, rendered).map_err(|source| {
        CrmError::io_system(
            "IO.WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}
