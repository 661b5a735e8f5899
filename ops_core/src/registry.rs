//! Built structures known to the operator tooling, keyed by area.

use std::{fmt, fs, io, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::BlockId;
use crate::error::ValidationError;
use crate::geometry::Region;

/// Errors reading or writing the JSON stores (registry, terrain snapshot).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn read_store(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|source| StoreError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Wellbore,
    Rig,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::Wellbore => f.write_str("wellbore"),
            StructureKind::Rig => f.write_str("rig"),
        }
    }
}

/// Area argument of a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    All,
    Wellbores,
    Rigs,
}

impl Area {
    pub fn includes(&self, kind: StructureKind) -> bool {
        match self {
            Area::All => true,
            Area::Wellbores => kind == StructureKind::Wellbore,
            Area::Rigs => kind == StructureKind::Rig,
        }
    }
}

impl FromStr for Area {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Area::All),
            "wellbores" | "wellbore" => Ok(Area::Wellbores),
            "rigs" | "rig" => Ok(Area::Rigs),
            _ => Err(ValidationError::UnknownArea(raw.to_string())),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::All => f.write_str("all"),
            Area::Wellbores => f.write_str("wellbores"),
            Area::Rigs => f.write_str("rigs"),
        }
    }
}

/// One box of a structure and the block it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub region: Region,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureFootprint {
    pub id: String,
    pub kind: StructureKind,
    /// Highest layer of original ground under the structure.
    pub surface_y: i32,
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub cleared: bool,
}

impl StructureFootprint {
    pub fn block_count(&self) -> u64 {
        self.volumes.iter().map(|volume| volume.region.volume()).sum()
    }
}

/// Source of footprints for a clear. Cleared structures are not returned
/// again.
pub trait StructureRegistry: Send {
    fn footprints(&self, area: Area) -> Vec<StructureFootprint>;

    /// Returns false when `id` is unknown.
    fn mark_cleared(&mut self, id: &str) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryRegistry {
    #[serde(default)]
    structures: Vec<StructureFootprint>,
}

impl InMemoryRegistry {
    pub fn new(structures: Vec<StructureFootprint>) -> Self {
        Self { structures }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_json_str(&read_store(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| StoreError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn register(&mut self, footprint: StructureFootprint) {
        self.structures.push(footprint);
    }

    pub fn get(&self, id: &str) -> Option<&StructureFootprint> {
        self.structures.iter().find(|structure| structure.id == id)
    }

    pub fn structures(&self) -> &[StructureFootprint] {
        &self.structures
    }
}

impl StructureRegistry for InMemoryRegistry {
    fn footprints(&self, area: Area) -> Vec<StructureFootprint> {
        self.structures
            .iter()
            .filter(|structure| !structure.cleared && area.includes(structure.kind))
            .cloned()
            .collect()
    }

    fn mark_cleared(&mut self, id: &str) -> bool {
        match self.structures.iter_mut().find(|structure| structure.id == id) {
            Some(structure) => {
                structure.cleared = true;
                true
            }
            None => false,
        }
    }
}
