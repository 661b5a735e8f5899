use std::{fmt, fs, io, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_CLASSIFICATION: &str = include_str!("data/block_classification.json");

const DEFAULT_NAMESPACE: &str = "minecraft";

/// Namespaced block identifier such as `minecraft:stone`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BlockId(String);

impl BlockId {
    /// Normalises case and adds the default namespace when none is given.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim().to_ascii_lowercase();
        if trimmed.contains(':') {
            Self(trimmed)
        } else {
            Self(format!("{DEFAULT_NAMESPACE}:{trimmed}"))
        }
    }

    pub fn air() -> Self {
        Self::new("air")
    }

    pub fn is_air(&self) -> bool {
        matches!(
            self.0.as_str(),
            "minecraft:air" | "minecraft:cave_air" | "minecraft:void_air"
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<BlockId> for String {
    fn from(value: BlockId) -> Self {
        value.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    /// Placed by the application; always safe to remove.
    Structure,
    /// Original landscape; must stay intact or be restored.
    Terrain,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub block: BlockId,
    pub category: BlockCategory,
}

/// Ordered block → category table. The first matching entry wins and blocks
/// that match nothing are [`BlockCategory::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTable {
    entries: Vec<ClassificationEntry>,
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("failed to parse block classification: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read block classification from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ClassificationTable {
    pub fn new(entries: Vec<ClassificationEntry>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_CLASSIFICATION)
            .expect("builtin block classification should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassificationError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ClassificationError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_json_str(&contents)?)
    }

    pub fn push(&mut self, block: impl Into<BlockId>, category: BlockCategory) {
        self.entries.push(ClassificationEntry {
            block: block.into(),
            category,
        });
    }

    pub fn classify(&self, block: &BlockId) -> BlockCategory {
        self.entries
            .iter()
            .find(|entry| &entry.block == block)
            .map(|entry| entry.category)
            .unwrap_or(BlockCategory::Other)
    }

    pub fn entries(&self) -> &[ClassificationEntry] {
        &self.entries
    }
}
