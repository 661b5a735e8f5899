use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::blocks::BlockId;
use crate::geometry::{BlockPos, Region};
use crate::registry::{read_store, StoreError};

/// Original ground material per position, captured before structures were
/// built. Positions without a record fall back to the planner's default.
pub trait TerrainSnapshot: Send + Sync {
    fn material_at(&self, pos: BlockPos) -> Option<BlockId>;

    /// Every recorded position inside `region`.
    fn records_in(&self, region: &Region) -> Vec<(BlockPos, BlockId)>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotRecord {
    x: i32,
    y: i32,
    z: i32,
    block: BlockId,
}

#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    records: Vec<SnapshotRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemorySnapshot {
    materials: HashMap<BlockPos, BlockId>,
}

impl InMemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let document: SnapshotDocument = serde_json::from_str(json)?;
        let mut snapshot = Self::new();
        for record in document.records {
            snapshot.insert(BlockPos::new(record.x, record.y, record.z), record.block);
        }
        Ok(snapshot)
    }

    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_json_str(&read_store(path)?)?)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut records: Vec<SnapshotRecord> = self
            .materials
            .iter()
            .map(|(pos, block)| SnapshotRecord {
                x: pos.x,
                y: pos.y,
                z: pos.z,
                block: block.clone(),
            })
            .collect();
        records.sort_by_key(|record| (record.y, record.z, record.x));
        serde_json::to_string_pretty(&SnapshotDocument { records })
    }

    pub fn insert(&mut self, pos: BlockPos, block: impl Into<BlockId>) {
        self.materials.insert(pos, block.into());
    }

    /// Records every position of `region` as `block`.
    pub fn fill(&mut self, region: Region, block: impl Into<BlockId>) {
        let block = block.into();
        for pos in region.positions() {
            self.materials.insert(pos, block.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl TerrainSnapshot for InMemorySnapshot {
    fn material_at(&self, pos: BlockPos) -> Option<BlockId> {
        self.materials.get(&pos).cloned()
    }

    fn records_in(&self, region: &Region) -> Vec<(BlockPos, BlockId)> {
        if region.volume() <= self.materials.len() as u64 {
            region
                .positions()
                .filter_map(|pos| self.materials.get(&pos).map(|block| (pos, block.clone())))
                .collect()
        } else {
            self.materials
                .iter()
                .filter(|(pos, _)| region.contains(**pos))
                .map(|(pos, block)| (*pos, block.clone()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_and_answers_lookups() {
        let snapshot = InMemorySnapshot::from_json_str(
            r#"{"records":[{"x":1,"y":63,"z":2,"block":"dirt"},{"x":1,"y":64,"z":2,"block":"grass_block"}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.material_at(BlockPos::new(1, 64, 2)),
            Some(BlockId::new("grass_block"))
        );
        assert_eq!(snapshot.material_at(BlockPos::new(0, 0, 0)), None);
    }

    #[test]
    fn record_lookup_by_region() {
        let mut snapshot = InMemorySnapshot::new();
        snapshot.insert(BlockPos::new(5, 5, 5), "stone");
        let near = Region::new(BlockPos::new(0, 0, 0), BlockPos::new(5, 5, 5));
        let far = Region::new(BlockPos::new(6, 0, 0), BlockPos::new(9, 9, 9));
        assert_eq!(
            snapshot.records_in(&near),
            vec![(BlockPos::new(5, 5, 5), BlockId::new("stone"))]
        );
        assert!(snapshot.records_in(&far).is_empty());
        assert_eq!(snapshot.records_in(&Region::single(BlockPos::new(5, 5, 5))).len(), 1);
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrain.json");
        let mut snapshot = InMemorySnapshot::new();
        snapshot.fill(
            Region::new(BlockPos::new(0, 60, 0), BlockPos::new(1, 61, 1)),
            "dirt",
        );
        std::fs::write(&path, snapshot.to_json_string().unwrap()).unwrap();
        assert_eq!(InMemorySnapshot::from_file(&path).unwrap(), snapshot);
    }
}
