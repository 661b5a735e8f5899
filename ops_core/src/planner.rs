//! Decides, per structure position, whether a clear removes it, restores the
//! ground that was there, or leaves it alone. Pure: no commands are issued.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::batcher::FillJob;
use crate::blocks::{BlockCategory, BlockId, ClassificationTable};
use crate::geometry::{coalesce_runs, merge_rows, BlockPos, Region};
use crate::registry::StructureFootprint;
use crate::snapshot::TerrainSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialSource {
    Snapshot,
    /// No record for the position; the configured surface material is used.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClearAction {
    Remove,
    Fill {
        material: BlockId,
        source: MaterialSource,
    },
    Skip,
}

impl ClearAction {
    /// Block the region is set to, or `None` for a skip.
    pub fn target(&self) -> Option<BlockId> {
        match self {
            ClearAction::Remove => Some(BlockId::air()),
            ClearAction::Fill { material, .. } => Some(material.clone()),
            ClearAction::Skip => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClearAction::Remove => "remove",
            ClearAction::Fill { .. } => "fill",
            ClearAction::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChunk {
    pub structure_id: String,
    pub region: Region,
    #[serde(flatten)]
    pub action: ClearAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearPlan {
    pub steps: Vec<PlannedChunk>,
}

impl ClearPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn blocks_where(&self, keep: impl Fn(&ClearAction) -> bool) -> u64 {
        self.steps
            .iter()
            .filter(|step| keep(&step.action))
            .map(|step| step.region.volume())
            .sum()
    }

    pub fn removal_blocks(&self) -> u64 {
        self.blocks_where(|action| matches!(action, ClearAction::Remove))
    }

    pub fn fill_blocks(&self) -> u64 {
        self.blocks_where(|action| matches!(action, ClearAction::Fill { .. }))
    }

    pub fn degraded_fill_blocks(&self) -> u64 {
        self.blocks_where(|action| {
            matches!(
                action,
                ClearAction::Fill {
                    source: MaterialSource::Default,
                    ..
                }
            )
        })
    }

    pub fn skipped_blocks(&self) -> u64 {
        self.blocks_where(|action| matches!(action, ClearAction::Skip))
    }

    /// Fill jobs for every non-skip step, and the step index each job came
    /// from.
    pub fn jobs(&self) -> (Vec<FillJob>, Vec<usize>) {
        let mut jobs = Vec::new();
        let mut origins = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(block) = step.action.target() {
                jobs.push(FillJob::new(step.region, block));
                origins.push(index);
            }
        }
        (jobs, origins)
    }
}

pub struct TerrainPlanner {
    table: ClassificationTable,
    default_material: BlockId,
    preserve_terrain: bool,
}

impl TerrainPlanner {
    pub fn new(table: ClassificationTable, default_material: BlockId, preserve_terrain: bool) -> Self {
        Self {
            table,
            default_material,
            preserve_terrain,
        }
    }

    pub fn plan_all(
        &self,
        footprints: &[StructureFootprint],
        snapshot: Option<&dyn TerrainSnapshot>,
    ) -> ClearPlan {
        let mut plan = ClearPlan::default();
        for footprint in footprints {
            plan.steps.extend(self.plan(footprint, snapshot).steps);
        }
        plan
    }

    /// Plans one structure. Non-structure volumes are skipped; without
    /// terrain preservation every structure volume is removed. With it, a
    /// position counts as former ground when the snapshot records a solid
    /// material there or, lacking a record, when it is at or below the
    /// footprint's surface layer.
    ///
    /// Work scales with the number of volumes and snapshot records, never
    /// with the volume size: the surface split is planned as whole boxes and
    /// only recorded positions that disagree with it are carved out.
    pub fn plan(
        &self,
        footprint: &StructureFootprint,
        snapshot: Option<&dyn TerrainSnapshot>,
    ) -> ClearPlan {
        let mut plan = ClearPlan::default();
        let mut push = |region: Region, action: ClearAction| {
            plan.steps.push(PlannedChunk {
                structure_id: footprint.id.clone(),
                region,
                action,
            })
        };

        for volume in &footprint.volumes {
            let region = volume.region;
            if self.table.classify(&volume.block) != BlockCategory::Structure {
                push(region, ClearAction::Skip);
                continue;
            }
            if !self.preserve_terrain {
                push(region, ClearAction::Remove);
                continue;
            }

            let surface = footprint.surface_y;
            let mut pieces = Vec::new();
            if let Some(above) = region.clamp_y(surface.saturating_add(1), i32::MAX) {
                pieces.push((above, ClearAction::Remove));
            }
            if let Some(below) = region.clamp_y(i32::MIN, surface) {
                pieces.push((below, self.default_fill()));
            }

            let overrides = match snapshot {
                Some(snapshot) => self.recorded_overrides(region, surface, snapshot),
                None => Vec::new(),
            };
            for (hole, _) in &overrides {
                pieces = pieces
                    .into_iter()
                    .flat_map(|(piece, action)| {
                        piece
                            .subtract(hole)
                            .into_iter()
                            .map(move |rest| (rest, action.clone()))
                    })
                    .collect();
            }
            for (region, action) in pieces.into_iter().chain(overrides) {
                push(region, action);
            }
        }

        let degraded = plan.degraded_fill_blocks();
        if degraded > 0 {
            warn!(
                structure = %footprint.id,
                blocks = degraded,
                material = %self.default_material,
                "clear.degraded_fill"
            );
        }
        plan
    }

    fn default_fill(&self) -> ClearAction {
        ClearAction::Fill {
            material: self.default_material.clone(),
            source: MaterialSource::Default,
        }
    }

    /// Boxes of recorded positions whose action differs from the surface
    /// split, grouped by action.
    fn recorded_overrides(
        &self,
        region: Region,
        surface_y: i32,
        snapshot: &dyn TerrainSnapshot,
    ) -> Vec<(Region, ClearAction)> {
        let mut grouped: BTreeMap<ClearAction, Vec<BlockPos>> = BTreeMap::new();
        for (pos, material) in snapshot.records_in(&region) {
            let action = if material.is_air() {
                ClearAction::Remove
            } else {
                ClearAction::Fill {
                    material,
                    source: MaterialSource::Snapshot,
                }
            };
            let unrecorded = if pos.y <= surface_y {
                self.default_fill()
            } else {
                ClearAction::Remove
            };
            if action != unrecorded {
                grouped.entry(action).or_default().push(pos);
            }
        }
        grouped
            .into_iter()
            .flat_map(|(action, positions)| {
                merge_rows(&coalesce_runs(&positions))
                    .into_iter()
                    .map(move |region| (region, action.clone()))
            })
            .collect()
    }
}
