//! The two operator workflows: clearing built structures and locking the
//! time of day.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{info, warn};

use crate::batcher::AdaptiveBatcher;
use crate::blocks::{BlockId, ClassificationTable};
use crate::classify::Outcome;
use crate::commands::ConsoleCommand;
use crate::config::OpsConfig;
use crate::error::{CommandError, ErrorKind};
use crate::executor::CommandExecutor;
use crate::geometry::Region;
use crate::planner::{ClearAction, MaterialSource, TerrainPlanner};
use crate::registry::{Area, StructureRegistry};
use crate::report::{ClearReport, TimeLockReport, UnresolvedRange};
use crate::snapshot::TerrainSnapshot;
use crate::transport::{RconTransport, Transport};
use crate::verify::VerificationProbe;
use crate::world_time::{LockPhase, TimeOfDay, DAYLIGHT_RULE};

pub struct WorkflowOrchestrator<R: StructureRegistry, T: Transport = RconTransport> {
    executor: CommandExecutor<T>,
    batcher: AdaptiveBatcher,
    registry: R,
    snapshot: Option<Box<dyn TerrainSnapshot>>,
    table: ClassificationTable,
    config: OpsConfig,
}

impl<R: StructureRegistry, T: Transport> WorkflowOrchestrator<R, T> {
    pub fn new(executor: CommandExecutor<T>, registry: R, config: OpsConfig) -> Self {
        let batcher = AdaptiveBatcher::new(&config.batching, executor.policy().timeout());
        Self {
            executor,
            batcher,
            registry,
            snapshot: None,
            table: ClassificationTable::builtin(),
            config,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Box<dyn TerrainSnapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_classification(mut self, table: ClassificationTable) -> Self {
        self.table = table;
        self
    }

    pub fn executor(&self) -> &CommandExecutor<T> {
        &self.executor
    }

    pub fn batcher(&self) -> &AdaptiveBatcher {
        &self.batcher
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }

    /// Clears every uncleared structure in `area`. An unknown area is
    /// rejected before anything is sent. Chunks that stay unresolved, or
    /// whose sampled read-back disagrees, are itemised in the report while
    /// the rest of the plan still runs; only structures with no unresolved
    /// range are marked cleared.
    pub async fn clear_environment(&mut self, area: &str, preserve_terrain: bool) -> ClearReport {
        let started = Instant::now();
        let parsed: Area = match area.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(area, "clear.rejected");
                return ClearReport::rejected(area, preserve_terrain, CommandError::from(err));
            }
        };

        let footprints = self.registry.footprints(parsed);
        let planner = TerrainPlanner::new(
            self.table.clone(),
            self.config.terrain.default_surface_material.clone(),
            preserve_terrain,
        );
        let plan = planner.plan_all(&footprints, self.snapshot.as_deref());
        let (jobs, origins) = plan.jobs();
        info!(
            %parsed,
            structures = footprints.len(),
            steps = plan.steps.len(),
            blocks = plan.removal_blocks() + plan.fill_blocks(),
            "clear.planned"
        );

        let run = self.batcher.run(&self.executor, &jobs).await;

        let mut report = ClearReport::empty(area, preserve_terrain);
        report.structures_total = footprints.len();
        report.chunks_dispatched = run.dispatched.len();
        report.final_chunk_size = run.final_chunk_size;

        let mut written: Vec<(Region, BlockId)> = Vec::new();
        let mut written_steps = Vec::new();
        for chunk in run.successful() {
            let step = &plan.steps[origins[chunk.job]];
            let changed = match chunk.result.outcome {
                Some(Outcome::Unchanged) => 0,
                _ => chunk.result.changed.unwrap_or(chunk.block_count),
            };
            match &step.action {
                ClearAction::Remove => report.blocks_removed += changed,
                ClearAction::Fill { source, .. } => {
                    report.blocks_filled += changed;
                    match source {
                        MaterialSource::Snapshot => report.blocks_filled_from_snapshot += changed,
                        MaterialSource::Default => report.blocks_filled_default += changed,
                    }
                }
                ClearAction::Skip => {}
            }
            if let Some(block) = step.action.target() {
                written.push((chunk.region, block));
                written_steps.push(origins[chunk.job]);
            }
        }

        let mut failed_structures = HashSet::new();
        for chunk in &run.unresolved {
            let step = &plan.steps[origins[chunk.job]];
            failed_structures.insert(step.structure_id.clone());
            report.unresolved.push(UnresolvedRange {
                structure_id: step.structure_id.clone(),
                region: chunk.region,
                action: step.action.label().to_string(),
                kind: chunk.kind,
                detail: chunk.detail.clone(),
                sent: chunk.sent,
            });
        }

        if !written.is_empty() && !run.aborted {
            let probe = VerificationProbe::new(&self.executor, self.config.verification.clone());
            let verification = probe.confirm_blocks(&written).await;
            // A failed sample keeps its structure registered so a re-run
            // rewrites the chunk it came from.
            let mut reported = HashSet::new();
            for failure in &verification.failures {
                let Some(index) = written.iter().position(|(region, _)| region.contains(failure.pos))
                else {
                    continue;
                };
                if !reported.insert(index) {
                    continue;
                }
                let step = &plan.steps[written_steps[index]];
                failed_structures.insert(step.structure_id.clone());
                report.unresolved.push(UnresolvedRange {
                    structure_id: step.structure_id.clone(),
                    region: written[index].0,
                    action: step.action.label().to_string(),
                    kind: failure.kind.unwrap_or(ErrorKind::Protocol),
                    detail: format!(
                        "read-back at {} expected {}, got {:?}",
                        failure.pos, failure.expected, failure.detail
                    ),
                    sent: true,
                });
            }
            report.verification = Some(verification);
        }

        for footprint in &footprints {
            if !failed_structures.contains(&footprint.id) && self.registry.mark_cleared(&footprint.id) {
                report.structures_cleared += 1;
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.finish();
        info!(
            area,
            status = %report.status,
            cleared = report.structures_cleared,
            removed = report.blocks_removed,
            filled = report.blocks_filled,
            unresolved = report.unresolved.len(),
            elapsed_ms = report.elapsed_ms,
            "clear.completed"
        );
        report
    }

    /// Sets the time of day, then sets `doDaylightCycle` to `!enabled` and
    /// reads it back. The lock only counts once the stored value matches.
    pub async fn lock_world_time(&self, time: &str, enabled: bool) -> TimeLockReport {
        let target: TimeOfDay = match time.parse() {
            Ok(target) => target,
            Err(err) => {
                warn!(time, "time_lock.rejected");
                return TimeLockReport::rejected(time, enabled, CommandError::from(err));
            }
        };

        let mut report = TimeLockReport::new(time, Some(target.ticks()), enabled);
        info!(phase = %report.phase, %target, enabled, "time_lock.state");

        let set_time = self
            .executor
            .run(&ConsoleCommand::SetTime { ticks: target.ticks() }.to_string())
            .await;
        if let Some(error) = set_time.error {
            return self.fail_lock(report, error);
        }
        report.phase = LockPhase::TimeSet;
        info!(phase = %report.phase, ticks = target.ticks(), "time_lock.state");

        let cycle_running = !enabled;
        let set_rule = self
            .executor
            .run(&ConsoleCommand::set_rule(DAYLIGHT_RULE, cycle_running).to_string())
            .await;
        if let Some(error) = set_rule.error {
            return self.fail_lock(report, error);
        }

        let probe = VerificationProbe::new(&self.executor, self.config.verification.clone());
        let rule = probe.confirm_rule(DAYLIGHT_RULE, cycle_running).await;
        let verified = rule.verified;
        let rule_error = rule.error.clone();
        let observed = rule.observed.clone();
        report.rule = Some(rule);
        if !verified {
            let error = rule_error.unwrap_or_else(|| {
                CommandError::new(
                    ErrorKind::Protocol,
                    format!(
                        "{DAYLIGHT_RULE} reads {} after setting it to {cycle_running}",
                        observed.as_deref().unwrap_or("<nothing>")
                    ),
                )
            });
            return self.fail_lock(report, error);
        }

        report.phase = if enabled {
            LockPhase::Locked
        } else {
            LockPhase::Released
        };
        info!(phase = %report.phase, "time_lock.state");

        match probe.query_time().await {
            Ok(ticks) => {
                report.observed_time = Some(ticks);
                if enabled {
                    report.in_range = Some(target.contains(ticks));
                }
            }
            Err(err) => warn!(error = %err, "time_lock.query_failed"),
        }
        report.finish();
        report
    }

    /// Current time of day as reported by the server.
    pub async fn current_time(&self) -> Result<u32, CommandError> {
        VerificationProbe::new(&self.executor, self.config.verification.clone())
            .query_time()
            .await
    }

    fn fail_lock(&self, mut report: TimeLockReport, error: CommandError) -> TimeLockReport {
        warn!(phase = %report.phase, error = %error, "time_lock.failed");
        report.phase = LockPhase::Failed;
        report.error = Some(error);
        report.finish();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BlockPos;
    use crate::registry::{InMemoryRegistry, StructureFootprint, StructureKind, Volume};
    use crate::report::ReportStatus;
    use crate::testing::{Reply, ScriptedTransport};

    fn config() -> OpsConfig {
        let mut config = OpsConfig::builtin();
        config.retry.max_retries = 0;
        config.retry.base_delay_ms = 1;
        config.verification.sample_rate = 0.01;
        config.verification.max_samples = 4;
        config
    }

    fn registry() -> InMemoryRegistry {
        let footprint = |id: &str, kind, x| StructureFootprint {
            id: id.to_string(),
            kind,
            surface_y: 64,
            volumes: vec![Volume {
                region: Region::new(BlockPos::new(x, 60, 0), BlockPos::new(x + 1, 70, 1)),
                block: BlockId::new("iron_block"),
            }],
            cleared: false,
        };
        InMemoryRegistry::new(vec![
            footprint("well-1", StructureKind::Wellbore, 0),
            footprint("rig-1", StructureKind::Rig, 10),
        ])
    }

    fn world_replies(command: &str) -> Reply {
        if command.starts_with("fill") {
            Reply::text("Successfully filled 4 block(s)")
        } else if command.starts_with("execute if block") {
            Reply::text("Test passed")
        } else if command.starts_with("time set") {
            Reply::text("Set the time to 1000")
        } else if command == "time query daytime" {
            Reply::text("The time is 1000")
        } else if command == "gamerule doDaylightCycle" {
            Reply::text("Gamerule doDaylightCycle is currently set to: false")
        } else if command.starts_with("gamerule") {
            Reply::text("Gamerule doDaylightCycle is now set to: false")
        } else {
            Reply::text("Unknown or incomplete command")
        }
    }

    fn orchestrator(
        transport: ScriptedTransport,
    ) -> WorkflowOrchestrator<InMemoryRegistry, ScriptedTransport> {
        let config = config();
        let executor = CommandExecutor::new(
            transport,
            config.retry.clone(),
            crate::classify::ResponseClassifier::default(),
        );
        WorkflowOrchestrator::new(executor, registry(), config)
    }

    #[tokio::test]
    async fn bogus_area_sends_nothing() {
        let transport = ScriptedTransport::new(Vec::new());
        let log = transport.sent_log();
        let mut ops = orchestrator(transport);
        let report = ops.clear_environment("bogus", true).await;
        assert_eq!(report.status, ReportStatus::Failure);
        assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Validation);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ops.executor().counters().commands, 0);
    }

    #[tokio::test]
    async fn clear_restores_ground_and_marks_structures() {
        let transport = ScriptedTransport::with_handler(world_replies);
        let log = transport.sent_log();
        let mut ops = orchestrator(transport);
        let report = ops.clear_environment("all", true).await;

        assert_eq!(report.structures_total, 2);
        assert_eq!(report.structures_cleared, 2);
        assert!(report.blocks_filled_default > 0);
        assert_eq!(report.status, ReportStatus::Warning, "default fill is degraded");
        assert!(report.unresolved.is_empty());
        assert!(report.verification.as_ref().unwrap().verified);
        let sent = log.lock().unwrap().clone();
        assert!(sent.iter().any(|c| c.ends_with("minecraft:grass_block")));
        assert!(sent.iter().any(|c| c.ends_with("minecraft:air")));

        let again = ops.clear_environment("all", true).await;
        assert_eq!(again.structures_total, 0);
        assert_eq!(again.blocks_removed, 0);
        assert_eq!(again.status, ReportStatus::Success);
    }

    #[tokio::test]
    async fn failing_structure_stays_registered() {
        let transport = ScriptedTransport::with_handler(|command| {
            if command.starts_with("fill 10") {
                Reply::text("That position is not loaded")
            } else {
                world_replies(command)
            }
        });
        let mut ops = orchestrator(transport);
        let report = ops.clear_environment("all", false).await;
        assert_eq!(report.status, ReportStatus::Warning);
        assert_eq!(report.structures_cleared, 1);
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].structure_id, "rig-1");
        assert_eq!(report.unresolved[0].kind, ErrorKind::CommandRejected);
        assert!(!ops.registry().get("rig-1").unwrap().cleared);
        assert!(ops.registry().get("well-1").unwrap().cleared);
    }

    #[tokio::test]
    async fn unapplied_write_keeps_structure_for_rerun() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let applied = Arc::new(AtomicBool::new(false));
        let world = Arc::clone(&applied);
        let transport = ScriptedTransport::with_handler(move |command| {
            let rig_probe = command.starts_with("execute if block 10 ")
                || command.starts_with("execute if block 11 ");
            if rig_probe && !world.load(Ordering::SeqCst) {
                Reply::text("Test failed")
            } else {
                world_replies(command)
            }
        });
        let mut config = config();
        config.verification.sample_rate = 1.0;
        config.verification.max_samples = 64;
        let executor = CommandExecutor::new(
            transport,
            config.retry.clone(),
            crate::classify::ResponseClassifier::default(),
        );
        let mut ops = WorkflowOrchestrator::new(executor, registry(), config);

        let report = ops.clear_environment("all", false).await;
        assert_eq!(report.status, ReportStatus::Warning);
        assert!(!report.verification.as_ref().unwrap().verified);
        assert_eq!(report.structures_cleared, 1);
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].structure_id, "rig-1");
        assert_eq!(report.unresolved[0].kind, ErrorKind::Protocol);
        assert!(!ops.registry().get("rig-1").unwrap().cleared);
        assert!(ops.registry().get("well-1").unwrap().cleared);

        applied.store(true, Ordering::SeqCst);
        let rerun = ops.clear_environment("all", false).await;
        assert_eq!(rerun.structures_total, 1);
        assert!(rerun.blocks_removed > 0);
        assert_eq!(rerun.status, ReportStatus::Success);
        assert!(ops.registry().get("rig-1").unwrap().cleared);
    }

    #[tokio::test]
    async fn lock_verifies_rule_and_time() {
        let transport = ScriptedTransport::with_handler(world_replies);
        let log = transport.sent_log();
        let ops = orchestrator(transport);
        let report = ops.lock_world_time("day", true).await;
        assert_eq!(report.phase, LockPhase::Locked);
        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.observed_time, Some(1_000));
        assert_eq!(
            log.lock().unwrap()[..3],
            [
                "time set 1000".to_string(),
                "gamerule doDaylightCycle false".to_string(),
                "gamerule doDaylightCycle".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn lock_fails_when_rule_does_not_stick() {
        let transport = ScriptedTransport::with_handler(|command| {
            if command == "gamerule doDaylightCycle" {
                Reply::text("Gamerule doDaylightCycle is currently set to: true")
            } else {
                world_replies(command)
            }
        });
        let ops = orchestrator(transport);
        let report = ops.lock_world_time("noon", true).await;
        assert_eq!(report.phase, LockPhase::Failed);
        assert!(report.status.is_failure());
        assert!(report.to_string().contains("observed true"));
    }

    #[tokio::test]
    async fn unknown_time_sends_nothing() {
        let transport = ScriptedTransport::new(Vec::new());
        let log = transport.sent_log();
        let ops = orchestrator(transport);
        let report = ops.lock_world_time("teatime", true).await;
        assert!(report.status.is_failure());
        assert!(log.lock().unwrap().is_empty());
    }
}
