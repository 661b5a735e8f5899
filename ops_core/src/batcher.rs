//! Splits bulk fills into server-sized chunks and tunes the chunk size from
//! observed throughput.
//!
//! The tuning state is a plain value ([`ChunkSizeState`]) with a pure
//! transition ([`ChunkSizeState::observe`]), so convergence can be tested
//! without a server. [`AdaptiveBatcher`] threads that state through a
//! sequential dispatch loop on one executor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blocks::BlockId;
use crate::commands::ConsoleCommand;
use crate::config::BatchConfig;
use crate::error::ErrorKind;
use crate::executor::{CommandExecutor, CommandResult};
use crate::geometry::{coalesce_runs, BlockPos, Region};
use crate::metrics::PerformanceStats;
use crate::transport::Transport;

/// One region to fill with one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillJob {
    pub region: Region,
    pub block: BlockId,
}

impl FillJob {
    pub fn new(region: Region, block: BlockId) -> Self {
        Self { region, block }
    }

    /// Coalesces scattered positions into x-runs of the same block.
    pub fn from_positions(positions: &[BlockPos], block: &BlockId) -> Vec<FillJob> {
        coalesce_runs(positions)
            .into_iter()
            .map(|region| FillJob::new(region, block.clone()))
            .collect()
    }
}

/// Threshold settings read by [`ChunkSizeState::observe`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tuning {
    pub high_water_blocks_per_sec: f64,
    pub low_water_blocks_per_sec: f64,
    pub growth_streak: u32,
    /// Chunks slower than this shrink regardless of throughput.
    pub latency_ceiling: Duration,
}

impl Tuning {
    pub fn from_config(config: &BatchConfig, command_timeout: Duration) -> Self {
        Self {
            high_water_blocks_per_sec: config.high_water_blocks_per_sec,
            low_water_blocks_per_sec: config.low_water_blocks_per_sec,
            growth_streak: config.growth_streak.max(1),
            latency_ceiling: command_timeout / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkObservation {
    pub blocks: u64,
    pub elapsed: Duration,
    pub success: bool,
}

impl ChunkObservation {
    pub fn blocks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            f64::INFINITY
        } else {
            self.blocks as f64 / secs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Held,
    Grew { from: u64, to: u64 },
    Shrank { from: u64, to: u64 },
}

/// Adaptive chunk ceiling. `min <= size <= max` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSizeState {
    pub size: u64,
    pub min: u64,
    pub max: u64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl ChunkSizeState {
    pub fn from_config(config: &BatchConfig) -> Self {
        let min = config.min_chunk_size.max(1);
        let max = config.max_chunk_size.max(min);
        Self {
            size: config.initial_chunk_size.clamp(min, max),
            min,
            max,
            growth_factor: config.growth_factor,
            shrink_factor: config.shrink_factor,
            consecutive_successes: 0,
            consecutive_failures: 0,
        }
    }

    /// Applies one chunk's outcome. Throughput only counts for chunks that
    /// used at least half the ceiling; a small leftover slab says little
    /// about what the server tolerates.
    pub fn observe(&mut self, observation: &ChunkObservation, tuning: &Tuning) -> Adjustment {
        let representative = observation.blocks.saturating_mul(2) >= self.size;
        if !observation.success {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            return self.shrink();
        }

        self.consecutive_failures = 0;
        self.consecutive_successes += 1;

        if observation.elapsed > tuning.latency_ceiling {
            self.consecutive_successes = 0;
            return self.shrink();
        }
        if !representative {
            return Adjustment::Held;
        }
        let throughput = observation.blocks_per_second();
        if throughput < tuning.low_water_blocks_per_sec {
            self.consecutive_successes = 0;
            return self.shrink();
        }
        if throughput >= tuning.high_water_blocks_per_sec
            && self.consecutive_successes >= tuning.growth_streak
        {
            self.consecutive_successes = 0;
            return self.grow();
        }
        Adjustment::Held
    }

    fn grow(&mut self) -> Adjustment {
        let from = self.size;
        let grown = (self.size as f64 * self.growth_factor).ceil() as u64;
        self.size = grown.clamp(self.min, self.max);
        if self.size == from {
            Adjustment::Held
        } else {
            Adjustment::Grew { from, to: self.size }
        }
    }

    fn shrink(&mut self) -> Adjustment {
        let from = self.size;
        let shrunk = (self.size as f64 / self.shrink_factor).floor() as u64;
        self.size = shrunk.clamp(self.min, self.max);
        if self.size == from {
            Adjustment::Held
        } else {
            Adjustment::Shrank { from, to: self.size }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    job: usize,
    region: Region,
    requeues: u32,
}

/// Takes the next chunk of at most `size` blocks off the front of the queue.
/// Oversized regions lose a slab from their min corner along their longest
/// axis; slab and remainder go back to the front, so the walk is depth-first
/// and deterministic.
fn carve(queue: &mut VecDeque<Pending>, size: u64) -> Option<Pending> {
    let size = size.max(1);
    loop {
        let pending = queue.pop_front()?;
        let region = pending.region;
        if region.volume() <= size {
            return Some(pending);
        }
        let axis = region.longest_axis();
        let cross_section = region.volume() / region.len(axis);
        let layers = (size / cross_section).max(1);
        let (head, tail) = region.split_at(axis, layers);
        if let Some(tail) = tail {
            queue.push_front(Pending {
                region: tail,
                ..pending
            });
        }
        queue.push_front(Pending {
            region: head,
            ..pending
        });
    }
}

/// Splits `region` into the chunks a batcher with ceiling `size` would send.
pub fn partition(region: Region, size: u64) -> Vec<Region> {
    let mut queue = VecDeque::from([Pending {
        job: 0,
        region,
        requeues: 0,
    }]);
    let mut chunks = Vec::new();
    while let Some(chunk) = carve(&mut queue, size) {
        chunks.push(chunk.region);
    }
    chunks
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkDispatch {
    /// Index into the job list passed to [`AdaptiveBatcher::run`].
    pub job: usize,
    pub region: Region,
    pub block_count: u64,
    /// Ceiling in force when the chunk was carved.
    pub chunk_limit: u64,
    pub result: CommandResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedChunk {
    pub job: usize,
    pub region: Region,
    pub kind: ErrorKind,
    pub detail: String,
    /// False when the range was never sent (run aborted or stopped).
    pub sent: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRun {
    pub dispatched: Vec<ChunkDispatch>,
    pub unresolved: Vec<UnresolvedChunk>,
    pub final_chunk_size: u64,
    pub aborted: bool,
}

impl BatchRun {
    pub fn successful(&self) -> impl Iterator<Item = &ChunkDispatch> {
        self.dispatched.iter().filter(|chunk| chunk.result.success)
    }

    pub fn job_failed(&self, job: usize) -> bool {
        self.unresolved.iter().any(|chunk| chunk.job == job)
    }
}

/// Cooperative stop flag. Checked between chunks; a chunk already sent is
/// always waited for. A stop is never undone, so one raised before a run
/// starts halts it before the first chunk.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AdaptiveBatcher {
    state: ChunkSizeState,
    tuning: Tuning,
    max_requeues: u32,
    stats: PerformanceStats,
    stop: StopHandle,
}

impl AdaptiveBatcher {
    pub fn new(config: &BatchConfig, command_timeout: Duration) -> Self {
        let state = ChunkSizeState::from_config(config);
        let stats = PerformanceStats::new(state.size);
        Self {
            state,
            tuning: Tuning::from_config(config, command_timeout),
            max_requeues: config.max_requeues,
            stats,
            stop: StopHandle::default(),
        }
    }

    pub fn state(&self) -> &ChunkSizeState {
        &self.state
    }

    pub fn stats(&self) -> &PerformanceStats {
        &self.stats
    }

    pub fn chunk_size(&self) -> u64 {
        self.state.size
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn run_positions<T: Transport>(
        &mut self,
        executor: &CommandExecutor<T>,
        positions: &[BlockPos],
        block: &BlockId,
    ) -> BatchRun {
        let jobs = FillJob::from_positions(positions, block);
        self.run(executor, &jobs).await
    }

    /// Dispatches every job, one chunk at a time. Failed chunks are re-queued
    /// at the (now smaller) size up to `max_requeues` times and then reported
    /// as unresolved; the run carries on with the rest. Only a rejected
    /// password aborts it.
    pub async fn run<T: Transport>(
        &mut self,
        executor: &CommandExecutor<T>,
        jobs: &[FillJob],
    ) -> BatchRun {
        let mut queue: VecDeque<Pending> = jobs
            .iter()
            .enumerate()
            .map(|(job, fill)| Pending {
                job,
                region: fill.region,
                requeues: 0,
            })
            .collect();
        let mut run = BatchRun::default();

        while let Some(chunk) = carve(&mut queue, self.state.size) {
            if self.stop.is_stopped() {
                queue.push_front(chunk);
                record_unsent(&mut run, &mut queue, ErrorKind::PartialBatchFailure, "stopped before dispatch");
                break;
            }

            let limit = self.state.size;
            let blocks = chunk.region.volume();
            let command = ConsoleCommand::fill(chunk.region, jobs[chunk.job].block.clone()).to_string();
            let result = executor.run(&command).await;

            let observation = ChunkObservation {
                blocks,
                elapsed: result.latency,
                success: result.success,
            };
            match self.state.observe(&observation, &self.tuning) {
                Adjustment::Grew { from, to } => {
                    debug!(from, to, bps = observation.blocks_per_second(), "batch.chunk_size.grow")
                }
                Adjustment::Shrank { from, to } => {
                    info!(from, to, success = result.success, "batch.chunk_size.shrink")
                }
                Adjustment::Held => {}
            }
            self.stats
                .record_chunk(blocks, result.latency, result.success, self.state.size);

            if !result.success {
                let error = result.error.clone();
                let kind = error.as_ref().map(|e| e.kind).unwrap_or(ErrorKind::Protocol);
                let detail = error.map(|e| e.detail).unwrap_or_default();
                match kind {
                    ErrorKind::Authentication => {
                        run.unresolved.push(UnresolvedChunk {
                            job: chunk.job,
                            region: chunk.region,
                            kind,
                            detail,
                            sent: true,
                        });
                        record_unsent(&mut run, &mut queue, kind, "not sent: authentication rejected");
                        run.aborted = true;
                        run.dispatched.push(ChunkDispatch {
                            job: chunk.job,
                            region: chunk.region,
                            block_count: blocks,
                            chunk_limit: limit,
                            result,
                        });
                        break;
                    }
                    ErrorKind::Connection | ErrorKind::ServerBusyOrTimeout | ErrorKind::LimitExceeded
                        if chunk.requeues < self.max_requeues =>
                    {
                        warn!(
                            region = %chunk.region,
                            requeues = chunk.requeues + 1,
                            chunk_size = self.state.size,
                            "batch.chunk_requeued"
                        );
                        queue.push_front(Pending {
                            requeues: chunk.requeues + 1,
                            ..chunk
                        });
                    }
                    _ => {
                        warn!(region = %chunk.region, %kind, detail = %detail, "batch.chunk_unresolved");
                        run.unresolved.push(UnresolvedChunk {
                            job: chunk.job,
                            region: chunk.region,
                            kind,
                            detail,
                            sent: true,
                        });
                    }
                }
            }

            run.dispatched.push(ChunkDispatch {
                job: chunk.job,
                region: chunk.region,
                block_count: blocks,
                chunk_limit: limit,
                result,
            });
        }

        run.final_chunk_size = self.state.size;
        info!(
            chunks = run.dispatched.len(),
            unresolved = run.unresolved.len(),
            final_chunk_size = run.final_chunk_size,
            bps = self.stats.blocks_per_second() as u64,
            "batch.completed"
        );
        run
    }
}

fn record_unsent(run: &mut BatchRun, queue: &mut VecDeque<Pending>, kind: ErrorKind, detail: &str) {
    for pending in queue.drain(..) {
        run.unresolved.push(UnresolvedChunk {
            job: pending.job,
            region: pending.region,
            kind,
            detail: detail.to_string(),
            sent: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ResponseClassifier;
    use crate::config::RetryPolicy;
    use crate::testing::{Reply, ScriptedTransport};
    use proptest::prelude::*;

    fn region(a: (i32, i32, i32), b: (i32, i32, i32)) -> Region {
        Region::new(BlockPos::new(a.0, a.1, a.2), BlockPos::new(b.0, b.1, b.2))
    }

    fn config() -> BatchConfig {
        BatchConfig {
            initial_chunk_size: 1000,
            min_chunk_size: 10,
            max_chunk_size: 8000,
            growth_factor: 2.0,
            shrink_factor: 2.0,
            high_water_blocks_per_sec: 10_000.0,
            low_water_blocks_per_sec: 100.0,
            growth_streak: 2,
            max_requeues: 2,
        }
    }

    fn tuning() -> Tuning {
        Tuning::from_config(&config(), Duration::from_secs(10))
    }

    fn executor(transport: ScriptedTransport) -> CommandExecutor<ScriptedTransport> {
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay_ms: 1,
            backoff_factor: 2.0,
            timeout_ms: 1_000,
        };
        CommandExecutor::new(transport, policy, ResponseClassifier::default())
    }

    fn fast(blocks: u64) -> ChunkObservation {
        ChunkObservation {
            blocks,
            elapsed: Duration::from_millis(1),
            success: true,
        }
    }

    #[test]
    fn grows_after_streak_of_fast_chunks() {
        let mut state = ChunkSizeState::from_config(&config());
        assert_eq!(state.observe(&fast(1000), &tuning()), Adjustment::Held);
        assert_eq!(
            state.observe(&fast(1000), &tuning()),
            Adjustment::Grew { from: 1000, to: 2000 }
        );
        for _ in 0..10 {
            state.observe(&fast(state.size), &tuning());
        }
        assert_eq!(state.size, 8000, "growth stops at max");
    }

    #[test]
    fn failure_shrinks_and_resets_streak() {
        let mut state = ChunkSizeState::from_config(&config());
        state.observe(&fast(1000), &tuning());
        let failed = ChunkObservation {
            blocks: 1000,
            elapsed: Duration::from_millis(5),
            success: false,
        };
        assert_eq!(
            state.observe(&failed, &tuning()),
            Adjustment::Shrank { from: 1000, to: 500 }
        );
        assert_eq!(state.consecutive_successes, 0);
        assert_eq!(state.consecutive_failures, 1);
        for _ in 0..10 {
            state.observe(&failed, &tuning());
        }
        assert_eq!(state.size, 10, "shrink stops at min");
    }

    #[test]
    fn slow_or_sluggish_chunks_shrink() {
        let mut state = ChunkSizeState::from_config(&config());
        let slow = ChunkObservation {
            blocks: 1000,
            elapsed: Duration::from_secs(20),
            success: true,
        };
        assert!(matches!(state.observe(&slow, &tuning()), Adjustment::Shrank { .. }));

        let mut state = ChunkSizeState::from_config(&config());
        let sluggish = ChunkObservation {
            blocks: 1000,
            elapsed: Duration::from_secs(4),
            success: true,
        };
        assert_eq!(
            state.observe(&sluggish, &tuning()),
            Adjustment::Shrank { from: 1000, to: 500 }
        );
    }

    #[test]
    fn small_leftover_chunks_do_not_drive_growth() {
        let mut state = ChunkSizeState::from_config(&config());
        for _ in 0..5 {
            assert_eq!(state.observe(&fast(3), &tuning()), Adjustment::Held);
        }
        assert_eq!(state.size, 1000);
    }

    #[test]
    fn partition_slices_longest_axis_first() {
        let chunks = partition(region((0, 0, 0), (99, 9, 9)), 300);
        assert_eq!(chunks.len(), 34);
        assert_eq!(chunks[0], region((0, 0, 0), (2, 9, 9)));
        assert_eq!(chunks[1], region((3, 0, 0), (5, 9, 9)));
        assert!(chunks.iter().all(|c| c.volume() <= 300));
        assert_eq!(chunks.iter().map(Region::volume).sum::<u64>(), 10_000);
    }

    #[test]
    fn partition_handles_cross_sections_larger_than_ceiling() {
        let chunks = partition(region((0, 0, 0), (49, 49, 49)), 20);
        assert!(chunks.iter().all(|c| c.volume() <= 20));
        assert_eq!(chunks.iter().map(Region::volume).sum::<u64>(), 125_000);
    }

    proptest! {
        #[test]
        fn partition_covers_region_within_ceiling(
            dx in 1i32..40, dy in 1i32..40, dz in 1i32..40, size in 1u64..5000
        ) {
            let r = region((0, 0, 0), (dx - 1, dy - 1, dz - 1));
            let chunks = partition(r, size);
            prop_assert!(chunks.iter().all(|c| c.volume() <= size));
            prop_assert!(chunks.iter().all(|c| r.contains_region(c)));
            prop_assert_eq!(chunks.iter().map(Region::volume).sum::<u64>(), r.volume());
            for (i, a) in chunks.iter().enumerate() {
                for b in &chunks[i + 1..] {
                    prop_assert!(!a.intersects(b));
                }
            }
        }

        #[test]
        fn chunk_size_stays_within_bounds(outcomes in proptest::collection::vec((any::<bool>(), 1u64..20_000, 0u64..30_000), 1..200)) {
            let mut state = ChunkSizeState::from_config(&config());
            for (success, blocks, millis) in outcomes {
                state.observe(&ChunkObservation {
                    blocks,
                    elapsed: Duration::from_millis(millis),
                    success,
                }, &tuning());
                prop_assert!(state.size >= state.min && state.size <= state.max);
            }
        }
    }

    #[tokio::test]
    async fn run_dispatches_sequential_chunks_within_limit() {
        let transport = ScriptedTransport::repeating(Reply::text("Successfully filled 1 block(s)"));
        let log = transport.sent_log();
        let exec = executor(transport);
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let jobs = vec![FillJob::new(region((0, 0, 0), (99, 99, 9)), BlockId::air())];
        let run = batcher.run(&exec, &jobs).await;

        assert!(run.unresolved.is_empty());
        assert!(run.dispatched.iter().all(|c| c.block_count <= c.chunk_limit));
        assert!(run.dispatched.iter().all(|c| c.block_count <= config().max_chunk_size));
        assert_eq!(run.dispatched.iter().map(|c| c.block_count).sum::<u64>(), 100_000);
        assert_eq!(log.lock().unwrap().len(), run.dispatched.len());
        assert!(run.final_chunk_size > 1000, "fast server should let the ceiling grow");
        assert_eq!(batcher.stats().operations, run.dispatched.len() as u64);
    }

    #[tokio::test]
    async fn failed_chunk_requeued_at_smaller_size() {
        let exec = executor(ScriptedTransport::with_handler(|cmd| {
            if cmd.starts_with("fill 0 0 0 9 9 9") {
                Reply::text("Too many blocks in the specified area (maximum 500, specified 1000)")
            } else {
                Reply::text("Successfully filled 500 block(s)")
            }
        }));
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let jobs = vec![FillJob::new(region((0, 0, 0), (9, 9, 9)), BlockId::air())];
        let run = batcher.run(&exec, &jobs).await;

        assert!(run.unresolved.is_empty());
        assert_eq!(run.dispatched.len(), 3);
        assert!(!run.dispatched[0].result.success);
        assert_eq!(run.dispatched[1].block_count, 500);
        assert_eq!(run.dispatched[1].chunk_limit, 500);
        assert_eq!(run.successful().map(|c| c.block_count).sum::<u64>(), 1000);
    }

    #[tokio::test]
    async fn persistent_failures_become_unresolved_and_run_continues() {
        let exec = executor(ScriptedTransport::with_handler(|cmd| {
            if cmd.contains("minecraft:stone") {
                Reply::text("Server is busy")
            } else {
                Reply::text("Successfully filled 8 block(s)")
            }
        }));
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let jobs = vec![
            FillJob::new(region((0, 0, 0), (1, 1, 1)), BlockId::new("stone")),
            FillJob::new(region((5, 0, 0), (6, 1, 1)), BlockId::air()),
        ];
        let run = batcher.run(&exec, &jobs).await;

        assert_eq!(run.unresolved.len(), 1);
        let unresolved = &run.unresolved[0];
        assert_eq!(unresolved.job, 0);
        assert_eq!(unresolved.kind, ErrorKind::Connection);
        assert!(unresolved.sent);
        assert!(run.job_failed(0));
        assert!(!run.job_failed(1));
        assert_eq!(run.successful().count(), 1);
        // first attempt + max_requeues
        assert_eq!(run.dispatched.iter().filter(|c| c.job == 0).count(), 3);
    }

    #[tokio::test]
    async fn rejected_password_aborts_remaining_work() {
        let exec = executor(ScriptedTransport::rejecting_auth());
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let jobs = vec![
            FillJob::new(region((0, 0, 0), (1, 1, 1)), BlockId::air()),
            FillJob::new(region((5, 0, 0), (6, 1, 1)), BlockId::air()),
        ];
        let run = batcher.run(&exec, &jobs).await;
        assert!(run.aborted);
        assert_eq!(run.dispatched.len(), 1);
        assert_eq!(run.unresolved.len(), 2);
        assert!(run.unresolved.iter().all(|u| u.kind == ErrorKind::Authentication));
        assert!(!run.unresolved[1].sent);
    }

    #[tokio::test]
    async fn stop_handle_halts_before_next_chunk() {
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let stop = batcher.stop_handle();
        let exec = executor(ScriptedTransport::with_handler(move |_| {
            stop.stop();
            Reply::text("Successfully filled 8 block(s)")
        }));
        let jobs = vec![
            FillJob::new(region((0, 0, 0), (1, 1, 1)), BlockId::air()),
            FillJob::new(region((5, 0, 0), (6, 1, 1)), BlockId::air()),
        ];
        let run = batcher.run(&exec, &jobs).await;
        assert_eq!(run.dispatched.len(), 1);
        assert!(!run.aborted);
        assert_eq!(run.unresolved.len(), 1);
        assert_eq!(run.unresolved[0].job, 1);
        assert_eq!(run.unresolved[0].kind, ErrorKind::PartialBatchFailure);
        assert!(!run.unresolved[0].sent);
    }

    #[tokio::test]
    async fn stop_raised_before_run_sends_nothing() {
        let transport = ScriptedTransport::repeating(Reply::text("Successfully filled 8 block(s)"));
        let log = transport.sent_log();
        let exec = executor(transport);
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        batcher.stop_handle().stop();
        let jobs = vec![
            FillJob::new(region((0, 0, 0), (1, 1, 1)), BlockId::air()),
            FillJob::new(region((5, 0, 0), (6, 1, 1)), BlockId::air()),
        ];
        let run = batcher.run(&exec, &jobs).await;
        assert!(run.dispatched.is_empty());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(run.unresolved.len(), 2);
        assert!(run.unresolved.iter().all(|u| !u.sent && u.kind == ErrorKind::PartialBatchFailure));
    }

    #[tokio::test]
    async fn scattered_positions_are_filled_as_runs() {
        let transport = ScriptedTransport::repeating(Reply::text("Successfully filled 2 block(s)"));
        let log = transport.sent_log();
        let exec = executor(transport);
        let mut batcher = AdaptiveBatcher::new(&config(), Duration::from_secs(10));
        let positions = [
            BlockPos::new(0, 64, 0),
            BlockPos::new(1, 64, 0),
            BlockPos::new(7, 64, 3),
        ];
        let run = batcher
            .run_positions(&exec, &positions, &BlockId::new("dirt"))
            .await;
        assert!(run.unresolved.is_empty());
        assert_eq!(run.dispatched.len(), 2);
        let sent = log.lock().unwrap().clone();
        assert_eq!(sent[0], "fill 0 64 0 1 64 0 minecraft:dirt");
        assert_eq!(sent[1], "fill 7 64 3 7 64 3 minecraft:dirt");
    }

    #[test]
    fn positions_become_runs() {
        let jobs = FillJob::from_positions(
            &[
                BlockPos::new(0, 0, 0),
                BlockPos::new(1, 0, 0),
                BlockPos::new(3, 0, 0),
            ],
            &BlockId::new("dirt"),
        );
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].region.volume(), 2);
    }
}
