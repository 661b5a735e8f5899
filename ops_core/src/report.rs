//! Operator-facing results of the workflows. `Display` renders the report
//! text; `Serialize` backs the CLI's JSON output.

use std::fmt;

use serde::Serialize;

use crate::error::{CommandError, ErrorKind};
use crate::geometry::Region;
use crate::verify::{BlockVerification, RuleVerification};
use crate::world_time::LockPhase;

const DEGRADED_FILL_HINT: &str =
    "capture a terrain snapshot before building so cleared ground is restored with its original material";
const VERIFY_MISMATCH_HINT: &str =
    "re-run the clear; sampled positions did not hold the expected block after the write";
const TIME_DRIFT_HINT: &str =
    "another operator or plugin may be changing the time; re-run the lock and check doDaylightCycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Warning,
    Failure,
}

impl ReportStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            ReportStatus::Success => "[SUCCESS]",
            ReportStatus::Warning => "[WARNING]",
            ReportStatus::Failure => "[FAILURE]",
        }
    }

    pub fn is_failure(&self) -> bool {
        *self == ReportStatus::Failure
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Hint list without duplicates, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Hints(Vec<String>);

impl Hints {
    pub fn push(&mut self, hint: &str) {
        if !self.0.iter().any(|existing| existing == hint) {
            self.0.push(hint.to_string());
        }
    }

    pub fn push_kind(&mut self, kind: ErrorKind) {
        self.push(kind.remediation());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn write_to(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        writeln!(f, "  hints:")?;
        for hint in self.iter() {
            writeln!(f, "    - {hint}")?;
        }
        Ok(())
    }
}

/// A range a clear could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedRange {
    pub structure_id: String,
    pub region: Region,
    pub action: String,
    pub kind: ErrorKind,
    pub detail: String,
    pub sent: bool,
}

impl fmt::Display for UnresolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({}): {}",
            self.region, self.action, self.kind, self.structure_id, self.detail
        )?;
        if !self.sent {
            f.write_str(" [not sent]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearReport {
    pub status: ReportStatus,
    pub area: String,
    pub preserve_terrain: bool,
    pub structures_total: usize,
    pub structures_cleared: usize,
    pub blocks_removed: u64,
    pub blocks_filled: u64,
    pub blocks_filled_from_snapshot: u64,
    pub blocks_filled_default: u64,
    pub chunks_dispatched: usize,
    pub final_chunk_size: u64,
    pub elapsed_ms: u64,
    pub verification: Option<BlockVerification>,
    pub unresolved: Vec<UnresolvedRange>,
    /// Failure that stopped the clear outright.
    pub error: Option<CommandError>,
    pub hints: Hints,
}

impl ClearReport {
    /// Report for a clear that was refused before any command was sent.
    pub fn rejected(area: &str, preserve_terrain: bool, error: CommandError) -> Self {
        let mut report = Self::empty(area, preserve_terrain);
        report.error = Some(error);
        report.finish();
        report
    }

    pub(crate) fn empty(area: &str, preserve_terrain: bool) -> Self {
        Self {
            status: ReportStatus::Success,
            area: area.to_string(),
            preserve_terrain,
            structures_total: 0,
            structures_cleared: 0,
            blocks_removed: 0,
            blocks_filled: 0,
            blocks_filled_from_snapshot: 0,
            blocks_filled_default: 0,
            chunks_dispatched: 0,
            final_chunk_size: 0,
            elapsed_ms: 0,
            verification: None,
            unresolved: Vec::new(),
            error: None,
            hints: Hints::default(),
        }
    }

    /// Derives status and hints from the collected figures.
    pub(crate) fn finish(&mut self) {
        let mut hints = Hints::default();
        let verification_failed = self
            .verification
            .as_ref()
            .map(|verification| !verification.verified)
            .unwrap_or(false);

        self.status = if let Some(error) = &self.error {
            hints.push_kind(error.kind);
            ReportStatus::Failure
        } else if !self.unresolved.is_empty() {
            for range in &self.unresolved {
                hints.push_kind(range.kind);
            }
            hints.push_kind(ErrorKind::PartialBatchFailure);
            if self.structures_cleared == 0 && self.blocks_removed + self.blocks_filled == 0 {
                ReportStatus::Failure
            } else {
                ReportStatus::Warning
            }
        } else if verification_failed || self.blocks_filled_default > 0 {
            ReportStatus::Warning
        } else {
            ReportStatus::Success
        };

        if verification_failed {
            hints.push(VERIFY_MISMATCH_HINT);
        }
        if self.blocks_filled_default > 0 {
            hints.push(DEGRADED_FILL_HINT);
        }
        self.hints = hints;
    }
}

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} clear area={} preserve_terrain={}",
            self.status, self.area, self.preserve_terrain
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "  error: {error}")?;
        }
        writeln!(
            f,
            "  structures cleared: {}/{}",
            self.structures_cleared, self.structures_total
        )?;
        writeln!(f, "  blocks removed: {}", self.blocks_removed)?;
        writeln!(
            f,
            "  blocks filled: {} (snapshot {}, default {})",
            self.blocks_filled, self.blocks_filled_from_snapshot, self.blocks_filled_default
        )?;
        writeln!(
            f,
            "  chunks dispatched: {} (final chunk size {})",
            self.chunks_dispatched, self.final_chunk_size
        )?;
        if let Some(verification) = &self.verification {
            writeln!(
                f,
                "  verification: {}/{} samples matched",
                verification.matched, verification.sampled
            )?;
            for failure in &verification.failures {
                writeln!(
                    f,
                    "    {} expected {}: {}",
                    failure.pos, failure.expected, failure.detail
                )?;
            }
        }
        writeln!(f, "  elapsed: {} ms", self.elapsed_ms)?;
        if !self.unresolved.is_empty() {
            writeln!(f, "  unresolved ranges ({}):", self.unresolved.len())?;
            for range in &self.unresolved {
                writeln!(f, "    {range}")?;
            }
        }
        self.hints.write_to(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeLockReport {
    pub status: ReportStatus,
    pub time: String,
    pub target_ticks: Option<u32>,
    pub enabled: bool,
    pub phase: LockPhase,
    pub rule: Option<RuleVerification>,
    pub observed_time: Option<u32>,
    pub in_range: Option<bool>,
    pub error: Option<CommandError>,
    pub hints: Hints,
}

impl TimeLockReport {
    pub fn rejected(time: &str, enabled: bool, error: CommandError) -> Self {
        let mut report = Self::new(time, None, enabled);
        report.phase = LockPhase::Failed;
        report.error = Some(error);
        report.finish();
        report
    }

    pub(crate) fn new(time: &str, target_ticks: Option<u32>, enabled: bool) -> Self {
        Self {
            status: ReportStatus::Success,
            time: time.to_string(),
            target_ticks,
            enabled,
            phase: LockPhase::Unlocked,
            rule: None,
            observed_time: None,
            in_range: None,
            error: None,
            hints: Hints::default(),
        }
    }

    pub(crate) fn finish(&mut self) {
        let mut hints = Hints::default();
        self.status = match self.phase {
            LockPhase::Locked | LockPhase::Released => {
                if self.in_range == Some(false) {
                    hints.push(TIME_DRIFT_HINT);
                    ReportStatus::Warning
                } else if self.observed_time.is_none() {
                    hints.push_kind(ErrorKind::Protocol);
                    ReportStatus::Warning
                } else {
                    ReportStatus::Success
                }
            }
            _ => {
                let kind = self
                    .error
                    .as_ref()
                    .map(|error| error.kind)
                    .unwrap_or(ErrorKind::Protocol);
                hints.push_kind(kind);
                ReportStatus::Failure
            }
        };
        self.hints = hints;
    }
}

impl fmt::Display for TimeLockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.enabled { "lock" } else { "unlock" };
        writeln!(f, "{} {mode} time={}", self.status, self.time)?;
        if let Some(ticks) = self.target_ticks {
            writeln!(f, "  target ticks: {ticks}")?;
        }
        writeln!(f, "  phase: {}", self.phase)?;
        if let Some(rule) = &self.rule {
            writeln!(
                f,
                "  doDaylightCycle: expected {}, observed {}",
                rule.expected,
                rule.observed.as_deref().unwrap_or("<none>")
            )?;
        }
        if let Some(observed) = self.observed_time {
            let note = match self.in_range {
                Some(false) => " (outside requested range)",
                _ => "",
            };
            writeln!(f, "  current time: {observed}{note}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  error: {error}")?;
        }
        self.hints.write_to(f)
    }
}
