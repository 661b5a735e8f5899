//! Read-back checks that stand in for the acknowledgement the protocol lacks.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::blocks::BlockId;
use crate::classify::Outcome;
use crate::commands::ConsoleCommand;
use crate::config::VerificationConfig;
use crate::error::{CommandError, ErrorKind};
use crate::executor::CommandExecutor;
use crate::geometry::{BlockPos, Region};
use crate::transport::Transport;

/// State a read-back should find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Block { pos: BlockPos, block: BlockId },
    Rule { name: String, value: String },
}

impl Expectation {
    pub fn block(pos: BlockPos, block: BlockId) -> Self {
        Expectation::Block { pos, block }
    }

    pub fn rule(name: &str, value: impl fmt::Display) -> Self {
        Expectation::Rule {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn query(&self) -> ConsoleCommand {
        match self {
            Expectation::Block { pos, block } => ConsoleCommand::TestBlock {
                pos: *pos,
                block: block.clone(),
            },
            Expectation::Rule { name, .. } => ConsoleCommand::query_rule(name),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Block { pos, block } => write!(f, "{block} at {pos}"),
            Expectation::Rule { name, value } => write!(f, "{name}={value}"),
        }
    }
}

pub(crate) struct ReadBack {
    pub matched: bool,
    pub observed: Option<String>,
    pub error: Option<CommandError>,
    pub latency: Duration,
}

/// Issues the query for `expectation` through the executor's retry loop
/// (never its verifying entry point) and compares.
pub(crate) async fn read_back<T: Transport>(
    executor: &CommandExecutor<T>,
    expectation: &Expectation,
    timeout: Duration,
) -> ReadBack {
    let query = expectation.query().to_string();
    let result = executor.dispatch(&query, timeout).await;
    if !result.success {
        return ReadBack {
            matched: false,
            observed: None,
            error: result.error,
            latency: result.latency,
        };
    }
    let (matched, observed) = match expectation {
        Expectation::Block { .. } => {
            let matched = result.outcome == Some(Outcome::Applied);
            (matched, Some(result.response.trim().to_string()))
        }
        Expectation::Rule { value, .. } => {
            let observed = parse_rule_value(&result.response);
            let matched = observed
                .as_deref()
                .map(|seen| seen == value.as_str())
                .unwrap_or(false);
            (matched, observed.or_else(|| Some(result.response.trim().to_string())))
        }
    };
    ReadBack {
        matched,
        observed,
        error: None,
        latency: result.latency,
    }
}

fn rule_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)set to:?\s*(\S+)").expect("rule value pattern compiles"))
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)the time is (\d+)").expect("time pattern compiles"))
}

/// Extracts `<value>` from "... is currently set to: <value>".
pub fn parse_rule_value(response: &str) -> Option<String> {
    rule_value_pattern()
        .captures(response)
        .map(|captures| captures[1].trim_end_matches('.').to_string())
}

/// Extracts the tick count from "The time is <n>".
pub fn parse_time(response: &str) -> Option<u32> {
    time_pattern()
        .captures(response)
        .and_then(|captures| captures[1].parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleFailure {
    pub pos: BlockPos,
    pub expected: BlockId,
    /// Set when the query itself failed rather than disagreeing.
    pub kind: Option<ErrorKind>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockVerification {
    pub verified: bool,
    pub sampled: u32,
    pub matched: u32,
    pub failures: Vec<SampleFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleVerification {
    pub verified: bool,
    pub expected: String,
    pub observed: Option<String>,
    pub error: Option<CommandError>,
}

/// Spot checks for bulk writes and exact checks for settings.
pub struct VerificationProbe<'a, T: Transport> {
    executor: &'a CommandExecutor<T>,
    config: VerificationConfig,
}

impl<'a, T: Transport> VerificationProbe<'a, T> {
    pub fn new(executor: &'a CommandExecutor<T>, config: VerificationConfig) -> Self {
        Self { executor, config }
    }

    /// Positions to test for a set of written regions: `ceil(blocks * rate)`
    /// samples capped at `max_samples`, drawn uniformly over all written
    /// positions from a seeded generator.
    pub fn sample_positions(&self, written: &[(Region, BlockId)]) -> Vec<(BlockPos, BlockId)> {
        let total: u64 = written.iter().map(|(region, _)| region.volume()).sum();
        if total == 0 || self.config.sample_rate <= 0.0 || self.config.max_samples == 0 {
            return Vec::new();
        }
        let wanted = ((total as f64) * self.config.sample_rate).ceil() as u64;
        let count = wanted.clamp(1, self.config.max_samples as u64);

        let mut cumulative = Vec::with_capacity(written.len());
        let mut running = 0u64;
        for (region, _) in written {
            running += region.volume();
            cumulative.push(running);
        }

        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        (0..count)
            .map(|_| {
                let offset = rng.gen_range(0..total);
                let index = cumulative.partition_point(|end| *end <= offset);
                let start = if index == 0 { 0 } else { cumulative[index - 1] };
                let (region, block) = &written[index];
                (region.nth(offset - start), block.clone())
            })
            .collect()
    }

    pub async fn confirm_blocks(&self, written: &[(Region, BlockId)]) -> BlockVerification {
        let samples = self.sample_positions(written);
        let timeout = self.executor.policy().timeout();
        let mut verification = BlockVerification {
            verified: true,
            ..Default::default()
        };
        for (pos, block) in samples {
            verification.sampled += 1;
            let expectation = Expectation::block(pos, block.clone());
            let check = read_back(self.executor, &expectation, timeout).await;
            if check.matched {
                verification.matched += 1;
                continue;
            }
            verification.verified = false;
            let (kind, detail) = match check.error {
                Some(error) => (Some(error.kind), error.detail),
                None => (None, check.observed.unwrap_or_default()),
            };
            warn!(%pos, expected = %block, detail = %detail, "verify.block_mismatch");
            verification.failures.push(SampleFailure {
                pos,
                expected: block,
                kind,
                detail,
            });
        }
        info!(
            sampled = verification.sampled,
            matched = verification.matched,
            "verify.blocks"
        );
        verification
    }

    pub async fn confirm_rule(&self, name: &str, expected: impl fmt::Display) -> RuleVerification {
        let expected = expected.to_string();
        let expectation = Expectation::rule(name, &expected);
        let check = read_back(self.executor, &expectation, self.executor.policy().timeout()).await;
        RuleVerification {
            verified: check.matched,
            expected,
            observed: check.observed,
            error: check.error,
        }
    }

    pub async fn query_time(&self) -> Result<u32, CommandError> {
        let result = self
            .executor
            .dispatch(
                &ConsoleCommand::QueryTime.to_string(),
                self.executor.policy().timeout(),
            )
            .await;
        if let Some(error) = result.error {
            return Err(error);
        }
        parse_time(&result.response).ok_or_else(|| {
            CommandError::new(
                ErrorKind::Protocol,
                format!("could not read time from {:?}", result.response),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ResponseClassifier;
    use crate::config::RetryPolicy;
    use crate::testing::{Reply, ScriptedTransport};

    fn executor(transport: ScriptedTransport) -> CommandExecutor<ScriptedTransport> {
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay_ms: 1,
            backoff_factor: 2.0,
            timeout_ms: 500,
        };
        CommandExecutor::new(transport, policy, ResponseClassifier::default())
    }

    fn config(sample_rate: f64, max_samples: u32) -> VerificationConfig {
        VerificationConfig {
            sample_rate,
            max_samples,
            seed: 7,
        }
    }

    #[test]
    fn parses_rule_and_time_responses() {
        assert_eq!(
            parse_rule_value("Gamerule doDaylightCycle is currently set to: false").as_deref(),
            Some("false")
        );
        assert_eq!(parse_time("The time is 6000"), Some(6000));
        assert_eq!(parse_time("nope"), None);
    }

    #[test]
    fn sampling_is_bounded_and_inside_written_regions() {
        let exec = executor(ScriptedTransport::new(Vec::new()));
        let probe = VerificationProbe::new(&exec, config(0.5, 10));
        let a = Region::new(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        let b = Region::new(BlockPos::new(100, 0, 0), BlockPos::new(100, 0, 0));
        let written = vec![(a, BlockId::air()), (b, BlockId::new("dirt"))];
        let samples = probe.sample_positions(&written);
        assert_eq!(samples.len(), 10);
        for (pos, block) in &samples {
            let owner = written.iter().find(|(region, _)| region.contains(*pos)).unwrap();
            assert_eq!(&owner.1, block);
        }
        assert_eq!(samples, probe.sample_positions(&written), "seeded sampling is stable");
    }

    #[test]
    fn small_writes_still_get_one_sample() {
        let exec = executor(ScriptedTransport::new(Vec::new()));
        let probe = VerificationProbe::new(&exec, config(0.0001, 64));
        let region = Region::single(BlockPos::new(1, 1, 1));
        assert_eq!(probe.sample_positions(&[(region, BlockId::air())]).len(), 1);
        let probe = VerificationProbe::new(&exec, config(0.0, 64));
        assert!(probe.sample_positions(&[(region, BlockId::air())]).is_empty());
    }

    #[tokio::test]
    async fn mismatching_sample_reported() {
        let exec = executor(ScriptedTransport::new(vec![
            Reply::text("Test passed"),
            Reply::text("Test failed"),
        ]));
        let probe = VerificationProbe::new(&exec, config(1.0, 2));
        let region = Region::new(BlockPos::new(0, 0, 0), BlockPos::new(1, 0, 0));
        let result = probe.confirm_blocks(&[(region, BlockId::air())]).await;
        assert!(!result.verified);
        assert_eq!(result.sampled, 2);
        assert_eq!(result.matched, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].kind, None);
    }

    #[tokio::test]
    async fn rule_check_compares_exact_value() {
        let exec = executor(ScriptedTransport::new(vec![
            Reply::text("Gamerule doDaylightCycle is currently set to: false"),
            Reply::text("Gamerule doDaylightCycle is currently set to: true"),
        ]));
        let probe = VerificationProbe::new(&exec, config(0.1, 1));
        let ok = probe.confirm_rule("doDaylightCycle", false).await;
        assert!(ok.verified);
        let bad = probe.confirm_rule("doDaylightCycle", false).await;
        assert!(!bad.verified);
        assert_eq!(bad.observed.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn rule_value_case_must_match() {
        let exec = executor(ScriptedTransport::new(vec![Reply::text(
            "Gamerule doDaylightCycle is currently set to: TRUE",
        )]));
        let probe = VerificationProbe::new(&exec, config(0.1, 1));
        let check = probe.confirm_rule("doDaylightCycle", true).await;
        assert!(!check.verified);
        assert_eq!(check.observed.as_deref(), Some("TRUE"));
    }
}
