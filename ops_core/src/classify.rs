//! Rule-driven interpretation of free-text console responses.
//!
//! Servers never acknowledge a command structurally; the only signal is the
//! text they send back. A [`ResponseClassifier`] walks an ordered list of
//! `(pattern, outcome)` rules and the first match decides. Supporting another
//! server dialect means adding rules, not code.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// What a response says about the command that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Outcome {
    Applied,
    /// Accepted, but the server reports nothing changed.
    Unchanged,
    /// A test or query command answered "no".
    Negative,
    Failed(ErrorKind),
}

impl Outcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Outcome::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => f.write_str("applied"),
            Outcome::Unchanged => f.write_str("unchanged"),
            Outcome::Negative => f.write_str("negative"),
            Outcome::Failed(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown outcome '{0}'")]
pub struct UnknownOutcome(String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let outcome = match value.trim().to_ascii_lowercase().as_str() {
            "applied" | "success" => Outcome::Applied,
            "unchanged" | "noop" => Outcome::Unchanged,
            "negative" => Outcome::Negative,
            "validation" => Outcome::Failed(ErrorKind::Validation),
            "partial_batch_failure" => Outcome::Failed(ErrorKind::PartialBatchFailure),
            "connection" => Outcome::Failed(ErrorKind::Connection),
            "authentication" => Outcome::Failed(ErrorKind::Authentication),
            "protocol" => Outcome::Failed(ErrorKind::Protocol),
            "server_busy_or_timeout" | "busy" | "timeout" => {
                Outcome::Failed(ErrorKind::ServerBusyOrTimeout)
            }
            "command_rejected" | "rejected" => Outcome::Failed(ErrorKind::CommandRejected),
            "limit_exceeded" => Outcome::Failed(ErrorKind::LimitExceeded),
            other => return Err(UnknownOutcome(other.to_string())),
        };
        Ok(outcome)
    }
}

impl TryFrom<String> for Outcome {
    type Error = UnknownOutcome;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Outcome> for String {
    fn from(value: Outcome) -> Self {
        value.to_string()
    }
}

/// Serialisable form of a rule, as it appears in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub pattern: String,
    pub outcome: Outcome,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid classifier pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pattern: Regex,
    outcome: Outcome,
}

impl ClassificationRule {
    /// Compiles a case-insensitive rule. A named group `count` marks the number
    /// of blocks the server says it changed.
    pub fn new(pattern: &str, outcome: Outcome) -> Result<Self, RuleError> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self { pattern, outcome })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }
}

/// Result of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    /// Pattern of the matching rule; `None` when nothing matched.
    pub rule: Option<String>,
    pub count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    rules: Vec<ClassificationRule>,
}

const MINECRAFT_JAVA_RULES: &[(&str, &str)] = &[
    (r"unknown or incomplete command", "command_rejected"),
    (r"incorrect argument for command", "command_rejected"),
    (r"unknown block type|invalid block|expected (?:whitespace|integer|value)", "command_rejected"),
    (r"too many blocks in the specified area", "limit_exceeded"),
    (r"position is not loaded|cannot place blocks outside of the world", "command_rejected"),
    (r"server is (?:busy|overloaded)|try again later|rate limit", "server_busy_or_timeout"),
    (r"no blocks were filled|could not set the block", "unchanged"),
    (r"successfully filled (?P<count>\d+) block", "applied"),
    (r"(?P<count>\d+) blocks? (?:were )?filled", "applied"),
    (r"changed the block", "applied"),
    (r"test passed", "applied"),
    (r"test failed", "negative"),
    (r"set the time to \d+", "applied"),
    (r"the time is \d+", "applied"),
    (r"gamerule \S+ is (?:now|currently) set to", "applied"),
    (r"^\s*$", "applied"),
];

impl ResponseClassifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Rules for vanilla Java Edition servers.
    pub fn minecraft_java() -> Self {
        let rules = MINECRAFT_JAVA_RULES
            .iter()
            .map(|(pattern, outcome)| {
                let outcome = outcome.parse().expect("builtin outcome names are valid");
                ClassificationRule::new(pattern, outcome).expect("builtin patterns compile")
            })
            .collect();
        Self { rules }
    }

    /// Builtin dialect with `extra` rules placed in front, so deployments can
    /// override the stock wording.
    pub fn with_overrides(extra: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut rules = extra
            .iter()
            .map(|spec| ClassificationRule::new(&spec.pattern, spec.outcome))
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(Self::minecraft_java().rules);
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, response: &str) -> Classification {
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(response) {
                let count = captures
                    .name("count")
                    .and_then(|m| m.as_str().parse::<u64>().ok());
                return Classification {
                    outcome: rule.outcome,
                    rule: Some(rule.pattern().to_string()),
                    count,
                };
            }
        }
        Classification {
            outcome: Outcome::Failed(ErrorKind::Protocol),
            rule: None,
            count: None,
        }
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::minecraft_java()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_response_carries_count() {
        let classifier = ResponseClassifier::minecraft_java();
        let result = classifier.classify("Successfully filled 4096 block(s)");
        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.count, Some(4096));

        let legacy = classifier.classify("27 blocks filled");
        assert_eq!(legacy.count, Some(27));
    }

    #[test]
    fn no_change_is_not_a_failure() {
        let classifier = ResponseClassifier::minecraft_java();
        let result = classifier.classify("No blocks were filled");
        assert_eq!(result.outcome, Outcome::Unchanged);
        assert!(result.outcome.is_success());
    }

    #[test]
    fn rejections_are_fatal_kinds() {
        let classifier = ResponseClassifier::minecraft_java();
        assert_eq!(
            classifier
                .classify("Unknown or incomplete command, see below for error")
                .outcome,
            Outcome::Failed(ErrorKind::CommandRejected)
        );
        assert_eq!(
            classifier
                .classify("Too many blocks in the specified area (maximum 32768, specified 65536)")
                .outcome,
            Outcome::Failed(ErrorKind::LimitExceeded)
        );
        assert_eq!(
            classifier.classify("Server is busy, try again later").outcome,
            Outcome::Failed(ErrorKind::ServerBusyOrTimeout)
        );
    }

    #[test]
    fn unmatched_text_is_protocol_error() {
        let classifier = ResponseClassifier::minecraft_java();
        let result = classifier.classify("¯\\_(ツ)_/¯");
        assert_eq!(result.outcome, Outcome::Failed(ErrorKind::Protocol));
        assert!(result.rule.is_none());
    }

    #[test]
    fn overrides_run_before_builtin_rules() {
        let classifier = ResponseClassifier::with_overrides(&[RuleSpec {
            pattern: r"^ok (?P<count>\d+)$".to_string(),
            outcome: Outcome::Applied,
        }])
        .unwrap();
        let result = classifier.classify("OK 12");
        assert_eq!(result.outcome, Outcome::Applied);
        assert_eq!(result.count, Some(12));
        assert_eq!(
            classifier.classify("Test failed").outcome,
            Outcome::Negative
        );
    }

    #[test]
    fn rule_specs_parse_from_json() {
        let specs: Vec<RuleSpec> = serde_json::from_str(
            r#"[{"pattern":"veuillez patienter","outcome":"server_busy_or_timeout"}]"#,
        )
        .unwrap();
        assert_eq!(
            specs[0].outcome,
            Outcome::Failed(ErrorKind::ServerBusyOrTimeout)
        );
        assert!(serde_json::from_str::<RuleSpec>(r#"{"pattern":"x","outcome":"maybe"}"#).is_err());
    }

    #[test]
    fn invalid_pattern_reported() {
        let err = ClassificationRule::new("(unclosed", Outcome::Applied).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }
}
