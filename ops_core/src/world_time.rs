use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

pub const TICKS_PER_DAY: u32 = 24_000;

/// Rule that freezes the day/night clock when false.
pub const DAYLIGHT_RULE: &str = "doDaylightCycle";

/// Time argument of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Day,
    Noon,
    Sunset,
    Night,
    Midnight,
    Sunrise,
    Ticks(u32),
}

impl TimeOfDay {
    pub fn ticks(&self) -> u32 {
        match self {
            TimeOfDay::Day => 1_000,
            TimeOfDay::Noon => 6_000,
            TimeOfDay::Sunset => 12_000,
            TimeOfDay::Night => 13_000,
            TimeOfDay::Midnight => 18_000,
            TimeOfDay::Sunrise => 23_000,
            TimeOfDay::Ticks(ticks) => *ticks,
        }
    }

    /// Ticks that still count as this time of day. A raw tick count only
    /// accepts itself.
    pub fn window(&self) -> Range<u32> {
        match self {
            TimeOfDay::Day | TimeOfDay::Noon => 0..12_000,
            TimeOfDay::Sunset => 12_000..13_000,
            TimeOfDay::Night | TimeOfDay::Midnight => 13_000..23_000,
            TimeOfDay::Sunrise => 23_000..TICKS_PER_DAY,
            TimeOfDay::Ticks(ticks) => *ticks..ticks + 1,
        }
    }

    pub fn contains(&self, ticks: u32) -> bool {
        self.window().contains(&(ticks % TICKS_PER_DAY))
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let time = match normalized.as_str() {
            "day" => TimeOfDay::Day,
            "noon" => TimeOfDay::Noon,
            "sunset" => TimeOfDay::Sunset,
            "night" => TimeOfDay::Night,
            "midnight" => TimeOfDay::Midnight,
            "sunrise" => TimeOfDay::Sunrise,
            other => match other.parse::<u32>() {
                Ok(ticks) if ticks < TICKS_PER_DAY => TimeOfDay::Ticks(ticks),
                _ => return Err(ValidationError::UnknownTime(raw.to_string())),
            },
        };
        Ok(time)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Day => f.write_str("day"),
            TimeOfDay::Noon => f.write_str("noon"),
            TimeOfDay::Sunset => f.write_str("sunset"),
            TimeOfDay::Night => f.write_str("night"),
            TimeOfDay::Midnight => f.write_str("midnight"),
            TimeOfDay::Sunrise => f.write_str("sunrise"),
            TimeOfDay::Ticks(ticks) => write!(f, "{ticks}"),
        }
    }
}

/// Progress of a time lock. `Locked` and `Released` are only reached once
/// the rule's stored value has been read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPhase {
    Unlocked,
    TimeSet,
    Locked,
    Released,
    Failed,
}

impl fmt::Display for LockPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockPhase::Unlocked => "unlocked",
            LockPhase::TimeSet => "time_set",
            LockPhase::Locked => "locked",
            LockPhase::Released => "released",
            LockPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}
