use std::fmt;

use crate::blocks::BlockId;
use crate::geometry::{BlockPos, Region};

/// Commands this crate knows how to phrase for a Java Edition console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Fill { region: Region, block: BlockId },
    SetBlock { pos: BlockPos, block: BlockId },
    TestBlock { pos: BlockPos, block: BlockId },
    SetTime { ticks: u32 },
    QueryTime,
    SetGameRule { name: String, value: String },
    QueryGameRule { name: String },
    Raw(String),
}

impl ConsoleCommand {
    pub fn fill(region: Region, block: BlockId) -> Self {
        if region.volume() == 1 {
            ConsoleCommand::SetBlock {
                pos: region.min(),
                block,
            }
        } else {
            ConsoleCommand::Fill { region, block }
        }
    }

    pub fn set_rule(name: &str, value: impl fmt::Display) -> Self {
        ConsoleCommand::SetGameRule {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn query_rule(name: &str) -> Self {
        ConsoleCommand::QueryGameRule {
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Fill { region, block } => {
                write!(f, "fill {} {} {}", region.min(), region.max(), block)
            }
            ConsoleCommand::SetBlock { pos, block } => write!(f, "setblock {} {}", pos, block),
            ConsoleCommand::TestBlock { pos, block } => {
                write!(f, "execute if block {} {}", pos, block)
            }
            ConsoleCommand::SetTime { ticks } => write!(f, "time set {}", ticks),
            ConsoleCommand::QueryTime => f.write_str("time query daytime"),
            ConsoleCommand::SetGameRule { name, value } => write!(f, "gamerule {} {}", name, value),
            ConsoleCommand::QueryGameRule { name } => write!(f, "gamerule {}", name),
            ConsoleCommand::Raw(text) => f.write_str(text.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_vanilla_syntax() {
        let region = Region::new(BlockPos::new(0, 60, 0), BlockPos::new(15, 70, -3));
        assert_eq!(
            ConsoleCommand::fill(region, BlockId::air()).to_string(),
            "fill 0 60 -3 15 70 0 minecraft:air"
        );
        assert_eq!(
            ConsoleCommand::fill(Region::single(BlockPos::new(1, 2, 3)), BlockId::new("dirt"))
                .to_string(),
            "setblock 1 2 3 minecraft:dirt"
        );
        assert_eq!(
            ConsoleCommand::TestBlock {
                pos: BlockPos::new(4, 64, 4),
                block: BlockId::air()
            }
            .to_string(),
            "execute if block 4 64 4 minecraft:air"
        );
        assert_eq!(
            ConsoleCommand::set_rule("doDaylightCycle", false).to_string(),
            "gamerule doDaylightCycle false"
        );
        assert_eq!(ConsoleCommand::SetTime { ticks: 1000 }.to_string(), "time set 1000");
    }
}
