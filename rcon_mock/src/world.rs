//! Simulated world state behind the mock console.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use ops_core::{BlockId, BlockPos, Region};
use tracing::debug;

pub const TICKS_PER_DAY: u64 = 24_000;

/// What the server does with one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Respond(String),
    /// Close the connection without answering.
    Disconnect,
    /// Answer normally after sleeping.
    Stall(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Reply(String),
    Disconnect,
    Delayed(Duration, String),
}

#[derive(Debug, Default)]
struct Faults {
    next: VecDeque<Fault>,
    matching: Vec<(String, Fault)>,
}

impl Faults {
    fn take(&mut self, command: &str) -> Option<Fault> {
        if let Some(fault) = self.next.pop_front() {
            return Some(fault);
        }
        self.matching
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, fault)| fault.clone())
    }
}

/// Day clock that advances with wall time while the daylight cycle runs.
#[derive(Debug)]
struct DayClock {
    base: u64,
    since: Instant,
    ticks_per_second: f64,
    running: bool,
}

impl DayClock {
    fn now(&self) -> u64 {
        if self.running {
            self.base + (self.since.elapsed().as_secs_f64() * self.ticks_per_second) as u64
        } else {
            self.base
        }
    }

    fn set(&mut self, ticks: u64) {
        self.base = ticks;
        self.since = Instant::now();
    }

    fn set_running(&mut self, running: bool) {
        let now = self.now();
        self.running = running;
        self.set(now);
    }
}

pub struct MockWorld {
    fills: Vec<(Region, BlockId)>,
    ground: Option<(i32, BlockId)>,
    rules: BTreeMap<String, String>,
    clock: DayClock,
    max_fill_blocks: u64,
    faults: Faults,
    commands: u64,
}

impl MockWorld {
    pub fn new(ticks_per_second: f64, max_fill_blocks: u64) -> Self {
        let rules = [
            ("doDaylightCycle", "true"),
            ("doWeatherCycle", "true"),
            ("keepInventory", "false"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
        Self {
            fills: Vec::new(),
            ground: None,
            rules,
            clock: DayClock {
                base: 0,
                since: Instant::now(),
                ticks_per_second,
                running: true,
            },
            max_fill_blocks,
            faults: Faults::default(),
            commands: 0,
        }
    }

    /// Every position at or below `surface_y` reads as `block` unless a fill
    /// overwrote it.
    pub fn set_ground(&mut self, surface_y: i32, block: BlockId) {
        self.ground = Some((surface_y, block));
    }

    /// Writes blocks directly, bypassing the console.
    pub fn place(&mut self, region: Region, block: BlockId) {
        self.fills.push((region, block));
    }

    pub fn block_at(&self, pos: BlockPos) -> BlockId {
        self.fills
            .iter()
            .rev()
            .find(|(region, _)| region.contains(pos))
            .map(|(_, block)| block.clone())
            .unwrap_or_else(|| self.ground_at(pos.y))
    }

    pub fn rule(&self, name: &str) -> Option<&str> {
        self.rules.get(name).map(String::as_str)
    }

    pub fn time_of_day(&self) -> u64 {
        self.clock.now() % TICKS_PER_DAY
    }

    pub fn commands_received(&self) -> u64 {
        self.commands
    }

    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }

    pub fn fail_next(&mut self, count: usize, fault: Fault) {
        self.faults
            .next
            .extend(std::iter::repeat(fault).take(count));
    }

    pub fn fail_matching(&mut self, needle: &str, fault: Fault) {
        self.faults.matching.push((needle.to_string(), fault));
    }

    pub fn clear_faults(&mut self) {
        self.faults = Faults::default();
    }

    fn ground_at(&self, y: i32) -> BlockId {
        match &self.ground {
            Some((surface, block)) if y <= *surface => block.clone(),
            _ => BlockId::air(),
        }
    }

    /// The block every position of `region` holds, when that is known to be
    /// uniform.
    fn uniform_block(&self, region: &Region) -> Option<BlockId> {
        if let Some((written, block)) = self.fills.iter().rev().find(|(r, _)| r.intersects(region)) {
            return written.contains_region(region).then(|| block.clone());
        }
        match &self.ground {
            Some((surface, block)) => {
                if region.min().y > *surface {
                    Some(BlockId::air())
                } else if region.max().y <= *surface {
                    Some(block.clone())
                } else {
                    None
                }
            }
            None => Some(BlockId::air()),
        }
    }

    pub(crate) fn handle(&mut self, command: &str) -> Action {
        self.commands += 1;
        match self.faults.take(command) {
            Some(Fault::Respond(text)) => Action::Reply(text),
            Some(Fault::Disconnect) => Action::Disconnect,
            Some(Fault::Stall(delay)) => Action::Delayed(delay, self.apply(command)),
            None => Action::Reply(self.apply(command)),
        }
    }

    /// Runs one console command against the world and returns the response
    /// text a vanilla server would print.
    pub fn apply(&mut self, command: &str) -> String {
        debug!(command, "mock.command");
        let mut parts = command.split_whitespace();
        let response = match parts.next() {
            Some("fill") => self.fill(&mut parts),
            Some("setblock") => self.setblock(&mut parts),
            Some("execute") => self.test_block(&mut parts),
            Some("time") => self.time(&mut parts),
            Some("gamerule") => self.gamerule(&mut parts),
            _ => None,
        };
        response.unwrap_or_else(|| "Unknown or incomplete command, see below for error".to_string())
    }

    fn fill<'a>(&mut self, parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        let a = parse_pos(parts)?;
        let b = parse_pos(parts)?;
        let block = BlockId::new(parts.next()?);
        let region = Region::new(a, b);
        let volume = region.volume();
        if volume > self.max_fill_blocks {
            return Some(format!(
                "Too many blocks in the specified area (maximum {}, specified {volume})",
                self.max_fill_blocks
            ));
        }
        if self.uniform_block(&region).as_ref() == Some(&block) {
            return Some("No blocks were filled".to_string());
        }
        self.fills.push((region, block));
        Some(format!("Successfully filled {volume} block(s)"))
    }

    fn setblock<'a>(&mut self, parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        let pos = parse_pos(parts)?;
        let block = BlockId::new(parts.next()?);
        if self.block_at(pos) == block {
            return Some("Could not set the block".to_string());
        }
        self.fills.push((Region::single(pos), block));
        Some(format!("Changed the block at {}, {}, {}", pos.x, pos.y, pos.z))
    }

    fn test_block<'a>(&mut self, parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        if parts.next()? != "if" || parts.next()? != "block" {
            return None;
        }
        let pos = parse_pos(parts)?;
        let block = BlockId::new(parts.next()?);
        if self.block_at(pos) == block {
            Some("Test passed".to_string())
        } else {
            Some("Test failed".to_string())
        }
    }

    fn time<'a>(&mut self, parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        match parts.next()? {
            "set" => {
                let ticks = match parts.next()? {
                    "day" => 1_000,
                    "noon" => 6_000,
                    "night" => 13_000,
                    "midnight" => 18_000,
                    raw => raw.parse::<u64>().ok()?,
                };
                self.clock.set(ticks);
                Some(format!("Set the time to {ticks}"))
            }
            "query" => match parts.next()? {
                "daytime" => Some(format!("The time is {}", self.time_of_day())),
                "gametime" => Some(format!("The time is {}", self.clock.now())),
                _ => None,
            },
            _ => None,
        }
    }

    fn gamerule<'a>(&mut self, parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        let name = parts.next()?;
        let Some(current) = self.rules.get(name).cloned() else {
            return Some(format!("Incorrect argument for command: unknown rule {name}"));
        };
        let Some(value) = parts.next() else {
            return Some(format!("Gamerule {name} is currently set to: {current}"));
        };
        if value != "true" && value != "false" {
            return Some(format!("Incorrect argument for command: {value}"));
        }
        if name == "doDaylightCycle" {
            self.clock.set_running(value == "true");
        }
        self.rules.insert(name.to_string(), value.to_string());
        Some(format!("Gamerule {name} is now set to: {value}"))
    }
}

fn parse_pos<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<BlockPos> {
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    Some(BlockPos::new(x, y, z))
}
