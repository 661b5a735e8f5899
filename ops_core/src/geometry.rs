use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn with(mut self, axis: Axis, value: i32) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// Axis-aligned box with inclusive corners. `min` is component-wise `<= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RegionCorners")]
pub struct Region {
    min: BlockPos,
    max: BlockPos,
}

#[derive(Deserialize)]
struct RegionCorners {
    min: BlockPos,
    max: BlockPos,
}

impl From<RegionCorners> for Region {
    fn from(corners: RegionCorners) -> Self {
        Region::new(corners.min, corners.max)
    }
}

impl Region {
    /// Builds the box spanned by two opposite corners in any order.
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn single(pos: BlockPos) -> Self {
        Self { min: pos, max: pos }
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn len(&self, axis: Axis) -> u64 {
        (self.max.get(axis) as i64 - self.min.get(axis) as i64 + 1) as u64
    }

    pub fn volume(&self) -> u64 {
        Axis::ALL.iter().map(|axis| self.len(*axis)).product()
    }

    /// Longest axis; ties resolve in X, Y, Z order.
    pub fn longest_axis(&self) -> Axis {
        let mut best = Axis::X;
        for axis in [Axis::Y, Axis::Z] {
            if self.len(axis) > self.len(best) {
                best = axis;
            }
        }
        best
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        Axis::ALL
            .iter()
            .all(|axis| pos.get(*axis) >= self.min.get(*axis) && pos.get(*axis) <= self.max.get(*axis))
    }

    pub fn contains_region(&self, other: &Region) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    pub fn intersects(&self, other: &Region) -> bool {
        Axis::ALL.iter().all(|axis| {
            self.min.get(*axis) <= other.max.get(*axis) && other.min.get(*axis) <= self.max.get(*axis)
        })
    }

    pub fn intersection(&self, other: &Region) -> Option<Region> {
        self.intersects(other).then(|| Region {
            min: BlockPos::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            max: BlockPos::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        })
    }

    /// The part of `self` outside `other`, as at most six disjoint boxes.
    pub fn subtract(&self, other: &Region) -> Vec<Region> {
        let Some(cut) = self.intersection(other) else {
            return vec![*self];
        };
        let mut pieces = Vec::new();
        let mut rest = *self;
        for axis in Axis::ALL {
            if rest.min.get(axis) < cut.min.get(axis) {
                pieces.push(Region {
                    min: rest.min,
                    max: rest.max.with(axis, cut.min.get(axis) - 1),
                });
                rest.min = rest.min.with(axis, cut.min.get(axis));
            }
            if rest.max.get(axis) > cut.max.get(axis) {
                pieces.push(Region {
                    min: rest.min.with(axis, cut.max.get(axis) + 1),
                    max: rest.max,
                });
                rest.max = rest.max.with(axis, cut.max.get(axis));
            }
        }
        pieces
    }

    /// Cuts the first `count` layers along `axis` off the low end. Returns the
    /// head and, when anything is left, the remainder.
    pub fn split_at(&self, axis: Axis, count: u64) -> (Region, Option<Region>) {
        if count >= self.len(axis) {
            return (*self, None);
        }
        let cut = self.min.get(axis) + count as i32;
        let head = Region {
            min: self.min,
            max: self.max.with(axis, cut - 1),
        };
        let tail = Region {
            min: self.min.with(axis, cut),
            max: self.max,
        };
        (head, Some(tail))
    }

    /// Portion of the region whose `y` lies in `lo..=hi`, if any.
    pub fn clamp_y(&self, lo: i32, hi: i32) -> Option<Region> {
        let min_y = self.min.y.max(lo);
        let max_y = self.max.y.min(hi);
        (min_y <= max_y).then(|| Region {
            min: self.min.with(Axis::Y, min_y),
            max: self.max.with(Axis::Y, max_y),
        })
    }

    /// Position at `offset` in x-fastest, then z, then y order.
    pub fn nth(&self, offset: u64) -> BlockPos {
        let dx = self.len(Axis::X);
        let dz = self.len(Axis::Z);
        let x = offset % dx;
        let z = (offset / dx) % dz;
        let y = offset / (dx * dz);
        BlockPos::new(
            self.min.x + x as i32,
            self.min.y + y as i32,
            self.min.z + z as i32,
        )
    }

    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        (0..self.volume()).map(move |offset| self.nth(offset))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// Coalesces positions into x-runs, one region per run of consecutive x at a
/// fixed (y, z). Duplicates are ignored; output is sorted by (y, z, x).
pub fn coalesce_runs(positions: &[BlockPos]) -> Vec<Region> {
    let mut sorted: Vec<BlockPos> = positions.to_vec();
    sorted.sort_by_key(|pos| (pos.y, pos.z, pos.x));
    sorted.dedup();

    let mut runs = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut start = first;
    let mut end = first;
    for pos in iter {
        if pos.y == end.y && pos.z == end.z && pos.x == end.x + 1 {
            end = pos;
        } else {
            runs.push(Region::new(start, end));
            start = pos;
            end = pos;
        }
    }
    runs.push(Region::new(start, end));
    runs
}

/// Merges x-runs that share a layer and x extent across consecutive z rows.
/// Input regions are expected to be one block thick in y and z, as produced
/// by [`coalesce_runs`].
pub fn merge_rows(runs: &[Region]) -> Vec<Region> {
    let mut sorted = runs.to_vec();
    sorted.sort_by_key(|run| (run.min.y, run.min.x, run.max.x, run.min.z));

    let mut merged: Vec<Region> = Vec::with_capacity(sorted.len());
    for run in sorted {
        match merged.last_mut() {
            Some(last)
                if last.min.y == run.min.y
                    && last.max.y == run.max.y
                    && last.min.x == run.min.x
                    && last.max.x == run.max.x
                    && last.max.z + 1 == run.min.z =>
            {
                last.max.z = run.max.z;
            }
            _ => merged.push(run),
        }
    }
    merged.sort_by_key(|region| (region.min.y, region.min.z, region.min.x));
    merged
}
