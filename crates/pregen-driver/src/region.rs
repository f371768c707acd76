//! Chunk rectangles and their generation order
//!
//! A [`Region`] is an inclusive rectangle of chunk coordinates. It is walked
//! row-major with `x` outer and `z` inner, so `(x, z2)` is followed by
//! `(x + 1, z1)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk x
    pub x: i32,
    /// Chunk z
    pub z: i32,
}

impl ChunkPos {
    /// Create position
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Inclusive rectangle of chunks with `x1 <= x2` and `z1 <= z2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawRegion")]
pub struct Region {
    x1: i32,
    z1: i32,
    x2: i32,
    z2: i32,
}

#[derive(Deserialize)]
struct RawRegion {
    x1: i32,
    z1: i32,
    x2: i32,
    z2: i32,
}

impl From<RawRegion> for Region {
    fn from(raw: RawRegion) -> Self {
        Self::new(raw.x1, raw.z1, raw.x2, raw.z2)
    }
}

impl Region {
    /// Rectangle spanned by two corners in any order
    #[must_use]
    pub fn new(x1: i32, z1: i32, x2: i32, z2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            z1: z1.min(z2),
            x2: x1.max(x2),
            z2: z1.max(z2),
        }
    }

    /// Lowest corner
    #[inline]
    #[must_use]
    pub fn min(&self) -> ChunkPos {
        ChunkPos::new(self.x1, self.z1)
    }

    /// Highest corner
    #[inline]
    #[must_use]
    pub fn max(&self) -> ChunkPos {
        ChunkPos::new(self.x2, self.z2)
    }

    /// Number of columns along `z`
    #[inline]
    #[must_use]
    pub fn width(&self) -> u64 {
        span(self.z1, self.z2)
    }

    /// Number of chunks, saturating at `u64::MAX` for the full `i32` plane
    #[inline]
    #[must_use]
    pub fn area(&self) -> u64 {
        span(self.x1, self.x2).saturating_mul(self.width())
    }

    /// Whether `pos` lies inside
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: ChunkPos) -> bool {
        (self.x1..=self.x2).contains(&pos.x) && (self.z1..=self.z2).contains(&pos.z)
    }

    /// Number of chunks strictly before `pos` in generation order
    fn offset(&self, pos: ChunkPos) -> u64 {
        span(self.x1, pos.x)
            .saturating_sub(1)
            .saturating_mul(self.width())
            .saturating_add(span(self.z1, pos.z) - 1)
    }

    /// Number of chunks from `pos` on in generation order
    fn rest(&self, pos: ChunkPos) -> u64 {
        span(pos.x, self.x2)
            .saturating_sub(1)
            .saturating_mul(self.width())
            .saturating_add(span(pos.z, self.z2))
    }

    /// Generation order starting at the beginning
    #[must_use]
    pub fn plan(&self) -> GenerationPlan {
        GenerationPlan {
            region: *self,
            next: Some(self.min()),
            skipped: 0,
        }
    }

    /// Generation order continuing after `last`
    ///
    /// A point on the last column restarts at the first column of the next
    /// row; any other point is generated again. A point outside the region is
    /// ignored and the plan starts at the beginning.
    #[must_use]
    pub fn resume(&self, last: ChunkPos) -> GenerationPlan {
        if !self.contains(last) {
            tracing::warn!(
                resume = %last,
                from = %self.min(),
                to = %self.max(),
                "resume point outside region, starting from the beginning"
            );
            return self.plan();
        }
        let next = if last.z == self.z2 {
            (last.x < self.x2).then(|| ChunkPos::new(last.x + 1, self.z1))
        } else {
            Some(last)
        };
        let skipped = next.map_or(self.area(), |pos| self.offset(pos));
        GenerationPlan {
            region: *self,
            next,
            skipped,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.min(), self.max())
    }
}

fn span(lo: i32, hi: i32) -> u64 {
    (i64::from(hi) - i64::from(lo) + 1).unsigned_abs()
}

/// Iterator over a region in generation order
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    region: Region,
    next: Option<ChunkPos>,
    skipped: u64,
}

impl GenerationPlan {
    /// Region walked
    #[inline]
    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    /// Chunks the plan starts past
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Chunks left to yield
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.next.map_or(0, |pos| self.region.rest(pos))
    }
}

impl Iterator for GenerationPlan {
    type Item = ChunkPos;

    fn next(&mut self) -> Option<ChunkPos> {
        let current = self.next?;
        let region = &self.region;
        self.next = if current.z < region.z2 {
            Some(ChunkPos::new(current.x, current.z + 1))
        } else if current.x < region.x2 {
            Some(ChunkPos::new(current.x + 1, region.z1))
        } else {
            None
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).ok();
        (remaining.unwrap_or(usize::MAX), remaining)
    }
}

impl std::iter::FusedIterator for GenerationPlan {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn corners_are_normalized() {
        let region = Region::new(5, -2, -1, 3);
        assert_eq!(region.min(), ChunkPos::new(-1, -2));
        assert_eq!(region.max(), ChunkPos::new(5, 3));
        assert_eq!(region.area(), 42);
    }

    #[test]
    fn walks_x_outer_z_inner() {
        let order: Vec<_> = Region::new(0, 0, 1, 2).plan().collect();
        assert_eq!(
            order,
            vec![
                ChunkPos::new(0, 0),
                ChunkPos::new(0, 1),
                ChunkPos::new(0, 2),
                ChunkPos::new(1, 0),
                ChunkPos::new(1, 1),
                ChunkPos::new(1, 2),
            ]
        );
    }

    #[test]
    fn resume_on_last_column_moves_to_next_row() {
        let region = Region::new(0, 0, 9, 9);
        let mut plan = region.resume(ChunkPos::new(3, 9));
        assert_eq!(plan.skipped(), 40);
        assert_eq!(plan.remaining(), 60);
        assert_eq!(plan.next(), Some(ChunkPos::new(4, 0)));
    }

    #[test]
    fn resume_mid_row_repeats_point() {
        let region = Region::new(0, 0, 9, 9);
        let plan = region.resume(ChunkPos::new(3, 4));
        assert_eq!(plan.remaining(), 66);
        assert_eq!(plan.clone().next(), Some(ChunkPos::new(3, 4)));
        assert_eq!(plan.count(), 66);
    }

    #[test]
    fn resume_at_final_chunk_is_empty() {
        let region = Region::new(0, 0, 2, 2);
        let plan = region.resume(ChunkPos::new(2, 2));
        assert_eq!(plan.remaining(), 0);
        assert_eq!(plan.count(), 0);
    }

    #[test]
    fn resume_outside_region_is_ignored() {
        let region = Region::new(0, 0, 3, 3);
        let mut plan = region.resume(ChunkPos::new(10, 0));
        assert_eq!(plan.skipped(), 0);
        assert_eq!(plan.next(), Some(ChunkPos::new(0, 0)));
    }

    #[test]
    fn full_plane_counts_saturate() {
        let region = Region::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(region.width(), 1 << 32);
        assert_eq!(region.area(), u64::MAX);
        assert_eq!(region.plan().remaining(), u64::MAX);

        let plan = region.resume(ChunkPos::new(i32::MAX, i32::MAX - 1));
        assert_eq!(plan.skipped(), u64::MAX - 1);
        assert_eq!(plan.remaining(), 2);
        assert_eq!(plan.count(), 2);

        let plan = region.resume(ChunkPos::new(i32::MIN, i32::MAX));
        assert_eq!(plan.skipped(), 1 << 32);
        assert_eq!(plan.remaining(), u64::MAX - (1 << 32) + 1);
    }

    #[test]
    fn region_deserializes_normalized() {
        let region: Region = serde_json::from_str(r#"{"x1":4,"z1":4,"x2":0,"z2":1}"#).unwrap();
        assert_eq!(region, Region::new(0, 1, 4, 4));
    }
}
