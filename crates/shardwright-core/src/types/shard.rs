//! Shard types
//!
//! A shard is a pool that additionally owns a contiguous slice of the
//! partitioned key space. Top-level shards tile the key domain without gaps
//! or overlaps; the last one is open-ended.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::pool::Pool;
use crate::error::{Error, Result};

/// Upper end of a shard range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum RangeEnd {
    /// Inclusive upper bound
    Bounded(u64),
    /// Open-ended; only the last shard
    Unbounded,
}

impl From<Option<u64>> for RangeEnd {
    fn from(v: Option<u64>) -> Self {
        v.map_or(RangeEnd::Unbounded, RangeEnd::Bounded)
    }
}

impl From<RangeEnd> for Option<u64> {
    fn from(v: RangeEnd) -> Self {
        match v {
            RangeEnd::Bounded(max) => Some(max),
            RangeEnd::Unbounded => None,
        }
    }
}

/// Key range owned by a shard, `min_id` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardRange {
    pub min_id: u64,
    pub max_id: RangeEnd,
}

impl ShardRange {
    pub fn bounded(min_id: u64, max_id: u64) -> Result<Self> {
        if max_id < min_id {
            return Err(Error::InvalidRange(format!(
                "max_id {} is below min_id {}",
                max_id, min_id
            )));
        }
        Ok(Self {
            min_id,
            max_id: RangeEnd::Bounded(max_id),
        })
    }

    pub fn unbounded(min_id: u64) -> Self {
        Self {
            min_id,
            max_id: RangeEnd::Unbounded,
        }
    }

    pub fn max_bound(&self) -> Option<u64> {
        self.max_id.into()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_id == RangeEnd::Unbounded
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.min_id
            && match self.max_id {
                RangeEnd::Bounded(max) => id <= max,
                RangeEnd::Unbounded => true,
            }
    }

    /// Number of ids in the range, `None` when open-ended. Widened so
    /// `[0, u64::MAX]` still has a length.
    pub fn len(&self) -> Option<u128> {
        self.max_bound()
            .map(|max| u128::from(max) - u128::from(self.min_id) + 1)
    }

    /// Whether `next` starts right where this range ends
    pub fn is_followed_by(&self, next: &ShardRange) -> bool {
        match self.max_id {
            RangeEnd::Bounded(max) => max.checked_add(1) == Some(next.min_id),
            RangeEnd::Unbounded => false,
        }
    }

    /// Name of the pool backing a shard with this range
    pub fn pool_name(&self) -> String {
        match self.max_id {
            RangeEnd::Bounded(max) => format!("shard-{}-{}", self.min_id, max),
            RangeEnd::Unbounded => format!("shard-{}-inf", self.min_id),
        }
    }

    /// Partition into `count` contiguous ranges. Each child takes its share
    /// of the ids still unassigned; the last child absorbs the remainder.
    pub fn even_partition(&self, count: usize) -> Result<Vec<ShardRange>> {
        let total = self.len().ok_or_else(|| {
            Error::InvalidRange(format!("cannot partition open-ended range {}", self))
        })?;
        if count < 2 {
            return Err(Error::InvalidRange(format!(
                "a split needs at least 2 children, got {}",
                count
            )));
        }
        if count as u128 > total {
            return Err(Error::InvalidRange(format!(
                "cannot split {} ids into {} children",
                total, count
            )));
        }

        let max = self.max_bound().unwrap_or(self.min_id);
        let mut ranges = Vec::with_capacity(count);
        let mut current_min = u128::from(self.min_id);
        for n in 0..count {
            let ids_left = total - (current_min - u128::from(self.min_id));
            let current_max = if n == count - 1 {
                u128::from(max)
            } else {
                current_min + ids_left / (count - n) as u128 - 1
            };
            // Both ends lie within [min_id, max], so they fit in u64.
            ranges.push(ShardRange::bounded(
                current_min as u64,
                current_max as u64,
            )?);
            current_min = current_max + 1;
        }
        Ok(ranges)
    }

    /// Check that `parts` cover this range exactly, in order, with no gap
    /// and no overlap.
    pub fn validate_partition(&self, parts: &[ShardRange]) -> Result<()> {
        let (first, last) = match (parts.first(), parts.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::InvalidRange("no child ranges given".into())),
        };
        if parts.len() < 2 {
            return Err(Error::InvalidRange(
                "a split needs at least 2 child ranges".into(),
            ));
        }
        if first.min_id != self.min_id {
            return Err(Error::InvalidRange(format!(
                "first child starts at {}, parent starts at {}",
                first.min_id, self.min_id
            )));
        }
        for pair in parts.windows(2) {
            if !pair[0].is_followed_by(&pair[1]) {
                return Err(Error::InvalidRange(format!(
                    "child ranges {} and {} are not contiguous",
                    pair[0], pair[1]
                )));
            }
        }
        if last.max_id != self.max_id {
            return Err(Error::InvalidRange(format!(
                "last child ends at {}, parent ends at {}",
                last, self
            )));
        }
        Ok(())
    }

    /// Cap an open-ended range just before `cutover_id`, returning the
    /// capped range and the new open-ended range beyond it.
    pub fn split_at(&self, cutover_id: u64) -> Result<(ShardRange, ShardRange)> {
        if !self.is_unbounded() {
            return Err(Error::InvalidRange(format!(
                "{} is not open-ended",
                self
            )));
        }
        if cutover_id <= self.min_id {
            return Err(Error::InvalidRange(format!(
                "cutover id {} must be greater than {}",
                cutover_id, self.min_id
            )));
        }
        Ok((
            ShardRange::bounded(self.min_id, cutover_id - 1)?,
            ShardRange::unbounded(cutover_id),
        ))
    }
}

impl fmt::Display for ShardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_id {
            RangeEnd::Bounded(max) => write!(f, "[{}, {}]", self.min_id, max),
            RangeEnd::Unbounded => write!(f, "[{}, INFINITY)", self.min_id),
        }
    }
}

/// Check that top-level ranges tile the key domain: sorted, contiguous,
/// and exactly one of them (the last) open-ended.
pub fn check_contiguous(ranges: &[ShardRange]) -> Result<()> {
    if ranges.is_empty() {
        return Ok(());
    }
    for pair in ranges.windows(2) {
        if !pair[0].is_followed_by(&pair[1]) {
            return Err(Error::InvalidRange(format!(
                "shards {} and {} leave a gap or overlap",
                pair[0], pair[1]
            )));
        }
    }
    let unbounded = ranges.iter().filter(|r| r.is_unbounded()).count();
    if unbounded != 1 || !ranges[ranges.len() - 1].is_unbounded() {
        return Err(Error::InvalidRange(format!(
            "expected exactly one open-ended last shard, found {}",
            unbounded
        )));
    }
    Ok(())
}

/// Lifecycle state of a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    /// Split child whose clone has not completed
    Initializing,
    /// Split child mirroring its parent
    Replicating,
    /// Split child owning writes, holding rows outside its range
    NeedsCleanup,
    /// Serving reads and writes
    #[default]
    Ready,
    ReadOnly,
    Offline,
    /// Parent of an in-flight split
    Deprecated,
    /// Split parent whose hardware can be reclaimed
    Recycle,
}

impl ShardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardState::Initializing => "initializing",
            ShardState::Replicating => "replicating",
            ShardState::NeedsCleanup => "needs_cleanup",
            ShardState::Ready => "ready",
            ShardState::ReadOnly => "read_only",
            ShardState::Offline => "offline",
            ShardState::Deprecated => "deprecated",
            ShardState::Recycle => "recycle",
        }
    }

    pub fn can_transition_to(&self, next: ShardState) -> bool {
        use ShardState::*;
        matches!(
            (self, next),
            (Ready, ReadOnly)
                | (ReadOnly, Ready)
                | (ReadOnly, Offline)
                | (Offline, ReadOnly)
                | (Ready, Offline)
                | (Offline, Ready)
                | (Ready, Deprecated)
                | (Deprecated, Recycle)
                | (Initializing, Replicating)
                | (Replicating, NeedsCleanup)
                | (NeedsCleanup, Ready)
        )
    }

    /// States an operator may set directly
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ShardState::Ready | ShardState::ReadOnly | ShardState::Offline
        )
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pool owning a key range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub pool: Pool,
    pub range: ShardRange,
    pub state: ShardState,
    /// Ranges of child shards, non-empty only mid-split
    #[serde(default)]
    pub children: Vec<ShardRange>,
    #[serde(default)]
    pub parent: Option<ShardRange>,
}

impl Shard {
    pub fn new(range: ShardRange) -> Self {
        Self {
            pool: Pool::new(range.pool_name()),
            range,
            state: ShardState::Ready,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_state(mut self, state: ShardState) -> Self {
        self.state = state;
        self
    }

    pub fn is_mid_split(&self) -> bool {
        !self.children.is_empty()
    }

    /// A top-level shard takes part in the key-space tiling
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none() && self.state != ShardState::Recycle
    }

    /// Move to `next`, rejecting transitions outside the lifecycle
    pub fn transition(&mut self, next: ShardState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                shard: self.pool.name.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Re-key the shard, keeping its nodes
    pub fn rekey(&mut self, range: ShardRange) {
        self.range = range;
        self.pool.name = range.pool_name();
    }
}

impl Deref for Shard {
    type Target = Pool;

    fn deref(&self) -> &Pool {
        &self.pool
    }
}

impl DerefMut for Shard {
    fn deref_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }
}
