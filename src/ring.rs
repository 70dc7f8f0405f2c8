//! Partition model: tokens and their subdivision into fragments
//!
//! A cluster's key space is a set of directed token ranges, each owned by
//! one endpoint. Tokens arrive from the topology source; the scheduler
//! subdivides each into a configured number of contiguous fragments, the
//! unit of repair dispatch.

use serde::{Deserialize, Serialize};

use crate::common::error::{Error, Result};

/// A directed range of the key space owned by one endpoint.
/// Immutable once obtained from the topology source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub start: i64,
    pub end: i64,
    pub endpoint: String,
}

impl Token {
    /// Subdivide `[start, end)` into exactly `steps` contiguous ranges.
    ///
    /// Step size is `(end - start) / steps` with integer division; the final
    /// range absorbs the remainder up to `end`, so the union tiles the token
    /// with no gaps or overlaps and the last range may be longer than the
    /// others by at most `steps - 1`.
    pub fn fragments(&self, steps: u64) -> Result<FragmentRanges> {
        if steps == 0 {
            return Err(Error::InvalidSliceCount(steps));
        }
        // An inverted range would wrap the span cast into a huge step count.
        if self.end < self.start {
            return Err(Error::InvertedTokenRange {
                start: self.start,
                end: self.end,
            });
        }
        let span = (self.end - self.start) as u64;
        Ok(FragmentRanges {
            start: self.start,
            end: self.end,
            step: (span / steps) as i64,
            steps,
            produced: 0,
        })
    }
}

/// Lazy iterator over a token's sub-ranges. Restartable via `Clone`.
#[derive(Debug, Clone)]
pub struct FragmentRanges {
    start: i64,
    end: i64,
    step: i64,
    steps: u64,
    produced: u64,
}

impl Iterator for FragmentRanges {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.produced == self.steps {
            return None;
        }
        let lo = self.start + self.step * self.produced as i64;
        self.produced += 1;
        let hi = if self.produced == self.steps {
            self.end
        } else {
            self.start + self.step * self.produced as i64
        };
        Some((lo, hi))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.steps - self.produced) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FragmentRanges {}

/// A bounded sub-range of a token, the unit of repair dispatch.
///
/// Ordinals are 1-based, assigned in generation order across all tokens of
/// a keyspace within one scheduling pass; the tracking identity is the
/// tuple (cluster, keyspace, table, ordinal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: u32,
    pub cluster: String,
    pub keyspace: String,
    pub endpoint: String,
    pub start: i64,
    pub end: i64,
}

/// Expand a keyspace's tokens into fragments with pass-wide ordinals.
///
/// Ordinals start at 1 and increase monotonically across tokens in the
/// order given.
pub fn keyspace_fragments(
    cluster: &str,
    keyspace: &str,
    tokens: &[Token],
    slices: u64,
) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::with_capacity(tokens.len() * slices as usize);
    let mut ordinal = 0u32;
    for token in tokens {
        for (start, end) in token.fragments(slices)? {
            ordinal += 1;
            fragments.push(Fragment {
                id: ordinal,
                cluster: cluster.to_string(),
                keyspace: keyspace.to_string(),
                endpoint: token.endpoint.clone(),
                start,
                end,
            });
        }
    }
    Ok(fragments)
}
