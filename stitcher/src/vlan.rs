// Snowcap: Synthesizing Network-Wide Configuration Updates
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! VLAN tag-set algebra: sparse sets of integers in `[MIN_TAG, MAX_TAG]`, stored as sorted,
//! non-overlapping inclusive ranges.

use std::fmt;
use thiserror::Error;

/// Lowest legal VLAN tag.
pub const MIN_TAG: u16 = 1;
/// Highest legal VLAN tag.
pub const MAX_TAG: u16 = 4094;

/// Errors raised by the tag-set algebra.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum VlanError {
    /// `pick` was called on a set with no candidates.
    #[error("no VLAN tag available in the requested set")]
    EmptySet,
    /// A tag outside `[MIN_TAG, MAX_TAG]` was supplied.
    #[error("VLAN tag {0} is out of range [{MIN_TAG}, {MAX_TAG}]")]
    OutOfRange(u32),
    /// The textual form could not be parsed.
    #[error("cannot parse VLAN range {0:?}")]
    ParseError(String),
}

/// A finite set of VLAN tags, represented as sorted, non-overlapping, inclusive ranges
/// `(start, end)` with `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct TagSet {
    ranges: Vec<(u16, u16)>,
}

impl TagSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    /// The full legal universe `[MIN_TAG, MAX_TAG]`.
    pub fn universe() -> Self {
        Self { ranges: vec![(MIN_TAG, MAX_TAG)] }
    }

    /// A set containing the single tag.
    pub fn single(tag: u16) -> Self {
        Self { ranges: vec![(tag, tag)] }
    }

    /// Build a set from an iterator of inclusive `(start, end)` ranges. Overlapping or adjacent
    /// ranges are coalesced and the result is sorted, regardless of input order.
    pub fn from_ranges<I: IntoIterator<Item = (u16, u16)>>(ranges: I) -> Result<Self, VlanError> {
        let mut rs: Vec<(u16, u16)> = ranges.into_iter().collect();
        for &(a, b) in rs.iter() {
            if a > b {
                return Err(VlanError::ParseError(format!("{}-{}", a, b)));
            }
            if (a as u32) < MIN_TAG as u32 || (b as u32) > MAX_TAG as u32 {
                return Err(VlanError::OutOfRange(b as u32));
            }
        }
        rs.sort_unstable();
        Ok(Self { ranges: coalesce(rs) })
    }

    /// Parse the canonical textual form, e.g. `"3-5,7,10-12"`. Whitespace around commas and
    /// dashes is tolerated.
    pub fn parse(s: &str) -> Result<Self, VlanError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return Ok(Self::empty());
        }
        let mut ranges = Vec::new();
        for part in trimmed.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(VlanError::ParseError(s.to_string()));
            }
            if let Some(dash) = part.find('-') {
                let (lo, hi) = part.split_at(dash);
                let hi = &hi[1..];
                let lo: u16 =
                    lo.trim().parse().map_err(|_| VlanError::ParseError(s.to_string()))?;
                let hi: u16 =
                    hi.trim().parse().map_err(|_| VlanError::ParseError(s.to_string()))?;
                ranges.push((lo, hi));
            } else {
                let v: u16 = part.parse().map_err(|_| VlanError::ParseError(s.to_string()))?;
                ranges.push((v, v));
            }
        }
        Self::from_ranges(ranges)
    }

    /// Emit the canonical comma-separated, coalesced form: smallest numbers first, maximal
    /// contiguous ranges. The empty set emits as `""`.
    pub fn emit(&self) -> String {
        self.ranges
            .iter()
            .map(|(a, b)| if a == b { a.to_string() } else { format!("{}-{}", a, b) })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True iff the set has no members.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True iff `tag` is a member.
    pub fn contains(&self, tag: u16) -> bool {
        self.ranges
            .binary_search_by(|&(a, b)| {
                if tag < a {
                    std::cmp::Ordering::Greater
                } else if tag > b {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|(a, b)| (*b - *a) as usize + 1).sum()
    }

    /// Iterate over every member tag, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ranges.iter().flat_map(|&(a, b)| a..=b)
    }

    /// `self | other`.
    pub fn union(&self, other: &Self) -> Self {
        let mut rs: Vec<(u16, u16)> = self.ranges.iter().chain(other.ranges.iter()).copied().collect();
        rs.sort_unstable();
        Self { ranges: coalesce(rs) }
    }

    /// `self & other`.
    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a0, a1) = self.ranges[i];
            let (b0, b1) = other.ranges[j];
            let lo = a0.max(b0);
            let hi = a1.min(b1);
            if lo <= hi {
                out.push((lo, hi));
            }
            if a1 < b1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { ranges: coalesce(out) }
    }

    /// `self \ other`.
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        for &(mut a, b) in self.ranges.iter() {
            for &(c, d) in other.ranges.iter() {
                if d < a || c > b {
                    continue;
                }
                if c > a {
                    out.push((a, c - 1));
                }
                if d >= b {
                    a = b + 1;
                    break;
                } else {
                    a = d + 1;
                }
            }
            if a <= b {
                out.push((a, b));
            }
        }
        Self { ranges: coalesce(out) }
    }

    /// Pick a deterministic element: the least member `>= hint` if one exists, else the least
    /// member overall. Fails with [`VlanError::EmptySet`] if the set is empty.
    pub fn pick(&self, hint: u16) -> Result<u16, VlanError> {
        for &(a, b) in self.ranges.iter() {
            if b >= hint {
                return Ok(a.max(hint));
            }
        }
        self.ranges.first().map(|&(a, _)| a).ok_or(VlanError::EmptySet)
    }

    /// Pick any deterministic element (the least member). Fails with [`VlanError::EmptySet`] if
    /// the set is empty.
    pub fn pick_any(&self) -> Result<u16, VlanError> {
        self.ranges.first().map(|&(a, _)| a).ok_or(VlanError::EmptySet)
    }
}

fn coalesce(sorted: Vec<(u16, u16)>) -> Vec<(u16, u16)> {
    let mut out: Vec<(u16, u16)> = Vec::with_capacity(sorted.len());
    for (a, b) in sorted {
        if let Some(last) = out.last_mut() {
            if a as u32 <= last.1 as u32 + 1 {
                last.1 = last.1.max(b);
                continue;
            }
        }
        out.push((a, b));
    }
    out
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            write!(f, "ANY")
        } else {
            write!(f, "{}", self.emit())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_emit_roundtrip() {
        for s in ["3-5,7,10-12", "1", "1,2,3", "100-200"] {
            let set = TagSet::parse(s).unwrap();
            assert_eq!(TagSet::parse(&set.emit()).unwrap(), set);
        }
    }

    #[test]
    fn parse_coalesces_adjacent() {
        let set = TagSet::parse("1,2,3,5-7,8").unwrap();
        assert_eq!(set.emit(), "1-3,5-8");
    }

    #[test]
    fn parse_whitespace_tolerant() {
        assert_eq!(TagSet::parse(" 3 - 5 , 7 ").unwrap(), TagSet::parse("3-5,7").unwrap());
    }

    #[test]
    fn union_commutative() {
        let a = TagSet::parse("1-5").unwrap();
        let b = TagSet::parse("3-10").unwrap();
        assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn intersect_distributes_over_union() {
        let a = TagSet::parse("1-10").unwrap();
        let b = TagSet::parse("5-15").unwrap();
        let c = TagSet::parse("12-20").unwrap();
        let lhs = a.intersect(&b.union(&c));
        let rhs = a.intersect(&b).union(&a.intersect(&c));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn difference_removes_members() {
        let a = TagSet::parse("1-10").unwrap();
        let b = TagSet::parse("3-5").unwrap();
        let d = a.difference(&b);
        assert_eq!(d.emit(), "1-2,6-10");
        assert!(!d.contains(4));
        assert!(d.contains(6));
    }

    #[test]
    fn pick_prefers_hint_then_least() {
        let set = TagSet::parse("1-3,10-20").unwrap();
        assert_eq!(set.pick(5).unwrap(), 10);
        assert_eq!(set.pick(0).unwrap(), 1);
        assert_eq!(TagSet::empty().pick(5), Err(VlanError::EmptySet));
    }

    #[test]
    fn empty_is_legal() {
        let e = TagSet::empty();
        assert!(e.is_empty());
        assert_eq!(e.emit(), "");
        assert_eq!(e.union(&TagSet::parse("1-2").unwrap()).emit(), "1-2");
    }
}
