#![forbid(unsafe_code)]

use crate::SeqNo;
use std::collections::BTreeSet;

/// Inclusive run of sequence numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqRange {
    pub start: SeqNo,
    pub end: SeqNo,
}

impl SeqRange {
    pub fn new(start: SeqNo, end: SeqNo) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of sequence numbers covered; zero for an inverted range and
    /// saturating at `u64::MAX` for the full `0..=u64::MAX` span.
    pub fn segment_count(&self) -> u64 {
        match self.end.checked_sub(self.start) {
            Some(span) => span.saturating_add(1),
            None => 0,
        }
    }

    pub fn contains(&self, seq: SeqNo) -> bool {
        (self.start..=self.end).contains(&seq)
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<SeqNo> {
        self.start..=self.end
    }
}

impl std::fmt::Display for SeqRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Partitions `unclaimed` into maximal contiguous runs, ascending.
pub fn make_ranges(unclaimed: &BTreeSet<SeqNo>) -> Vec<SeqRange> {
    let mut out = Vec::new();
    let mut iter = unclaimed.iter().copied();
    let Some(first) = iter.next() else {
        return out;
    };

    let mut current = SeqRange {
        start: first,
        end: first,
    };
    for seq in iter {
        if current.end.checked_add(1) == Some(seq) {
            current.end = seq;
        } else {
            out.push(current);
            current = SeqRange {
                start: seq,
                end: seq,
            };
        }
    }
    out.push(current);
    out
}
