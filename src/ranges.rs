//! Line ranges and point lookups over them.

use std::cmp::Ordering;

/// An inclusive, 1-based span of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Checks if a line falls inside this range.
    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    /// Returns the number of lines spanned, 0 for a reversed range.
    pub fn line_count(&self) -> u64 {
        self.end
            .checked_sub(self.start)
            .map_or(0, |span| u64::from(span) + 1)
    }
}

/// How a source line is shown in a per-file page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Reached,
    Missed,
    /// Outside any recorded block (blank lines, braces, comments).
    Plain,
}

impl LineKind {
    /// CSS class used by the HTML renderer.
    pub fn css_class(self) -> &'static str {
        match self {
            LineKind::Reached => "run",
            LineKind::Missed => "mis show_mis",
            LineKind::Plain => "pln",
        }
    }
}

/// A sorted list of pairwise disjoint, non-adjacent line ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeIndex {
    ranges: Vec<LineRange>,
}

impl RangeIndex {
    /// Builds an index from ranges in any order, merging overlapping and
    /// adjacent ranges.
    pub fn from_ranges<I: IntoIterator<Item = LineRange>>(ranges: I) -> Self {
        let mut sorted: Vec<LineRange> = ranges.into_iter().collect();
        sorted.sort_unstable();

        let mut merged: Vec<LineRange> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// Checks if a line is covered by any range.
    pub fn contains(&self, line: u32) -> bool {
        self.ranges
            .binary_search_by(|range| {
                if range.end < line {
                    Ordering::Less
                } else if range.start > line {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Returns the lines of `self` that are not in `other`.
    pub fn subtract(&self, other: &RangeIndex) -> RangeIndex {
        let mut out = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            let first = other.ranges.partition_point(|cut| cut.end < range.start);
            let mut next = Some(range.start);
            for cut in &other.ranges[first..] {
                let Some(start) = next else { break };
                if cut.start > range.end {
                    break;
                }
                if cut.start > start {
                    out.push(LineRange::new(start, cut.start - 1));
                }
                next = cut.end.checked_add(1).filter(|line| *line <= range.end);
            }
            if let Some(start) = next {
                out.push(LineRange::new(start, range.end));
            }
        }
        RangeIndex { ranges: out }
    }

    /// Checks if any line is covered by both indexes.
    pub fn intersects(&self, other: &RangeIndex) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a, b) = (self.ranges[i], other.ranges[j]);
            if a.start <= b.end && b.start <= a.end {
                return true;
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        false
    }

    pub fn ranges(&self) -> &[LineRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of lines covered.
    pub fn line_count(&self) -> u64 {
        self.ranges.iter().map(LineRange::line_count).sum()
    }
}
