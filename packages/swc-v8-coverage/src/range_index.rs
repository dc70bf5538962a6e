//! Effective execution counts over one script's nested V8 ranges.
//!
//! V8 reports a function range with its call count and block ranges nested
//! inside it whose counts override the parent for the bytes they cover (an early
//! `return` shows up as a zero-count range over the unreached tail). The index
//! flattens that nesting once into disjoint segments so lookups are a binary
//! search.

use tracing::debug;

use crate::error::{CoverageError, Result};
use crate::raw_coverage::{RawRange, ScriptCoverage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
    pub count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeIndex {
    segments: Vec<Segment>,
}

impl RangeIndex {
    pub fn build(ranges: impl IntoIterator<Item = RawRange>) -> Result<Self> {
        Self::build_shifted(ranges, 0)
    }

    /// Every range of `script`, shifted left by the module wrapper length.
    pub fn from_script(script: &ScriptCoverage, wrapper_length: u32) -> Result<Self> {
        Self::build_shifted(script.raw_ranges(), wrapper_length)
    }

    /// Builds the index after subtracting `shift` from every offset.
    pub fn build_shifted(ranges: impl IntoIterator<Item = RawRange>, shift: u32) -> Result<Self> {
        let mut ranges = ranges
            .into_iter()
            .map(|range| {
                if range.start_offset > range.end_offset {
                    return Err(CoverageError::InvalidRange {
                        start: range.start_offset,
                        end: range.end_offset,
                    });
                }
                Ok((
                    range.start_offset.saturating_sub(shift),
                    range.end_offset.saturating_sub(shift),
                    range.count,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        // Parents before children; the sort is stable so a duplicate range
        // reported later nests inside the earlier one.
        ranges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut segments = Vec::with_capacity(ranges.len() * 2);
        let mut stack: Vec<(u32, u32, u32)> = Vec::new();
        let mut cursor = 0;

        for (start, end, count) in ranges {
            if start == end {
                continue;
            }
            while let Some(&(_, top_end, top_count)) = stack.last() {
                if top_end > start {
                    break;
                }
                push_segment(&mut segments, cursor, top_end, top_count);
                cursor = top_end;
                stack.pop();
            }
            if let Some(&(top_start, top_end, top_count)) = stack.last() {
                if end > top_end {
                    return Err(CoverageError::RangeOverlap {
                        first: (top_start, top_end),
                        second: (start, end),
                    });
                }
                push_segment(&mut segments, cursor, start, top_count);
            }
            cursor = start;
            stack.push((start, end, count));
        }
        while let Some((_, end, count)) = stack.pop() {
            push_segment(&mut segments, cursor, end, count);
            cursor = end;
        }

        debug!(segments = segments.len(), "built range index");
        Ok(Self { segments })
    }

    /// Count of the innermost range containing `offset`, 0 outside every range.
    pub fn count_at(&self, offset: u32) -> u32 {
        let idx = self.segments.partition_point(|segment| segment.end <= offset);
        match self.segments.get(idx) {
            Some(segment) if segment.start <= offset => segment.count,
            _ => 0,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn push_segment(segments: &mut Vec<Segment>, start: u32, end: u32, count: u32) {
    if start >= end {
        return;
    }
    if let Some(last) = segments.last_mut() {
        if last.end == start && last.count == count {
            last.end = end;
            return;
        }
    }
    segments.push(Segment { start, end, count });
}
