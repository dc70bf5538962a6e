//! Istanbul-style coverage totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::options::ReportLogic;
use crate::source_coverage::{BranchType, CoverageMap, FileCoverage};

/// Percentage the way istanbul rounds it: floored to two decimals, 100 when
/// there is nothing to cover.
pub fn percent(covered: u32, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let scaled = 1000.0 * 100.0 * covered as f64 / total as f64;
    (scaled / 10.0).floor() / 100.0
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total: u32,
    pub covered: u32,
    pub skipped: u32,
    pub pct: f64,
}

impl Default for Totals {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Totals {
    pub fn new(total: u32, covered: u32) -> Self {
        Self {
            total,
            covered,
            skipped: 0,
            pct: percent(covered, total),
        }
    }

    fn add(&mut self, other: &Totals) {
        *self = Totals::new(self.total + other.total, self.covered + other.covered);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub lines: Totals,
    pub statements: Totals,
    pub functions: Totals,
    pub branches: Totals,
}

impl CoverageSummary {
    pub fn merge(&mut self, other: &CoverageSummary) {
        self.lines.add(&other.lines);
        self.statements.add(&other.statements);
        self.functions.add(&other.functions);
        self.branches.add(&other.branches);
    }
}

fn totals<'a>(counts: impl Iterator<Item = &'a u32>) -> Totals {
    let (total, covered) = counts.fold((0, 0), |(total, covered), &count| {
        (total + 1, covered + u32::from(count > 0))
    });
    Totals::new(total, covered)
}

impl FileCoverage {
    /// Highest statement count per start line.
    pub fn line_coverage(&self) -> BTreeMap<u32, u32> {
        let mut lines = BTreeMap::new();
        for (key, range) in &self.statement_map {
            let count = self.s.get(key).copied().unwrap_or_default();
            lines
                .entry(range.start.line)
                .and_modify(|line: &mut u32| *line = (*line).max(count))
                .or_insert(count);
        }
        lines
    }

    pub fn summary(&self, logic: ReportLogic) -> CoverageSummary {
        let mut branches = (0, 0);
        for (key, entry) in &self.branch_map {
            let hits = self.b.get(key).map(Vec::as_slice).unwrap_or_default();
            let (total, covered) = match (logic, entry.kind) {
                (ReportLogic::Or, BranchType::BinaryExpr) => (1, u32::from(hits.iter().any(|&h| h > 0))),
                (ReportLogic::And, BranchType::BinaryExpr) => {
                    (1, u32::from(!hits.is_empty() && hits.iter().all(|&h| h > 0)))
                }
                _ => (
                    hits.len() as u32,
                    hits.iter().filter(|&&h| h > 0).count() as u32,
                ),
            };
            branches.0 += total;
            branches.1 += covered;
        }

        CoverageSummary {
            lines: totals(self.line_coverage().values()),
            statements: totals(self.s.values()),
            functions: totals(self.f.values()),
            branches: Totals::new(branches.0, branches.1),
        }
    }
}

impl CoverageMap {
    pub fn summary(&self, logic: ReportLogic) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for (_, cov) in self.files() {
            summary.merge(&cov.summary(logic));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_coverage::Range;

    #[test]
    fn istanbul_rounding() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(2, 3), 66.66);
        assert_eq!(percent(3, 3), 100.0);
    }

    fn sample() -> FileCoverage {
        let mut cov = FileCoverage::new("/a.js");
        cov.new_statement(Range::new(1, 0, 1, 10), 1);
        cov.new_statement(Range::new(1, 11, 1, 20), 0);
        cov.new_statement(Range::new(2, 0, 2, 10), 0);
        cov.new_function(Some("f"), Range::new(1, 0, 1, 5), Range::new(1, 0, 2, 10), 1);
        cov.new_branch(
            BranchType::BinaryExpr,
            Range::new(3, 0, 3, 10),
            vec![Range::new(3, 0, 3, 1), Range::new(3, 5, 3, 6), Range::new(3, 9, 3, 10)],
            vec![2, 1, 0],
        );
        cov.new_branch(
            BranchType::If,
            Range::new(4, 0, 5, 1),
            vec![Range::new(4, 7, 5, 1), Range::new(5, 1, 5, 1)],
            vec![1, 0],
        );
        cov
    }

    #[test]
    fn lines_take_the_highest_statement() {
        let lines = sample().line_coverage();
        assert_eq!(lines.get(&1), Some(&1));
        assert_eq!(lines.get(&2), Some(&0));
    }

    #[test]
    fn report_logic_changes_branch_totals() {
        let cov = sample();
        let off = cov.summary(ReportLogic::Off);
        assert_eq!((off.branches.total, off.branches.covered), (5, 3));
        let or = cov.summary(ReportLogic::Or);
        assert_eq!((or.branches.total, or.branches.covered), (3, 2));
        let and = cov.summary(ReportLogic::And);
        assert_eq!((and.branches.total, and.branches.covered), (3, 1));

        assert_eq!((off.statements.total, off.statements.covered), (3, 1));
        assert_eq!((off.lines.total, off.lines.covered), (2, 1));
        assert_eq!(off.functions.pct, 100.0);
    }
}
