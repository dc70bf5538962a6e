//! Folding coverage for the same file produced by several scripts or runs.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::{CoverageError, Result};
use crate::source_coverage::{BranchEntry, BranchType, CoverageMap, FileCoverage, FunctionEntry, Location, Range};

/// Start ascending, then end descending.
type CanonicalRange = (Location, Reverse<Location>);

fn canonical(range: &Range) -> CanonicalRange {
    (range.start, Reverse(range.end))
}

fn same_keys<A, B>(left: &IndexMap<u32, A>, right: &IndexMap<u32, B>) -> bool {
    left.len() == right.len() && left.keys().all(|key| right.contains_key(key))
}

fn check_tables(cov: &FileCoverage) -> Result<()> {
    if !same_keys(&cov.statement_map, &cov.s) {
        return Err(CoverageError::merge_conflict(&cov.path, "statementMap and s keys differ"));
    }
    if !same_keys(&cov.fn_map, &cov.f) {
        return Err(CoverageError::merge_conflict(&cov.path, "fnMap and f keys differ"));
    }
    if !same_keys(&cov.branch_map, &cov.b) {
        return Err(CoverageError::merge_conflict(&cov.path, "branchMap and b keys differ"));
    }
    for (key, branch) in &cov.branch_map {
        if cov.b.get(key).map(Vec::len) != Some(branch.locations.len()) {
            return Err(CoverageError::merge_conflict(
                &cov.path,
                format!("branch {key} has a different number of locations and hits"),
            ));
        }
    }
    Ok(())
}

fn group<K: Ord, V>(items: impl IntoIterator<Item = (K, V)>) -> BTreeMap<K, Vec<V>> {
    let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for (key, value) in items {
        groups.entry(key).or_default().push(value);
    }
    groups
}

/// Pairs the k-th duplicate of each key with the k-th duplicate on the other
/// side; leftovers are kept as they are.
fn merge_groups<K: Ord, V>(
    mut left: BTreeMap<K, Vec<V>>,
    right: BTreeMap<K, Vec<V>>,
    mut combine: impl FnMut(V, V) -> Result<V>,
) -> Result<Vec<V>> {
    for (key, values) in right {
        let slot = left.entry(key).or_default();
        let mut merged = Vec::with_capacity(slot.len().max(values.len()));
        let mut ours = std::mem::take(slot).into_iter();
        let mut theirs = values.into_iter();
        loop {
            match (ours.next(), theirs.next()) {
                (Some(a), Some(b)) => merged.push(combine(a, b)?),
                (Some(value), None) | (None, Some(value)) => merged.push(value),
                (None, None) => break,
            }
        }
        *slot = merged;
    }
    Ok(left.into_values().flatten().collect())
}

fn statements(cov: &FileCoverage) -> BTreeMap<CanonicalRange, Vec<(Range, u32)>> {
    group(cov.statement_map.iter().map(|(key, range)| {
        let count = cov.s.get(key).copied().unwrap_or_default();
        (canonical(range), (*range, count))
    }))
}

type FunctionKey = (CanonicalRange, CanonicalRange);

fn functions(cov: &FileCoverage) -> BTreeMap<FunctionKey, Vec<(FunctionEntry, u32)>> {
    group(cov.fn_map.iter().map(|(key, entry)| {
        let count = cov.f.get(key).copied().unwrap_or_default();
        ((canonical(&entry.loc), canonical(&entry.decl)), (entry.clone(), count))
    }))
}

type BranchKey = (CanonicalRange, BranchType);

fn branches(cov: &FileCoverage) -> BTreeMap<BranchKey, Vec<(BranchEntry, Vec<u32>)>> {
    group(cov.branch_map.iter().map(|(key, entry)| {
        let hits = cov.b.get(key).cloned().unwrap_or_default();
        ((canonical(&entry.loc), entry.kind), (entry.clone(), hits))
    }))
}

/// Sums the counts of two coverage objects for the same file.
///
/// Entries match on kind and range; keys of the result are renumbered in
/// source order, so the operation is commutative and associative.
pub fn merge_file_coverage(left: &FileCoverage, right: &FileCoverage) -> Result<FileCoverage> {
    if left.path != right.path {
        return Err(CoverageError::merge_conflict(
            &left.path,
            format!("cannot merge with coverage for {}", right.path),
        ));
    }
    check_tables(left)?;
    check_tables(right)?;

    let mut out = FileCoverage::new(left.path.clone());

    for (range, count) in merge_groups(statements(left), statements(right), |(range, a), (_, b)| {
        Ok((range, a.saturating_add(b)))
    })? {
        out.new_statement(range, count);
    }

    let merged_functions = merge_groups(functions(left), functions(right), |(a, x), (b, y)| {
        let entry = if b.name < a.name { b } else { a };
        Ok((entry, x.saturating_add(y)))
    })?;
    for (id, (entry, count)) in merged_functions.into_iter().enumerate() {
        out.fn_map.insert(id as u32, entry);
        out.f.insert(id as u32, count);
    }

    let path = &left.path;
    let merged_branches = merge_groups(branches(left), branches(right), |(a, x), (b, y)| {
        if a.locations != b.locations {
            return Err(CoverageError::merge_conflict(
                path.as_str(),
                format!("{} branch at {} has different locations", a.kind.as_str(), a.loc),
            ));
        }
        let hits = x.iter().zip(&y).map(|(p, q)| p.saturating_add(*q)).collect();
        Ok((a, hits))
    })?;
    for (id, (entry, hits)) in merged_branches.into_iter().enumerate() {
        out.branch_map.insert(id as u32, entry);
        out.b.insert(id as u32, hits);
    }

    Ok(out)
}

impl CoverageMap {
    /// Adds `cov`, merging it into what is already known about its file.
    ///
    /// A conflict marks the file indeterminate: its coverage is dropped and
    /// later fragments for it are ignored.
    pub fn merge_file(&mut self, cov: FileCoverage) {
        if self.indeterminate.contains_key(&cov.path) {
            return;
        }
        let Some(existing) = self.files.get(&cov.path) else {
            self.files.insert(cov.path.clone(), cov);
            return;
        };
        match merge_file_coverage(existing, &cov) {
            Ok(merged) => {
                self.files.insert(cov.path, merged);
            }
            Err(err) => {
                warn!(path = %cov.path, error = %err, "coverage is indeterminate");
                self.files.shift_remove(&cov.path);
                self.indeterminate.insert(cov.path, err.to_string());
            }
        }
    }

    pub fn merge(&mut self, other: CoverageMap) {
        for (path, reason) in other.indeterminate {
            self.files.shift_remove(&path);
            self.indeterminate.entry(path).or_insert(reason);
        }
        for (_, cov) in other.files {
            self.merge_file(cov);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn file(statements: &[((u32, u32, u32, u32), u32)]) -> FileCoverage {
        let mut cov = FileCoverage::new("/a.js");
        for &((sl, sc, el, ec), count) in statements {
            cov.new_statement(Range::new(sl, sc, el, ec), count);
        }
        cov
    }

    #[test]
    fn matching_statements_add_up() {
        let a = file(&[((1, 0, 1, 5), 1), ((2, 0, 2, 5), 0)]);
        let b = file(&[((2, 0, 2, 5), 3), ((1, 0, 1, 5), 2)]);
        let merged = merge_file_coverage(&a, &b).unwrap();
        assert_eq!(merged.s.values().copied().collect::<Vec<_>>(), vec![3, 3]);
        assert_eq!(merged.statement_map[&0], Range::new(1, 0, 1, 5));
    }

    #[test]
    fn unmatched_entries_are_unioned_in_canonical_order() {
        let a = file(&[((3, 0, 3, 5), 1)]);
        let b = file(&[((1, 0, 4, 0), 2), ((1, 0, 1, 5), 1)]);
        let merged = merge_file_coverage(&a, &b).unwrap();
        let ranges: Vec<_> = merged.statement_map.values().copied().collect();
        assert_eq!(
            ranges,
            vec![Range::new(1, 0, 4, 0), Range::new(1, 0, 1, 5), Range::new(3, 0, 3, 5)]
        );
    }

    #[test]
    fn duplicate_ranges_match_by_occurrence() {
        let a = file(&[((1, 0, 1, 5), 1), ((1, 0, 1, 5), 10)]);
        let b = file(&[((1, 0, 1, 5), 2)]);
        let merged = merge_file_coverage(&a, &b).unwrap();
        assert_eq!(merged.s.values().copied().collect::<Vec<_>>(), vec![3, 10]);
    }

    #[test]
    fn branch_location_mismatch_conflicts() {
        let mut a = FileCoverage::new("/a.js");
        a.new_branch(
            BranchType::If,
            Range::new(1, 0, 3, 1),
            vec![Range::new(1, 5, 2, 0), Range::new(3, 1, 3, 1)],
            vec![1, 0],
        );
        let mut b = FileCoverage::new("/a.js");
        b.new_branch(
            BranchType::If,
            Range::new(1, 0, 3, 1),
            vec![Range::new(1, 5, 2, 0), Range::new(2, 6, 3, 1)],
            vec![0, 1],
        );
        let err = merge_file_coverage(&a, &b).unwrap_err();
        assert!(matches!(err, CoverageError::MergeConflict { .. }));

        let mut map = CoverageMap::new();
        map.merge_file(a);
        map.merge_file(b);
        assert!(map.get("/a.js").is_none());
        assert_eq!(map.indeterminate().count(), 1);
    }

    #[test]
    fn misaligned_tables_conflict() {
        let mut a = file(&[((1, 0, 1, 5), 1)]);
        a.s.insert(7, 1);
        let b = file(&[((1, 0, 1, 5), 1)]);
        assert!(merge_file_coverage(&a, &b).is_err());
    }

    #[test]
    fn functions_merge_on_decl_and_loc() {
        let mut a = FileCoverage::new("/a.js");
        a.new_function(Some("f"), Range::new(1, 0, 1, 14), Range::new(1, 0, 3, 1), 1);
        let mut b = FileCoverage::new("/a.js");
        b.new_function(Some("f"), Range::new(1, 0, 1, 14), Range::new(1, 0, 3, 1), 4);
        b.new_function(None, Range::new(5, 0, 5, 8), Range::new(5, 0, 5, 20), 0);
        let merged = merge_file_coverage(&a, &b).unwrap();
        assert_eq!(merged.f.values().copied().collect::<Vec<_>>(), vec![5, 0]);
        assert_eq!(merged.fn_map[&0].name, "f");
    }

    fn arb_file() -> impl Strategy<Value = FileCoverage> {
        prop::collection::vec(((1u32..4, 0u32..3, 0u32..3), 0u32..5), 0..6).prop_map(|entries| {
            let mut cov = FileCoverage::new("/a.js");
            for ((line, column, width), count) in entries {
                cov.new_statement(Range::new(line, column, line, column + width), count);
            }
            cov
        })
    }

    proptest! {
        #[test]
        fn merge_is_associative_and_commutative(a in arb_file(), b in arb_file(), c in arb_file()) {
            let ab = merge_file_coverage(&a, &b).unwrap();
            let ba = merge_file_coverage(&b, &a).unwrap();
            prop_assert_eq!(&ab, &ba);
            let left = merge_file_coverage(&ab, &c).unwrap();
            let bc = merge_file_coverage(&b, &c).unwrap();
            let right = merge_file_coverage(&a, &bc).unwrap();
            prop_assert_eq!(left, right);
        }
    }
}
