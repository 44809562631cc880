//! Line-level diff between two snapshots.
//!
//! Classifies every line of the old and new text as removed, added or common
//! using a longest-common-subsequence alignment. When both a removal and an
//! insertion are equally good the removal is emitted first.

use serde::{Deserialize, Serialize};

/// One step of the alignment between old and new lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp<'a> {
    Removed(&'a str),
    Added(&'a str),
    Common(&'a str),
}

/// Lines of each category in alignment order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub common: Vec<String>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty()
    }

    /// Get the total number of changed lines.
    pub fn change_count(&self) -> usize {
        self.removed.len() + self.added.len()
    }
}

/// Align the lines of `old` and `new`.
///
/// Both texts are trimmed as a whole before being split into lines. The
/// shared leading and trailing lines are matched directly, so the quadratic
/// table only spans the region that actually changed.
pub fn diff_lines<'a>(old: &'a str, new: &'a str) -> Vec<DiffOp<'a>> {
    let old: Vec<&str> = old.trim().lines().collect();
    let new: Vec<&str> = new.trim().lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(x, y)| x == y).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut ops = Vec::with_capacity(old.len() + new.len());
    ops.extend(old[..prefix].iter().map(|line| DiffOp::Common(line)));
    align(
        &old[prefix..old.len() - suffix],
        &new[prefix..new.len() - suffix],
        &mut ops,
    );
    ops.extend(old[old.len() - suffix..].iter().map(|line| DiffOp::Common(line)));
    ops
}

fn align<'a>(a: &[&'a str], b: &[&'a str], ops: &mut Vec<DiffOp<'a>>) {
    // lcs[i][j] = length of the LCS of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            ops.push(DiffOp::Common(a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(DiffOp::Removed(a[i]));
            i += 1;
        } else {
            ops.push(DiffOp::Added(b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().map(|line| DiffOp::Removed(line)));
    ops.extend(b[j..].iter().map(|line| DiffOp::Added(line)));
}

/// Classify the lines of `old` and `new` into removed, added and common.
pub fn diff(old: &str, new: &str) -> DiffResult {
    let mut result = DiffResult::default();
    for op in diff_lines(old, new) {
        match op {
            DiffOp::Removed(line) => result.removed.push(line.to_string()),
            DiffOp::Added(line) => result.added.push(line.to_string()),
            DiffOp::Common(line) => result.common.push(line.to_string()),
        }
    }
    result
}
