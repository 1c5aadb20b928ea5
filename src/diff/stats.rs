use super::types::DiffRow;
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub added_count: usize,
    pub removed_count: usize,
}

impl DiffStats {
    pub fn is_empty(&self) -> bool {
        self.added_count == 0 && self.removed_count == 0
    }
}

/// Calculate character-level statistics from diff rows
pub fn calculate_stats(rows: &[DiffRow]) -> DiffStats {
    let mut stats = DiffStats::default();

    for row in rows {
        if let DiffRow::Pair(left, right) = row {
            let left_str: String = left.iter().map(|l| l.content.as_str()).collect();
            let right_str: String = right.iter().map(|r| r.content.as_str()).collect();
            count_chars(&left_str, &right_str, &mut stats);
        }
    }

    stats
}

/// Character-level statistics between two whole texts
pub fn text_stats(old: &str, new: &str) -> DiffStats {
    let rows = super::lines::group_into_rows(&super::lines::compute_diff(old, new));
    calculate_stats(&rows)
}

fn count_chars(old: &str, new: &str, stats: &mut DiffStats) {
    let diff = TextDiff::from_chars(old, new);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.added_count += change.value().chars().count(),
            ChangeTag::Delete => stats.removed_count += change.value().chars().count(),
            ChangeTag::Equal => {}
        }
    }
}
