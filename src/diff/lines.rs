use super::types::{DiffLine, DiffLineType, DiffRow};
use similar::{ChangeTag, TextDiff};

/// Compute line-based diff between old and new text
pub fn compute_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(old, new);

    diff.iter_all_changes()
        .map(|change| {
            let line_type = match change.tag() {
                ChangeTag::Delete => DiffLineType::Removed,
                ChangeTag::Insert => DiffLineType::Added,
                ChangeTag::Equal => DiffLineType::Unchanged,
            };

            DiffLine {
                line_type,
                content: change.to_string().trim_end().to_string(),
            }
        })
        .collect()
}

/// Group raw diff lines into rows where unchanged identical lines are single rows,
/// and contiguous removed/added blocks become paired rows.
pub fn group_into_rows(diff_lines: &[DiffLine]) -> Vec<DiffRow> {
    let mut rows = Vec::new();
    let mut i = 0usize;

    while i < diff_lines.len() {
        match &diff_lines[i].line_type {
            DiffLineType::Unchanged => {
                rows.push(DiffRow::Unchanged(diff_lines[i].content.clone()));
                i += 1;
            }
            DiffLineType::Removed => {
                let start = i;
                while i < diff_lines.len() && diff_lines[i].line_type == DiffLineType::Removed {
                    i += 1;
                }
                let removed_block = diff_lines[start..i].to_vec();

                // a following added block pairs with the removed one
                let added_start = i;
                while i < diff_lines.len() && diff_lines[i].line_type == DiffLineType::Added {
                    i += 1;
                }
                let added_block = diff_lines[added_start..i].to_vec();

                rows.push(DiffRow::Pair(removed_block, added_block));
            }
            DiffLineType::Added => {
                // added without preceding removal -> right-only
                rows.push(DiffRow::Pair(Vec::new(), vec![diff_lines[i].clone()]));
                i += 1;
            }
        }
    }

    rows
}

/// Check if diff lines contain meaningful changes (non-empty added or removed content)
pub fn has_meaningful_changes(diff_lines: &[DiffLine]) -> bool {
    diff_lines.iter().any(|line| {
        matches!(line.line_type, DiffLineType::Added | DiffLineType::Removed)
            && !line.content.trim().is_empty()
    })
}
