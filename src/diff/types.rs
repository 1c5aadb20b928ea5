#[derive(Debug, Clone)]
pub enum DiffRow {
    Unchanged(String),
    Pair(Vec<DiffLine>, Vec<DiffLine>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiffLineType {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
}

/// Classification of one node in a diff tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Equal,
    Changed,
    /// Present on the right only
    Added,
    /// Present on the left only
    Removed,
}

impl DiffKind {
    /// The kind seen when left and right trade places
    pub fn mirrored(self) -> Self {
        match self {
            DiffKind::Added => DiffKind::Removed,
            DiffKind::Removed => DiffKind::Added,
            other => other,
        }
    }
}

/// Which side moved away from the common ancestor in a three-way diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Only the left side differs from the ancestor
    Left,
    /// Only the right side differs from the ancestor
    Right,
    /// Both sides differ from the ancestor and from each other
    Conflicting,
}

impl Direction {
    pub fn mirrored(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Conflicting => Direction::Conflicting,
        }
    }
}
