//! Structural two- and three-way comparison.
//!
//! For two-way diffs a node's kind describes going from left to right.
//! For three-way diffs the kind describes the change relative to the
//! ancestor and `direction` says which side made it.

use super::input::{CompareInput, IdentityComparator, Input, RevisionIdentity, Verdict};
use super::stats::{DiffStats, text_stats};
use super::types::{DiffKind, Direction};
use crate::error::{Cancelled, ContentError};
use crate::history::edition::{StructuredContent, same_content};
use crate::progress::ProgressMonitor;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DiffNode {
    name: String,
    kind: DiffKind,
    direction: Option<Direction>,
    ancestor: Option<Input>,
    left: Option<Input>,
    right: Option<Input>,
    children: Vec<DiffNode>,
    stats: Option<DiffStats>,
}

impl DiffNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DiffKind {
        self.kind
    }

    /// Always `None` for two-way diffs and for equal nodes
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn ancestor(&self) -> Option<&Input> {
        self.ancestor.as_ref()
    }

    pub fn left(&self) -> Option<&Input> {
        self.left.as_ref()
    }

    pub fn right(&self) -> Option<&Input> {
        self.right.as_ref()
    }

    pub fn children(&self) -> &[DiffNode] {
        &self.children
    }

    /// Character statistics of a changed text leaf. Containers never carry
    /// statistics of their own.
    pub fn stats(&self) -> Option<DiffStats> {
        self.stats
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first search by name path, e.g. `["src", "main.rs"]`
    pub fn find(&self, path: &[&str]) -> Option<&DiffNode> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children
            .iter()
            .find(|c| c.name == *first)
            .and_then(|c| c.find(rest))
    }

    /// Number of nodes in this subtree, this node included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DiffNode::node_count).sum::<usize>()
    }
}

/// First content failure seen during a build, plus how many there were
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFailure {
    pub first: ContentError,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct DiffTree {
    root: DiffNode,
    failure: Option<ContentFailure>,
}

impl DiffTree {
    pub fn root(&self) -> &DiffNode {
        &self.root
    }

    pub fn into_root(self) -> DiffNode {
        self.root
    }

    /// Non-fatal diagnostic: some content could not be read and the affected
    /// nodes were classified as changed
    pub fn failure(&self) -> Option<&ContentFailure> {
        self.failure.as_ref()
    }

    pub fn is_equal(&self) -> bool {
        self.root.kind == DiffKind::Equal
    }
}

/// A build either completes or is cancelled; there is no partial tree
#[derive(Debug, Clone)]
pub enum DiffOutcome {
    Completed(DiffTree),
    Cancelled,
}

impl DiffOutcome {
    pub fn tree(&self) -> Option<&DiffTree> {
        match self {
            DiffOutcome::Completed(tree) => Some(tree),
            DiffOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiffOutcome::Cancelled)
    }
}

#[derive(Clone)]
pub struct DiffTreeBuilder {
    comparator: Arc<dyn IdentityComparator>,
}

impl Default for DiffTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffTreeBuilder {
    pub fn new() -> Self {
        Self::with_comparator(Arc::new(RevisionIdentity))
    }

    pub fn with_comparator(comparator: Arc<dyn IdentityComparator>) -> Self {
        Self { comparator }
    }

    /// Best-effort node count for progress: the roots plus their direct
    /// children
    pub fn estimate(left: &Input, right: &Input) -> usize {
        let count = |input: &Input| {
            input
                .children()
                .ok()
                .flatten()
                .map_or(0, |children| children.len())
        };
        1 + count(left).max(count(right))
    }

    pub fn build(
        &self,
        three_way: bool,
        ancestor: Option<&Input>,
        left: &Input,
        right: &Input,
        monitor: &ProgressMonitor,
    ) -> DiffOutcome {
        monitor.begin(Self::estimate(left, right));

        let mut pass = Pass {
            comparator: self.comparator.as_ref(),
            monitor,
            three_way,
            failure: None,
        };
        let ancestor = if three_way { ancestor } else { None };

        match pass.traverse(ancestor, Some(left), Some(right)) {
            Ok(root) => {
                if let Some(failure) = &pass.failure {
                    warn!(
                        "Diff of {} completed with {} unreadable input(s): {}",
                        root.name, failure.count, failure.first
                    );
                }
                DiffOutcome::Completed(DiffTree {
                    root,
                    failure: pass.failure,
                })
            }
            Err(Cancelled) => {
                debug!("Diff of {} cancelled", left.name());
                DiffOutcome::Cancelled
            }
        }
    }
}

/// Lazily read contents of the three sides of one node
struct Sides<'i> {
    inputs: [Option<&'i Input>; 3],
    contents: [Option<Option<Arc<StructuredContent>>>; 3],
}

const ANCESTOR: usize = 0;
const LEFT: usize = 1;
const RIGHT: usize = 2;

impl<'i> Sides<'i> {
    fn new(ancestor: Option<&'i Input>, left: Option<&'i Input>, right: Option<&'i Input>) -> Self {
        Self {
            inputs: [ancestor, left, right],
            contents: [None, None, None],
        }
    }

    fn present(&self, side: usize) -> bool {
        self.inputs[side].is_some()
    }
}

struct Pass<'b> {
    comparator: &'b dyn IdentityComparator,
    monitor: &'b ProgressMonitor,
    three_way: bool,
    failure: Option<ContentFailure>,
}

impl Pass<'_> {
    fn traverse(
        &mut self,
        ancestor: Option<&Input>,
        left: Option<&Input>,
        right: Option<&Input>,
    ) -> Result<DiffNode, Cancelled> {
        if self.monitor.is_cancelled() {
            return Err(Cancelled);
        }
        self.monitor.worked(1);

        let name = left
            .or(right)
            .or(ancestor)
            .map(|input| input.name().to_string())
            .unwrap_or_default();

        // sides that are equal by identity need no descent and no reads; with
        // an ancestor this also covers the same change made on both sides
        if let (Some(l), Some(r)) = (left, right)
            && self.comparator.compare(l, r) == Verdict::Equal
        {
            return Ok(self.node(name, DiffKind::Equal, None, ancestor, left, right, Vec::new(), None));
        }

        let listed = [
            self.children_of(ancestor),
            self.children_of(left),
            self.children_of(right),
        ];

        if listed.iter().any(Option::is_some) {
            return self.container(name, ancestor, left, right, listed);
        }

        let mut sides = Sides::new(ancestor, left, right);
        let (kind, direction) = self.classify(&mut sides);
        let stats = if kind == DiffKind::Changed && sides.present(LEFT) && sides.present(RIGHT) {
            self.leaf_stats(&mut sides)
        } else {
            None
        };

        Ok(self.node(name, kind, direction, ancestor, left, right, Vec::new(), stats))
    }

    fn container(
        &mut self,
        name: String,
        ancestor: Option<&Input>,
        left: Option<&Input>,
        right: Option<&Input>,
        listed: [Option<Vec<Input>>; 3],
    ) -> Result<DiffNode, Cancelled> {
        let both_containers = listed[LEFT].is_some() && listed[RIGHT].is_some();
        let [ancestor_children, left_children, right_children] =
            listed.map(Option::unwrap_or_default);

        let ancestor_keys = child_keys(&ancestor_children);
        let left_keys = child_keys(&left_children);
        let right_keys = child_keys(&right_children);

        // ancestor-only children go last, in ancestor order
        let mut order = merge_order(&left_keys, &right_keys);
        let merged: HashSet<&ChildKey> = order.iter().collect();
        let ancestor_only: Vec<ChildKey> = ancestor_keys
            .iter()
            .filter(|key| !merged.contains(key))
            .cloned()
            .collect();
        order.extend(ancestor_only);

        let index = |keys: &[ChildKey]| -> HashMap<ChildKey, usize> {
            keys.iter().cloned().zip(0..).collect()
        };
        let ancestor_index = index(&ancestor_keys);
        let left_index = index(&left_keys);
        let right_index = index(&right_keys);

        let mut nodes = Vec::with_capacity(order.len());
        for key in &order {
            let a = ancestor_index.get(key).map(|&i| &ancestor_children[i]);
            let l = left_index.get(key).map(|&i| &left_children[i]);
            let r = right_index.get(key).map(|&i| &right_children[i]);
            nodes.push(self.traverse(if self.three_way { a } else { None }, l, r)?);
        }

        let (kind, direction) = if left.is_some() && right.is_some() {
            if both_containers && nodes.iter().all(|n| n.kind == DiffKind::Equal) {
                (DiffKind::Equal, None)
            } else if self.three_way {
                (DiffKind::Changed, Some(merge_directions(&nodes)))
            } else {
                (DiffKind::Changed, None)
            }
        } else {
            self.container_presence(ancestor.is_some(), left.is_some(), right.is_some(), &nodes)
        };

        Ok(self.node(name, kind, direction, ancestor, left, right, nodes, None))
    }

    /// Kind of a container missing on the left or the right. Containers have
    /// no bytes, so "unchanged against the ancestor" is read off the children.
    fn container_presence(
        &self,
        has_ancestor: bool,
        has_left: bool,
        has_right: bool,
        children: &[DiffNode],
    ) -> (DiffKind, Option<Direction>) {
        let added = if has_left { Direction::Left } else { Direction::Right };

        if !has_left && !has_right {
            return (DiffKind::Removed, Some(Direction::Conflicting));
        }

        if !self.three_way {
            return if has_left {
                (DiffKind::Removed, None)
            } else {
                (DiffKind::Added, None)
            };
        }
        if !has_ancestor {
            return (DiffKind::Added, Some(added));
        }

        // the deleting side is the one that is missing
        let deleted_by = if has_left { Direction::Right } else { Direction::Left };
        let clean_delete = children
            .iter()
            .all(|c| c.kind == DiffKind::Removed && c.direction == Some(deleted_by));
        if clean_delete {
            (DiffKind::Removed, Some(deleted_by))
        } else {
            (DiffKind::Changed, Some(Direction::Conflicting))
        }
    }

    /// Kind of a leaf (or of a node missing on some side)
    fn classify(&mut self, sides: &mut Sides<'_>) -> (DiffKind, Option<Direction>) {
        if !sides.present(LEFT) || !sides.present(RIGHT) {
            return self.classify_presence(sides);
        }

        if !self.three_way {
            return match self.equal(sides, LEFT, RIGHT) {
                Some(true) => (DiffKind::Equal, None),
                _ => (DiffKind::Changed, None),
            };
        }

        if !sides.present(ANCESTOR) {
            // added on both sides
            return match self.equal(sides, LEFT, RIGHT) {
                Some(true) => (DiffKind::Equal, None),
                _ => (DiffKind::Added, Some(Direction::Conflicting)),
            };
        }

        let left_same = self.equal(sides, ANCESTOR, LEFT);
        let right_same = self.equal(sides, ANCESTOR, RIGHT);
        match (left_same, right_same) {
            (Some(true), Some(true)) => (DiffKind::Equal, None),
            (Some(true), Some(false)) => (DiffKind::Changed, Some(Direction::Right)),
            (Some(false), Some(true)) => (DiffKind::Changed, Some(Direction::Left)),
            _ => match self.equal(sides, LEFT, RIGHT) {
                // same change made on both sides
                Some(true) => (DiffKind::Equal, None),
                _ => (DiffKind::Changed, Some(Direction::Conflicting)),
            },
        }
    }

    /// Kind of a node that is missing on the left or the right
    fn classify_presence(&mut self, sides: &mut Sides<'_>) -> (DiffKind, Option<Direction>) {
        let (left, right) = (sides.present(LEFT), sides.present(RIGHT));

        if !self.three_way {
            return match (left, right) {
                (false, true) => (DiffKind::Added, None),
                (true, false) => (DiffKind::Removed, None),
                _ => (DiffKind::Equal, None),
            };
        }

        if !sides.present(ANCESTOR) {
            return match (left, right) {
                (false, true) => (DiffKind::Added, Some(Direction::Right)),
                (true, false) => (DiffKind::Added, Some(Direction::Left)),
                _ => (DiffKind::Equal, None),
            };
        }

        match (left, right) {
            (false, false) => (DiffKind::Removed, Some(Direction::Conflicting)),
            (false, true) => match self.equal(sides, ANCESTOR, RIGHT) {
                Some(true) => (DiffKind::Removed, Some(Direction::Left)),
                _ => (DiffKind::Changed, Some(Direction::Conflicting)),
            },
            (true, false) => match self.equal(sides, ANCESTOR, LEFT) {
                Some(true) => (DiffKind::Removed, Some(Direction::Right)),
                _ => (DiffKind::Changed, Some(Direction::Conflicting)),
            },
            (true, true) => (DiffKind::Equal, None),
        }
    }

    /// `None` when either side's content is unreadable
    fn equal(&mut self, sides: &mut Sides<'_>, a: usize, b: usize) -> Option<bool> {
        let (Some(x), Some(y)) = (sides.inputs[a], sides.inputs[b]) else {
            return Some(false);
        };

        match self.comparator.compare(x, y) {
            Verdict::Equal => return Some(true),
            Verdict::NotEqual => return Some(false),
            Verdict::Unknown => {}
        }

        let x = self.content(sides, a);
        let y = self.content(sides, b);
        if x.is_none() || y.is_none() {
            return None;
        }
        Some(same_content(x.as_deref(), y.as_deref()))
    }

    fn content(&mut self, sides: &mut Sides<'_>, side: usize) -> Option<Arc<StructuredContent>> {
        if let Some(loaded) = &sides.contents[side] {
            return loaded.clone();
        }

        let loaded = sides.inputs[side].and_then(|input| match input.read_content() {
            Ok(content) => Some(content),
            Err(e) => {
                self.report(e);
                None
            }
        });
        sides.contents[side] = Some(loaded.clone());
        loaded
    }

    fn leaf_stats(&mut self, sides: &mut Sides<'_>) -> Option<DiffStats> {
        let left = self.content(sides, LEFT)?;
        let right = self.content(sides, RIGHT)?;
        let left = std::str::from_utf8(left.as_bytes()).ok()?;
        let right = std::str::from_utf8(right.as_bytes()).ok()?;
        Some(text_stats(left, right))
    }

    fn children_of(&mut self, input: Option<&Input>) -> Option<Vec<Input>> {
        match input?.children() {
            Ok(children) => children,
            Err(e) => {
                self.report(e);
                None
            }
        }
    }

    fn report(&mut self, error: ContentError) {
        debug!("Content unavailable during diff: {}", error);
        match &mut self.failure {
            Some(failure) => failure.count += 1,
            None => {
                self.failure = Some(ContentFailure {
                    first: error,
                    count: 1,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn node(
        &self,
        name: String,
        kind: DiffKind,
        direction: Option<Direction>,
        ancestor: Option<&Input>,
        left: Option<&Input>,
        right: Option<&Input>,
        children: Vec<DiffNode>,
        stats: Option<DiffStats>,
    ) -> DiffNode {
        DiffNode {
            name,
            kind,
            direction: if self.three_way && kind != DiffKind::Equal {
                direction
            } else {
                None
            },
            ancestor: ancestor.cloned(),
            left: left.cloned(),
            right: right.cloned(),
            children,
            stats,
        }
    }
}

/// A child's name plus how many earlier siblings share it, so repeated names
/// pair up by occurrence
type ChildKey = (String, usize);

fn child_keys(children: &[Input]) -> Vec<ChildKey> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    children
        .iter()
        .map(|child| {
            let occurrence = seen.entry(child.name()).or_default();
            let key = (child.name().to_string(), *occurrence);
            *occurrence += 1;
            key
        })
        .collect()
}

/// Merge two sibling orders into one that does not depend on which side is
/// passed first. Shared keys keep their relative order where the sides agree;
/// ties go to the smaller key.
fn merge_order(x: &[ChildKey], y: &[ChildKey]) -> Vec<ChildKey> {
    let in_x: HashSet<&ChildKey> = x.iter().collect();
    let in_y: HashSet<&ChildKey> = y.iter().collect();
    let mut emitted: HashSet<&ChildKey> = HashSet::new();
    let mut order = Vec::with_capacity(x.len().max(y.len()));
    let (mut i, mut j) = (0, 0);

    loop {
        while i < x.len() && emitted.contains(&x[i]) {
            i += 1;
        }
        while j < y.len() && emitted.contains(&y[j]) {
            j += 1;
        }

        let next = match (x.get(i), y.get(j)) {
            (None, None) => break,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => match (in_y.contains(a), in_x.contains(b)) {
                (false, true) => a,
                (true, false) => b,
                _ => a.min(b),
            },
        };
        emitted.insert(next);
        order.push(next.clone());
    }
    order
}

/// Direction of a changed container: the common direction of its changed
/// children, or conflicting when they disagree
fn merge_directions(children: &[DiffNode]) -> Direction {
    let mut directions = children.iter().filter_map(DiffNode::direction);
    let Some(first) = directions.next() else {
        return Direction::Conflicting;
    };
    if directions.all(|d| d == first) {
        first
    } else {
        Direction::Conflicting
    }
}
