use super::edition::{Edition, EditionMap, StructuredContent, same_content};
use super::types::{ContentSource, Revision};
use crate::error::Cancelled;
use crate::progress::CancelToken;
use std::sync::Arc;
use tracing::{debug, warn};

/// Order revisions newest first. Equal timestamps fall back to the content
/// identifier so repeated calls see the same order.
pub fn sort_descending(revisions: &mut [Revision]) {
    revisions.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| a.content_id().cmp(b.content_id()))
    });
}

/// Drop every revision whose content equals the nearest newer distinct
/// edition, starting from `reference` (usually the live content).
///
/// Kept revisions are returned newest first and their editions are stored in
/// `editions`; dropped editions are released immediately. A revision whose
/// content can't be loaded is kept.
pub fn dedupe<S: ContentSource + ?Sized>(
    reference: &mut Edition,
    revisions: &[Revision],
    source: &S,
    editions: &mut EditionMap,
    cancel: &CancelToken,
) -> Result<Vec<Revision>, Cancelled> {
    let mut ordered = revisions.to_vec();
    sort_descending(&mut ordered);

    let mut previous: Option<Arc<StructuredContent>> = match reference.materialize(source) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!("Reference edition {} unavailable: {}", reference.label(), e);
            None
        }
    };

    let mut kept = Vec::with_capacity(ordered.len());

    for revision in ordered {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let mut edition = Edition::for_revision(revision.clone());
        let current = match edition.materialize(source) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Keeping revision {}: {}", revision.content_id(), e);
                None
            }
        };

        if same_content(previous.as_deref(), current.as_deref()) {
            debug!("Dropping revision {}: no content change", revision.content_id());
            edition.release();
            continue;
        }

        previous = current;
        editions.insert(edition);
        kept.push(revision);
    }

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::edition::tests::MemorySource;
    use crate::history::types::{ContentHandle, ResourceId};

    fn rev(id: &str, timestamp: i64, handle: &str) -> Revision {
        Revision::new(id, timestamp, ContentHandle::new(handle))
    }

    fn ids(revisions: &[Revision]) -> Vec<&str> {
        revisions.iter().map(Revision::content_id).collect()
    }

    fn scenario() -> (MemorySource, Vec<Revision>) {
        let source = MemorySource::with_local("X")
            .blob("hx", "X")
            .blob("hy", "Y")
            .blob("hz", "Z");
        // R1 is the newest revision
        let revisions = vec![
            rev("R3", 200, "hy"),
            rev("R1", 400, "hx"),
            rev("R4", 100, "hz"),
            rev("R2", 300, "hy"),
        ];
        (source, revisions)
    }

    #[test]
    fn test_drops_unchanged_revisions() {
        let (source, revisions) = scenario();
        let mut reference = Edition::local(ResourceId::new("doc"));
        let mut editions = EditionMap::new();

        let kept = dedupe(
            &mut reference,
            &revisions,
            &source,
            &mut editions,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(ids(&kept), vec!["R2", "R4"]);
        assert_eq!(editions.len(), 2);
        assert!(editions.contains("R2"));
        assert!(!editions.contains("R1"));
        assert!(editions.get("R4").unwrap().is_materialized());
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let (source, revisions) = scenario();
        let mut reference = Edition::local(ResourceId::new("doc"));

        let first = dedupe(
            &mut reference,
            &revisions,
            &source,
            &mut EditionMap::new(),
            &CancelToken::new(),
        )
        .unwrap();
        let second = dedupe(
            &mut reference,
            &first,
            &source,
            &mut EditionMap::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_kept_revisions_differ_from_predecessor() {
        let source = MemorySource::with_local("a")
            .blob("a", "a")
            .blob("b", "b")
            .blob("c", "c");
        let revisions = vec![
            rev("1", 9, "a"),
            rev("2", 8, "b"),
            rev("3", 7, "b"),
            rev("4", 6, "a"),
            rev("5", 5, "a"),
            rev("6", 4, "c"),
            rev("7", 3, "b"),
        ];
        let mut reference = Edition::local(ResourceId::new("doc"));
        let mut editions = EditionMap::new();

        let kept = dedupe(
            &mut reference,
            &revisions,
            &source,
            &mut editions,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(ids(&kept), vec!["2", "4", "6", "7"]);
        let mut previous = "a".to_string();
        for revision in &kept {
            let text = editions.get(revision.content_id()).unwrap().content().unwrap().text().to_string();
            assert_ne!(text, previous);
            previous = text;
        }
    }

    #[test]
    fn test_unavailable_content_is_kept() {
        // "r2" has no blob; both it and the following identical-looking
        // revision must survive
        let source = MemorySource::with_local("a").blob("a", "a");
        let revisions = vec![rev("r1", 3, "a"), rev("r2", 2, "missing"), rev("r3", 1, "a")];
        let mut reference = Edition::local(ResourceId::new("doc"));

        let kept = dedupe(
            &mut reference,
            &revisions,
            &source,
            &mut EditionMap::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(ids(&kept), vec!["r2", "r3"]);
    }

    #[test]
    fn test_deletion_revisions_are_kept() {
        let source = MemorySource::with_local("a").blob("a", "a");
        let revisions = vec![rev("r1", 2, "a").deleted(), rev("r2", 1, "a")];
        let mut reference = Edition::local(ResourceId::new("doc"));

        let kept = dedupe(
            &mut reference,
            &revisions,
            &source,
            &mut EditionMap::new(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(ids(&kept), vec!["r1", "r2"]);
    }

    #[test]
    fn test_empty_input() {
        let source = MemorySource::with_local("a");
        let mut reference = Edition::local(ResourceId::new("doc"));
        let mut editions = EditionMap::new();

        let kept = dedupe(&mut reference, &[], &source, &mut editions, &CancelToken::new()).unwrap();

        assert!(kept.is_empty());
        assert!(editions.is_empty());
    }

    #[test]
    fn test_cancelled_before_first_revision() {
        let (source, revisions) = scenario();
        let mut reference = Edition::local(ResourceId::new("doc"));
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = dedupe(&mut reference, &revisions, &source, &mut EditionMap::new(), &cancel);
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn test_sort_breaks_ties_by_content_id() {
        let mut revisions = vec![rev("b", 1, "x"), rev("a", 1, "x"), rev("c", 2, "x")];
        sort_descending(&mut revisions);
        assert_eq!(ids(&revisions), vec!["c", "a", "b"]);
    }
}
