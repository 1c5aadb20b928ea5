//! One open history view of a resource.
//!
//! The session owns the edition map of its latest refresh and hands it to
//! the diff builder, so revisions compared right after a refresh are not
//! read again. The navigation trail is shared between sessions.

use crate::config::Settings;
use crate::diff::input::{ExternalInput, HistoricalInput, Input};
use crate::diff::job::{DiffJob, spawn_diff};
use crate::diff::lines::{compute_diff, group_into_rows};
use crate::diff::tree::{DiffOutcome, DiffTreeBuilder};
use crate::diff::types::DiffRow;
use crate::error::SessionError;
use crate::history::category::Category;
use crate::history::edition::{Edition, StructuredContent};
use crate::history::navigation::{NavigationEntry, NavigationHistory};
use crate::history::refresh::{
    Clock, HistorySnapshot, RefreshCoordinator, RefreshOptions, RefreshState, RefreshStatus,
};
use crate::history::types::{ContentSource, ResourceId, Revision, RevisionProvider};
use crate::messages::ResponseMessage;
use crate::progress::ProgressMonitor;
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Which edition of the session's resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionRef<'a> {
    /// The live content
    Local,
    Revision(&'a str),
}

impl EditionRef<'_> {
    fn key(&self) -> &str {
        match self {
            EditionRef::Local => "local",
            EditionRef::Revision(id) => id,
        }
    }
}

/// What a poll delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Loaded(RefreshStatus),
    Cancelled,
}

/// A diff that finished on the calling thread, or one still running
pub enum DiffRun {
    Ready(DiffOutcome),
    Background(DiffJob),
}

impl DiffRun {
    /// Block for a background diff
    pub fn into_outcome(self) -> DiffOutcome {
        match self {
            DiffRun::Ready(outcome) => outcome,
            DiffRun::Background(job) => job.wait(),
        }
    }
}

pub struct HistorySession {
    resource: ResourceId,
    name: String,
    id: String,
    source: Arc<dyn ContentSource>,
    coordinator: RefreshCoordinator,
    builder: DiffTreeBuilder,
    background_threshold: usize,
    snapshot: Option<HistorySnapshot>,
    navigation: Rc<RefCell<NavigationHistory>>,
}

impl HistorySession {
    pub fn new<P: RevisionProvider + 'static>(
        resource: ResourceId,
        name: impl Into<String>,
        provider: Arc<P>,
        settings: &Settings,
        navigation: Rc<RefCell<NavigationHistory>>,
    ) -> Self {
        let source: Arc<dyn ContentSource> = provider.clone();
        let coordinator = RefreshCoordinator::new(resource.clone(), provider, RefreshOptions::from(settings));

        Self {
            resource,
            name: name.into(),
            id: Uuid::new_v4().to_string(),
            source,
            coordinator,
            builder: DiffTreeBuilder::new(),
            background_threshold: settings.background_diff_threshold,
            snapshot: None,
            navigation,
        }
    }

    /// Use `builder` (e.g. with another identity comparator) for diffs
    pub fn with_builder(mut self, builder: DiffTreeBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Group revisions by date relative to `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        let options = RefreshOptions {
            clock,
            ..self.coordinator.options().clone()
        };
        self.coordinator.set_options(options);
        self
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- refresh ----

    pub fn refresh(&mut self, force_refetch: bool) -> u64 {
        self.coordinator.refresh(force_refetch)
    }

    pub fn cancel_refresh(&mut self) {
        self.coordinator.cancel();
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    pub fn set_options(&mut self, settings: &Settings) {
        let options = RefreshOptions {
            clock: self.coordinator.options().clock,
            ..RefreshOptions::from(settings)
        };
        self.coordinator.set_options(options);
        self.background_threshold = settings.background_diff_threshold;
    }

    /// Take a pending refresh result, if any
    pub fn poll(&mut self) -> Option<SessionUpdate> {
        let message = self.coordinator.poll()?;
        Some(self.apply(message))
    }

    /// Like `poll`, blocking up to `timeout`
    pub fn wait(&mut self, timeout: Duration) -> Option<SessionUpdate> {
        let message = self.coordinator.wait(timeout)?;
        Some(self.apply(message))
    }

    fn apply(&mut self, message: ResponseMessage) -> SessionUpdate {
        match message {
            ResponseMessage::HistoryLoaded { snapshot, .. } => {
                let status = snapshot.status.clone();
                self.snapshot = Some(snapshot);
                SessionUpdate::Loaded(status)
            }
            ResponseMessage::RefreshCancelled { .. } => SessionUpdate::Cancelled,
        }
    }

    pub fn status(&self) -> Option<&RefreshStatus> {
        self.snapshot.as_ref().map(|s| &s.status)
    }

    /// Distinct revisions of the last refresh, newest first
    pub fn revisions(&self) -> &[Revision] {
        match &self.snapshot {
            Some(snapshot) => &snapshot.revisions,
            None => &[],
        }
    }

    pub fn categories(&self) -> Option<&[Category]> {
        self.snapshot.as_ref()?.categories.as_deref()
    }

    /// Every revision the provider returned, duplicates included
    pub fn all_revisions(&self) -> &[Revision] {
        match &self.snapshot {
            Some(snapshot) => snapshot.fetched.revisions(),
            None => &[],
        }
    }

    pub fn editions(&self) -> impl Iterator<Item = (&Revision, &Edition)> {
        self.snapshot.iter().flat_map(|s| s.editions.iter())
    }

    // ---- diff ----

    /// Compare two (or, with an ancestor, three) editions.
    ///
    /// Small comparisons finish before returning; larger ones run in the
    /// background and report through `monitor`.
    pub fn build_diff(
        &mut self,
        ancestor: Option<EditionRef<'_>>,
        left: EditionRef<'_>,
        right: EditionRef<'_>,
        monitor: &ProgressMonitor,
    ) -> Result<DiffRun, SessionError> {
        let ancestor = ancestor.map(|a| self.input(a)).transpose()?;
        let left = self.input(left)?;
        let right = self.input(right)?;
        let three_way = ancestor.is_some();

        if DiffTreeBuilder::estimate(&left, &right) > self.background_threshold {
            debug!("Diffing {} in the background", self.name);
            return Ok(DiffRun::Background(spawn_diff(
                self.builder.clone(),
                three_way,
                ancestor,
                left,
                right,
                monitor.clone(),
            )));
        }

        Ok(DiffRun::Ready(self.builder.build(
            three_way,
            ancestor.as_ref(),
            &left,
            &right,
            monitor,
        )))
    }

    /// Side-by-side line rows between two editions
    pub fn line_diff(&mut self, left: EditionRef<'_>, right: EditionRef<'_>) -> Result<Vec<DiffRow>, SessionError> {
        let old = self.text(left)?;
        let new = self.text(right)?;
        Ok(group_into_rows(&compute_diff(&old, &new)))
    }

    /// Text of one edition, lossily decoded
    pub fn text(&mut self, edition: EditionRef<'_>) -> Result<String, SessionError> {
        let bytes = match edition {
            EditionRef::Local => self.read_local()?,
            EditionRef::Revision(id) => {
                let snapshot = self.snapshot.as_mut();
                match snapshot.and_then(|s| s.editions.get_mut(id)) {
                    Some(edition) => edition.materialize(self.source.as_ref())?,
                    None => {
                        let mut edition = Edition::for_revision(self.find_revision(id)?.clone());
                        edition.materialize(self.source.as_ref())?
                    }
                }
            }
        };
        Ok(bytes.text().into_owned())
    }

    fn input(&mut self, edition: EditionRef<'_>) -> Result<Input, SessionError> {
        match edition {
            EditionRef::Local => {
                let content = self.read_local()?;
                Ok(ExternalInput::leaf(self.name.as_str(), content.as_bytes().to_vec()).into())
            }
            EditionRef::Revision(id) => {
                let known = self.snapshot.as_ref().and_then(|s| s.editions.get(id));
                if let Some(input) = known
                    .and_then(|e| HistoricalInput::from_edition(self.name.as_str(), e, self.source.clone()))
                {
                    return Ok(input.into());
                }
                let revision = self.find_revision(id)?.clone();
                Ok(HistoricalInput::new(self.name.as_str(), revision, self.source.clone()).into())
            }
        }
    }

    /// The live content as it is now. The edition is released on return so
    /// the next call reads the resource again.
    fn read_local(&self) -> Result<Arc<StructuredContent>, SessionError> {
        let mut local = Edition::local(self.resource.clone());
        let content = local.materialize(self.source.as_ref())?;
        local.release();
        Ok(content)
    }

    fn find_revision(&self, id: &str) -> Result<&Revision, SessionError> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.fetched.find(id))
            .ok_or_else(|| SessionError::UnknownRevision(id.to_string()))
    }

    // ---- navigation ----

    /// Note that `edition` is now the one shown
    pub fn record_shown(&self, edition: EditionRef<'_>, name: impl Into<String>) {
        let subject = format!("{}@{}", self.resource, edition.key());
        self.navigation
            .borrow_mut()
            .record(NavigationEntry::new(subject, name, self.id.as_str()));
    }

    /// See [`NavigationHistory::goto_previous`]
    pub fn go_previous<F>(&self, show: F) -> bool
    where
        F: FnOnce(&NavigationEntry, &mut NavigationHistory),
    {
        self.navigation.borrow_mut().goto_previous(show)
    }

    /// See [`NavigationHistory::goto`]
    pub fn go_to<F>(&self, entry: &NavigationEntry, show: F) -> bool
    where
        F: FnOnce(&NavigationEntry, &mut NavigationHistory),
    {
        self.navigation.borrow_mut().goto(entry, show)
    }

    pub fn navigation(&self) -> Ref<'_, NavigationHistory> {
        self.navigation.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalHistoryStore;
    use crate::diff::types::DiffKind;
    use crate::history::category::Bucket;
    use std::fs;
    use chrono::{DateTime, Local, TimeZone, Utc};
    use std::path::{Path, PathBuf};
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn setup_store() -> (Arc<LocalHistoryStore>, PathBuf) {
        let test_dir = std::env::temp_dir().join(format!("test_session_{}", Uuid::new_v4()));
        let store = LocalHistoryStore::open(test_dir.join("data")).unwrap();
        (Arc::new(store), test_dir)
    }

    /// 9:00 local time, so every test revision falls on the clock's day
    fn morning() -> DateTime<Utc> {
        Local.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap().with_timezone(&Utc)
    }

    /// Saves `versions` oldest first, a minute apart, and leaves `live` on disk
    fn track(store: &LocalHistoryStore, file: &Path, versions: &[&str], live: &str) {
        for (minute, version) in (0..).zip(versions) {
            let at = morning() + chrono::Duration::minutes(minute);
            store.save_at(file, version.as_bytes(), "", "", at).unwrap();
        }
        fs::write(file, live).unwrap();
    }

    fn open(store: Arc<LocalHistoryStore>, file: &Path, settings: &Settings) -> HistorySession {
        let noon = Local.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap();
        HistorySession::new(
            LocalHistoryStore::resource_id(file),
            "doc.txt",
            store,
            settings,
            Rc::new(RefCell::new(NavigationHistory::new())),
        )
        .with_clock(Clock::Fixed(noon))
    }

    fn loaded(session: &mut HistorySession) {
        session.refresh(true);
        assert_eq!(
            session.wait(TIMEOUT),
            Some(SessionUpdate::Loaded(RefreshStatus::Complete))
        );
    }

    fn ids(revisions: &[Revision]) -> Vec<&str> {
        revisions.iter().map(Revision::content_id).collect()
    }

    #[test]
    fn test_duplicate_revisions_collapse_into_today() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        // newest first this reads X, Y, Y, Z against a live "X"
        track(&store, &file, &["Z", "Y", "Y", "X"], "X");

        let mut session = open(store, &file, &Settings::default());
        loaded(&mut session);

        assert_eq!(session.all_revisions().len(), 4);
        assert_eq!(ids(session.revisions()), vec!["r3", "r1"]);

        let categories = session.categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].bucket(), Some(Bucket::Today));
        assert_eq!(ids(categories[0].revisions()), vec!["r3", "r1"]);

        let editions: Vec<_> = session.editions().map(|(r, _)| r.content_id()).collect();
        assert_eq!(editions, vec!["r3", "r1"]);
        assert!(session.editions().all(|(_, e)| e.is_materialized()));

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_diff_between_editions() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        track(&store, &file, &["one\ntwo\n", "one\nthree\n"], "one\nthree\nfour\n");

        let mut session = open(store, &file, &Settings::default());
        loaded(&mut session);
        let monitor = ProgressMonitor::new();

        let outcome = session
            .build_diff(None, EditionRef::Revision("r1"), EditionRef::Revision("r2"), &monitor)
            .unwrap()
            .into_outcome();
        let root = outcome.tree().unwrap().root();
        assert_eq!(root.kind(), DiffKind::Changed);
        assert!(root.stats().is_some_and(|s| !s.is_empty()));

        let same = session
            .build_diff(None, EditionRef::Revision("r2"), EditionRef::Revision("r2"), &monitor)
            .unwrap()
            .into_outcome();
        assert!(same.tree().unwrap().is_equal());

        let three_way = session
            .build_diff(
                Some(EditionRef::Revision("r1")),
                EditionRef::Revision("r2"),
                EditionRef::Local,
                &monitor,
            )
            .unwrap()
            .into_outcome();
        assert!(three_way.tree().unwrap().root().direction().is_some());

        let rows = session
            .line_diff(EditionRef::Revision("r2"), EditionRef::Local)
            .unwrap();
        assert!(matches!(rows.last(), Some(DiffRow::Pair(left, right)) if left.is_empty() && right.len() == 1));

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_local_edition_follows_the_file() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        track(&store, &file, &["a"], "a");

        let mut session = open(store, &file, &Settings::default());
        loaded(&mut session);
        let monitor = ProgressMonitor::new();

        let before = session
            .build_diff(None, EditionRef::Revision("r1"), EditionRef::Local, &monitor)
            .unwrap()
            .into_outcome();
        assert!(before.tree().unwrap().is_equal());

        fs::write(&file, "b").unwrap();

        let after = session
            .build_diff(None, EditionRef::Revision("r1"), EditionRef::Local, &monitor)
            .unwrap()
            .into_outcome();
        assert_eq!(after.tree().unwrap().root().kind(), DiffKind::Changed);
        assert_eq!(session.text(EditionRef::Local).unwrap(), "b");

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_unknown_revision_is_rejected() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        track(&store, &file, &["a"], "a");

        let mut session = open(store, &file, &Settings::default());
        loaded(&mut session);

        let result = session.build_diff(
            None,
            EditionRef::Local,
            EditionRef::Revision("r9"),
            &ProgressMonitor::new(),
        );
        assert!(matches!(result, Err(SessionError::UnknownRevision(id)) if id == "r9"));

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_large_diffs_run_in_background() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        track(&store, &file, &["a", "b"], "b");

        let settings = Settings {
            background_diff_threshold: 0,
            ..Settings::default()
        };
        let mut session = open(store, &file, &settings);
        loaded(&mut session);

        let run = session
            .build_diff(None, EditionRef::Revision("r1"), EditionRef::Local, &ProgressMonitor::new())
            .unwrap();
        assert!(matches!(run, DiffRun::Background(_)));
        assert_eq!(run.into_outcome().tree().unwrap().root().kind(), DiffKind::Changed);

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_navigation_is_shared_between_sessions() {
        let (store, test_dir) = setup_store();
        let file = test_dir.join("doc.txt");
        track(&store, &file, &["a"], "a");

        let navigation = Rc::new(RefCell::new(NavigationHistory::new()));
        let resource = LocalHistoryStore::resource_id(&file);
        let first = HistorySession::new(
            resource.clone(),
            "doc.txt",
            store.clone(),
            &Settings::default(),
            navigation.clone(),
        );
        let second =
            HistorySession::new(resource, "doc.txt", store, &Settings::default(), navigation.clone());

        first.record_shown(EditionRef::Revision("r1"), "r1");
        second.record_shown(EditionRef::Revision("r1"), "r1");
        first.record_shown(EditionRef::Local, "live");
        first.record_shown(EditionRef::Revision("r1"), "r1 again");

        // same subject from two sessions stays two entries
        assert_eq!(first.navigation().len(), 3);
        assert_eq!(navigation.borrow().current().unwrap().name(), "r1 again");

        let mut shown = None;
        assert!(first.go_previous(|entry, history| {
            history.record(entry.clone());
            shown = Some(entry.name().to_string());
        }));
        assert_eq!(shown.as_deref(), Some("live"));
        assert_eq!(second.navigation().len(), 3);

        let target = navigation.borrow().entries()[0].clone();
        assert!(second.go_to(&target, |_, _| {}));
        assert_eq!(navigation.borrow().cursor(), 0);

        let _ = fs::remove_dir_all(&test_dir);
    }
}
