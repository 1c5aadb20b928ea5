use crate::constant::MAX_NAVIGATION_ENTRIES;

/// One "item shown" event.
///
/// Identity is the subject plus the source it was shown from; the display
/// name is a label that may change (e.g. after a rename).
#[derive(Debug, Clone)]
pub struct NavigationEntry {
    subject: String,
    name: String,
    source: String,
}

impl NavigationEntry {
    pub fn new(subject: impl Into<String>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PartialEq for NavigationEntry {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject && self.source == other.source
    }
}

impl Eq for NavigationEntry {}

/// Bounded most-recently-shown trail with a cursor.
///
/// The tail is the most recent entry. Entries are unique; re-recording one
/// moves it to the tail.
#[derive(Debug, Default)]
pub struct NavigationHistory {
    entries: Vec<NavigationEntry>,
    cursor: usize,
    replaying: bool,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[NavigationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&NavigationEntry> {
        self.entries.get(self.cursor)
    }

    /// True while a show requested by `goto`/`goto_previous` is running
    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Note that `entry` is now shown. Ignored during replay.
    pub fn record(&mut self, entry: NavigationEntry) {
        if self.replaying {
            return;
        }

        self.entries.retain(|e| e != &entry);
        self.entries.push(entry);
        if self.entries.len() > MAX_NAVIGATION_ENTRIES {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Entry one step back from the cursor, wrapping to the tail
    pub fn previous_entry(&self) -> Option<&NavigationEntry> {
        self.entries.get(self.previous_index()?)
    }

    /// Step the cursor back and ask `show` to display that entry.
    ///
    /// `show` receives this history so the normal show path can call
    /// `record`; those calls are ignored until `show` returns. Returns false
    /// when the history is empty.
    pub fn goto_previous<F>(&mut self, show: F) -> bool
    where
        F: FnOnce(&NavigationEntry, &mut NavigationHistory),
    {
        let Some(index) = self.previous_index() else {
            return false;
        };
        self.replay(index, show);
        true
    }

    /// Move the cursor to `entry` and ask `show` to display it.
    ///
    /// `entry` must come from this history; unknown entries are ignored and
    /// false is returned.
    pub fn goto<F>(&mut self, entry: &NavigationEntry, show: F) -> bool
    where
        F: FnOnce(&NavigationEntry, &mut NavigationHistory),
    {
        let Some(index) = self.entries.iter().position(|e| e == entry) else {
            return false;
        };
        self.replay(index, show);
        true
    }

    fn previous_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        Some(if self.cursor == 0 {
            self.entries.len() - 1
        } else {
            self.cursor - 1
        })
    }

    fn replay<F>(&mut self, index: usize, show: F)
    where
        F: FnOnce(&NavigationEntry, &mut NavigationHistory),
    {
        self.cursor = index;
        let entry = self.entries[index].clone();

        self.replaying = true;
        let replay = Replay(self);
        show(&entry, &mut *replay.0);
    }
}

/// Clears the replay flag when dropped, also when `show` unwinds
struct Replay<'h>(&'h mut NavigationHistory);

impl Drop for Replay<'_> {
    fn drop(&mut self) {
        self.0.replaying = false;
    }
}
