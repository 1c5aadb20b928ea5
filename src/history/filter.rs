use super::types::Revision;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// User-defined narrowing of the revision list.
///
/// Unset criteria are ignored. With `match_any` a revision passes when any
/// set criterion matches, otherwise all set criteria must match. Dates are
/// compared as UTC calendar days, both bounds inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub match_any: bool,
}

impl HistoryFilter {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.comment.is_none() && self.from.is_none() && self.to.is_none()
    }

    pub fn matches(&self, revision: &Revision) -> bool {
        let mut checks = Vec::with_capacity(3);

        if let Some(author) = &self.author {
            checks.push(contains_ignore_case(revision.author(), author));
        }
        if let Some(comment) = &self.comment {
            checks.push(contains_ignore_case(revision.comment(), comment));
        }
        if self.from.is_some() || self.to.is_some() {
            checks.push(self.in_date_range(revision));
        }

        if checks.is_empty() {
            return true;
        }

        if self.match_any {
            checks.into_iter().any(|c| c)
        } else {
            checks.into_iter().all(|c| c)
        }
    }

    pub fn apply(&self, revisions: &[Revision]) -> Vec<Revision> {
        if self.is_empty() {
            return revisions.to_vec();
        }
        revisions
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }

    fn in_date_range(&self, revision: &Revision) -> bool {
        let Some(day) = revision.datetime().map(|d| d.date_naive()) else {
            return false;
        };
        self.from.is_none_or(|from| day >= from) && self.to.is_none_or(|to| day <= to)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
