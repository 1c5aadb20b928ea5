//! Date grouping of revisions.
//!
//! Revisions are bucketed by calendar day in the time zone of `now`. The
//! four buckets are contiguous and cover all time:
//!
//! | bucket     | range                                            |
//! |------------|--------------------------------------------------|
//! | Today      | `[today, +inf)`                                  |
//! | Yesterday  | `[yesterday, today)`                             |
//! | This Month | `[min(first of month, yesterday), yesterday)`    |
//! | Previous   | `(-inf, min(first of month, yesterday))`         |
//!
//! On the first two days of a month "This Month" is empty and "Yesterday"
//! may lie in the previous month or year.

use super::types::Revision;
use crate::constant::{
    CATEGORY_PREVIOUS, CATEGORY_THIS_MONTH, CATEGORY_TODAY, CATEGORY_YESTERDAY,
    NO_REVISIONS_MESSAGE,
};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Today,
    Yesterday,
    ThisMonth,
    Previous,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Today,
        Bucket::Yesterday,
        Bucket::ThisMonth,
        Bucket::Previous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Bucket::Today => CATEGORY_TODAY,
            Bucket::Yesterday => CATEGORY_YESTERDAY,
            Bucket::ThisMonth => CATEGORY_THIS_MONTH,
            Bucket::Previous => CATEGORY_PREVIOUS,
        }
    }
}

/// A named day range and the revisions that fall in it. A category without
/// a bucket is a message placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    name: String,
    bucket: Option<Bucket>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    revisions: Vec<Revision>,
}

impl Category {
    fn date(bucket: Bucket, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            name: bucket.label().to_string(),
            bucket: Some(bucket),
            from,
            to,
            revisions: Vec::new(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self {
            name: text.into(),
            bucket: None,
            from: None,
            to: None,
            revisions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket(&self) -> Option<Bucket> {
        self.bucket
    }

    pub fn is_message(&self) -> bool {
        self.bucket.is_none()
    }

    /// Inclusive lower bound, `None` when unbounded
    pub fn from(&self) -> Option<NaiveDate> {
        self.from
    }

    /// Exclusive upper bound, `None` when unbounded
    pub fn to(&self) -> Option<NaiveDate> {
        self.to
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn has_revisions(&self) -> bool {
        !self.revisions.is_empty()
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.bucket.is_some()
            && self.from.is_none_or(|from| day >= from)
            && self.to.is_none_or(|to| day < to)
    }
}

/// The four date categories for `now`, empty, in display order
pub fn date_categories<Tz: TimeZone>(now: &DateTime<Tz>) -> [Category; 4] {
    let today = now.date_naive();
    let yesterday = today.pred_opt().unwrap_or(NaiveDate::MIN);
    let first_of_month = today.with_day(1).unwrap_or(today);
    let month_start = first_of_month.min(yesterday);

    [
        Category::date(Bucket::Today, Some(today), None),
        Category::date(Bucket::Yesterday, Some(yesterday), Some(today)),
        Category::date(Bucket::ThisMonth, Some(month_start), Some(yesterday)),
        Category::date(Bucket::Previous, None, Some(month_start)),
    ]
}

/// Calendar day of `revision` in the time zone of `now`
pub fn revision_day<Tz: TimeZone>(revision: &Revision, now: &DateTime<Tz>) -> Option<NaiveDate> {
    revision
        .datetime()
        .map(|instant| instant.with_timezone(&now.timezone()).date_naive())
}

/// Group `revisions` into non-empty date categories, keeping their order
/// inside each category. Never returns an empty list: with no revisions the
/// result is a single message category.
pub fn categorize<Tz: TimeZone>(revisions: &[Revision], now: &DateTime<Tz>) -> Vec<Category> {
    let mut categories = date_categories(now);

    for revision in revisions {
        let Some(day) = revision_day(revision, now) else {
            error!(
                "Revision {} has an unrepresentable timestamp {}",
                revision.content_id(),
                revision.timestamp()
            );
            continue;
        };

        match categories.iter_mut().find(|c| c.contains_day(day)) {
            Some(category) => category.revisions.push(revision.clone()),
            None => {
                debug_assert!(false, "day {day} is outside every date category");
                error!(
                    "Revision {} on {} matched no date category",
                    revision.content_id(),
                    day
                );
            }
        }
    }

    let found: Vec<Category> = categories
        .into_iter()
        .filter(Category::has_revisions)
        .collect();

    if found.is_empty() {
        vec![Category::message(NO_REVISIONS_MESSAGE)]
    } else {
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::ContentHandle;
    use chrono::{Duration, Utc};

    fn at(id: &str, instant: DateTime<Utc>) -> Revision {
        Revision::new(id, instant.timestamp_millis(), ContentHandle::new(id))
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn names(categories: &[Category]) -> Vec<&str> {
        categories.iter().map(Category::name).collect()
    }

    fn bucket_of(categories: &[Category], id: &str) -> Vec<Bucket> {
        categories
            .iter()
            .filter(|c| c.revisions().iter().any(|r| r.content_id() == id))
            .filter_map(Category::bucket)
            .collect()
    }

    #[test]
    fn test_buckets_mid_month() {
        let now = utc(2025, 4, 10, 12);
        let revisions = vec![
            at("today", utc(2025, 4, 10, 1)),
            at("yesterday", utc(2025, 4, 9, 23)),
            at("month", utc(2025, 4, 1, 0)),
            at("previous", utc(2025, 3, 31, 23)),
        ];

        let categories = categorize(&revisions, &now);

        assert_eq!(
            names(&categories),
            vec!["Today", "Yesterday", "This Month", "Previous"]
        );
        assert_eq!(bucket_of(&categories, "today"), vec![Bucket::Today]);
        assert_eq!(bucket_of(&categories, "yesterday"), vec![Bucket::Yesterday]);
        assert_eq!(bucket_of(&categories, "month"), vec![Bucket::ThisMonth]);
        assert_eq!(bucket_of(&categories, "previous"), vec![Bucket::Previous]);
    }

    #[test]
    fn test_day_100_of_year() {
        // 2025-04-10 is day 100
        let now = utc(2025, 4, 10, 8);
        assert_eq!(now.ordinal(), 100);

        let categories = categorize(
            &[at("d99", utc(2025, 4, 9, 8)), at("d1", utc(2025, 1, 1, 8))],
            &now,
        );

        assert_eq!(bucket_of(&categories, "d99"), vec![Bucket::Yesterday]);
        assert_eq!(bucket_of(&categories, "d1"), vec![Bucket::Previous]);
    }

    #[test]
    fn test_year_boundary_is_not_confused() {
        // Same day-of-year one year apart must not land in Today
        let now = utc(2025, 1, 1, 12);
        let categories = categorize(
            &[
                at("last_year", utc(2024, 1, 1, 12)),
                at("yesterday", utc(2024, 12, 31, 12)),
            ],
            &now,
        );

        assert_eq!(bucket_of(&categories, "last_year"), vec![Bucket::Previous]);
        assert_eq!(bucket_of(&categories, "yesterday"), vec![Bucket::Yesterday]);
    }

    #[test]
    fn test_first_of_month_has_no_overlap() {
        let now = utc(2025, 3, 1, 9);
        let categories = categorize(&[at("feb28", utc(2025, 2, 28, 9))], &now);
        assert_eq!(bucket_of(&categories, "feb28"), vec![Bucket::Yesterday]);
    }

    #[test]
    fn test_every_revision_lands_in_exactly_one_bucket() {
        for now in [
            utc(2025, 1, 1, 0),
            utc(2025, 1, 2, 23),
            utc(2024, 2, 29, 12),
            utc(2025, 7, 15, 6),
            utc(2025, 12, 31, 18),
        ] {
            let revisions: Vec<Revision> = (-400..3)
                .map(|days| at(&format!("r{days}"), now + Duration::days(days)))
                .collect();

            let categories = categorize(&revisions, &now);
            for revision in &revisions {
                assert_eq!(
                    bucket_of(&categories, revision.content_id()).len(),
                    1,
                    "revision {} at now={}",
                    revision.content_id(),
                    now
                );
            }

            let total: usize = categories.iter().map(|c| c.revisions().len()).sum();
            assert_eq!(total, revisions.len());
        }
    }

    #[test]
    fn test_ranges_are_contiguous() {
        for now in [utc(2025, 1, 1, 0), utc(2025, 1, 2, 0), utc(2025, 6, 20, 0)] {
            let [today, yesterday, month, previous] = date_categories(&now);
            assert_eq!(today.to(), None);
            assert_eq!(yesterday.to(), today.from());
            assert_eq!(month.to(), yesterday.from());
            assert_eq!(previous.to(), month.from());
            assert_eq!(previous.from(), None);
        }
    }

    #[test]
    fn test_empty_yields_message_category() {
        let categories = categorize(&[], &utc(2025, 4, 10, 12));
        assert_eq!(categories.len(), 1);
        assert!(categories[0].is_message());
        assert_eq!(categories[0].name(), NO_REVISIONS_MESSAGE);
    }

    #[test]
    fn test_member_order_is_preserved_and_stable() {
        let now = utc(2025, 4, 10, 12);
        let revisions = vec![
            at("b", utc(2025, 4, 10, 11)),
            at("a", utc(2025, 4, 10, 10)),
        ];

        let first = categorize(&revisions, &now);
        let second = categorize(&revisions, &now);

        assert_eq!(first, second);
        let ids: Vec<_> = first[0].revisions().iter().map(Revision::content_id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
