use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::activity::{newest_first, Activity};
use crate::calendar::CalendarZone;

/// All cached activities that fall on one local calendar day.
///
/// `activities` is kept in timeline order (see [`newest_first`]) and never holds
/// two activities with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub activities: Vec<Activity>,
    /// Set when the bucket received live data the UI has not animated yet
    #[serde(default)]
    pub is_fresh: bool,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            activities: Vec::new(),
            is_fresh: false,
        }
    }

    /// Build a bucket from arbitrary input, dropping duplicate ids.
    pub fn from_activities(date: NaiveDate, activities: Vec<Activity>) -> Self {
        let mut bucket = Self::new(date);
        bucket.union(activities);
        bucket
    }

    /// Date key in `YYYY-MM-DD` form.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.activities.iter().any(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.activities.iter_mut().find(|a| a.id == id)
    }

    pub fn max_version(&self) -> Option<u64> {
        self.activities.iter().map(|a| a.version).max()
    }

    /// Union `incoming` into this bucket by id. Activities already present are
    /// left untouched. Returns how many activities were inserted.
    pub fn union<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = Activity>,
    {
        let mut known: HashSet<String> = self.activities.iter().map(|a| a.id.clone()).collect();
        let before = self.activities.len();
        for activity in incoming {
            if known.insert(activity.id.clone()) {
                self.activities.push(activity);
            }
        }
        let inserted = self.activities.len() - before;
        if inserted > 0 {
            self.activities.sort_by(newest_first);
        }
        inserted
    }
}

/// Group activities into day buckets, newest day first.
pub fn group_by_day<I>(activities: I, zone: &CalendarZone) -> Vec<DayBucket>
where
    I: IntoIterator<Item = Activity>,
{
    let mut days: BTreeMap<NaiveDate, Vec<Activity>> = BTreeMap::new();
    for activity in activities {
        days.entry(zone.date_of(activity.start_time))
            .or_default()
            .push(activity);
    }
    days.into_iter()
        .rev()
        .map(|(date, list)| DayBucket::from_activities(date, list))
        .collect()
}

/// Number of activities across `buckets`.
pub fn activity_count(buckets: &[DayBucket]) -> usize {
    buckets.iter().map(DayBucket::len).sum()
}
