//! Bounded, date-bucketed cache of the timeline the user is looking at.
//!
//! Buckets are kept newest date first and never exceed `capacity`. Growing one
//! end evicts from the other, and the pagination offsets are corrected so the
//! evicted rows are fetched again when the user scrolls back to them.
//!
//! Offsets count activity rows in store order (newest first):
//! `top_offset` is the number of rows newer than the newest loaded activity,
//! `bottom_offset` is the store index one past the oldest loaded activity.

use daylog_core::{activity_count, group_by_day, newest_first, Activity, CalendarZone, DayBucket};
use std::cmp::Ordering;

use crate::edge::Edge;
use crate::reader::PageRequest;

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub evicted_buckets: usize,
    pub evicted_activities: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.evicted_buckets > 0
    }
}

#[derive(Debug, Clone)]
pub struct WindowState {
    buckets: Vec<DayBucket>,
    capacity: usize,
    zone: CalendarZone,
    top_offset: usize,
    bottom_offset: usize,
    has_more_top: bool,
    has_more_bottom: bool,
    watermark_version: u64,
    /// Bumped each time an edge loses buckets to eviction
    eviction_epochs: [u64; 2],
}

impl WindowState {
    /// Empty window anchored at the live edge. Nothing is known about older
    /// data yet, so the bottom is assumed to have more.
    pub fn new(capacity: usize, zone: CalendarZone) -> Self {
        Self {
            buckets: Vec::new(),
            capacity: capacity.max(1),
            zone,
            top_offset: 0,
            bottom_offset: 0,
            has_more_top: false,
            has_more_bottom: true,
            watermark_version: 0,
            eviction_epochs: [0; 2],
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn buckets(&self) -> &[DayBucket] {
        &self.buckets
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn zone(&self) -> &CalendarZone {
        &self.zone
    }

    pub fn top_offset(&self) -> usize {
        self.top_offset
    }

    pub fn bottom_offset(&self) -> usize {
        self.bottom_offset
    }

    pub fn has_more_top(&self) -> bool {
        self.has_more_top
    }

    pub fn has_more_bottom(&self) -> bool {
        self.has_more_bottom
    }

    pub fn has_more(&self, edge: Edge) -> bool {
        match edge {
            Edge::Top => self.has_more_top,
            Edge::Bottom => self.has_more_bottom,
        }
    }

    pub fn watermark_version(&self) -> u64 {
        self.watermark_version
    }

    /// Changes whenever buckets are evicted from `edge`. A page requested
    /// under an older epoch no longer lines up with the loaded range there.
    pub fn eviction_epoch(&self, edge: Edge) -> u64 {
        self.eviction_epochs[edge.index()]
    }

    /// True while the newest data is loaded, i.e. live increments may be
    /// merged at the top without opening a gap.
    pub fn is_anchored(&self) -> bool {
        !self.has_more_top
    }

    pub fn activity_count(&self) -> usize {
        activity_count(&self.buckets)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn find(&self, activity_id: &str) -> Option<&Activity> {
        self.buckets
            .iter()
            .flat_map(|b| b.activities.iter())
            .find(|a| a.id == activity_id)
    }

    // ── Pagination requests ─────────────────────────────────────────────

    /// Rows just above the loaded range, or `None` when nothing newer is
    /// known to exist.
    pub fn top_request(&self, limit: usize) -> Option<PageRequest> {
        if self.top_offset == 0 {
            return None;
        }
        let limit = limit.min(self.top_offset);
        Some(PageRequest::new(self.top_offset - limit, limit))
    }

    pub fn bottom_request(&self, limit: usize) -> PageRequest {
        PageRequest::new(self.bottom_offset, limit)
    }

    // ── Writers ─────────────────────────────────────────────────────────

    /// Drop everything except the watermark, which never moves backwards,
    /// and the eviction epochs.
    pub fn reset(&mut self) {
        let watermark = self.watermark_version;
        let epochs = self.eviction_epochs;
        *self = Self::new(self.capacity, self.zone.clone());
        self.watermark_version = watermark;
        self.eviction_epochs = epochs;
    }

    /// Replace the window with the first page of the timeline.
    pub fn reset_with(&mut self, page: Vec<DayBucket>, limit: usize) -> MergeReport {
        self.reset();
        let received = activity_count(&page);
        let page_max = page.iter().filter_map(DayBucket::max_version).max();

        let inserted = self.union_buckets(page, false);
        let (evicted_buckets, evicted_activities) = self.trim_bottom();

        self.bottom_offset = received.saturating_sub(evicted_activities);
        self.has_more_bottom = received >= limit || evicted_buckets > 0;
        if let Some(max) = page_max {
            self.raise_watermark(max);
        }
        MergeReport {
            inserted,
            evicted_buckets,
            evicted_activities,
        }
    }

    /// Merge the result of a pagination fetch issued with `request`.
    ///
    /// An empty page means the edge is exhausted and nothing is merged.
    pub fn apply_page(
        &mut self,
        edge: Edge,
        request: &PageRequest,
        page: Vec<DayBucket>,
    ) -> MergeReport {
        let received = activity_count(&page);
        match edge {
            Edge::Top => {
                if received == 0 {
                    self.top_offset = 0;
                    self.has_more_top = false;
                    return MergeReport::default();
                }
                self.top_offset = request.offset;
                self.has_more_top = self.top_offset > 0;
                self.merge_top(page)
            }
            Edge::Bottom => {
                if received == 0 {
                    self.has_more_bottom = false;
                    return MergeReport::default();
                }
                self.bottom_offset = request.offset + received;
                self.has_more_bottom = received >= request.limit;
                self.merge_bottom(page)
            }
        }
    }

    /// Union newer buckets at the top, evicting the oldest buckets if over
    /// capacity. Does not touch the watermark.
    pub fn merge_top(&mut self, incoming: Vec<DayBucket>) -> MergeReport {
        let inserted = self.union_buckets(incoming, false);
        let (evicted_buckets, evicted_activities) = self.trim_bottom();
        self.after_bottom_eviction(evicted_activities);
        MergeReport {
            inserted,
            evicted_buckets,
            evicted_activities,
        }
    }

    /// Union older buckets at the bottom, evicting the newest buckets if over
    /// capacity.
    pub fn merge_bottom(&mut self, incoming: Vec<DayBucket>) -> MergeReport {
        let inserted = self.union_buckets(incoming, false);
        let (evicted_buckets, evicted_activities) = self.trim_top();
        if evicted_activities > 0 {
            self.top_offset += evicted_activities;
            self.has_more_top = true;
        }
        MergeReport {
            inserted,
            evicted_buckets,
            evicted_activities,
        }
    }

    /// Merge live activities at the top, marking the buckets that received
    /// new rows as fresh. `max_version_seen` raises the watermark even when
    /// every activity was already cached.
    ///
    /// While older rows remain unloaded, activities that sort below the oldest
    /// loaded one are left for bottom pagination instead of being cached out
    /// of range.
    pub fn merge_increment(
        &mut self,
        activities: Vec<Activity>,
        max_version_seen: u64,
    ) -> MergeReport {
        let max_version = activities
            .iter()
            .map(|a| a.version)
            .max()
            .unwrap_or(0)
            .max(max_version_seen);

        let floor = if self.has_more_bottom {
            self.buckets.last().and_then(|b| b.activities.last()).cloned()
        } else {
            None
        };
        let in_range: Vec<Activity> = activities
            .into_iter()
            .filter(|a| match &floor {
                Some(oldest) => newest_first(a, oldest) != Ordering::Greater,
                None => true,
            })
            .collect();

        let grouped = group_by_day(in_range, &self.zone);
        let inserted = self.union_buckets(grouped, true);
        self.bottom_offset += inserted;
        let (evicted_buckets, evicted_activities) = self.trim_bottom();
        self.after_bottom_eviction(evicted_activities);
        self.raise_watermark(max_version);

        MergeReport {
            inserted,
            evicted_buckets,
            evicted_activities,
        }
    }

    /// Fold lazily fetched detail into the cached activity with the same id.
    /// Returns false when the activity is no longer in the window.
    pub fn merge_detail(&mut self, detail: &Activity) -> bool {
        for bucket in &mut self.buckets {
            if let Some(cached) = bucket.get_mut(&detail.id) {
                cached.merge_detail(detail);
                return true;
            }
        }
        false
    }

    /// Account for rows persisted above the loaded range while detached, so
    /// top pagination does not skip the rows they pushed down. Has no effect
    /// while anchored, where increments merge them directly.
    pub fn note_rows_above(&mut self, count: usize) {
        if !self.is_anchored() {
            self.top_offset += count;
        }
    }

    /// Clear every fresh flag; returns how many buckets were flagged.
    pub fn acknowledge_fresh(&mut self) -> usize {
        let mut cleared = 0;
        for bucket in self.buckets.iter_mut().filter(|b| b.is_fresh) {
            bucket.is_fresh = false;
            cleared += 1;
        }
        cleared
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn union_buckets(&mut self, incoming: Vec<DayBucket>, mark_fresh: bool) -> usize {
        let mut inserted = 0;
        for bucket in incoming {
            if bucket.is_empty() {
                continue;
            }
            let date = bucket.date;
            // buckets are sorted by date descending
            match self.buckets.binary_search_by(|b| date.cmp(&b.date)) {
                Ok(pos) => {
                    let added = self.buckets[pos].union(bucket.activities);
                    if added > 0 && mark_fresh {
                        self.buckets[pos].is_fresh = true;
                    }
                    inserted += added;
                }
                Err(pos) => {
                    let mut fresh = DayBucket::from_activities(date, bucket.activities);
                    fresh.is_fresh = mark_fresh;
                    inserted += fresh.len();
                    self.buckets.insert(pos, fresh);
                }
            }
        }
        inserted
    }

    fn trim_bottom(&mut self) -> (usize, usize) {
        let mut buckets = 0;
        let mut activities = 0;
        while self.buckets.len() > self.capacity {
            if let Some(evicted) = self.buckets.pop() {
                buckets += 1;
                activities += evicted.len();
            }
        }
        if buckets > 0 {
            self.eviction_epochs[Edge::Bottom.index()] += 1;
        }
        (buckets, activities)
    }

    fn trim_top(&mut self) -> (usize, usize) {
        let excess = self.buckets.len().saturating_sub(self.capacity);
        let activities = self.buckets.drain(..excess).map(|b| b.len()).sum();
        if excess > 0 {
            self.eviction_epochs[Edge::Top.index()] += 1;
        }
        (excess, activities)
    }

    fn after_bottom_eviction(&mut self, evicted_activities: usize) {
        if evicted_activities > 0 {
            self.bottom_offset = self.bottom_offset.saturating_sub(evicted_activities);
            self.has_more_bottom = true;
        }
    }

    fn raise_watermark(&mut self, version: u64) {
        self.watermark_version = self.watermark_version.max(version);
    }
}
