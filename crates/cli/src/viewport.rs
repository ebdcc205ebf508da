//! Row-based viewport for the headless `watch` command.
//!
//! Each day header and each activity is one row. The viewport keeps the first
//! visible row in place when rows are merged above it, unless it is pinned to
//! the top, in which case it keeps following the live edge.

use chrono::NaiveDate;
use daylog_timeline::{TimelineSnapshot, ViewportGeometry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Day(NaiveDate),
    Activity(String),
}

#[derive(Debug, Clone)]
pub struct HeadlessViewport {
    height: usize,
    scroll: usize,
    rows: Vec<Row>,
    anchor: Option<Row>,
}

impl HeadlessViewport {
    pub fn new(height: usize) -> Self {
        Self {
            height: height.max(1),
            scroll: 0,
            rows: Vec::new(),
            anchor: None,
        }
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_pinned_to_top(&self) -> bool {
        self.scroll == 0
    }

    /// Adopt the rows of a new snapshot.
    pub fn sync(&mut self, snapshot: &TimelineSnapshot) {
        let rows = rows_of(snapshot);
        if !self.is_pinned_to_top() {
            if let Some(pos) = self
                .anchor
                .as_ref()
                .and_then(|anchor| rows.iter().position(|r| r == anchor))
            {
                self.scroll = pos;
            }
        }
        self.rows = rows;
        self.clamp();
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
        self.clamp();
    }

    pub fn page_up(&mut self) {
        self.scroll_by(-(self.half_page() as isize));
    }

    pub fn page_down(&mut self) {
        self.scroll_by(self.half_page() as isize);
    }

    pub fn to_top(&mut self) {
        self.scroll = 0;
        self.clamp();
    }

    pub fn to_bottom(&mut self) {
        self.scroll = self.max_scroll();
        self.clamp();
    }

    pub fn geometry(&self) -> ViewportGeometry {
        ViewportGeometry::for_content(
            self.scroll as f64,
            self.height as f64,
            self.rows.len() as f64,
        )
    }

    pub fn visible(&self) -> &[Row] {
        let end = (self.scroll + self.height).min(self.rows.len());
        &self.rows[self.scroll.min(end)..end]
    }

    fn half_page(&self) -> usize {
        (self.height / 2).max(1)
    }

    fn max_scroll(&self) -> usize {
        self.rows.len().saturating_sub(self.height)
    }

    fn clamp(&mut self) {
        self.scroll = self.scroll.min(self.max_scroll());
        self.anchor = self.rows.get(self.scroll).cloned();
    }
}

fn rows_of(snapshot: &TimelineSnapshot) -> Vec<Row> {
    let mut rows = Vec::with_capacity(snapshot.buckets.len() + snapshot.activity_count());
    for bucket in &snapshot.buckets {
        rows.push(Row::Day(bucket.date));
        rows.extend(
            bucket
                .activities
                .iter()
                .map(|a| Row::Activity(a.id.clone())),
        );
    }
    rows
}
