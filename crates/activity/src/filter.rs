use chrono::{DateTime, Utc};
use serde::Serialize;

use stockadoodle_core::{ProductId, UserId};

use crate::entry::{ActivityEntry, ActivitySource};

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Conjunctive filter over activity entries. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFilter {
    pub product_id: Option<ProductId>,
    pub user_id: Option<UserId>,
    pub action: Option<String>,
    pub source: Option<ActivitySource>,
    pub method: Option<String>,
    pub target_entity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &ActivityEntry) -> bool {
        if self.product_id.is_some() && entry.product_id != self.product_id {
            return false;
        }
        if self.user_id.is_some() && entry.user_id != self.user_id {
            return false;
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(source) = self.source {
            if entry.source != source {
                return false;
            }
        }
        if let Some(method) = &self.method {
            match entry.method() {
                Some(m) if m.eq_ignore_ascii_case(method) => {}
                _ => return false,
            }
        }
        if let Some(target) = &self.target_entity {
            if entry.target_entity() != Some(target.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.logged_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.logged_at > until {
                return false;
            }
        }
        true
    }
}

/// Filter plus newest-first window.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityQuery {
    pub filter: ActivityFilter,
    limit: u32,
    offset: u32,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self::new(ActivityFilter::default(), None, None)
    }
}

impl ActivityQuery {
    pub fn new(filter: ActivityFilter, limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            filter,
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Filter, sort newest first, then window.
    pub fn apply<I>(&self, entries: I) -> ActivityPage
    where
        I: IntoIterator<Item = ActivityEntry>,
    {
        let mut matching: Vec<ActivityEntry> = entries
            .into_iter()
            .filter(|e| self.filter.matches(e))
            .collect();
        matching.sort_by(|a, b| b.logged_at.cmp(&a.logged_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len();
        let logs: Vec<ActivityEntry> = matching
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        ActivityPage::new(logs, total, self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityPage {
    pub total: usize,
    pub offset: u32,
    pub limit: u32,
    pub count: usize,
    pub logs: Vec<ActivityEntry>,
}

impl ActivityPage {
    pub fn new(logs: Vec<ActivityEntry>, total: usize, query: &ActivityQuery) -> Self {
        Self {
            total,
            offset: query.offset,
            limit: query.limit,
            count: logs.len(),
            logs,
        }
    }
}
