use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::entry::ActivityEntry;

/// Aggregate counts shown on the admin activity page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub total_logs: usize,
    pub recent_24h: usize,
    pub by_method: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_entity: BTreeMap<String, usize>,
}

impl ActivitySummary {
    pub fn from_entries<'a, I>(entries: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a ActivityEntry>,
    {
        let cutoff = now - Duration::hours(24);
        let mut summary = Self::default();

        for entry in entries {
            summary.total_logs += 1;
            if entry.logged_at >= cutoff {
                summary.recent_24h += 1;
            }
            *summary
                .by_source
                .entry(entry.source.as_str().to_string())
                .or_default() += 1;
            if let Some(method) = entry.method() {
                *summary.by_method.entry(method.to_string()).or_default() += 1;
            }
            if let Some(entity) = entry.target_entity() {
                *summary.by_entity.entry(entity.to_string()).or_default() += 1;
            }
        }
        summary
    }
}
