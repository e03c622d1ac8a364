// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted cache entries and their freshness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A previously fetched backend payload.
///
/// Stored on disk as `{ "data": ..., "fetchedAt": "<rfc3339>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
}

/// Age classification of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within `stale_time`: serve without refetching.
    Fresh,
    /// Past `stale_time` but within `max_age`: serve while revalidating.
    Stale,
    /// Past `max_age`: treated as absent.
    Expired,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(PersistedEntry),
    Stale(PersistedEntry),
    Miss,
}

impl PersistedEntry {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }

    pub fn fetched_at(data: Value, fetched_at: DateTime<Utc>) -> Self {
        Self { data, fetched_at }
    }

    /// Age at `now`. Entries stamped in the future count as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or_default()
    }

    pub fn freshness(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
        stale_time: Duration,
    ) -> Freshness {
        let age = self.age(now);
        if age > max_age {
            Freshness::Expired
        } else if age <= stale_time {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX_AGE: Duration = Duration::from_secs(3600);
    const STALE_TIME: Duration = Duration::from_secs(60);

    fn entry_aged(secs: i64) -> (PersistedEntry, DateTime<Utc>) {
        let now = Utc::now();
        let entry = PersistedEntry::fetched_at(json!({"ok": true}), now - chrono::Duration::seconds(secs));
        (entry, now)
    }

    #[test]
    fn test_freshness_boundaries() {
        let (entry, now) = entry_aged(0);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Fresh);

        let (entry, now) = entry_aged(60);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Fresh);

        let (entry, now) = entry_aged(61);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Stale);

        let (entry, now) = entry_aged(3600);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Stale);

        let (entry, now) = entry_aged(3601);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Expired);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let (entry, now) = entry_aged(-30);
        assert_eq!(entry.age(now), Duration::ZERO);
        assert_eq!(entry.freshness(now, MAX_AGE, STALE_TIME), Freshness::Fresh);
    }

    #[test]
    fn test_wire_shape() {
        let entry = PersistedEntry::fetched_at(
            json!([1, 2]),
            DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["data"], json!([1, 2]));
        assert_eq!(value["fetchedAt"], "2026-01-02T03:04:05Z");
    }
}
