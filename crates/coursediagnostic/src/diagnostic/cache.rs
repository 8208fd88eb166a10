//! Per-course caching of diagnostic results.
//!
//! Entries never expire on their own; they are removed when an
//! invalidation event arrives for the course (see `observer`).

use super::types::CachedCourseReport;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const CACHE_KEY_PREFIX: &str = "courseid:";

/// Cache key for one course's report.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_course(course_id: i64) -> Self {
        Self(format!("{}{}", CACHE_KEY_PREFIX, course_id))
    }

    /// Course id encoded in the key, if it was built by [`for_course`](Self::for_course).
    pub fn course_id(&self) -> Option<i64> {
        self.0.strip_prefix(CACHE_KEY_PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thread-safe store of course reports.
///
/// Uses DashMap for concurrent access without external locking. Two
/// requests computing the same course at once both write; the last one wins.
#[derive(Default)]
pub struct ReportCache {
    entries: DashMap<CacheKey, CachedCourseReport>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the cached report for a course.
    pub fn get(&self, course_id: i64) -> Option<CachedCourseReport> {
        let found = self
            .entries
            .get(&CacheKey::for_course(course_id))
            .map(|entry| entry.value().clone());

        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        found
    }

    /// Returns true if a report is cached, without touching the hit counters.
    pub fn contains(&self, course_id: i64) -> bool {
        self.entries.contains_key(&CacheKey::for_course(course_id))
    }

    /// Stores a report, replacing any previous one for the same course.
    pub fn insert(&self, report: CachedCourseReport) {
        self.entries
            .insert(CacheKey::for_course(report.course_id), report);
    }

    /// Removes a course's report. Returns true if one was cached.
    pub fn invalidate(&self, course_id: i64) -> bool {
        self.entries
            .remove(&CacheKey::for_course(course_id))
            .is_some()
    }

    /// Clears all entries from the cache.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hits: u64,
    pub misses: u64,
}
