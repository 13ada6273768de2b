//! Job registry.
//!
//! Owns every job entry keyed by [`JobId`]. The map itself is never handed
//! out; callers get `Arc<JobEntry>` clones or snapshot copies.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::job::{JobEntry, JobId, ProgressSnapshot};

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Arc<JobEntry>) {
        self.jobs.insert(entry.id(), entry);
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn snapshot(&self, id: &JobId) -> Option<ProgressSnapshot> {
        self.jobs.get(id).map(|e| e.snapshot())
    }

    /// Snapshots of all jobs, most recently updated first.
    pub fn list(&self) -> Vec<(JobId, ProgressSnapshot)> {
        let mut jobs: Vec<_> = self
            .jobs
            .iter()
            .map(|e| (*e.key(), e.value().snapshot()))
            .collect();
        jobs.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
        jobs
    }

    /// Entries with a live attempt.
    pub fn live_entries(&self) -> Vec<Arc<JobEntry>> {
        self.jobs
            .iter()
            .filter(|e| e.value().is_live())
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove jobs retired for at least `retention`. Returns the evicted ids.
    pub fn evict_retired(&self, retention: Duration) -> Vec<JobId> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|e| {
                !e.value().is_live() && e.value().retired_for().is_some_and(|age| age >= retention)
            })
            .map(|e| *e.key())
            .collect();

        for id in &expired {
            self.jobs.remove(id);
            debug!(job_id = %id, "Evicted retired job");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry() -> Arc<JobEntry> {
        Arc::new(JobEntry::new(
            JobId::new(),
            ProgressSnapshot::new("u", "18", "/d", None),
            PathBuf::from("/w"),
        ))
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = JobRegistry::new();
        let e = entry();
        let id = e.id();
        registry.insert(e);

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.snapshot(&id).unwrap().selected_format, "18");
        assert!(registry.snapshot(&JobId::new()).is_none());
    }

    #[test]
    fn test_list_contains_all_jobs() {
        let registry = JobRegistry::new();
        registry.insert(entry());
        registry.insert(entry());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_evict_only_retired_jobs() {
        let registry = JobRegistry::new();
        let kept = entry();
        let retired = entry();
        retired.retire();
        let (kept_id, retired_id) = (kept.id(), retired.id());
        registry.insert(kept);
        registry.insert(retired);

        assert!(registry.evict_retired(Duration::from_secs(3600)).is_empty());
        let evicted = registry.evict_retired(Duration::ZERO);
        assert_eq!(evicted, vec![retired_id]);
        assert!(registry.contains(&kept_id));
        assert!(!registry.contains(&retired_id));
    }

    #[test]
    fn test_live_entries() {
        let registry = JobRegistry::new();
        let e = entry();
        registry.insert(Arc::clone(&e));
        registry.insert(entry());

        assert!(registry.live_entries().is_empty());
        let _guard = e.try_begin_attempt().unwrap();
        assert_eq!(registry.live_entries().len(), 1);
    }
}
