//! Deduplicator / upsert engine.
//!
//! Reconciles one source's normalized candidates against the store:
//! insert unseen keys, refresh or reactivate known ones, then retire keys of
//! the same source that the crawl no longer lists and expire past-deadline
//! postings. Writes for different keys run concurrently; writes for the same
//! key are serialized by a per-key lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::ingestion::store::{JobStore, StoreError, UpsertOutcome};
use crate::models::job::{JobCandidate, JobKey, Organization};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub reactivated: usize,
    pub retired: usize,
    pub expired: usize,
}

impl UpsertStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Reactivated => self.reactivated += 1,
        }
    }
}

/// Everything one source's reconciliation needs besides the candidates.
pub struct Reconcile<'a> {
    pub organization: Organization,
    /// Source ids the crawl saw, including postings skipped after discovery.
    pub seen_ids: &'a BTreeSet<String>,
    pub started_at: DateTime<Utc>,
    /// False for failed crawls: nothing is retired on their account.
    pub retire_absent: bool,
}

#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<JobKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &JobKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the entry once no writer holds it.
    fn release(&self, key: &JobKey) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn JobStore>,
    write_concurrency: usize,
    locks: Arc<KeyLocks>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn JobStore>, write_concurrency: usize) -> Self {
        Self {
            store,
            write_concurrency: write_concurrency.max(1),
            locks: Arc::new(KeyLocks::default()),
        }
    }

    /// Applies one source's candidates. A store error aborts the source
    /// immediately; writes already committed stay committed.
    pub async fn apply(
        &self,
        candidates: Vec<JobCandidate>,
        reconcile: Reconcile<'_>,
    ) -> Result<UpsertStats, StoreError> {
        let Reconcile {
            organization,
            seen_ids,
            started_at,
            retire_absent,
        } = reconcile;
        let mut stats = UpsertStats::default();

        // Snapshot before writing so keys inserted now are never "absent".
        let previously_active = if retire_absent {
            self.store.active_jobs_by_source(organization).await?
        } else {
            Vec::new()
        };

        let candidate_ids: BTreeSet<String> =
            candidates.iter().map(|c| c.source_id.clone()).collect();

        let outcomes: Vec<UpsertOutcome> = stream::iter(candidates)
            .map(|candidate| self.upsert_one(candidate, started_at))
            .buffer_unordered(self.write_concurrency)
            .try_collect()
            .await?;
        for outcome in outcomes {
            stats.record(outcome);
        }

        if retire_absent {
            let absent: Vec<String> = previously_active
                .into_iter()
                .map(|job| job.source_id)
                .filter(|id| !seen_ids.contains(id) && !candidate_ids.contains(id))
                .collect();
            if !absent.is_empty() {
                debug!("{organization}: retiring {absent:?}");
            }
            stats.retired = self.store.deactivate(organization, &absent).await? as usize;
        }

        stats.expired = self
            .store
            .expire_past_deadline(organization, started_at.date_naive(), started_at)
            .await? as usize;

        info!(
            "{organization}: inserted={} updated={} reactivated={} retired={} expired={}",
            stats.inserted, stats.updated, stats.reactivated, stats.retired, stats.expired
        );
        Ok(stats)
    }

    async fn upsert_one(
        &self,
        candidate: JobCandidate,
        scraped_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let key = candidate.key();
        let lock = self.locks.lock_for(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.store.upsert(&candidate, scraped_at).await
        };
        drop(lock);
        self.locks.release(&key);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::ingestion::store::memory::MemoryJobStore;
    use crate::models::job::Job;

    fn candidate(org: Organization, id: &str, description: &str) -> JobCandidate {
        JobCandidate {
            source_id: id.to_string(),
            organization: org,
            title: format!("Job {id}"),
            description: description.to_string(),
            responsibilities: None,
            qualifications: None,
            category: None,
            grade: None,
            contract_type: None,
            location: None,
            duty_station: None,
            remote_eligible: false,
            language_requirements: BTreeMap::new(),
            education_level: None,
            years_of_experience: None,
            apply_url: format!("https://example.org/{id}"),
            deadline: None,
            posted_date: None,
            source_url: format!("https://example.org/{id}"),
        }
    }

    fn run_at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, day, 6, 0, 0).unwrap()
    }

    async fn apply(
        engine: &UpsertEngine,
        org: Organization,
        candidates: Vec<JobCandidate>,
        extra_seen: &[&str],
        started_at: DateTime<Utc>,
        retire_absent: bool,
    ) -> UpsertStats {
        let mut seen: BTreeSet<String> = candidates.iter().map(|c| c.source_id.clone()).collect();
        seen.extend(extra_seen.iter().map(|s| s.to_string()));
        engine
            .apply(
                candidates,
                Reconcile {
                    organization: org,
                    seen_ids: &seen,
                    started_at,
                    retire_absent,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_description_change_updates_not_inserts() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        let org = Organization::Un;

        let first = apply(&engine, org, vec![candidate(org, "1", "old")], &[], run_at(1), true).await;
        assert_eq!(first.inserted, 1);
        let created = store.get(org, "1").unwrap().created_at;

        let second = apply(&engine, org, vec![candidate(org, "1", "new")], &[], run_at(2), true).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 1);

        let job = store.get(org, "1").unwrap();
        assert_eq!(job.description, "new");
        assert_eq!(job.created_at, created);
        assert_eq!(job.last_scraped, run_at(2));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_retirement_scoped_to_source() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);

        apply(&engine, Organization::Un, vec![candidate(Organization::Un, "1", "")], &[], run_at(1), true).await;
        apply(&engine, Organization::Who, vec![candidate(Organization::Who, "1", "")], &[], run_at(1), true).await;

        // UN crawl no longer lists "1"; the WHO posting with the same id survives.
        let stats = apply(&engine, Organization::Un, vec![candidate(Organization::Un, "2", "")], &[], run_at(2), true).await;
        assert_eq!(stats.retired, 1);
        assert!(!store.get(Organization::Un, "1").unwrap().is_active);
        assert!(store.get(Organization::Who, "1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_skipped_but_seen_postings_not_retired() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        let org = Organization::Ilo;

        apply(&engine, org, vec![candidate(org, "1", ""), candidate(org, "2", "")], &[], run_at(1), true).await;
        let stats = apply(&engine, org, vec![candidate(org, "1", "")], &["2"], run_at(2), true).await;
        assert_eq!(stats.retired, 0);
        assert!(store.get(org, "2").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_failed_crawl_retires_nothing() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        let org = Organization::Undp;

        apply(&engine, org, vec![candidate(org, "1", "")], &[], run_at(1), true).await;
        let stats = apply(&engine, org, vec![], &[], run_at(2), false).await;
        assert_eq!(stats.retired, 0);
        assert!(store.get(org, "1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_reappearing_key_is_reactivated() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        let org = Organization::Un;

        apply(&engine, org, vec![candidate(org, "1", "")], &[], run_at(1), true).await;
        apply(&engine, org, vec![], &[], run_at(2), true).await;
        assert!(!store.get(org, "1").unwrap().is_active);

        let stats = apply(&engine, org, vec![candidate(org, "1", "")], &[], run_at(3), true).await;
        assert_eq!(stats.reactivated, 1);
        assert!(store.get(org, "1").unwrap().is_active);
    }

    #[tokio::test]
    async fn test_past_deadline_expires_only_preexisting_postings() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        let org = Organization::Who;
        let mut late = candidate(org, "late", "");
        late.deadline = NaiveDate::from_ymd_opt(2025, 10, 31);

        // Inserted by this run: stays active until the next run.
        let first = apply(&engine, org, vec![late.clone()], &[], run_at(1), true).await;
        assert_eq!(first.expired, 0);
        assert!(store.get(org, "late").unwrap().is_active);

        let second = apply(&engine, org, vec![late], &[], run_at(1) + Duration::days(1), true).await;
        assert_eq!(second.expired, 1);
        assert!(!store.get(org, "late").unwrap().is_active);
    }

    /// Checks for the key, yields, then writes. Without outside
    /// serialization two writers both see the key as absent.
    struct SplitStore(MemoryJobStore);

    #[async_trait]
    impl JobStore for SplitStore {
        async fn upsert(
            &self,
            job: &JobCandidate,
            scraped_at: DateTime<Utc>,
        ) -> Result<UpsertOutcome, StoreError> {
            let existed = self.0.get(job.organization, &job.source_id).is_some();
            tokio::task::yield_now().await;
            let outcome = self.0.upsert(job, scraped_at).await?;
            Ok(if existed { outcome } else { UpsertOutcome::Inserted })
        }

        async fn active_jobs_by_source(
            &self,
            organization: Organization,
        ) -> Result<Vec<Job>, StoreError> {
            self.0.active_jobs_by_source(organization).await
        }

        async fn deactivate(
            &self,
            organization: Organization,
            source_ids: &[String],
        ) -> Result<u64, StoreError> {
            self.0.deactivate(organization, source_ids).await
        }

        async fn expire_past_deadline(
            &self,
            organization: Organization,
            today: NaiveDate,
            created_before: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.0.expire_past_deadline(organization, today, created_before).await
        }

        async fn active_jobs(&self) -> Result<Vec<Job>, StoreError> {
            self.0.active_jobs().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_writes_for_same_key_are_serialized() {
        let org = Organization::Un;

        // Straight to the store, both writers claim the insert.
        let unguarded = SplitStore(MemoryJobStore::new());
        let (cand_a, cand_b) = (candidate(org, "1", "a"), candidate(org, "1", "b"));
        let (a, b) = tokio::join!(
            unguarded.upsert(&cand_a, run_at(1)),
            unguarded.upsert(&cand_b, run_at(1)),
        );
        assert_eq!(a.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(b.unwrap(), UpsertOutcome::Inserted);

        // Through the engine, the second writer waits and sees the first.
        let store = Arc::new(SplitStore(MemoryJobStore::new()));
        let engine = UpsertEngine::new(store.clone(), 8);
        let (a, b) = tokio::join!(
            engine.upsert_one(candidate(org, "1", "a"), run_at(1)),
            engine.upsert_one(candidate(org, "1", "b"), run_at(1)),
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o != UpsertOutcome::Inserted);
        assert_eq!(outcomes, vec![UpsertOutcome::Inserted, UpsertOutcome::Updated]);
        assert_eq!(store.0.all().len(), 1);
        assert!(engine.locks.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_aborts_source() {
        let store = Arc::new(MemoryJobStore::new());
        let engine = UpsertEngine::new(store.clone(), 4);
        store.fail_writes(true);
        let seen = BTreeSet::new();
        let result = engine
            .apply(
                vec![candidate(Organization::Un, "1", "")],
                Reconcile {
                    organization: Organization::Un,
                    seen_ids: &seen,
                    started_at: run_at(1),
                    retire_absent: true,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
