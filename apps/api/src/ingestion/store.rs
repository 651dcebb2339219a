//! Job corpus store.
//!
//! `JobStore` is what the upsert engine and the matching handlers see.
//! `PgJobStore` is the production implementation; the in-memory store backs
//! the pipeline tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::models::job::{Job, JobCandidate, Organization};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Reactivated,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts or refreshes by natural key. The stored row ends up active,
    /// with `created_at` untouched on refresh.
    async fn upsert(
        &self,
        job: &JobCandidate,
        scraped_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn active_jobs_by_source(&self, organization: Organization)
        -> Result<Vec<Job>, StoreError>;

    /// Marks the given postings of one source inactive. Returns rows changed.
    async fn deactivate(
        &self,
        organization: Organization,
        source_ids: &[String],
    ) -> Result<u64, StoreError>;

    /// Deactivates postings of one source whose deadline is before `today`,
    /// limited to rows created before `created_before`.
    async fn expire_past_deadline(
        &self,
        organization: Organization,
        today: NaiveDate,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn active_jobs(&self) -> Result<Vec<Job>, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert(
        &self,
        job: &JobCandidate,
        scraped_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        // `prev` sees the row as it was before this statement.
        let previously_active: Option<bool> = sqlx::query_scalar(
            r#"
            WITH prev AS (
                SELECT is_active FROM jobs WHERE organization = $1 AND source_id = $2
            )
            INSERT INTO jobs
                (organization, source_id, title, description, responsibilities,
                 qualifications, category, grade, contract_type, location,
                 duty_station, remote_eligible, language_requirements, education_level,
                 years_of_experience, apply_url, deadline, posted_date, source_url,
                 is_active, last_scraped, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, TRUE, $20, $20, $20)
            ON CONFLICT (organization, source_id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                responsibilities = EXCLUDED.responsibilities,
                qualifications = EXCLUDED.qualifications,
                category = EXCLUDED.category,
                grade = EXCLUDED.grade,
                contract_type = EXCLUDED.contract_type,
                location = EXCLUDED.location,
                duty_station = EXCLUDED.duty_station,
                remote_eligible = EXCLUDED.remote_eligible,
                language_requirements = EXCLUDED.language_requirements,
                education_level = EXCLUDED.education_level,
                years_of_experience = EXCLUDED.years_of_experience,
                apply_url = EXCLUDED.apply_url,
                deadline = EXCLUDED.deadline,
                posted_date = EXCLUDED.posted_date,
                source_url = EXCLUDED.source_url,
                is_active = TRUE,
                last_scraped = EXCLUDED.last_scraped,
                updated_at = EXCLUDED.updated_at
            RETURNING (SELECT is_active FROM prev)
            "#,
        )
        .bind(job.organization.as_str())
        .bind(&job.source_id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&job.responsibilities)
        .bind(&job.qualifications)
        .bind(&job.category)
        .bind(&job.grade)
        .bind(&job.contract_type)
        .bind(&job.location)
        .bind(&job.duty_station)
        .bind(job.remote_eligible)
        .bind(Json(&job.language_requirements))
        .bind(&job.education_level)
        .bind(years_column(job.years_of_experience))
        .bind(&job.apply_url)
        .bind(job.deadline)
        .bind(job.posted_date)
        .bind(&job.source_url)
        .bind(scraped_at)
        .fetch_one(&self.pool)
        .await?;

        let outcome = match previously_active {
            None => UpsertOutcome::Inserted,
            Some(true) => UpsertOutcome::Updated,
            Some(false) => UpsertOutcome::Reactivated,
        };
        debug!("{} {}: {outcome:?}", job.organization, job.source_id);
        Ok(outcome)
    }

    async fn active_jobs_by_source(
        &self,
        organization: Organization,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE organization = $1 AND is_active ORDER BY source_id",
        )
        .bind(organization.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn deactivate(
        &self,
        organization: Organization,
        source_ids: &[String],
    ) -> Result<u64, StoreError> {
        if source_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            UPDATE jobs SET is_active = FALSE, updated_at = NOW()
            WHERE organization = $1 AND source_id = ANY($2) AND is_active
            "#,
        )
        .bind(organization.as_str())
        .bind(source_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn expire_past_deadline(
        &self,
        organization: Organization,
        today: NaiveDate,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET is_active = FALSE, updated_at = NOW()
            WHERE organization = $1 AND is_active
              AND deadline IS NOT NULL AND deadline < $2
              AND created_at < $3
            "#,
        )
        .bind(organization.as_str())
        .bind(today)
        .bind(created_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE is_active ORDER BY organization, source_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }
}

/// `INTEGER` column value; out-of-range years are stored as unknown.
fn years_column(years: Option<u32>) -> Option<i32> {
    years.and_then(|y| i32::try_from(y).ok())
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::RwLock;

    use super::*;
    use crate::models::job::JobKey;

    #[derive(Default)]
    pub struct MemoryJobStore {
        jobs: RwLock<BTreeMap<JobKey, Job>>,
        next_id: AtomicI64,
        fail_writes: AtomicBool,
    }

    impl MemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent write fail, simulating a lost database.
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn get(&self, organization: Organization, source_id: &str) -> Option<Job> {
            let key = JobKey::new(organization, source_id);
            self.jobs.read().ok()?.get(&key).cloned()
        }

        pub fn all(&self) -> Vec<Job> {
            self.jobs
                .read()
                .map(|jobs| jobs.values().cloned().collect())
                .unwrap_or_default()
        }

        fn check_writable(&self) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("writes disabled".into()));
            }
            Ok(())
        }

        fn poisoned<T>(_: T) -> StoreError {
            StoreError::Unavailable("lock poisoned".into())
        }
    }

    fn to_job(id: i64, c: &JobCandidate, at: DateTime<Utc>) -> Job {
        Job {
            id,
            source_id: c.source_id.clone(),
            organization: c.organization.as_str().to_string(),
            title: c.title.clone(),
            description: c.description.clone(),
            responsibilities: c.responsibilities.clone(),
            qualifications: c.qualifications.clone(),
            category: c.category.clone(),
            grade: c.grade.clone(),
            contract_type: c.contract_type.clone(),
            location: c.location.clone(),
            duty_station: c.duty_station.clone(),
            remote_eligible: c.remote_eligible,
            language_requirements: Json(c.language_requirements.clone()),
            education_level: c.education_level.clone(),
            years_of_experience: years_column(c.years_of_experience),
            apply_url: c.apply_url.clone(),
            deadline: c.deadline,
            posted_date: c.posted_date,
            source_url: c.source_url.clone(),
            is_active: true,
            last_scraped: at,
            created_at: at,
            updated_at: at,
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn upsert(
            &self,
            job: &JobCandidate,
            scraped_at: DateTime<Utc>,
        ) -> Result<UpsertOutcome, StoreError> {
            self.check_writable()?;
            let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
            let key = job.key();
            match jobs.get_mut(&key) {
                Some(existing) => {
                    let was_active = existing.is_active;
                    let mut refreshed = to_job(existing.id, job, scraped_at);
                    refreshed.created_at = existing.created_at;
                    *existing = refreshed;
                    Ok(if was_active {
                        UpsertOutcome::Updated
                    } else {
                        UpsertOutcome::Reactivated
                    })
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    jobs.insert(key, to_job(id, job, scraped_at));
                    Ok(UpsertOutcome::Inserted)
                }
            }
        }

        async fn active_jobs_by_source(
            &self,
            organization: Organization,
        ) -> Result<Vec<Job>, StoreError> {
            let jobs = self.jobs.read().map_err(Self::poisoned)?;
            Ok(jobs
                .values()
                .filter(|j| j.is_active && j.organization == organization.as_str())
                .cloned()
                .collect())
        }

        async fn deactivate(
            &self,
            organization: Organization,
            source_ids: &[String],
        ) -> Result<u64, StoreError> {
            self.check_writable()?;
            let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
            let mut changed = 0;
            for id in source_ids {
                if let Some(job) = jobs.get_mut(&JobKey::new(organization, id.clone())) {
                    if job.is_active {
                        job.is_active = false;
                        changed += 1;
                    }
                }
            }
            Ok(changed)
        }

        async fn expire_past_deadline(
            &self,
            organization: Organization,
            today: NaiveDate,
            created_before: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            self.check_writable()?;
            let mut jobs = self.jobs.write().map_err(Self::poisoned)?;
            let mut changed = 0;
            for job in jobs.values_mut().filter(|j| {
                j.is_active
                    && j.organization == organization.as_str()
                    && j.created_at < created_before
                    && j.deadline.is_some_and(|d| d < today)
            }) {
                job.is_active = false;
                changed += 1;
            }
            Ok(changed)
        }

        async fn active_jobs(&self) -> Result<Vec<Job>, StoreError> {
            let jobs = self.jobs.read().map_err(Self::poisoned)?;
            Ok(jobs.values().filter(|j| j.is_active).cloned().collect())
        }
    }
}
