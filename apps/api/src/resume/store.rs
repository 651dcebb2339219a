//! Résumé persistence. At most one résumé per user is active; every write
//! that changes activation runs in a transaction.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::resume::ResumeRow;
use crate::resume::parser::ParsedResume;

/// Stores a freshly parsed résumé as the user's active one.
pub async fn insert_resume(
    pool: &PgPool,
    user_id: Uuid,
    filename: &str,
    parsed: &ParsedResume,
) -> Result<ResumeRow, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE resumes SET is_active = FALSE WHERE user_id = $1 AND is_active")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, ResumeRow>(
        r#"
        INSERT INTO resumes
            (id, user_id, filename, file_type, text, skills, experience_years,
             education_level, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(filename)
    .bind(parsed.format.as_str())
    .bind(&parsed.text)
    .bind(&parsed.skills)
    .bind(parsed.experience_years.and_then(|y| i32::try_from(y).ok()))
    .bind(parsed.education_level.map(|level| level.label()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Stored résumé {} for user {user_id} ({} skills)",
        row.id,
        row.skills.len()
    );
    Ok(row)
}

pub async fn list_resumes(pool: &PgPool, user_id: Uuid) -> Result<Vec<ResumeRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeRow>(
        "SELECT * FROM resumes WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get_resume(pool: &PgPool, id: Uuid) -> Result<Option<ResumeRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_active_resume(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<ResumeRow>, sqlx::Error> {
    sqlx::query_as::<_, ResumeRow>(
        "SELECT * FROM resumes WHERE user_id = $1 AND is_active ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Makes `id` its owner's only active résumé. `None` if it does not exist.
pub async fn activate_resume(pool: &PgPool, id: Uuid) -> Result<Option<ResumeRow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let owner: Option<Uuid> =
        sqlx::query_scalar("SELECT user_id FROM resumes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(user_id) = owner else {
        return Ok(None);
    };

    sqlx::query("UPDATE resumes SET is_active = (id = $2) WHERE user_id = $1")
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(row))
}

/// Returns false if nothing was deleted.
pub async fn delete_resume(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM resumes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
