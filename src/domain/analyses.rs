//! Analysis domain - DB queries for the analyses table
//!
//! All functions use the generic Executor pattern, allowing them to work
//! with both `&PgPool` (for standalone queries) and `&mut PgConnection`
//! (for transactions). Routes manage transaction boundaries; when a caller
//! is authenticated, the surrounding transaction sets
//! `request.user_id` so row-level security policies keyed on
//! `current_setting('request.user_id')` apply. Anonymous writes run on the
//! elevated service-role pool instead.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, Postgres};

/// One persisted analysis submission and, once complete, its result.
#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct AnalysisRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub text_content: Option<String>,
    pub image_urls: Vec<String>,
    pub overall_score: Option<i32>,
    pub predicted_reach: Option<String>,
    pub factors: Option<serde_json::Value>,
    pub short_explanation: Option<String>,
    pub detailed_reasons: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result fields written back once the AI reply has been validated.
pub struct AnalysisUpdate<'a> {
    pub overall_score: i32,
    pub predicted_reach: Option<&'a str>,
    pub factors: serde_json::Value,
    pub short_explanation: Option<&'a str>,
    pub detailed_reasons: &'a [String],
    pub improvement_suggestions: &'a [String],
}

/// Bind the caller's identity to the current transaction so row-level
/// security policies see it. Must run inside a transaction; the setting is
/// transaction-local.
pub async fn set_request_user<'e, E>(executor: E, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("SELECT set_config('request.user_id', $1, true)")
        .bind(user_id.to_string())
        .execute(executor)
        .await?;
    Ok(())
}

/// Create the record for a submission before analysis runs: input fields
/// only, result fields null. Returns the new row id.
pub async fn insert_analysis<'e, E>(
    executor: E,
    user_id: Option<i64>,
    text_content: Option<&str>,
    image_urls: &[String],
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO analyses (user_id, text_content, image_urls, detailed_reasons, improvement_suggestions, created_at, updated_at)
        VALUES ($1, $2, $3, '{}', '{}', NOW(), NOW())
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(text_content)
    .bind(image_urls)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Write the validated result fields onto the pre-created row. Returns the
/// number of rows updated; zero means the row vanished or was not visible.
pub async fn update_analysis_result<'e, E>(
    executor: E,
    id: i64,
    update: &AnalysisUpdate<'_>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE analyses
        SET overall_score = $1,
            predicted_reach = $2,
            factors = $3,
            short_explanation = $4,
            detailed_reasons = $5,
            improvement_suggestions = $6,
            updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(update.overall_score)
    .bind(update.predicted_reach)
    .bind(&update.factors)
    .bind(update.short_explanation)
    .bind(update.detailed_reasons)
    .bind(update.improvement_suggestions)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Annotate a pre-created row whose analysis failed structural validation.
pub async fn mark_analysis_error<'e, E>(
    executor: E,
    id: i64,
    error: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE analyses
        SET error = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(error)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fetch a single analysis by id.
pub async fn get_analysis<'e, E>(executor: E, id: i64) -> Result<Option<AnalysisRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, user_id, text_content, image_urls, overall_score, predicted_reach,
               factors, short_explanation, detailed_reasons, improvement_suggestions,
               error, created_at, updated_at
        FROM analyses
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}
