//! Scoring endpoints (/score, /analyses/*)
//!
//! POST /score orchestrates one analysis: validate input, pre-create the
//! database record, call the AI completion backend, parse and validate its
//! reply, update the record, and return the merged result. Pre-creation
//! failures are fatal; post-analysis persistence failures are reported as
//! diagnostics on an otherwise successful response.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::AppState;
use crate::ai::ChatRequest;
use crate::domain::analyses;
use crate::models::{AnalysisResult, ScorePayload};
use crate::prompt;
use crate::services::credentials::Credential;
use crate::services::error::{ApiError, LogErr};
use crate::services::recover;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/score",
            post(score)
                .options(score_preflight)
                .fallback(method_not_allowed),
        )
        .route("/analyses/{id}", get(get_analysis))
}

/// OPTIONS /score - CORS preflight; headers come from the global layers
async fn score_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

/// POST /score - Analyze a post's virality from text and/or image URLs
async fn score(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AnalysisResult>, ApiError> {
    let parsed: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("Invalid JSON body: {}", e)))?;

    // Coerce loosely-typed input: non-string text and non-array imageUrls
    // degrade to empty rather than erroring.
    let text = parsed
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let image_urls: Vec<String> = parsed
        .get("imageUrls")
        .and_then(|v| v.as_array())
        .map(|urls| {
            urls.iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() && image_urls.is_empty() {
        return Err(ApiError::validation(
            "Please provide text content or images (or both)",
        ));
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let db_credential = state.credentials.for_database(auth_header);
    let ai_credential = state.credentials.for_ai(auth_header);

    println!(
        "[score] analyzing post: {} chars, {} image(s), user_id={:?}",
        text.len(),
        image_urls.len(),
        db_credential.user_id()
    );

    // The record must exist before analysis runs, so a row survives even
    // when the AI call fails afterwards.
    let text_content = (!text.is_empty()).then_some(text.as_str());
    let analysis_id = create_record(&state, &db_credential, text_content, &image_urls).await?;
    println!("[score] created analysis record {}", analysis_id);

    let request = ChatRequest::scoring(
        prompt::system_prompt(image_urls.len()),
        prompt::user_prompt(&text, image_urls.len()),
        &image_urls,
    );

    let completion = state
        .ai
        .chat_completion(ai_credential.bearer_token(), &request)
        .await
        .map_err(|e| {
            eprintln!("[score] AI call failed: {}", e);
            ApiError::from(e)
        })?;

    let raw = completion.content().ok_or_else(|| {
        ApiError::upstream(
            "AI did not return a response",
            "No content in completion choices",
        )
    })?;

    let value = recover::recover_json(raw).map_err(|e| {
        eprintln!("[score] failed to parse AI reply: {}", e);
        ApiError::parse(e.to_string(), raw)
    })?;

    let payload = match validate_payload(value) {
        Ok(payload) => payload,
        Err(details) => {
            // Best-effort annotation; the schema failure is what the caller sees.
            if let Err(e) = annotate_failure(&state, &db_credential, analysis_id, &details).await {
                eprintln!("[score] failed to annotate record {}: {}", analysis_id, e);
            }
            return Err(ApiError::Schema { details });
        }
    };

    let save_outcome = update_record(&state, &db_credential, analysis_id, &payload).await;
    if let Err(message) = &save_outcome {
        eprintln!(
            "[score] analysis {} completed but record update failed: {}",
            analysis_id, message
        );
    }

    Ok(Json(AnalysisResult::assemble(
        payload,
        (!text.is_empty()).then(|| text.clone()),
        image_urls,
        analysis_id,
        save_outcome,
    )))
}

/// Require `overall_score` and `factors`; anything else the model dropped
/// is tolerated downstream.
fn validate_payload(value: serde_json::Value) -> Result<ScorePayload, String> {
    let present = |key: &str| value.get(key).is_some_and(|v| !v.is_null());
    if !present("overall_score") || !present("factors") {
        return Err("AI reply is missing overall_score or factors".to_string());
    }
    serde_json::from_value(value).map_err(|e| format!("AI reply failed schema validation: {}", e))
}

async fn create_record(
    state: &AppState,
    credential: &Credential,
    text_content: Option<&str>,
    image_urls: &[String],
) -> Result<i64, ApiError> {
    let result = match credential {
        Credential::User {
            user_id: Some(user_id),
            ..
        } => insert_as_user(&state.db, *user_id, text_content, image_urls).await,
        Credential::Service => {
            analyses::insert_analysis(state.service_pool(), None, text_content, image_urls).await
        }
        _ => analyses::insert_analysis(&state.db, None, text_content, image_urls).await,
    };

    result.map_err(|e| {
        eprintln!("[score] failed to create analysis record: {}", e);
        let code = e
            .as_database_error()
            .and_then(|d| d.code())
            .map(|c| c.to_string());
        ApiError::db_create(code.as_deref(), e.to_string())
    })
}

/// Insert under the caller's identity so row-level security applies.
async fn insert_as_user(
    db: &PgPool,
    user_id: i64,
    text_content: Option<&str>,
    image_urls: &[String],
) -> Result<i64, sqlx::Error> {
    let mut tx = db.begin().await?;
    analyses::set_request_user(&mut *tx, user_id).await?;
    let id = analyses::insert_analysis(&mut *tx, Some(user_id), text_content, image_urls).await?;
    tx.commit().await?;
    Ok(id)
}

/// Write the validated result onto the pre-created row. Non-fatal: the
/// error string becomes a response diagnostic.
async fn update_record(
    state: &AppState,
    credential: &Credential,
    analysis_id: i64,
    payload: &ScorePayload,
) -> Result<(), String> {
    let factors = serde_json::to_value(&payload.factors)
        .map_err(|e| format!("Failed to encode factors: {}", e))?;
    let update = analyses::AnalysisUpdate {
        overall_score: i32::from(payload.overall_score),
        predicted_reach: payload.predicted_reach.map(|r| r.as_str()),
        factors,
        short_explanation: payload.short_explanation.as_deref(),
        detailed_reasons: &payload.detailed_reasons,
        improvement_suggestions: &payload.improvement_suggestions,
    };

    let rows = match credential {
        Credential::User {
            user_id: Some(user_id),
            ..
        } => update_as_user(&state.db, *user_id, analysis_id, &update).await,
        Credential::Service => {
            analyses::update_analysis_result(state.service_pool(), analysis_id, &update).await
        }
        _ => analyses::update_analysis_result(&state.db, analysis_id, &update).await,
    }
    .map_err(|e| format!("Database update failed: {}", e))?;

    if rows == 0 {
        return Err("Database update returned no data".to_string());
    }
    Ok(())
}

async fn update_as_user(
    db: &PgPool,
    user_id: i64,
    analysis_id: i64,
    update: &analyses::AnalysisUpdate<'_>,
) -> Result<u64, sqlx::Error> {
    let mut tx = db.begin().await?;
    analyses::set_request_user(&mut *tx, user_id).await?;
    let rows = analyses::update_analysis_result(&mut *tx, analysis_id, update).await?;
    tx.commit().await?;
    Ok(rows)
}

async fn annotate_failure(
    state: &AppState,
    credential: &Credential,
    analysis_id: i64,
    details: &str,
) -> Result<(), sqlx::Error> {
    match credential {
        Credential::User {
            user_id: Some(user_id),
            ..
        } => {
            let mut tx = state.db.begin().await?;
            analyses::set_request_user(&mut *tx, *user_id).await?;
            analyses::mark_analysis_error(&mut *tx, analysis_id, details).await?;
            tx.commit().await
        }
        Credential::Service => {
            analyses::mark_analysis_error(state.service_pool(), analysis_id, details).await
        }
        _ => analyses::mark_analysis_error(&state.db, analysis_id, details).await,
    }
}

/// GET /analyses/:id - Read back a persisted analysis record
async fn get_analysis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(analysis_id): Path<i64>,
) -> Result<Json<analyses::AnalysisRow>, ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let credential = state.credentials.for_database(auth_header);

    let row = match &credential {
        Credential::User {
            user_id: Some(user_id),
            ..
        } => {
            let mut tx = state
                .db
                .begin()
                .await
                .log_500("Begin transaction error")?;
            analyses::set_request_user(&mut *tx, *user_id)
                .await
                .log_500("Set request user error")?;
            let row = analyses::get_analysis(&mut *tx, analysis_id)
                .await
                .log_500("Get analysis error")?;
            tx.commit().await.log_500("Commit error")?;
            row
        }
        Credential::Service => analyses::get_analysis(state.service_pool(), analysis_id)
            .await
            .log_500("Get analysis error")?,
        _ => analyses::get_analysis(&state.db, analysis_id)
            .await
            .log_500("Get analysis error")?,
    };

    row.map(Json).ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> axum::Router {
        crate::app(AppState::for_tests())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    fn post_score(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/score")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    #[tokio::test]
    async fn empty_input_is_rejected_with_400() {
        let response = test_router()
            .oneshot(post_score(r#"{"text":"","imageUrls":[]}"#))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body.get("error").is_some());
        assert_eq!(body["type"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn missing_fields_count_as_empty_input() {
        let response = test_router()
            .oneshot(post_score("{}"))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn whitespace_only_text_is_empty() {
        let response = test_router()
            .oneshot(post_score(r#"{"text":"   \n  "}"#))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_validation_error() {
        let response = test_router()
            .oneshot(post_score("{not json"))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid JSON body"));
    }

    #[tokio::test]
    async fn wrong_method_gets_405_with_json_body() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/score")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn preflight_returns_204_with_cors_headers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/score")
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
                .and_then(|v| v.to_str().ok()),
            Some("Content-Type, Authorization")
        );
    }

    #[tokio::test]
    async fn precreation_failure_is_fatal() {
        // The test pool points at an unreachable database, so valid input
        // fails at record pre-creation and analysis never starts.
        let response = test_router()
            .oneshot(post_score(r#"{"text":"Great launch today!","imageUrls":[]}"#))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["type"], "DB_ERROR");
        assert!(body.get("error").is_some());
    }

    #[test]
    fn validate_payload_requires_score_and_factors() {
        let missing = serde_json::json!({ "predicted_reach": "Low" });
        assert!(validate_payload(missing).is_err());

        let null_factors =
            serde_json::json!({ "overall_score": 10, "factors": serde_json::Value::Null });
        assert!(validate_payload(null_factors).is_err());

        let ok = serde_json::json!({ "overall_score": 10, "factors": {} });
        let payload = validate_payload(ok).expect("valid payload");
        assert_eq!(payload.overall_score, 10);
        assert_eq!(payload.factors.media_boost, 0);
    }
}
