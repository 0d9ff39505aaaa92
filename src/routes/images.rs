//! Image upload and media serving endpoints (/images, /media/*)

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::constants::{BUCKET_NAME, MAX_IMAGE_UPLOAD_SIZE};
use crate::services::credentials::Credential;
use crate::services::error::{ApiError, LogErr};
use crate::storage;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/images", post(upload_image))
        .route("/media/{*path}", get(serve_media))
}

#[derive(Serialize)]
struct UploadResponse {
    url: String,
    path: String,
}

/// POST /images - Upload one post image, returning its public URL.
/// Accepts multipart form data with a single "file" field carrying image
/// media, capped at 5 MB.
async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let owner = authorize_upload(&state, auth_header)?;

    while let Some(field) = multipart.next_field().await.log_api(
        "Multipart field error",
        ApiError::validation("Malformed multipart body"),
    )? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !content_type.starts_with("image/") {
            return Err(ApiError::UnsupportedMedia {
                details: format!("content type {} is not image media", content_type),
            });
        }

        let file_name = field
            .file_name()
            .map(sanitize_file_name)
            .unwrap_or_else(|| "upload".to_string());

        let data = field
            .bytes()
            .await
            .log_api(
                "Upload read error",
                ApiError::validation("Failed to read uploaded file"),
            )?;

        if data.len() > MAX_IMAGE_UPLOAD_SIZE {
            return Err(ApiError::PayloadTooLarge {
                details: format!(
                    "image is {} bytes, cap is {} bytes",
                    data.len(),
                    MAX_IMAGE_UPLOAD_SIZE
                ),
            });
        }

        // Sniff the bytes too; the declared content type alone is cheap to fake.
        if image::guess_format(&data).is_err() {
            return Err(ApiError::UnsupportedMedia {
                details: "file bytes are not a recognized image format".to_string(),
            });
        }

        let key = build_storage_key(&owner, &file_name);
        storage::store_image(
            state.gcs.as_ref(),
            state.local_storage_path.as_ref(),
            BUCKET_NAME,
            &key,
            &data,
        )
        .await
        .log_500("Image upload error")?;

        let url = storage::public_image_url(
            state.local_storage_path.is_some(),
            &state.public_base_url,
            BUCKET_NAME,
            &key,
        )
        .await
        .log_500("Public URL error")?;

        println!("[images] stored {} ({} bytes)", key, data.len());
        return Ok((StatusCode::CREATED, Json(UploadResponse { url, path: key })));
    }

    Err(ApiError::validation("Multipart body is missing a file field"))
}

/// Uploads need a recognizable credential: a valid user token stores under
/// the user's prefix, the static key stores anonymously, anything else is
/// rejected so the client can abort its batch.
fn authorize_upload(state: &AppState, auth_header: Option<&str>) -> Result<String, ApiError> {
    match state.credentials.classify(auth_header) {
        Some(Credential::User {
            user_id: Some(id), ..
        }) => Ok(format!("user_{}", id)),
        Some(Credential::StaticKey { .. }) => Ok("anon".to_string()),
        Some(Credential::User { user_id: None, .. }) => {
            Err(ApiError::auth("AUTH_INVALID_CREDENTIALS"))
        }
        _ => Err(ApiError::auth("Missing Authorization bearer token")),
    }
}

// Path: images/user_123/2026-08-07/1754500000000-9f3a1c20-photo.png
fn build_storage_key(owner: &str, file_name: &str) -> String {
    let now = Utc::now();
    let suffix: u32 = rand::rng().random();
    format!(
        "images/{}/{}/{}-{:08x}-{}",
        owner,
        now.format("%Y-%m-%d"),
        now.timestamp_millis(),
        suffix,
        file_name
    )
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// GET /media/*path - Serve locally stored media files
async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Security: reject paths with traversal attempts or null bytes upfront
    if path.contains("..") || path.contains('\0') {
        return Err(StatusCode::FORBIDDEN);
    }

    let local_path = state
        .local_storage_path
        .as_ref()
        .ok_or(StatusCode::NOT_FOUND)?;

    let full_path = local_path.join(&path);

    // Security: ensure the path doesn't escape the storage directory.
    // canonicalize() resolves symlinks and normalizes the path.
    let canonical = full_path
        .canonicalize()
        .map_err(|_| StatusCode::NOT_FOUND)?; // Silent - expected for missing files
    let storage_canonical = local_path
        .canonicalize()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !canonical.starts_with(&storage_canonical) {
        return Err(StatusCode::FORBIDDEN);
    }

    let bytes = tokio::fs::read(&canonical)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?; // Silent - expected for missing files

    let content_type = match canonical.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };

    // Keys embed a timestamp, so stored files never change; cache hard.
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_file_name("weird/name!.png"), "weird_name_.png");
        assert_eq!(sanitize_file_name("///"), "upload");
    }

    #[test]
    fn storage_keys_carry_owner_and_file_name() {
        let key = build_storage_key("user_7", "photo.png");
        assert!(key.starts_with("images/user_7/"));
        assert!(key.ends_with("-photo.png"));
        assert!(!key.contains(' '));
    }

    #[tokio::test]
    async fn upload_requires_a_recognized_credential() {
        let state = AppState::for_tests();

        assert!(authorize_upload(&state, None).is_err());
        assert!(authorize_upload(&state, Some("Bearer junk-token")).is_err());
        assert_eq!(
            authorize_upload(&state, Some("Bearer ik_test")).expect("static key accepted"),
            "anon"
        );
    }
}
