//! Error handling for route handlers.
//!
//! Every failure leaving a handler is one of these variants; each renders
//! as structured JSON `{error, details, type}` with its classified status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::ai::AiError;
use crate::constants::RAW_PREVIEW_LIMIT;

/// Generic user-facing message for authentication failures.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed. Please ensure you are logged in or ACCESS_API_KEY is configured on the server.";

/// Substrings that mark an error message as authentication-related.
/// Compatibility fallback for collaborators that only surface message
/// text; prefer typed error kinds where the seam provides them.
const AUTH_ERROR_PATTERNS: [&str; 7] = [
    "401",
    "unauthorized",
    "invalid token",
    "auth_invalid_credentials",
    "token",
    "authentication",
    "credential",
];

/// Case-insensitive match of a message against the known
/// authentication-failure patterns.
pub fn looks_like_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug)]
pub enum ApiError {
    /// Request failed validation before any collaborator was touched (400)
    Validation { message: String },
    /// Missing or invalid credential (401)
    Auth { details: String },
    /// An upstream collaborator failed for a non-auth reason; propagates
    /// the upstream status when it carries one in 400-599, else 500
    Upstream {
        status: Option<StatusCode>,
        message: String,
        details: String,
    },
    /// The AI reply was not recoverable JSON (500, with a raw preview)
    Parse { details: String, raw: String },
    /// The AI reply parsed but is missing required fields (500)
    Schema { details: String },
    /// A fatal database failure, e.g. record pre-creation (500)
    Db {
        message: String,
        details: String,
        hint: Option<String>,
    },
    /// Upload exceeded the per-image size cap (413)
    PayloadTooLarge { details: String },
    /// Upload was not image media (415)
    UnsupportedMedia { details: String },
    /// Requested record does not exist or is not visible (404)
    NotFound,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
        }
    }

    pub fn auth(details: impl Into<String>) -> Self {
        ApiError::Auth {
            details: details.into(),
        }
    }

    pub fn upstream(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::Upstream {
            status: None,
            message: message.into(),
            details: details.into(),
        }
    }

    /// Parse failure carrying a truncated preview of the raw reply.
    pub fn parse(details: impl Into<String>, raw: &str) -> Self {
        ApiError::Parse {
            details: details.into(),
            raw: raw.to_string(),
        }
    }

    /// Map a record pre-creation failure. A permission-denied code means
    /// row-level security rejected the insert, which for anonymous
    /// submissions points at missing elevated-credential configuration.
    pub fn db_create(code: Option<&str>, details: impl Into<String>) -> Self {
        if code == Some("42501") {
            ApiError::Db {
                message: "Permission denied: database record creation failed".to_string(),
                details: format!(
                    "Row-level security rejected the insert. Anonymous submissions require SERVICE_DATABASE_URL to be configured. Error: {}",
                    details.into()
                ),
                hint: Some("Set SERVICE_DATABASE_URL to a connection string for a role that bypasses row-level security".to_string()),
            }
        } else {
            ApiError::Db {
                message: "Failed to create database record".to_string(),
                details: details.into(),
                hint: None,
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Auth { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Upstream { status, .. } => {
                (*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Parse { .. } | ApiError::Schema { .. } | ApiError::Db { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMedia { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation { message } => json!({
                "error": message,
                "type": "VALIDATION_ERROR",
            }),
            ApiError::Auth { details } => json!({
                "error": AUTH_FAILED_MESSAGE,
                "details": details,
                "type": "AUTH_ERROR",
            }),
            ApiError::Upstream {
                message, details, ..
            } => json!({
                "error": message,
                "details": details,
                "type": "UPSTREAM_ERROR",
            }),
            ApiError::Parse { details, raw } => {
                let preview_len = raw.len().min(RAW_PREVIEW_LIMIT);
                let truncated = raw.len() > preview_len;
                let mut preview = raw
                    .char_indices()
                    .take_while(|(i, _)| *i < preview_len)
                    .map(|(_, c)| c)
                    .collect::<String>();
                if truncated {
                    preview.push_str("...");
                }
                json!({
                    "error": "Failed to parse AI response",
                    "details": details,
                    "raw_response_preview": preview,
                    "raw_response_length": raw.len(),
                    "type": "PARSE_ERROR",
                })
            }
            ApiError::Schema { details } => json!({
                "error": "Invalid AI response structure",
                "details": details,
                "type": "SCHEMA_ERROR",
            }),
            ApiError::Db {
                message,
                details,
                hint,
            } => json!({
                "error": message,
                "details": details,
                "hint": hint,
                "type": "DB_ERROR",
            }),
            ApiError::PayloadTooLarge { details } => json!({
                "error": "Image too large",
                "details": details,
                "type": "VALIDATION_ERROR",
            }),
            ApiError::UnsupportedMedia { details } => json!({
                "error": "Unsupported media type",
                "details": details,
                "type": "VALIDATION_ERROR",
            }),
            ApiError::NotFound => json!({
                "error": "Not found",
                "type": "NOT_FOUND",
            }),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status(), self.body())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Api { status, message } => {
                if status == 401 || looks_like_auth_error(&message) {
                    ApiError::Auth { details: message }
                } else {
                    ApiError::Upstream {
                        status: StatusCode::from_u16(status)
                            .ok()
                            .filter(|s| s.is_client_error() || s.is_server_error()),
                        message: "AI service error".to_string(),
                        details: message,
                    }
                }
            }
            AiError::Http(err) => {
                let details = err.to_string();
                if looks_like_auth_error(&details) {
                    ApiError::Auth { details }
                } else {
                    ApiError::Upstream {
                        status: None,
                        message: "AI service error".to_string(),
                        details,
                    }
                }
            }
        }
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return a 500-class upstream error
    fn log_500(self, context: &str) -> Result<T, ApiError>;

    /// Log error with context and return a custom ApiError
    fn log_api(self, context: &str, err: ApiError) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            eprintln!("{}: {}", context, e);
            ApiError::upstream(context, e.to_string())
        })
    }

    fn log_api(self, context: &str, err: ApiError) -> Result<T, ApiError> {
        self.map_err(|e| {
            eprintln!("{}: {}", context, e);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_patterns_match_across_status_text_variations() {
        assert!(looks_like_auth_error("upstream returned 401"));
        assert!(looks_like_auth_error("Unauthorized"));
        assert!(looks_like_auth_error("invalid TOKEN supplied"));
        assert!(looks_like_auth_error("AUTH_INVALID_CREDENTIALS"));
        assert!(looks_like_auth_error("bad credential"));
        assert!(!looks_like_auth_error("connection reset by peer"));
        assert!(!looks_like_auth_error("model overloaded"));
    }

    #[test]
    fn bodies_carry_error_and_type() {
        let err = ApiError::validation("Please provide text content or images (or both)");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.body();
        assert_eq!(
            body["error"],
            "Please provide text content or images (or both)"
        );
        assert_eq!(body["type"], "VALIDATION_ERROR");
    }

    #[test]
    fn parse_error_truncates_the_raw_preview() {
        let raw = "x".repeat(RAW_PREVIEW_LIMIT + 100);
        let err = ApiError::parse("expected value at line 1", &raw);
        let body = err.body();
        assert_eq!(body["type"], "PARSE_ERROR");
        let preview = body["raw_response_preview"].as_str().unwrap();
        assert_eq!(preview.len(), RAW_PREVIEW_LIMIT + 3);
        assert!(preview.ends_with("..."));
        assert_eq!(body["raw_response_length"], RAW_PREVIEW_LIMIT as u64 + 100);
    }

    #[test]
    fn permission_denied_names_the_missing_configuration() {
        let err = ApiError::db_create(Some("42501"), "permission denied for table analyses");
        let body = err.body();
        assert!(
            body["details"]
                .as_str()
                .unwrap()
                .contains("SERVICE_DATABASE_URL")
        );
        assert_eq!(body["type"], "DB_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_status_is_propagated_in_range() {
        let err = ApiError::from(AiError::Api {
            status: 429,
            message: "rate limited".to_string(),
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let err = ApiError::from(AiError::Api {
            status: 302,
            message: "weird redirect".to_string(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ai_401_classifies_as_auth() {
        let err = ApiError::from(AiError::Api {
            status: 401,
            message: "nope".to_string(),
        });
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.body()["type"], "AUTH_ERROR");
    }
}
