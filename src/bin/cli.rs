//! Command-line client for the virality score service.
//!
//! Mirrors the submit flow end to end: validate the selected input, upload
//! images one at a time, invoke the scoring handler, then render the
//! returned score or a single classified error message.

use clap::Parser;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode, multipart};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Maximum size of a single image (5 MB), enforced before upload.
const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Shared access key used when no token is supplied; matches the server's
/// fallback so anonymous scoring works out of the box.
const DEFAULT_ACCESS_API_KEY: &str = "ik_0f3c2a9d417b46c2b7d90ad1c55e8a21";

/// Estimated end-to-end duration driving the cosmetic progress line.
const ESTIMATED_DURATION_MS: u64 = 15_000;

const AUTH_REQUIRED_MESSAGE: &str =
    "Authentication required. Please ensure you are logged in or contact support.";

/// Substrings that mark an error message as authentication-related.
const AUTH_ERROR_PATTERNS: [&str; 7] = [
    "401",
    "unauthorized",
    "invalid token",
    "auth_invalid_credentials",
    "token",
    "authentication",
    "credential",
];

#[derive(Parser)]
#[command(
    name = "viralscore-cli",
    about = "Score a post's virality from text and images"
)]
struct Args {
    /// Post text to analyze
    #[arg(long)]
    text: Option<String>,

    /// Image file to attach; may be given multiple times
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Base URL of the scoring service
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// Bearer token; defaults to the shared access key
    #[arg(long)]
    token: Option<String>,
}

struct SelectedImage {
    name: String,
    mime: &'static str,
    bytes: Vec<u8>,
}

/// Mirror of the handler's success payload; tolerant of missing fields.
#[derive(Debug, Deserialize)]
struct ScoreResponse {
    overall_score: Option<f64>,
    predicted_reach: Option<String>,
    #[serde(default)]
    factors: serde_json::Value,
    short_explanation: Option<String>,
    #[serde(default)]
    detailed_reasons: Vec<String>,
    #[serde(default)]
    improvement_suggestions: Vec<String>,
    analysis_id: Option<i64>,
    db_save_error: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

enum UploadError {
    /// Credential rejected; aborts the whole batch.
    Auth(String),
    /// Anything else; the file is skipped.
    Other(String),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(message) = run(args).await {
        eprintln!("error: {}", message);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let text = args.text.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() && args.images.is_empty() {
        return Err("Please enter text content or upload images".to_string());
    }

    let images = load_images(&args.images)?;
    let token = args
        .token
        .clone()
        .unwrap_or_else(|| DEFAULT_ACCESS_API_KEY.to_string());
    let server = args.server.trim_end_matches('/').to_string();
    let http = Client::new();

    let progress = start_progress();
    let outcome = analyze(&http, &server, &token, &text, &images).await;
    progress.finish();

    let response = outcome?;

    let Some(score) = response.overall_score else {
        return Err(response
            .db_save_error
            .unwrap_or_else(|| "Analysis failed. Please try again.".to_string()));
    };

    render(score, &response);

    if let Some(warning) = &response.db_save_error {
        // Non-fatal: the score rendered, the record just didn't persist.
        eprintln!("warning: result was not saved: {}", warning);
    }

    Ok(())
}

/// Read and validate the selected images before anything is uploaded.
/// Any invalid file aborts the submit, matching the selection-time checks.
fn load_images(paths: &[PathBuf]) -> Result<Vec<SelectedImage>, String> {
    let mut selected = Vec::with_capacity(paths.len());
    for path in paths {
        let name = file_name_of(path);
        let bytes =
            std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let mime = validate_image_bytes(&name, &bytes)?;
        selected.push(SelectedImage { name, mime, bytes });
    }
    Ok(selected)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string()
}

/// Size cap plus media sniffing; returns the MIME type to upload with.
fn validate_image_bytes(name: &str, bytes: &[u8]) -> Result<&'static str, String> {
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(format!("Image too large: {}. Max size is 5MB", name));
    }
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok("image/png"),
        Ok(image::ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(image::ImageFormat::Gif) => Ok("image/gif"),
        Ok(image::ImageFormat::WebP) => Ok("image/webp"),
        _ => Err(format!("Please upload image files only ({})", name)),
    }
}

async fn analyze(
    http: &Client,
    server: &str,
    token: &str,
    text: &str,
    images: &[SelectedImage],
) -> Result<ScoreResponse, String> {
    // Upload sequentially, best-effort per file; only an auth failure
    // aborts the batch.
    let mut image_urls = Vec::new();
    for image in images {
        match upload_image(http, server, token, image).await {
            Ok(url) => {
                eprintln!("uploaded {} -> {}", image.name, url);
                image_urls.push(url);
            }
            Err(UploadError::Auth(body)) => {
                return Err(classify_error_message(&body));
            }
            Err(UploadError::Other(message)) => {
                eprintln!("warning: failed to upload {}: {}", image.name, message);
            }
        }
    }

    let body = serde_json::json!({ "text": text, "imageUrls": image_urls });
    let response = http
        .post(format!("{}/score", server))
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_error_message(&e.to_string()))?;

    let status = response.status();
    let body_text = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(classify_error_message(&body_text));
    }

    serde_json::from_str(&body_text).map_err(|e| format!("Unexpected response from server: {}", e))
}

async fn upload_image(
    http: &Client,
    server: &str,
    token: &str,
    image: &SelectedImage,
) -> Result<String, UploadError> {
    let part = multipart::Part::bytes(image.bytes.clone())
        .mime_str(image.mime)
        .map_err(|e| UploadError::Other(e.to_string()))?
        .file_name(image.name.clone());
    let form = multipart::Form::new().part("file", part);

    let response = http
        .post(format!("{}/images", server))
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .multipart(form)
        .send()
        .await
        .map_err(|e| UploadError::Other(e.to_string()))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        if status == StatusCode::UNAUTHORIZED || looks_like_auth_error(&body) {
            return Err(UploadError::Auth(body));
        }
        return Err(UploadError::Other(format!(
            "unexpected status {}: {}",
            status, body
        )));
    }

    let parsed: UploadResponse =
        serde_json::from_str(&body).map_err(|e| UploadError::Other(e.to_string()))?;
    Ok(parsed.url)
}

fn render(score: f64, response: &ScoreResponse) {
    println!("Overall score: {:.0}/100", score);
    if let Some(reach) = &response.predicted_reach {
        println!("Predicted reach: {}", reach);
    }
    if let Some(explanation) = &response.short_explanation {
        println!("\n{}", explanation);
    }

    if let Some(factors) = response.factors.as_object() {
        println!("\nFactors:");
        for (name, value) in factors {
            println!("  {:<26} {}", name, value);
        }
    }

    if !response.detailed_reasons.is_empty() {
        println!("\nWhy:");
        for reason in &response.detailed_reasons {
            println!("  - {}", reason);
        }
    }
    if !response.improvement_suggestions.is_empty() {
        println!("\nTry:");
        for suggestion in &response.improvement_suggestions {
            println!("  - {}", suggestion);
        }
    }

    if let Some(id) = response.analysis_id {
        println!("\nRecord created (ID: {})", id);
    }
    if !response.image_urls.is_empty() {
        println!("Images analyzed: {}", response.image_urls.len());
    }
}

// Progress line: advances linearly toward 95% over the estimated duration,
// then jumps to 100% when the call resolves. Purely cosmetic.

struct Progress {
    handle: tokio::task::JoinHandle<()>,
}

fn start_progress() -> Progress {
    let handle = tokio::spawn(async {
        let started = Instant::now();
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            let pct = linear_progress(started.elapsed().as_millis() as u64, ESTIMATED_DURATION_MS);
            print!("\r[{:>3}%] analyzing...", pct);
            let _ = std::io::stdout().flush();
        }
    });
    Progress { handle }
}

impl Progress {
    fn finish(self) {
        self.handle.abort();
        println!("\r[100%] analyzing... done");
    }
}

fn linear_progress(elapsed_ms: u64, estimate_ms: u64) -> u8 {
    let pct = elapsed_ms.saturating_mul(100) / estimate_ms.max(1);
    pct.min(95) as u8
}

fn looks_like_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Turn a failure body into the single message shown to the user: unwrap
/// `{error, details}` JSON shapes, then swap authentication-flavored
/// messages for a generic one.
fn classify_error_message(raw: &str) -> String {
    let mut message = raw.trim().to_string();
    if message.is_empty() {
        message = "Analysis failed. Please try again.".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&message) {
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            message = match value.get("details").and_then(|d| d.as_str()) {
                Some(details) => format!("{}: {}", error, details),
                None => error.to_string(),
            };
        }
    }

    if looks_like_auth_error(&message) {
        return AUTH_REQUIRED_MESSAGE.to_string();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_bodies_are_unwrapped() {
        let raw = r#"{"error":"AI service error","details":"model overloaded","type":"UPSTREAM_ERROR"}"#;
        assert_eq!(
            classify_error_message(raw),
            "AI service error: model overloaded"
        );
    }

    #[test]
    fn auth_flavored_messages_become_generic() {
        for raw in [
            "upstream said 401",
            r#"{"error":"Invalid token"}"#,
            r#"{"error":"boom","details":"AUTH_INVALID_CREDENTIALS"}"#,
        ] {
            assert_eq!(classify_error_message(raw), AUTH_REQUIRED_MESSAGE);
        }
    }

    #[test]
    fn other_messages_pass_through_verbatim() {
        assert_eq!(
            classify_error_message("connection reset by peer"),
            "connection reset by peer"
        );
        assert_eq!(
            classify_error_message(""),
            "Analysis failed. Please try again."
        );
    }

    #[test]
    fn progress_is_linear_and_caps_at_95() {
        assert_eq!(linear_progress(0, 15_000), 0);
        assert_eq!(linear_progress(7_500, 15_000), 50);
        assert_eq!(linear_progress(15_000, 15_000), 95);
        assert_eq!(linear_progress(60_000, 15_000), 95);
    }

    #[test]
    fn image_validation_checks_magic_bytes_and_size() {
        let png_magic = [0x89u8, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(
            validate_image_bytes("a.png", &png_magic).expect("png accepted"),
            "image/png"
        );

        assert!(validate_image_bytes("notes.txt", b"just some text").is_err());

        let oversized = vec![0u8; MAX_IMAGE_SIZE + 1];
        let err = validate_image_bytes("big.png", &oversized).unwrap_err();
        assert!(err.contains("Image too large"));
    }
}
