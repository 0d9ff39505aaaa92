//! Application constants

/// Storage bucket name for uploaded post images
pub const BUCKET_NAME: &str = "viralscore_media";

/// Maximum size of a single uploaded image (5 MB)
pub const MAX_IMAGE_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Body limit for the upload endpoint (image cap plus multipart overhead)
pub const MAX_UPLOAD_BODY_SIZE: usize = MAX_IMAGE_UPLOAD_SIZE + 64 * 1024;

/// Signed URL expiry time in seconds (15 minutes)
pub const SIGNED_URL_EXPIRY_SECS: u32 = 15 * 60;

/// Model used for scoring completions
pub const AI_MODEL: &str = "openai/gpt-4o";

/// Sampling temperature for scoring completions
pub const AI_TEMPERATURE: f32 = 0.7;

/// Token ceiling for scoring completions
pub const AI_MAX_TOKENS: u32 = 1200;

/// Maximum length of the raw-reply preview attached to parse errors
pub const RAW_PREVIEW_LIMIT: usize = 2000;

/// Fallback API key used when ACCESS_API_KEY is not set. Deployments are
/// expected to override it; the default keeps local setups working.
pub const FALLBACK_ACCESS_API_KEY: &str = "ik_0f3c2a9d417b46c2b7d90ad1c55e8a21";
