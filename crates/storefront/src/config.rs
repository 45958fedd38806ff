//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `OJA_BACKEND_URL` - Base URL of the hosted project (e.g. `https://abc.example.co`)
//! - `OJA_BACKEND_ANON_KEY` - Public API key sent with every request
//!
//! ## Optional
//! - `OJA_BACKEND_SERVICE_KEY` - Elevated key for maintenance commands (high entropy)
//! - `OJA_STATE_DIR` - Directory for device-local storage (default: .oja)
//! - `OJA_IMAGE_BUCKET` - Object storage bucket for product images (default: product-images)
//! - `OJA_CATALOG_CACHE_SECS` - Catalog list cache TTL (default: 300)
//! - `OJA_REALTIME_POLL_MS` - Realtime feed polling period (default: 5000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const MIN_REALTIME_POLL_MS: u64 = 250;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub backend: BackendConfig,
    /// Directory holding the device-local cart and guest orders
    pub state_dir: PathBuf,
    /// Bucket used for product image uploads
    pub image_bucket: String,
    /// How long a fetched catalog list is served from memory
    pub catalog_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Hosted backend connection settings.
///
/// Implements `Debug` manually to redact keys.
#[derive(Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: SecretString,
    pub service_key: Option<SecretString>,
    pub realtime_poll: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field(
                "service_key",
                &self.service_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("realtime_poll", &self.realtime_poll)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the service key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig::from_env()?;
        let state_dir = PathBuf::from(get_env_or_default("OJA_STATE_DIR", ".oja"));
        let image_bucket = get_env_or_default("OJA_IMAGE_BUCKET", "product-images");
        let catalog_ttl = Duration::from_secs(parse_env("OJA_CATALOG_CACHE_SECS", 300)?);

        Ok(Self {
            backend,
            state_dir,
            image_bucket,
            catalog_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_required_env("OJA_BACKEND_URL")?;
        let url = parse_backend_url(&raw_url)
            .map_err(|reason| ConfigError::InvalidEnvVar("OJA_BACKEND_URL".to_string(), reason))?;

        let poll_ms = parse_env("OJA_REALTIME_POLL_MS", 5000)?;
        if poll_ms < MIN_REALTIME_POLL_MS {
            return Err(ConfigError::InvalidEnvVar(
                "OJA_REALTIME_POLL_MS".to_string(),
                format!("must be at least {MIN_REALTIME_POLL_MS}"),
            ));
        }

        let service_key = match get_optional_env("OJA_BACKEND_SERVICE_KEY") {
            Some(value) => {
                validate_secret_strength(&value, "OJA_BACKEND_SERVICE_KEY")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            url,
            anon_key: SecretString::from(get_required_env("OJA_BACKEND_ANON_KEY")?),
            service_key,
            realtime_poll: Duration::from_millis(poll_ms),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the backend base URL, requiring http(s) and normalizing the trailing slash
/// so that `Url::join` keeps any path prefix.
fn parse_backend_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // key length never approaches f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholders and low-entropy values for elevated keys.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_service_key_placeholder_rejected() {
        let err =
            validate_secret_strength("your-service-key", "OJA_BACKEND_SERVICE_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_service_key_low_entropy_rejected() {
        assert!(validate_secret_strength("abababababababab", "K").is_err());
        let jwt_like = "eyJhbGciOiJIUzI1NiJ9.c2VydmljZV9yb2xl.Qw3kZ9";
        assert!(validate_secret_strength(jwt_like, "K").is_ok());
    }

    #[test]
    fn test_backend_url_normalized() {
        let url = parse_backend_url("https://abc.hosted.dev/base").unwrap();
        assert_eq!(url.as_str(), "https://abc.hosted.dev/base/");
        assert_eq!(url.join("rest/v1/products").unwrap().path(), "/base/rest/v1/products");
        assert!(parse_backend_url("ftp://abc").is_err());
        assert!(parse_backend_url("not a url").is_err());
    }

    #[test]
    fn test_backend_config_debug_redacts_keys() {
        let config = BackendConfig {
            url: parse_backend_url("https://abc.hosted.dev").unwrap(),
            anon_key: SecretString::from("anon-key-value"),
            service_key: Some(SecretString::from("service-key-value")),
            realtime_poll: Duration::from_secs(5),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("abc.hosted.dev"));
        assert!(!debug.contains("anon-key-value"));
        assert!(!debug.contains("service-key-value"));
    }
}
