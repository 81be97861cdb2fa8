use itertools::Itertools;
use url::Url;

use crate::core::config::{batch, validation};
use crate::core::error::{AppError, AppResult};

/// Converts a byte count to megabytes rounded to two decimals.
///
/// # Example
///
/// ```
/// use melodrop::core::utils::bytes_to_mb;
///
/// assert_eq!(bytes_to_mb(1_572_864), 1.5);
/// ```
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Trims submitted URLs, drops blanks and duplicates, and validates the rest.
///
/// Returns `AppError::Validation` when nothing is left ("No URLs provided"), when
/// too many URLs are given, or when an entry is not an http(s) URL.
pub fn normalize_urls(raw: &[String]) -> AppResult<Vec<String>> {
    let urls: Vec<String> = raw
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .unique()
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(AppError::Validation("No URLs provided".to_string()));
    }
    if urls.len() > validation::MAX_URLS_PER_REQUEST {
        return Err(AppError::Validation(format!(
            "Too many URLs: {} (max {})",
            urls.len(),
            validation::MAX_URLS_PER_REQUEST
        )));
    }

    for url in &urls {
        validate_url(url)?;
    }

    Ok(urls)
}

fn validate_url(raw: &str) -> AppResult<()> {
    if raw.len() > validation::MAX_URL_LENGTH {
        return Err(AppError::Validation(format!(
            "URL too long ({} bytes, max {})",
            raw.len(),
            validation::MAX_URL_LENGTH
        )));
    }

    let parsed = Url::parse(raw).map_err(|e| AppError::Validation(format!("Invalid URL {}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(AppError::Validation(format!("Unsupported URL: {}", raw))),
    }
}

/// Batch ids name directories under the download root, so only a safe alphabet is allowed.
pub fn is_valid_batch_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= batch::MAX_BATCH_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
