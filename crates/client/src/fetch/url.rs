//! URL canonicalization for consistent cache keys.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string so equivalent requests share one cache key.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve `/`-rooted paths against `base` when one is given
/// 3. Default scheme to https:// if missing
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
/// 6. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str, base: Option<&url::Url>) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = match base {
        Some(base) if trimmed.starts_with('/') && !trimmed.starts_with("//") => {
            base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
        }
        _ => {
            let url_str =
                if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
            url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
        }
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}
