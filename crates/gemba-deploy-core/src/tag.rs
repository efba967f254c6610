use chrono::{DateTime, Utc};

/// `chrono` format of the fallback tag: UTC, second granularity.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Pick the image tag for this run.
///
/// An explicitly supplied tag wins, then the short source revision,
/// then a timestamp.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gemba_deploy_core::tag::derive_image_tag;
///
/// let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
/// assert_eq!(derive_image_tag(None, Some("abc123"), now), "abc123");
/// assert_eq!(derive_image_tag(None, None, now), "20260301123005");
/// ```
pub fn derive_image_tag(
    supplied: Option<&str>,
    revision: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    supplied
        .or(revision)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| now.format(TIMESTAMP_FORMAT).to_string())
}

/// Fully-qualified image reference: `<login server>/<name>:<tag>`.
pub fn image_reference(login_server: &str, image_name: &str, image_tag: &str) -> String {
    format!("{login_server}/{image_name}:{image_tag}")
}
