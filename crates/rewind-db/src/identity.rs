//! Dedup & identity resolver (C8, §4.8).

use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use url::Url;

use rewind_models::{Revision, Video, VideoId};

use crate::error::DbResult;

/// Hosts known to be shortlink redirectors, used by [`PatternUrlExpander`].
const KNOWN_SHORTLINK_HOSTS: &[(&str, &str)] = &[("youtu.be", "www.example-video.test")];

/// Query parameters stripped during per-host canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "feature",
    "si",
    "ref",
];

/// The redirect-following expansion pass is a trait seam: the dependency
/// stack carries no general-purpose HTTP client, so the shipped implementation
/// is pattern-based, but a real HTTP-following expander can be swapped in
/// later without touching the resolver below it.
pub trait UrlExpander: Send + Sync {
    /// Best-effort expansion. `None` means "leave the input as-is" — this
    /// pass may fail gracefully per §4.8.
    fn expand(&self, raw: &str) -> Option<String>;
}

/// Rewrites a handful of known shortlink hosts to their canonical host.
/// Never follows an actual redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternUrlExpander;

impl UrlExpander for PatternUrlExpander {
    fn expand(&self, raw: &str) -> Option<String> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?;
        let (_, canonical_host) = KNOWN_SHORTLINK_HOSTS.iter().find(|(h, _)| *h == host)?;
        let mut expanded = parsed.clone();
        expanded.set_host(Some(canonical_host)).ok()?;
        Some(expanded.to_string())
    }
}

/// Per-host canonicalization: strips tracking params and normalizes the
/// path. Fails gracefully (returns the input) if the URL doesn't parse.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &retained {
            serializer.append_pair(k, v);
        }
        parsed.set_query(Some(&serializer.finish()));
    }

    let path = parsed.path().trim_end_matches('/').to_string();
    if !path.is_empty() {
        parsed.set_path(&path);
    }

    parsed.to_string()
}

/// Candidate URL set tried, in order, against the `src` column (§4.8).
pub fn candidate_urls(expander: &dyn UrlExpander, raw_input: &str, info: &Value) -> Vec<String> {
    let mut candidates = vec![raw_input.to_string()];

    if let Some(expanded) = expander.expand(raw_input) {
        candidates.push(expanded);
    }

    if let Some(webpage_url) = info.get("webpage_url").and_then(Value::as_str) {
        candidates.push(webpage_url.to_string());
    }
    if let Some(original_url) = info.get("original_url").and_then(Value::as_str) {
        candidates.push(original_url.to_string());
    }

    let normalized: Vec<String> = candidates.iter().map(|c| canonicalize_url(c)).collect();
    candidates.extend(normalized);
    candidates
}

#[derive(Debug, FromRow)]
struct VideoIdRow {
    id: uuid::Uuid,
}

/// First candidate URL with a matching `src` row identifies the existing
/// video; `None` means it's new.
pub async fn resolve_existing(pool: &PgPool, candidates: &[String]) -> DbResult<Option<VideoId>> {
    for candidate in candidates {
        let row = sqlx::query_as::<_, VideoIdRow>("SELECT id FROM videos WHERE src = $1")
            .bind(candidate)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            debug!(src = %candidate, "resolved existing video by src");
            return Ok(Some(VideoId::from_uuid(row.id)));
        }
    }
    Ok(None)
}

/// Canonical host for a URL, used to derive deterministic ids.
pub fn canonical_domain(raw: &str) -> Option<String> {
    Url::parse(raw).ok()?.host_str().map(str::to_string)
}

/// Assign an id per §4.8: existing video keeps its id; a new video with a
/// known domain+extractor id gets a deterministic UUIDv5; otherwise random.
pub fn assign_id(
    existing: Option<VideoId>,
    canonical_domain: Option<&str>,
    extractor_id: Option<&str>,
) -> VideoId {
    if let Some(id) = existing {
        return id;
    }
    match (canonical_domain, extractor_id) {
        (Some(domain), Some(extractor_id)) => VideoId::deterministic(domain, extractor_id),
        _ => VideoId::new(),
    }
}

/// Append a revision record if `refresh` is set and the title/description
/// changed between the prior and new info blobs (§4.8).
pub fn maybe_append_revision(video: &mut Video, refresh: bool, new_info: &Value) {
    if !refresh {
        return;
    }

    let title_changed = new_info.get("title").and_then(Value::as_str) != Some(video.title.as_str());
    let description_changed =
        new_info.get("description").and_then(Value::as_str) != Some(video.description.as_str());

    if !title_changed && !description_changed {
        return;
    }

    let diff = serde_json::json!({
        "previous": { "title": video.title, "description": video.description },
        "incoming": {
            "title": new_info.get("title"),
            "description": new_info.get("description"),
        },
    })
    .to_string();

    video.revisions.push(Revision {
        recorded_at: chrono::Utc::now(),
        diff,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_tracking_params_and_trailing_slash() {
        let canon = canonicalize_url("https://example.test/v/abc123/?utm_source=x&ref=y&lang=en");
        assert_eq!(canon, "https://example.test/v/abc123?lang=en");
    }

    #[test]
    fn canonicalize_drops_query_entirely_when_all_tracking() {
        let canon = canonicalize_url("https://example.test/v/abc123?utm_source=x");
        assert_eq!(canon, "https://example.test/v/abc123");
    }

    #[test]
    fn canonicalize_leaves_unparseable_urls_untouched() {
        assert_eq!(canonicalize_url("not a url"), "not a url");
    }

    #[test]
    fn expand_url_rewrites_known_shortlink_hosts() {
        let expanded = PatternUrlExpander.expand("https://youtu.be/abc123").unwrap();
        assert!(expanded.contains("www.example-video.test"));
    }

    #[test]
    fn expand_url_returns_none_for_unknown_hosts() {
        assert!(PatternUrlExpander
            .expand("https://example.test/v/abc123")
            .is_none());
    }

    #[test]
    fn assign_id_prefers_existing_then_deterministic_then_random() {
        let existing = VideoId::new();
        assert_eq!(assign_id(Some(existing), Some("example.test"), Some("abc")), existing);

        let deterministic_a = assign_id(None, Some("example.test"), Some("abc"));
        let deterministic_b = assign_id(None, Some("example.test"), Some("abc"));
        assert_eq!(deterministic_a, deterministic_b);

        let random_a = assign_id(None, None, None);
        let random_b = assign_id(None, None, None);
        assert_ne!(random_a, random_b);
    }

    #[test]
    fn candidate_urls_includes_info_json_urls_and_normalized_forms() {
        let info = serde_json::json!({
            "webpage_url": "https://example.test/v/abc123?utm_source=x",
            "original_url": "https://example.test/v/abc123",
        });
        let candidates =
            candidate_urls(&PatternUrlExpander, "https://example.test/v/abc123?utm_source=x", &info);
        assert!(candidates.contains(&"https://example.test/v/abc123".to_string()));
    }
}
