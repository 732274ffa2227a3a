// src/ingest/providers/mod.rs
pub mod api_json;
pub mod feed;

use chrono::{DateTime, Utc};
use metrics::counter;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::config::{CrawlerSettings, SourceDescriptor, SourceKind};
use crate::ingest::types::{Item, SourceProvider};

use self::api_json::ApiJsonProvider;
use self::feed::FeedProvider;

/// Build the provider for one configured source. Providers share one HTTP client.
pub fn build_provider(
    desc: &SourceDescriptor,
    client: reqwest::Client,
    settings: &CrawlerSettings,
) -> Box<dyn SourceProvider> {
    match &desc.kind {
        SourceKind::Api(params) => Box::new(ApiJsonProvider::from_url(
            &desc.name,
            &desc.endpoint,
            params.clone(),
            client,
            settings,
        )),
        SourceKind::Feed => Box::new(FeedProvider::from_url(
            &desc.name,
            &desc.endpoint,
            client,
            settings,
        )),
    }
}

/// Never-failing fetch: errors are logged and counted, and become an empty batch.
pub async fn fetch(provider: &dyn SourceProvider) -> Vec<Item> {
    match provider.fetch_latest().await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(target: "crawl", error = ?e, source = provider.name(), "provider error");
            counter!("crawl_source_errors_total", "source" => provider.name().to_string())
                .increment(1);
            Vec::new()
        }
    }
}

/// Decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut to `max` chars and append "..." when something was cut.
pub fn truncate_description(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

fn from_offset(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom, JSON APIs) timestamps.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    OffsetDateTime::parse(ts, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc2822))
        .ok()
        .and_then(from_offset)
        // obsolete zone names ("GMT", "EST") still common in feeds
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// First parseable candidate, else `now` (fetch time).
pub(crate) fn published_or(now: DateTime<Utc>, candidates: &[Option<&str>]) -> DateTime<Utc> {
    for raw in candidates.iter().flatten() {
        match parse_timestamp(raw) {
            Some(dt) => return dt,
            None => tracing::debug!(target: "crawl", raw = %raw, "unparseable timestamp"),
        }
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clean_text_strips_markup() {
        let s = "  <p>Hello,&nbsp;&nbsp;<b>world</b></p>\n\n ok ";
        assert_eq!(clean_text(s), "Hello, world ok");
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_description("abc", 3), "abc");
        assert_eq!(truncate_description("abcdef", 3), "abc...");
        assert_eq!(truncate_description("프론트엔드", 3), "프론트...");
    }

    #[test]
    fn timestamps_in_both_formats() {
        let want = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-05T12:30:00Z"), Some(want));
        assert_eq!(parse_timestamp("Tue, 05 Mar 2024 12:30:00 +0000"), Some(want));
        assert_eq!(parse_timestamp("Tue, 05 Mar 2024 21:30:00 +0900"), Some(want));
        assert_eq!(parse_timestamp("Tue, 05 Mar 2024 12:30:00 GMT"), Some(want));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn published_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(published_or(now, &[None, Some("garbage")]), now);
        assert_eq!(
            published_or(now, &[None, Some("2024-03-05T12:30:00Z")]),
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap()
        );
    }
}
