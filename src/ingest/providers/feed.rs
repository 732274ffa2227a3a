// src/ingest/providers/feed.rs
//! RSS 2.0 and Atom feeds. The root element decides which schema is used.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::config::CrawlerSettings;
use crate::ingest::providers::{clean_text, published_or, truncate_description};
use crate::ingest::types::{Item, SourceProvider};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    /// `content:encoded`; matched by local name.
    encoded: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
}

impl RssItem {
    /// `<description>`, or the full body when the description is missing or blank.
    fn body(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(self.encoded.as_deref())
            .unwrap_or_default()
    }
}

// Text content of an element whose attributes we don't care about.
#[derive(Debug, Deserialize, Default)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<Text>,
    content: Option<Text>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

impl AtomEntry {
    fn alternate_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.links.first())
            .map(|l| l.href.as_str())
    }
}

pub struct FeedProvider {
    name: String,
    max_description_len: usize,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        user_agent: String,
        timeout: Duration,
        client: reqwest::Client,
    },
}

impl FeedProvider {
    pub fn from_fixture(name: &str, xml: &str, max_description_len: usize) -> Self {
        Self {
            name: name.to_string(),
            max_description_len,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(
        name: &str,
        url: &str,
        client: reqwest::Client,
        settings: &CrawlerSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_description_len: settings.max_description_len,
            mode: Mode::Http {
                url: url.to_string(),
                user_agent: settings.user_agent.clone(),
                timeout: settings.request_timeout(),
                client,
            },
        }
    }

    fn item(&self, title: &str, url: &str, description: &str, tags: Vec<String>) -> Item {
        Item {
            title: clean_text(title),
            url: url.trim().to_string(),
            description: truncate_description(&clean_text(description), self.max_description_len),
            published_at: Utc::now(),
            tags,
            source: self.name.clone(),
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let now = Utc::now();

        let out: Vec<Item> = match root_element(&xml_clean).as_deref() {
            Some("rss") => {
                let rss: Rss = from_str(&xml_clean)
                    .with_context(|| format!("parsing {} rss xml", self.name))?;
                rss.channel
                    .item
                    .into_iter()
                    .map(|it| {
                        let tags = clean_tags(it.categories.iter().map(|c| c.value.clone()));
                        let mut item = self.item(
                            it.title.as_deref().unwrap_or_default(),
                            it.link.as_deref().unwrap_or_default(),
                            it.body(),
                            tags,
                        );
                        item.published_at = published_or(now, &[it.pub_date.as_deref()]);
                        item
                    })
                    .collect()
            }
            Some("feed") => {
                let feed: AtomFeed = from_str(&xml_clean)
                    .with_context(|| format!("parsing {} atom xml", self.name))?;
                feed.entries
                    .into_iter()
                    .map(|en| {
                        let body = en
                            .summary
                            .as_ref()
                            .or(en.content.as_ref())
                            .map(|t| t.value.as_str())
                            .unwrap_or_default();
                        let title = en.title.as_ref().map(|t| t.value.as_str()).unwrap_or_default();
                        let link = en.alternate_link().unwrap_or_default();
                        let tags = clean_tags(en.categories.iter().map(|c| c.term.clone()));
                        let mut item = self.item(title, link, body, tags);
                        item.published_at =
                            published_or(now, &[en.published.as_deref(), en.updated.as_deref()]);
                        item
                    })
                    .collect()
            }
            other => {
                return Err(anyhow!(
                    "{}: unrecognized feed root element {:?}",
                    self.name,
                    other
                ))
            }
        };

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("crawl_parse_ms").record(ms);
        counter!("crawl_items_fetched_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<Item>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http {
                url,
                user_agent,
                timeout,
                client,
            } => {
                tracing::info!(target: "crawl", source = %self.name, "feed fetch");
                let body = client
                    .get(url.as_str())
                    .header(USER_AGENT, user_agent.as_str())
                    .timeout(*timeout)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} non-2xx", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn clean_tags(raw: impl Iterator<Item = String>) -> Vec<String> {
    raw.map(|t| clean_text(&t)).filter(|t| !t.is_empty()).collect()
}

/// Local name of the first element, e.g. `rss` or `feed`.
fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

// HTML entities are not defined in XML and make the parser bail.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
