//! Content sources.
//!
//! | Source | Kind | Fetches |
//! |--------|------|---------|
//! | [`RedditSource`] | social | a subreddit's public `hot.json` listing |
//! | [`FeedSource`] | blog | an RSS 2.0 feed |
//! | [`SampleSource`] | both | the bundled sample posts, no network |
//!
//! Every source applies the `days_back` window itself when the upstream
//! item carries a timestamp; undated items are kept.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use belly_buzz_core::models::{ContentItem, ContentMeta, SourceKind};
use belly_buzz_core::traits::ContentSource;
use belly_buzz_core::CollaboratorError;

use crate::config::{FeedConfig, SourcesConfig};
use crate::http;

/// Posts shorter than this (title plus body) carry too little to extract from.
const MIN_POST_CHARS: usize = 40;
const SOURCE_TIMEOUT_SECS: u64 = 20;

/// Oldest timestamp a post may carry. Windows reaching past the earliest
/// representable time start there instead.
fn window_start(days_back: u32) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(Duration::days(i64::from(days_back)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============ Reddit ============

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    created_utc: Option<f64>,
}

pub struct RedditSource {
    client: reqwest::Client,
    subreddit: String,
    label: String,
}

impl RedditSource {
    pub fn new(subreddit: &str, user_agent: &str) -> Result<Self> {
        let subreddit = subreddit.trim().trim_start_matches("r/").to_string();
        Ok(Self {
            client: http::client(SOURCE_TIMEOUT_SECS, user_agent)?,
            label: format!("r/{}", subreddit),
            subreddit,
        })
    }
}

fn posts_to_items(
    listing: Listing,
    label: &str,
    since: DateTime<Utc>,
    limit: usize,
) -> Vec<ContentItem> {
    listing
        .data
        .children
        .into_iter()
        .map(|c| c.data)
        .filter_map(|post| {
            let posted_at = post
                .created_utc
                .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single());
            if posted_at.is_some_and(|t| t < since) {
                return None;
            }

            let content = [post.title.trim(), post.selftext.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            if content.chars().count() < MIN_POST_CHARS {
                return None;
            }

            let mut item = ContentItem::new(content, SourceKind::Social);
            item.meta = ContentMeta {
                label: Some(label.to_string()),
                title: Some(post.title).filter(|t| !t.trim().is_empty()),
                url: Some(post.permalink)
                    .filter(|p| !p.is_empty())
                    .map(|p| format!("https://www.reddit.com{}", p)),
                author: post.author,
                score: Some(post.score),
                num_comments: Some(post.num_comments),
                posted_at,
            };
            Some(item)
        })
        .take(limit)
        .collect()
}

#[async_trait]
impl ContentSource for RedditSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn collect(
        &self,
        limit: usize,
        days_back: u32,
    ) -> Result<Vec<ContentItem>, CollaboratorError> {
        let url = format!(
            "https://www.reddit.com/r/{}/hot.json?limit={}&raw_json=1",
            self.subreddit,
            limit.clamp(1, 100)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::transport_error(e, SOURCE_TIMEOUT_SECS))?;
        if !response.status().is_success() {
            return Err(http::api_error(response).await);
        }
        let listing: Listing = response
            .json()
            .await
            .map_err(|e| http::transport_error(e, SOURCE_TIMEOUT_SECS))?;

        let items = posts_to_items(listing, &self.label, window_start(days_back), limit);
        debug!(source = %self.label, items = items.len(), "collected");
        Ok(items)
    }
}

// ============ RSS ============

#[derive(Debug, Default)]
struct FeedEntry {
    title: String,
    link: String,
    description: String,
    published: Option<DateTime<Utc>>,
}

pub struct FeedSource {
    client: reqwest::Client,
    feed: FeedConfig,
    tags: Regex,
}

impl FeedSource {
    pub fn new(feed: &FeedConfig, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http::client(SOURCE_TIMEOUT_SECS, user_agent)?,
            feed: feed.clone(),
            tags: Regex::new(r"<[^>]*>")?,
        })
    }

    fn entry_to_item(&self, entry: FeedEntry) -> ContentItem {
        let summary = self.tags.replace_all(&entry.description, " ");
        let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
        let content = format!("{}\n{}\n{}", entry.title.trim(), summary, entry.link.trim());

        let mut item = ContentItem::new(content, SourceKind::Blog);
        item.meta = ContentMeta {
            label: Some(self.feed.name.clone()),
            title: Some(entry.title.trim().to_string()).filter(|t| !t.is_empty()),
            url: Some(entry.link.trim().to_string()).filter(|l| !l.is_empty()),
            posted_at: entry.published,
            ..Default::default()
        };
        item
    }
}

fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Parse the `<item>` elements of an RSS 2.0 document.
fn parse_rss(xml: &str) -> Result<Vec<FeedEntry>, CollaboratorError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"item" {
                    current = Some(FeedEntry::default());
                } else if current.is_some() {
                    field = Some(name);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"item" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                push_field(current.as_mut(), field.as_deref(), &text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                push_field(current.as_mut(), field.as_deref(), &text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CollaboratorError::Parse(format!("bad feed XML: {}", e))),
            _ => {}
        }
    }

    Ok(entries)
}

fn push_field(entry: Option<&mut FeedEntry>, field: Option<&[u8]>, text: &str) {
    let (Some(entry), Some(field)) = (entry, field) else {
        return;
    };
    match field {
        b"title" => entry.title.push_str(text),
        b"link" => entry.link.push_str(text),
        b"description" => entry.description.push_str(text),
        b"pubDate" | b"date" => entry.published = parse_feed_date(text),
        _ => {}
    }
}

#[async_trait]
impl ContentSource for FeedSource {
    fn name(&self) -> &str {
        &self.feed.name
    }

    async fn collect(
        &self,
        limit: usize,
        days_back: u32,
    ) -> Result<Vec<ContentItem>, CollaboratorError> {
        let response = self
            .client
            .get(&self.feed.url)
            .send()
            .await
            .map_err(|e| http::transport_error(e, SOURCE_TIMEOUT_SECS))?;
        if !response.status().is_success() {
            return Err(http::api_error(response).await);
        }
        let body = response
            .text()
            .await
            .map_err(|e| http::transport_error(e, SOURCE_TIMEOUT_SECS))?;

        let since = window_start(days_back);
        let items: Vec<ContentItem> = parse_rss(&body)?
            .into_iter()
            .filter(|e| !e.published.is_some_and(|t| t < since))
            .map(|e| self.entry_to_item(e))
            .take(limit)
            .collect();
        debug!(source = %self.feed.name, items = items.len(), "collected");
        Ok(items)
    }
}

// ============ Samples ============

/// Bundled posts used by `--mock-data` and the empty-collection fallback.
pub fn sample_posts() -> Vec<ContentItem> {
    let post = |content: &str, source: SourceKind, label: &str, title: &str| {
        let mut item = ContentItem::new(content, source);
        item.meta.label = Some(label.to_string());
        item.meta.title = Some(title.to_string());
        item
    };
    vec![
        post(
            "Pai Northern Thai Kitchen just launched a khao soi special and the curry depth is unreal. \
             Lineups still wrap around Duncan but worth it.",
            SourceKind::Social,
            "mock:reddit",
            "Pai still slaps",
        ),
        post(
            "Seven Lives in Kensington is frying the crispiest Baja tacos and everyone on FoodToronto \
             won't shut up about it.",
            SourceKind::Social,
            "mock:reddit",
            "Seven Lives forever",
        ),
        post(
            "The Burger's Priest secret menu is back. Double-double with the Vatican-style bun might \
             be peak comfort food right now.",
            SourceKind::Blog,
            "mock:article",
            "Burger wars",
        ),
    ]
}

pub struct SampleSource;

#[async_trait]
impl ContentSource for SampleSource {
    fn name(&self) -> &str {
        "samples"
    }

    async fn collect(
        &self,
        limit: usize,
        _days_back: u32,
    ) -> Result<Vec<ContentItem>, CollaboratorError> {
        Ok(sample_posts().into_iter().take(limit).collect())
    }
}

/// Build one source per configured subreddit and feed.
pub fn create_sources(config: &SourcesConfig) -> Result<Vec<Box<dyn ContentSource>>> {
    let mut sources: Vec<Box<dyn ContentSource>> = Vec::new();
    for sub in &config.subreddits {
        sources.push(Box::new(RedditSource::new(sub, &config.user_agent)?));
    }
    for feed in &config.feeds {
        sources.push(Box::new(FeedSource::new(feed, &config.user_agent)?));
    }
    Ok(sources)
}
