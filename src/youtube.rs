use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::catalog::{CatalogEntry, CatalogPage, CatalogSource};

const PAGE_SIZE: &str = "50";
const UNAVAILABLE_TITLES: &[&str] = &["Private video", "Deleted video"];
const UNAVAILABLE_PRIVACY: &[&str] = &["private", "privacyStatusUnspecified"];

/// YouTube Data API v3 client.
#[derive(Debug, Clone)]
pub struct YoutubeCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YoutubeCatalog {
    pub fn new(base_url: &str, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build YouTube http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    pub fn from_env(base_url: &str) -> anyhow::Result<Self> {
        let api_key = std::env::var("YOUTUBE_API_KEY")
            .map_err(|_| anyhow::anyhow!("YOUTUBE_API_KEY is not set"))?;
        if api_key.trim().is_empty() {
            anyhow::bail!("YOUTUBE_API_KEY is empty");
        }
        Self::new(base_url, api_key)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let mut url = Url::parse(&format!("{}/{resource}", self.base_url))
            .with_context(|| format!("parse YouTube url for {resource}"))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {resource}"))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("read YouTube response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("YouTube API error ({status}) on {resource}: {message}");
        }

        serde_json::from_str(&raw).with_context(|| format!("parse YouTube {resource} response"))
    }
}

#[async_trait]
impl CatalogSource for YoutubeCatalog {
    async fn list_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<CatalogPage> {
        let mut params = vec![
            ("part", "snippet,status,contentDetails"),
            ("maxResults", PAGE_SIZE),
            ("playlistId", playlist_id),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: PlaylistItemsResponse = self.get_json("playlistItems", &params).await?;
        let entries = response
            .items
            .into_iter()
            .filter_map(|item| {
                let entry = item.into_entry();
                if entry.is_none() {
                    tracing::warn!(playlist_id, "playlist item without video id; skipping");
                }
                entry
            })
            .collect();

        Ok(CatalogPage {
            entries,
            next_page_token: response.next_page_token,
        })
    }

    async fn uploads_playlist(&self, handle: &str) -> anyhow::Result<String> {
        let response: ChannelsResponse = self
            .get_json(
                "channels",
                &[("part", "contentDetails"), ("forHandle", handle)],
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .and_then(|channel| channel.content_details)
            .and_then(|details| details.related_playlists.uploads)
            .ok_or_else(|| anyhow::anyhow!("channel {handle} has no uploads playlist"))
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Option<Snippet>,
    status: Option<ItemStatus>,
    content_details: Option<ItemContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemStatus {
    privacy_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemContentDetails {
    video_id: Option<String>,
}

impl PlaylistItem {
    fn into_entry(self) -> Option<CatalogEntry> {
        let snippet = self.snippet?;
        let video_id = snippet
            .resource_id
            .and_then(|r| r.video_id)
            .or_else(|| self.content_details.and_then(|d| d.video_id))
            .filter(|id| !id.trim().is_empty())?;

        let private = self
            .status
            .and_then(|s| s.privacy_status)
            .is_some_and(|status| UNAVAILABLE_PRIVACY.contains(&status.as_str()));
        let unavailable = private || UNAVAILABLE_TITLES.contains(&snippet.title.as_str());

        Some(CatalogEntry {
            published_at: snippet.published_at,
            title: snippet.title,
            description: snippet.description,
            video_id,
            unavailable,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Channel {
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_item_normalizes_snippet() -> anyhow::Result<()> {
        let item: PlaylistItem = serde_json::from_value(serde_json::json!({
            "snippet": {
                "publishedAt": "2024-03-01T10:00:00Z",
                "title": "We Raced Across Japan",
                "description": "Three teams...",
                "thumbnails": {},
                "resourceId": { "kind": "youtube#video", "videoId": "vid123" }
            },
            "status": { "privacyStatus": "public" }
        }))?;
        let entry = item.into_entry().expect("entry");
        assert_eq!(entry.video_id, "vid123");
        assert_eq!(entry.title, "We Raced Across Japan");
        assert!(!entry.unavailable);
        Ok(())
    }

    #[test]
    fn private_items_are_flagged() -> anyhow::Result<()> {
        let item: PlaylistItem = serde_json::from_value(serde_json::json!({
            "snippet": {
                "title": "Private video",
                "description": "This video is private.",
                "resourceId": { "videoId": "hidden" }
            },
            "status": { "privacyStatus": "private" }
        }))?;
        assert!(item.into_entry().expect("entry").unavailable);
        Ok(())
    }

    #[test]
    fn content_details_supply_missing_resource_id() -> anyhow::Result<()> {
        let item: PlaylistItem = serde_json::from_value(serde_json::json!({
            "snippet": { "title": "Lost resource", "resourceId": { "kind": "youtube#video" } },
            "contentDetails": { "videoId": "from-details" }
        }))?;
        assert_eq!(item.into_entry().expect("entry").video_id, "from-details");
        Ok(())
    }

    #[test]
    fn items_without_video_id_are_skipped() -> anyhow::Result<()> {
        let item: PlaylistItem =
            serde_json::from_value(serde_json::json!({ "snippet": { "title": "x" } }))?;
        assert!(item.into_entry().is_none());
        Ok(())
    }

    #[test]
    fn error_message_is_extracted() {
        let raw = r#"{"error":{"code":403,"message":"API key not valid"}}"#;
        assert_eq!(parse_error_message(raw).as_deref(), Some("API key not valid"));
    }
}
