use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::artifact_store::{self, RawArtifact};
use crate::cli::FetchArgs;
use crate::config::CatalogConfig;
use crate::formats::RawItem;
use crate::youtube::YoutubeCatalog;

/// One catalog entry reduced to the fields the pipeline uses.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub published_at: String,
    pub title: String,
    pub description: String,
    pub video_id: String,
    pub unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<CatalogPage>;

    /// Resolves a channel handle to its uploads playlist id.
    async fn uploads_playlist(&self, handle: &str) -> anyhow::Result<String>;
}

pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let config = CatalogConfig::load(&PathBuf::from(&args.config))?;
    let out_path = PathBuf::from(&args.out);

    let source = YoutubeCatalog::from_env(&args.youtube.youtube_base_url)
        .context("initialize YouTube client")?;
    let items = gather_catalog(&source, &config).await?;

    artifact_store::write::<RawArtifact>(&out_path, &items).context("write raw items")?;
    tracing::info!(
        stage = "fetch",
        items = items.len(),
        out = %out_path.display(),
        "fetch complete"
    );
    Ok(())
}

/// Pages through one playlist until the source stops returning a cursor.
pub async fn fetch_container_items(
    source: &dyn CatalogSource,
    playlist_id: &str,
) -> anyhow::Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut seen_tokens = HashSet::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source
            .list_page(playlist_id, page_token.as_deref())
            .await
            .with_context(|| format!("list playlist {playlist_id} (page {})", pages + 1))?;
        pages += 1;

        for entry in page.entries {
            if seen_ids.insert(entry.video_id.clone()) {
                entries.push(entry);
            }
        }
        tracing::debug!(
            playlist_id,
            pages,
            items = entries.len(),
            "catalog page fetched"
        );

        match page.next_page_token {
            Some(token) if !token.is_empty() => {
                if !seen_tokens.insert(token.clone()) {
                    anyhow::bail!("playlist {playlist_id} repeated page token {token:?}");
                }
                page_token = Some(token);
            }
            _ => break,
        }
    }

    tracing::info!(playlist_id, pages, items = entries.len(), "playlist fetched");
    Ok(entries)
}

/// Fetches the channel uploads and every configured playlist, merging
/// entries by video id. The first source that lists a video wins.
pub async fn gather_catalog(
    source: &dyn CatalogSource,
    config: &CatalogConfig,
) -> anyhow::Result<Vec<RawItem>> {
    let mut items: Vec<RawItem> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |item: RawItem| {
        if seen.insert(item.video_id.clone()) {
            items.push(item);
        }
    };

    if let Some(handle) = config.channel_handle.as_deref() {
        let uploads = source
            .uploads_playlist(handle)
            .await
            .with_context(|| format!("resolve uploads playlist for {handle}"))?;
        tracing::info!(handle, playlist_id = %uploads, "resolved uploads playlist");
        for entry in fetch_container_items(source, &uploads).await? {
            let mut item = raw_item(entry);
            item.handle = Some(handle.to_owned());
            push(item);
        }
    }

    for playlist in &config.playlists {
        for entry in fetch_container_items(source, &playlist.id).await? {
            let mut item = raw_item(entry);
            item.playlist_id = Some(playlist.id.clone());
            if !playlist.name.is_empty() {
                item.playlist_name = Some(playlist.name.clone());
            }
            push(item);
        }
    }

    Ok(items)
}

fn raw_item(entry: CatalogEntry) -> RawItem {
    RawItem {
        published_at: entry.published_at,
        title: entry.title,
        description: entry.description,
        video_id: entry.video_id,
        playlist_id: None,
        playlist_name: None,
        handle: None,
        unavailable: entry.unavailable,
    }
}
