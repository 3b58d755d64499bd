use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::artifact_store::{self, RawArtifact, SupplementaryArtifact};
use crate::cli::{TranscriptEngine, TranscriptSourceArgs, TranscriptsArgs};
use crate::formats::{RawItem, SupplementaryEntry, SupplementaryMap, Transcript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFetch {
    Segments(Vec<String>),
    /// Transcripts are disabled or missing for the video.
    NotAvailable,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<TranscriptFetch>;
}

/// Records every transcript as unavailable without any network call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscripts;

#[async_trait]
impl TranscriptSource for NoTranscripts {
    async fn fetch(&self, _video_id: &str) -> anyhow::Result<TranscriptFetch> {
        Ok(TranscriptFetch::NotAvailable)
    }
}

/// Transcript service returning `[{"text": ...}, ...]` at `{base}/{videoId}`.
#[derive(Debug, Clone)]
pub struct HttpTranscriptSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    text: String,
}

impl HttpTranscriptSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build transcript http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<TranscriptFetch> {
        let endpoint = format!("{}/{video_id}", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .with_context(|| format!("GET {endpoint}"))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE
        ) {
            return Ok(TranscriptFetch::NotAvailable);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("transcript service error ({status}): {body}");
        }

        let segments: Vec<Segment> = response
            .json()
            .await
            .context("parse transcript response")?;
        Ok(TranscriptFetch::Segments(
            segments.into_iter().map(|s| s.text).collect(),
        ))
    }
}

pub fn source_from_args(args: &TranscriptSourceArgs) -> anyhow::Result<Arc<dyn TranscriptSource>> {
    match args.transcript_engine {
        TranscriptEngine::Off => Ok(Arc::new(NoTranscripts)),
        TranscriptEngine::Http => {
            let url = match args.transcript_url.clone() {
                Some(url) => url,
                None => std::env::var("TRANSCRIPT_API_URL").map_err(|_| {
                    anyhow::anyhow!(
                        "missing --transcript-url or TRANSCRIPT_API_URL (required when --transcript-engine=http)"
                    )
                })?,
            };
            Ok(Arc::new(HttpTranscriptSource::new(&url)?))
        }
    }
}

/// Joins transcript segments into one line of text that is safe to embed
/// in comma-delimited or line-oriented formats.
pub fn sanitize_transcript(segments: &[String]) -> String {
    let joined = segments.join(" ");
    let replaced = joined
        .chars()
        .map(|c| match c {
            ',' | '"' | '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .collect::<String>();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn transcript_from_fetch(result: anyhow::Result<TranscriptFetch>, video_id: &str) -> Transcript {
    match result {
        Ok(TranscriptFetch::Segments(segments)) => {
            let text = sanitize_transcript(&segments);
            if text.is_empty() {
                Transcript::Unavailable
            } else {
                Transcript::Available { text }
            }
        }
        Ok(TranscriptFetch::NotAvailable) => Transcript::Unavailable,
        Err(err) => {
            let message = format!("{err:#}");
            tracing::warn!(video_id, error = %message, "transcript fetch failed");
            Transcript::Error { message }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub fetched: usize,
    pub unavailable: usize,
    pub errors: usize,
}

/// Additive transcript/description cache keyed by video id.
pub struct SupplementaryCache {
    entries: SupplementaryMap,
    retry_unavailable: bool,
}

impl SupplementaryCache {
    pub fn new(entries: SupplementaryMap, retry_unavailable: bool) -> Self {
        Self {
            entries,
            retry_unavailable,
        }
    }

    pub fn entries(&self) -> &SupplementaryMap {
        &self.entries
    }

    pub fn into_entries(self) -> SupplementaryMap {
        self.entries
    }

    /// Whether the cached entry for `video_id` can be served as-is.
    pub fn is_fresh(&self, video_id: &str) -> bool {
        match self.entries.get(video_id).map(|e| &e.transcript) {
            Some(Transcript::Available { .. }) => true,
            Some(Transcript::Unavailable) => !self.retry_unavailable,
            Some(Transcript::Error { .. }) | None => false,
        }
    }

    /// Updates the cached description from the latest catalog and reports
    /// whether the cached transcript can be served.
    fn refresh(&mut self, item: &RawItem) -> bool {
        // Descriptions may change upstream even when the transcript is cached.
        if let Some(entry) = self.entries.get_mut(&item.video_id)
            && entry.description != item.description
        {
            entry.description = item.description.clone();
        }
        self.is_fresh(&item.video_id)
    }

    pub async fn get_or_fetch(
        &mut self,
        source: &dyn TranscriptSource,
        item: &RawItem,
    ) -> SupplementaryEntry {
        if self.refresh(item)
            && let Some(entry) = self.entries.get(&item.video_id)
        {
            return entry.clone();
        }
        let transcript = transcript_from_fetch(source.fetch(&item.video_id).await, &item.video_id);
        self.insert(item, transcript)
    }

    fn insert(&mut self, item: &RawItem, transcript: Transcript) -> SupplementaryEntry {
        let entry = SupplementaryEntry {
            description: item.description.clone(),
            transcript,
            fetched_at: chrono::Utc::now().to_rfc3339(),
        };
        self.entries.insert(item.video_id.clone(), entry.clone());
        entry
    }

    /// Fetches every stale entry with at most `concurrency` requests in
    /// flight. Results are merged by the calling task only.
    pub async fn fill(
        &mut self,
        source: Arc<dyn TranscriptSource>,
        items: &[RawItem],
        concurrency: usize,
    ) -> CacheStats {
        let mut stats = CacheStats::default();
        let mut pending = Vec::new();
        for item in items {
            if self.refresh(item) {
                stats.hits += 1;
            } else if !pending.iter().any(|p: &&RawItem| p.video_id == item.video_id) {
                pending.push(item);
            }
        }

        let total = pending.len();
        let concurrency = concurrency.max(1).min(total.max(1));
        let mut join_set = tokio::task::JoinSet::new();
        let mut next_idx = 0usize;
        let mut done = 0usize;
        let started_at = Instant::now();
        let mut last_progress_log_at = started_at;

        while next_idx < total || !join_set.is_empty() {
            while next_idx < total && join_set.len() < concurrency {
                let index = next_idx;
                let video_id = pending[index].video_id.clone();
                let source = Arc::clone(&source);
                join_set.spawn(async move {
                    let result = source.fetch(&video_id).await;
                    (index, result)
                });
                next_idx += 1;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::error!(error = %err, "transcript task panicked");
                    stats.errors += 1;
                    done += 1;
                    continue;
                }
            };

            let item = pending[index];
            let transcript = transcript_from_fetch(result, &item.video_id);
            match transcript {
                Transcript::Available { .. } => stats.fetched += 1,
                Transcript::Unavailable => stats.unavailable += 1,
                Transcript::Error { .. } => stats.errors += 1,
            }
            self.insert(item, transcript);

            done += 1;
            if done == total || last_progress_log_at.elapsed() >= Duration::from_secs(2) {
                tracing::info!(
                    stage = "transcripts",
                    done,
                    total,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "transcripts: progress"
                );
                last_progress_log_at = Instant::now();
            }
        }

        stats
    }
}

pub async fn run(args: TranscriptsArgs) -> anyhow::Result<()> {
    let items_path = PathBuf::from(&args.items);
    let cache_path = PathBuf::from(&args.cache);

    let items = artifact_store::read::<RawArtifact>(&items_path)?
        .ok_or_else(|| anyhow::anyhow!("raw items not found: {}", items_path.display()))?;
    let previous = artifact_store::read::<SupplementaryArtifact>(&cache_path)?.unwrap_or_default();

    let source = source_from_args(&args.source)?;
    let mut cache = SupplementaryCache::new(previous, args.source.retry_unavailable);
    let stats = cache
        .fill(source, &items, args.source.transcript_concurrency)
        .await;

    artifact_store::write::<SupplementaryArtifact>(&cache_path, cache.entries())
        .context("write supplementary cache")?;
    tracing::info!(
        stage = "transcripts",
        items = items.len(),
        cache_hits = stats.hits,
        fetched = stats.fetched,
        unavailable = stats.unavailable,
        errors = stats.errors,
        out = %cache_path.display(),
        "transcripts complete"
    );
    Ok(())
}
