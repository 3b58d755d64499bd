use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Context as _;

use crate::artifact_store::{self, GeocodedArtifact};
use crate::catalog::{CatalogSource, fetch_container_items};
use crate::cli::PublishArgs;
use crate::config::{CatalogConfig, PlaylistConfig};
use crate::formats::{GeocodeResult, GeocodedItem, PublishedRecord};
use crate::validate::{ValidationReport, validate};
use crate::youtube::YoutubeCatalog;

/// Maps video id to the short name of the first allow-listed playlist
/// (in configuration order) that contains it.
pub async fn fetch_membership(
    source: &dyn CatalogSource,
    playlists: &[PlaylistConfig],
) -> anyhow::Result<HashMap<String, String>> {
    let mut membership = HashMap::new();
    for playlist in playlists {
        let entries = fetch_container_items(source, &playlist.id)
            .await
            .with_context(|| format!("fetch membership of playlist {}", playlist.short))?;
        for entry in entries {
            membership
                .entry(entry.video_id)
                .or_insert_with(|| playlist.short.clone());
        }
    }
    Ok(membership)
}

/// Video ids flagged `marked` in a previously published artifact.
pub fn marked_ids(previous: &[serde_json::Value]) -> HashSet<String> {
    previous
        .iter()
        .filter(|value| value.get("marked").and_then(serde_json::Value::as_bool) == Some(true))
        .filter_map(|value| value.get("videoId").and_then(serde_json::Value::as_str))
        .map(str::to_owned)
        .collect()
}

/// Projects geocoded items onto the published schema. Items outside the
/// allow-list or missing a title, id or location are dropped; the first
/// record per video id wins.
pub fn reconcile(
    items: &[GeocodedItem],
    membership: &HashMap<String, String>,
    marked: &HashSet<String>,
) -> Vec<PublishedRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for geocoded in items {
        let item = &geocoded.located.item;
        let Some(playlist) = membership.get(&item.video_id) else {
            continue;
        };
        let geocode = geocoded.geocode.as_ref().and_then(GeocodeResult::lat_lng);
        let location = geocoded.located.location.display_text();

        if item.title.trim().is_empty()
            || item.video_id.trim().is_empty()
            || location.trim().is_empty()
        {
            tracing::warn!(video_id = %item.video_id, "record missing a required field; dropped");
            continue;
        }
        if !seen.insert(item.video_id.as_str()) {
            continue;
        }

        records.push(PublishedRecord {
            title: item.title.clone(),
            video_id: item.video_id.clone(),
            location: location.to_owned(),
            geocode,
            playlist: playlist.clone(),
            marked: marked.contains(&item.video_id),
        });
    }
    records
}

/// Reconciles and gates `items` through the schema validator. Only the
/// report's valid records are fit to publish.
pub async fn prepare(
    source: &dyn CatalogSource,
    config: &CatalogConfig,
    items: &[GeocodedItem],
    previous: &[serde_json::Value],
) -> anyhow::Result<ValidationReport> {
    let membership = fetch_membership(source, &config.playlists).await?;
    let records = reconcile(items, &membership, &marked_ids(previous));

    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .context("serialize published records")?;
    let report = validate(&values, &config.allow_list());
    for entry in &report.invalid {
        tracing::warn!(
            index = entry.index,
            problems = %entry.problems.join("; "),
            "record failed schema check; withheld"
        );
    }

    let unresolved = report.valid.iter().filter(|r| r.geocode.is_none()).count();
    tracing::info!(
        stage = "publish",
        items = items.len(),
        members = membership.len(),
        dropped = items.len() - records.len(),
        published = report.valid.len(),
        withheld = report.invalid.len(),
        unresolved,
        "reconciled"
    );
    Ok(report)
}

pub fn load_previous(path: &std::path::Path) -> anyhow::Result<Vec<serde_json::Value>> {
    match artifact_store::read_json::<serde_json::Value>(path)? {
        None => Ok(Vec::new()),
        Some(serde_json::Value::Array(values)) => Ok(values),
        Some(_) => anyhow::bail!(
            "previous published artifact is not a JSON array: {}",
            path.display()
        ),
    }
}

pub async fn run(args: PublishArgs) -> anyhow::Result<()> {
    let items_path = PathBuf::from(&args.items);
    let out_path = PathBuf::from(&args.out);
    let config = CatalogConfig::load(&PathBuf::from(&args.config))?;

    let items = artifact_store::read::<GeocodedArtifact>(&items_path)?
        .ok_or_else(|| anyhow::anyhow!("geocoded items not found: {}", items_path.display()))?;
    let previous = load_previous(&out_path).context("load previous published artifact")?;

    let source = YoutubeCatalog::from_env(&args.youtube.youtube_base_url)
        .context("initialize YouTube client")?;
    let report = prepare(&source, &config, &items, &previous).await?;

    artifact_store::write_json_atomic(&out_path, &report.valid)
        .context("write published artifact")?;
    if let Some(web_out) = args.web_out.as_deref() {
        let web_path = PathBuf::from(web_out);
        artifact_store::write_json_atomic(&web_path, &report.valid)
            .context("write web data copy")?;
        tracing::info!(path = %web_path.display(), "web data updated");
    }

    tracing::info!(
        stage = "publish",
        records = report.valid.len(),
        out = %out_path.display(),
        "publish complete"
    );
    Ok(())
}
