use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use unicode_normalization::UnicodeNormalization as _;

use crate::artifact_store::{self, GeocodedArtifact, LocatedArtifact};
use crate::cli::GeocodeArgs;
use crate::formats::{GeocodeResult, GeocodedItem, LocatedItem, Location, SourceTier};
use crate::nominatim::{GeocodingService, NominatimClient};

/// Previous results keyed by video id.
pub type GeocodeCache = HashMap<String, GeocodeResult>;

/// Combining marks used as Latin-script accents. Marks in other blocks,
/// such as kana voicing marks, are significant and kept.
fn is_diacritical_mark(c: char) -> bool {
    matches!(
        c,
        '\u{0300}'..='\u{036F}'
            | '\u{1AB0}'..='\u{1AFF}'
            | '\u{1DC0}'..='\u{1DFF}'
            | '\u{20D0}'..='\u{20FF}'
            | '\u{FE20}'..='\u{FE2F}'
    )
}

/// Letters with no canonical decomposition into a base letter plus marks.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'æ' => "ae",
        'Æ' => "AE",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ħ' => "h",
        'Ħ' => "H",
        'ı' => "i",
        'ŀ' | 'ł' => "l",
        'Ŀ' | 'Ł' => "L",
        'ø' => "o",
        'Ø' => "O",
        'œ' => "oe",
        'Œ' => "OE",
        'ß' => "ss",
        'ŧ' => "t",
        'Ŧ' => "T",
        'þ' => "th",
        'Þ' => "Th",
        '’' | '‘' => "'",
        '–' | '—' => "-",
        _ => return None,
    };
    Some(folded)
}

/// Folds diacritics, removes parenthetical asides and punctuation noise,
/// and rejoins the non-empty comma-separated components.
pub fn normalize_location(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut depth = 0usize;
    let stripped = text
        .nfd()
        .filter(|c| !is_diacritical_mark(*c))
        .nfc()
        .collect::<String>();
    for c in stripped.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ => match fold_char(c) {
                Some(folded) => cleaned.push_str(folded),
                None if c.is_alphanumeric() || matches!(c, ',' | '-' | '\'' | '.') => {
                    cleaned.push(c)
                }
                None => cleaned.push(' '),
            },
        }
    }

    cleaned
        .split(',')
        .map(|part| {
            part.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_matches(|c: char| matches!(c, '-' | '.' | '\''))
                .to_owned()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Queries to try in order, most specific first. Each query is distinct.
pub fn relaxation_queries(text: &str) -> Vec<(SourceTier, String)> {
    let mut queries = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |tier: SourceTier, query: String| {
        if !query.trim().is_empty() && seen.insert(query.to_lowercase()) {
            queries.push((tier, query));
        }
    };

    push(SourceTier::Exact, text.trim().to_owned());

    let normalized = normalize_location(text);
    let components = normalized.split(", ").collect::<Vec<_>>();
    for dropped in 0..components.len() {
        push(SourceTier::Relaxed(dropped), components[dropped..].join(", "));
    }
    queries
}

fn cached_valid<'a>(cache: &'a GeocodeCache, video_id: &str) -> Option<&'a GeocodeResult> {
    cache.get(video_id).filter(|result| result.is_valid())
}

/// Resolves one location, reusing a valid cached result for `video_id`.
/// Every failure mode ends in `None`.
pub async fn geocode(
    service: &dyn GeocodingService,
    location: &Location,
    video_id: &str,
    cache: &GeocodeCache,
) -> Option<GeocodeResult> {
    let Location::Found { text } = location else {
        return None;
    };
    if let Some(cached) = cached_valid(cache, video_id) {
        return Some(cached.clone());
    }

    for (tier, query) in relaxation_queries(text) {
        match service.search(&query).await {
            Ok(response) => {
                let result = GeocodeResult {
                    query,
                    tier,
                    response,
                };
                if result.is_valid() {
                    tracing::debug!(video_id, tier = ?result.tier, query = %result.query, "geocoded");
                    return Some(result);
                }
                tracing::debug!(video_id, ?tier, query = %result.query, "no results at tier");
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(
                    video_id,
                    ?tier,
                    query = %query,
                    error = %message,
                    "geocoder request failed; trying next tier"
                );
            }
        }
    }
    None
}

/// Builds the cache from an earlier geocoded artifact. Entries whose
/// location text no longer matches the current item are left out.
pub fn cache_from_previous(previous: Vec<GeocodedItem>, items: &[LocatedItem]) -> GeocodeCache {
    let current = items
        .iter()
        .map(|item| (item.item.video_id.as_str(), &item.location))
        .collect::<HashMap<_, _>>();

    previous
        .into_iter()
        .filter_map(|prev| {
            let geocode = prev.geocode?;
            let video_id = prev.located.item.video_id;
            match current.get(video_id.as_str()) {
                Some(location) if **location == prev.located.location => Some((video_id, geocode)),
                Some(_) => {
                    tracing::debug!(video_id = %video_id, "location changed; cached geocode dropped");
                    None
                }
                None => None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeStats {
    pub cache_hits: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub skipped: usize,
}

/// Geocodes every item with at most `concurrency` items in flight and
/// returns them in input order.
pub async fn geocode_items(
    service: Arc<dyn GeocodingService>,
    items: Vec<LocatedItem>,
    cache: GeocodeCache,
    concurrency: usize,
) -> (Vec<GeocodedItem>, GeocodeStats) {
    let mut stats = GeocodeStats::default();
    let mut results: Vec<Option<GeocodeResult>> = vec![None; items.len()];
    let mut pending = Vec::new();

    for (index, item) in items.iter().enumerate() {
        if !item.location.is_found() {
            stats.skipped += 1;
        } else if let Some(cached) = cached_valid(&cache, &item.item.video_id) {
            stats.cache_hits += 1;
            results[index] = Some(cached.clone());
        } else {
            pending.push(index);
        }
    }

    let cache = Arc::new(cache);
    let total = pending.len();
    let concurrency = concurrency.max(1).min(total.max(1));
    let mut join_set = tokio::task::JoinSet::new();
    let mut next_idx = 0usize;
    let mut done = 0usize;
    let started_at = Instant::now();
    let mut last_progress_log_at = started_at;

    while next_idx < total || !join_set.is_empty() {
        while next_idx < total && join_set.len() < concurrency {
            let index = pending[next_idx];
            let location = items[index].location.clone();
            let video_id = items[index].item.video_id.clone();
            let service = Arc::clone(&service);
            let cache = Arc::clone(&cache);
            join_set.spawn(async move {
                let result = geocode(service.as_ref(), &location, &video_id, &cache).await;
                (index, result)
            });
            next_idx += 1;
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        done += 1;
        match joined {
            Ok((index, Some(result))) => {
                stats.resolved += 1;
                results[index] = Some(result);
            }
            Ok((index, None)) => {
                stats.unresolved += 1;
                tracing::warn!(
                    video_id = %items[index].item.video_id,
                    location = %items[index].location.display_text(),
                    "no coordinates at any tier"
                );
            }
            Err(err) => {
                stats.unresolved += 1;
                tracing::error!(error = %err, "geocode task panicked");
            }
        }

        if done == total || last_progress_log_at.elapsed() >= Duration::from_secs(2) {
            tracing::info!(
                stage = "geocode",
                done,
                total,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "geocode: progress"
            );
            last_progress_log_at = Instant::now();
        }
    }

    let geocoded = items
        .into_iter()
        .zip(results)
        .map(|(located, geocode)| GeocodedItem { located, geocode })
        .collect();
    (geocoded, stats)
}

pub async fn run(args: GeocodeArgs) -> anyhow::Result<()> {
    let items_path = PathBuf::from(&args.items);
    let out_path = PathBuf::from(&args.out);

    let items = artifact_store::read::<LocatedArtifact>(&items_path)?
        .ok_or_else(|| anyhow::anyhow!("located items not found: {}", items_path.display()))?;
    let previous = artifact_store::read::<GeocodedArtifact>(&out_path)?.unwrap_or_default();
    let cache = cache_from_previous(previous, &items);

    let service: Arc<dyn GeocodingService> =
        Arc::new(NominatimClient::from_args(&args.geocoder).context("initialize geocoder")?);
    tracing::info!(
        stage = "geocode",
        items = items.len(),
        cached = cache.len(),
        "geocode"
    );

    let (geocoded, stats) =
        geocode_items(service, items, cache, args.geocoder.geocode_concurrency).await;

    artifact_store::write::<GeocodedArtifact>(&out_path, &geocoded)
        .context("write geocoded items")?;
    tracing::info!(
        stage = "geocode",
        cache_hits = stats.cache_hits,
        resolved = stats.resolved,
        unresolved = stats.unresolved,
        skipped = stats.skipped,
        out = %out_path.display(),
        "geocode complete"
    );
    Ok(())
}
