use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Context as _;

use crate::artifact_store::{self, LocatedArtifact, RawArtifact, SupplementaryArtifact};
use crate::cli::{LocateArgs, OracleArgs, OracleEngine};
use crate::formats::{
    LocatedItem, Location, NotFoundReason, RawItem, SupplementaryEntry, SupplementaryMap,
    Transcript,
};
use crate::openai::OpenAiClient;
use crate::oracle::{GuessRequest, HeuristicOracle, LocationOracle, OpenAiOracle};

/// Roughly the first few minutes of dialogue.
pub const TRANSCRIPT_EXCERPT_CHARS: usize = 3000;
pub const DESCRIPTION_EXCERPT_CHARS: usize = 1500;

const DEGENERATE_ANSWERS: &[&str] = &[
    "location",
    "unknown",
    "unclear",
    "various",
    "various locations",
    "n/a",
    "na",
    "none",
    "not sure",
    "no location found",
    "multiple locations",
];
const DEGENERATE_FRAGMENTS: &[&str] = &[
    "unclear",
    "various locations",
    "cannot determine",
    "can't determine",
    "not possible to determine",
    "i'm sorry",
];

/// Locations assigned so far in one run. Lookups ignore case and spacing.
#[derive(Debug, Clone, Default)]
pub struct UsedLocations {
    texts: Vec<String>,
    keys: HashSet<String>,
    occurrences: HashMap<String, usize>,
}

impl UsedLocations {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(text: &str) -> String {
        text.split(',')
            .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(",")
            .to_lowercase()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.keys.contains(&Self::key(text))
    }

    /// Records `text`; returns false when it was already present.
    pub fn insert(&mut self, text: &str) -> bool {
        let key = Self::key(text);
        if !self.keys.insert(key.clone()) {
            return false;
        }
        *self.occurrences.entry(key).or_insert(0) += 1;
        self.texts.push(text.to_owned());
        true
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Derives and records an unused variant of `base` by prefixing an
    /// ordinal component (`Site 2, base`). The ordinal is the occurrence
    /// index of `base` in this run, bumped past variants already taken.
    pub fn disambiguate(&mut self, base: &str) -> String {
        let base_key = Self::key(base);
        let mut ordinal = self.occurrences.get(&base_key).copied().unwrap_or(0) + 1;
        ordinal = ordinal.max(2);
        let mut candidate = format!("Site {ordinal}, {base}");
        while self.contains(&candidate) {
            ordinal += 1;
            candidate = format!("Site {ordinal}, {base}");
        }
        self.occurrences.insert(base_key, ordinal);
        self.insert(&candidate);
        candidate
    }
}

/// Reduces an oracle answer to a single well-formed location line.
pub fn clean_answer(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    let mut text = line;
    if text
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("location:"))
    {
        text = &text[9..];
    }
    let text = text
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '_'))
        .trim()
        .trim_end_matches('.');
    let text = strip_counter_suffix(text);

    text.split(',')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Removes a trailing `(n)` retry counter.
fn strip_counter_suffix(text: &str) -> &str {
    let trimmed = text.trim_end();
    let Some(inner) = trimmed.strip_suffix(')') else {
        return text;
    };
    let Some(open) = inner.rfind('(') else {
        return text;
    };
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return text;
    }
    inner[..open].trim_end()
}

pub fn is_degenerate(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return true;
    }
    DEGENERATE_ANSWERS.contains(&lower.as_str())
        || DEGENERATE_FRAGMENTS.iter().any(|f| lower.contains(f))
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Assigns one location to `item`, keeping every found location unique
/// within `used`.
pub async fn resolve_location(
    oracle: &dyn LocationOracle,
    item: &RawItem,
    supplementary: Option<&SupplementaryEntry>,
    used: &mut UsedLocations,
    attempts: usize,
) -> Location {
    if item.unavailable {
        return Location::NotFound {
            reason: NotFoundReason::Unavailable,
        };
    }
    let transcript = supplementary.map(|entry| &entry.transcript);
    if matches!(transcript, Some(Transcript::Error { .. })) {
        return Location::NotFound {
            reason: NotFoundReason::TranscriptError,
        };
    }

    let description = supplementary
        .map(|entry| entry.description.as_str())
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(&item.description);
    let description = truncate_chars(description, DESCRIPTION_EXCERPT_CHARS);
    let transcript = transcript
        .and_then(Transcript::text)
        .map(|t| truncate_chars(t, TRANSCRIPT_EXCERPT_CHARS));

    let attempts = if oracle.is_deterministic() {
        1
    } else {
        attempts.max(1)
    };
    let mut duplicate: Option<String> = None;

    for attempt in 1..=attempts {
        let answer = {
            let request = GuessRequest {
                title: &item.title,
                description,
                transcript,
                used: used.texts(),
            };
            oracle.guess(&request).await
        };

        let answer = match answer {
            Ok(raw) => clean_answer(&raw),
            Err(err) => {
                let message = format!("{err:#}");
                tracing::warn!(
                    video_id = %item.video_id,
                    attempt,
                    attempts,
                    error = %message,
                    "oracle request failed"
                );
                continue;
            }
        };

        if is_degenerate(&answer) {
            tracing::warn!(
                video_id = %item.video_id,
                attempt,
                answer = %answer,
                "oracle answer is not a usable location; retrying"
            );
            continue;
        }
        if used.contains(&answer) {
            tracing::info!(
                video_id = %item.video_id,
                attempt,
                answer = %answer,
                "oracle answer already used; retrying"
            );
            duplicate = Some(answer);
            continue;
        }

        used.insert(&answer);
        return Location::found(answer);
    }

    let base = match duplicate {
        Some(answer) => answer,
        None => {
            let title = clean_answer(&item.title);
            if title.is_empty() {
                item.video_id.clone()
            } else {
                title
            }
        }
    };
    if used.insert(&base) {
        tracing::warn!(
            video_id = %item.video_id,
            location = %base,
            "no usable oracle answer; falling back to title"
        );
        return Location::found(base);
    }

    let text = used.disambiguate(&base);
    tracing::warn!(
        video_id = %item.video_id,
        base = %base,
        location = %text,
        "location still duplicated after retries; disambiguated"
    );
    Location::found(text)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocateStats {
    pub reused: usize,
    pub resolved: usize,
    pub not_found: usize,
}

/// Resolves every item in order. Earlier found locations for the same video
/// id are reused and reserved before any new item is resolved.
pub async fn locate_items(
    oracle: &dyn LocationOracle,
    items: &[RawItem],
    supplementary: &SupplementaryMap,
    previous: &[LocatedItem],
    attempts: usize,
) -> (Vec<LocatedItem>, LocateStats) {
    let mut stats = LocateStats::default();
    let mut used = UsedLocations::new();

    let previous_by_id = previous
        .iter()
        .filter_map(|p| match &p.location {
            Location::Found { text } if !text.trim().is_empty() => {
                Some((p.item.video_id.as_str(), text.as_str()))
            }
            _ => None,
        })
        .collect::<HashMap<_, _>>();

    let mut reused = HashMap::new();
    for item in items {
        let Some(text) = previous_by_id.get(item.video_id.as_str()) else {
            continue;
        };
        let text = if used.insert(text) {
            (*text).to_owned()
        } else {
            let variant = used.disambiguate(text);
            tracing::warn!(
                video_id = %item.video_id,
                location = %text,
                reassigned = %variant,
                "reused location collides with another reused location"
            );
            variant
        };
        reused.insert(item.video_id.as_str(), text);
    }

    let mut located = Vec::with_capacity(items.len());
    for item in items {
        let location = match reused.get(item.video_id.as_str()) {
            Some(text) => {
                stats.reused += 1;
                Location::found(text.as_str())
            }
            None => {
                let location = resolve_location(
                    oracle,
                    item,
                    supplementary.get(&item.video_id),
                    &mut used,
                    attempts,
                )
                .await;
                match &location {
                    Location::Found { text } => {
                        stats.resolved += 1;
                        tracing::info!(video_id = %item.video_id, location = %text, "located");
                    }
                    Location::NotFound { reason } => {
                        stats.not_found += 1;
                        tracing::info!(video_id = %item.video_id, ?reason, "no location");
                    }
                }
                location
            }
        };
        located.push(LocatedItem {
            item: item.clone(),
            location,
        });
    }

    (located, stats)
}

pub fn oracle_from_args(args: &OracleArgs) -> anyhow::Result<Box<dyn LocationOracle>> {
    match args.engine {
        OracleEngine::Heuristic => Ok(Box::new(HeuristicOracle)),
        OracleEngine::Openai => {
            let client = OpenAiClient::from_args(args).context("initialize OpenAI client")?;
            Ok(Box::new(OpenAiOracle::new(client)))
        }
    }
}

pub async fn run(args: LocateArgs) -> anyhow::Result<()> {
    let items_path = PathBuf::from(&args.items);
    let supplementary_path = PathBuf::from(&args.supplementary);
    let out_path = PathBuf::from(&args.out);

    let items = artifact_store::read::<RawArtifact>(&items_path)?
        .ok_or_else(|| anyhow::anyhow!("raw items not found: {}", items_path.display()))?;
    let supplementary = match artifact_store::read::<SupplementaryArtifact>(&supplementary_path)? {
        Some(map) => map,
        None => {
            tracing::warn!(
                path = %supplementary_path.display(),
                "supplementary cache not found; using titles and descriptions only"
            );
            SupplementaryMap::new()
        }
    };
    let previous = artifact_store::read::<LocatedArtifact>(&out_path)?.unwrap_or_default();

    let oracle = oracle_from_args(&args.oracle)?;
    tracing::info!(
        stage = "locate",
        engine = ?args.oracle.engine,
        items = items.len(),
        previous = previous.len(),
        "locate"
    );

    let (located, stats) = locate_items(
        oracle.as_ref(),
        &items,
        &supplementary,
        &previous,
        args.oracle.attempts,
    )
    .await;

    artifact_store::write::<LocatedArtifact>(&out_path, &located)
        .context("write located items")?;
    tracing::info!(
        stage = "locate",
        reused = stats.reused,
        resolved = stats.resolved,
        not_found = stats.not_found,
        out = %out_path.display(),
        "locate complete"
    );
    Ok(())
}
