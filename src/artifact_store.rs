//! Versioned JSON artifacts shared between pipeline stages.
//!
//! Every working artifact is written inside an envelope naming its schema and
//! version. Files without an envelope are the un-versioned output of the
//! legacy pipeline (version 0) and are migrated on read.

use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::formats::{GeocodedItem, LocatedItem, NO_LOCATION_FOUND, RawItem, SupplementaryMap};

const LEGACY_TRANSCRIPT_UNAVAILABLE: &str = "not available";
const LEGACY_TRANSCRIPT_ERROR: &str = "error fetching";

pub trait Artifact {
    const KIND: &'static str;
    const VERSION: u32;
    type Records: Serialize + DeserializeOwned;

    /// Upgrade `records` written at `from_version` to the current shape.
    fn migrate(from_version: u32, records: Value) -> anyhow::Result<Value>;
}

pub struct RawArtifact;
pub struct SupplementaryArtifact;
pub struct LocatedArtifact;
pub struct GeocodedArtifact;

impl Artifact for RawArtifact {
    const KIND: &'static str = "raw_items";
    const VERSION: u32 = 1;
    type Records = Vec<RawItem>;

    fn migrate(_from_version: u32, records: Value) -> anyhow::Result<Value> {
        Ok(records)
    }
}

impl Artifact for SupplementaryArtifact {
    const KIND: &'static str = "supplementary";
    const VERSION: u32 = 1;
    type Records = SupplementaryMap;

    fn migrate(from_version: u32, mut records: Value) -> anyhow::Result<Value> {
        if from_version > 0 {
            return Ok(records);
        }
        let map = records
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("legacy supplementary cache must be a JSON object"))?;
        for entry in map.values_mut() {
            let Some(obj) = entry.as_object_mut() else {
                continue;
            };
            let transcript = obj.remove("transcript").unwrap_or(Value::Null);
            obj.insert("transcript".to_owned(), migrate_transcript(transcript));
            obj.entry("description")
                .or_insert_with(|| Value::String(String::new()));
            obj.entry("fetchedAt")
                .or_insert_with(|| Value::String(String::new()));
        }
        Ok(records)
    }
}

impl Artifact for LocatedArtifact {
    const KIND: &'static str = "located_items";
    const VERSION: u32 = 1;
    type Records = Vec<LocatedItem>;

    fn migrate(from_version: u32, records: Value) -> anyhow::Result<Value> {
        if from_version > 0 {
            return Ok(records);
        }
        migrate_legacy_records(records, |_| Ok(()))
    }
}

impl Artifact for GeocodedArtifact {
    const KIND: &'static str = "geocoded_items";
    const VERSION: u32 = 1;
    type Records = Vec<GeocodedItem>;

    fn migrate(from_version: u32, records: Value) -> anyhow::Result<Value> {
        if from_version > 0 {
            return Ok(records);
        }
        migrate_legacy_records(records, |obj| {
            let query = obj
                .get("location")
                .and_then(|loc| loc.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            // CSV-era files carry the response as an embedded JSON string.
            let raw = match obj.remove("geocode") {
                Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::Null),
                Some(value) => value,
                None => Value::Null,
            };
            let geocode = if raw.is_null() {
                Value::Null
            } else {
                serde_json::json!({ "query": query, "tier": "exact", "response": raw })
            };
            obj.insert("geocode".to_owned(), geocode);
            Ok(())
        })
    }
}

fn migrate_transcript(raw: Value) -> Value {
    match raw {
        Value::String(text) if text == LEGACY_TRANSCRIPT_UNAVAILABLE || text.is_empty() => {
            serde_json::json!({ "status": "unavailable" })
        }
        Value::String(text) if text == LEGACY_TRANSCRIPT_ERROR => {
            serde_json::json!({ "status": "error", "message": text })
        }
        Value::String(text) => serde_json::json!({ "status": "available", "text": text }),
        Value::Object(obj) if obj.contains_key("status") => Value::Object(obj),
        _ => serde_json::json!({ "status": "unavailable" }),
    }
}

/// Converts legacy records that carry `location` as a plain string.
/// Records without a usable location are dropped; stages re-derive them.
fn migrate_legacy_records(
    records: Value,
    mut extra: impl FnMut(&mut serde_json::Map<String, Value>) -> anyhow::Result<()>,
) -> anyhow::Result<Value> {
    let Value::Array(items) = records else {
        anyhow::bail!("legacy artifact must be a JSON array");
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut obj) = item else {
            tracing::warn!(index, "legacy record is not an object; skipping");
            continue;
        };
        let location = match obj.remove("location") {
            Some(Value::String(text)) if text.trim() == NO_LOCATION_FOUND => {
                serde_json::json!({ "status": "not_found", "reason": "unavailable" })
            }
            Some(Value::String(text)) if !text.trim().is_empty() => {
                serde_json::json!({ "status": "found", "text": text.trim() })
            }
            Some(Value::Object(loc)) if loc.contains_key("status") => Value::Object(loc),
            _ => {
                tracing::warn!(
                    index,
                    video_id = ?obj.get("videoId"),
                    "legacy record has no location; skipping"
                );
                continue;
            }
        };
        obj.insert("location".to_owned(), location);
        extra(&mut obj)?;
        out.push(Value::Object(obj));
    }
    Ok(Value::Array(out))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeOut<'a, T> {
    schema: &'a str,
    version: u32,
    generated_at: String,
    records: &'a T,
}

/// Reads an artifact, returning `None` when the file does not exist.
pub fn read<A: Artifact>(path: &Path) -> anyhow::Result<Option<A::Records>> {
    let Some(value) = read_json::<Value>(path)? else {
        return Ok(None);
    };
    let records = decode::<A>(value).with_context(|| format!("decode {}", path.display()))?;
    Ok(Some(records))
}

pub fn decode<A: Artifact>(value: Value) -> anyhow::Result<A::Records> {
    let (version, records) = match value {
        Value::Object(mut obj) if obj.contains_key("schema") => {
            let schema = obj
                .get("schema")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if schema != A::KIND {
                anyhow::bail!(
                    "artifact schema mismatch: expected {}, found {schema}",
                    A::KIND
                );
            }
            let version = obj
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow::anyhow!("artifact envelope is missing `version`"))?;
            let version = u32::try_from(version).context("artifact version out of range")?;
            let records = obj
                .remove("records")
                .ok_or_else(|| anyhow::anyhow!("artifact envelope is missing `records`"))?;
            (version, records)
        }
        legacy => (0, legacy),
    };

    if version > A::VERSION {
        anyhow::bail!(
            "{} artifact version {version} is newer than supported version {}",
            A::KIND,
            A::VERSION
        );
    }
    let records = if version < A::VERSION {
        tracing::info!(
            schema = A::KIND,
            from_version = version,
            to_version = A::VERSION,
            "migrating artifact"
        );
        A::migrate(version, records).with_context(|| format!("migrate {} artifact", A::KIND))?
    } else {
        records
    };

    serde_json::from_value(records).with_context(|| format!("parse {} records", A::KIND))
}

pub fn write<A: Artifact>(path: &Path, records: &A::Records) -> anyhow::Result<()> {
    let envelope = EnvelopeOut {
        schema: A::KIND,
        version: A::VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        records,
    };
    write_json_atomic(path, &envelope)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read: {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse json: {}", path.display()))?;
    Ok(Some(value))
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let mut data = serde_json::to_vec_pretty(value).context("serialize json")?;
    data.push(b'\n');
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
