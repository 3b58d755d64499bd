use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::artifact_store;
use crate::cli::ValidateArgs;
use crate::config::CatalogConfig;
use crate::formats::PublishedRecord;

const PUBLIC_FIELDS: &[&str] = &["title", "videoId", "location", "geocode", "playlist", "marked"];

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidEntry {
    pub index: usize,
    pub value: serde_json::Value,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: Vec<PublishedRecord>,
    pub invalid: Vec<InvalidEntry>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{} valid, {} invalid\n",
            self.valid.len(),
            self.invalid.len()
        );
        for entry in &self.invalid {
            let _ = writeln!(
                out,
                "invalid entry at index {}: {}\n  {}",
                entry.index,
                entry.problems.join("; "),
                entry.value
            );
        }
        out
    }
}

/// Problems with one value against the published record schema.
pub fn check_record(value: &serde_json::Value, allow_list: &[String]) -> Vec<String> {
    let Some(object) = value.as_object() else {
        return vec!["not an object".to_owned()];
    };
    let mut problems = Vec::new();

    for field in ["title", "videoId", "location"] {
        match object.get(field) {
            Some(serde_json::Value::String(_)) => {}
            Some(_) => problems.push(format!("`{field}` is not a string")),
            None => problems.push(format!("`{field}` is missing")),
        }
    }

    match object.get("geocode") {
        Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Array(pair)) => {
            let finite = pair
                .iter()
                .all(|v| v.as_f64().is_some_and(f64::is_finite));
            if pair.len() != 2 || !finite {
                problems.push("`geocode` is not a [lat, lng] pair of numbers".to_owned());
            }
        }
        Some(_) => problems.push("`geocode` is neither null nor an array".to_owned()),
        None => problems.push("`geocode` is missing".to_owned()),
    }

    match object.get("playlist") {
        Some(serde_json::Value::String(short)) if allow_list.contains(short) => {}
        Some(serde_json::Value::String(short)) => {
            problems.push(format!("`playlist` {short:?} is not in the allow-list"))
        }
        Some(_) => problems.push("`playlist` is not a string".to_owned()),
        None => problems.push("`playlist` is missing".to_owned()),
    }

    match object.get("marked") {
        Some(serde_json::Value::Bool(_)) => {}
        Some(_) => problems.push("`marked` is not a boolean".to_owned()),
        None => problems.push("`marked` is missing".to_owned()),
    }

    for key in object.keys() {
        if !PUBLIC_FIELDS.contains(&key.as_str()) {
            problems.push(format!("unexpected field `{key}`"));
        }
    }
    problems
}

/// Partitions `values` into schema-conforming records and invalid entries.
pub fn validate(values: &[serde_json::Value], allow_list: &[String]) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (index, value) in values.iter().enumerate() {
        let mut problems = check_record(value, allow_list);
        if problems.is_empty() {
            match serde_json::from_value::<PublishedRecord>(value.clone()) {
                Ok(record) => {
                    report.valid.push(record);
                    continue;
                }
                Err(err) => problems.push(format!("decode: {err}")),
            }
        }
        report.invalid.push(InvalidEntry {
            index,
            value: value.clone(),
            problems,
        });
    }
    report
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let input_path = PathBuf::from(&args.input);
    let config = CatalogConfig::load(&PathBuf::from(&args.config))?;

    let value = artifact_store::read_json::<serde_json::Value>(&input_path)?
        .ok_or_else(|| anyhow::anyhow!("published artifact not found: {}", input_path.display()))?;
    let values = value
        .as_array()
        .with_context(|| format!("{} is not a JSON array", input_path.display()))?;

    let report = validate(values, &config.allow_list());
    print!("{}", report.render());
    tracing::info!(
        stage = "validate",
        valid = report.valid.len(),
        invalid = report.invalid.len(),
        input = %input_path.display(),
        "validate complete"
    );

    if !report.is_clean() {
        anyhow::bail!("{} invalid record(s) in {}", report.invalid.len(), input_path.display());
    }
    Ok(())
}
