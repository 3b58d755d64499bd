mod stubs;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use predicates::prelude::*;
use serde_json::Value;
use stubs::{ServiceStub, StubConfig, private_video, video};

const CONFIG_YAML: &str = "channel_handle: \"@racetravel\"
playlists:
  - short: ap
    id: PL_AP
    name: Around the Planet
  - short: bfs
    id: PL_BFS
    name: Bonus Features
";

fn stub_config() -> StubConfig {
    StubConfig {
        uploads: HashMap::from([("@racetravel".to_owned(), "UU_RACE".to_owned())]),
        playlists: HashMap::from([
            (
                "UU_RACE".to_owned(),
                vec![
                    vec![
                        video("a", "We Raced Across Japan", "Three teams, one country."),
                        video("b", "Hide and seek in Zurich", "The hunters have 30 minutes."),
                        video("x", "Behind the scenes in Paris", "Bloopers."),
                    ],
                    vec![private_video("p")],
                ],
            ),
            (
                "PL_AP".to_owned(),
                vec![
                    vec![video("a", "We Raced Across Japan", "")],
                    vec![video("b", "Hide and seek in Zurich", "")],
                ],
            ),
            (
                "PL_BFS".to_owned(),
                vec![vec![
                    video("b", "Hide and seek in Zurich", ""),
                    private_video("p"),
                ]],
            ),
        ]),
        places: HashMap::from([
            ("Japan".to_owned(), [138.25, 36.2]),
            ("Zurich".to_owned(), [8.54, 47.37]),
        ]),
        ..StubConfig::default()
    }
}

fn run_pipeline(stub: &ServiceStub, config_path: &Path, workspace: &Path, web_out: &Path) {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.env("YOUTUBE_API_KEY", "test-key")
        .env("RUST_LOG", "info")
        .args([
            "run",
            "--config",
            config_path.to_str().expect("utf-8 path"),
            "--out",
            workspace.to_str().expect("utf-8 path"),
            "--web-out",
            web_out.to_str().expect("utf-8 path"),
            "--youtube-base-url",
            &stub.youtube_url(),
            "--engine",
            "heuristic",
            "--geocoder-url",
            &stub.geocoder_url(),
            "--delay-ms",
            "0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 invalid"));
}

fn read_published(path: &Path) -> anyhow::Result<Vec<Value>> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn by_id<'a>(records: &'a [Value], video_id: &str) -> &'a Value {
    records
        .iter()
        .find(|r| r["videoId"] == video_id)
        .unwrap_or_else(|| panic!("record {video_id} missing"))
}

#[test]
fn run_publishes_allow_listed_records() -> anyhow::Result<()> {
    let stub = ServiceStub::spawn(stub_config());
    let temp = tempfile::tempdir()?;
    let config_path = temp.path().join("catalog.yaml");
    fs::write(&config_path, CONFIG_YAML)?;
    let workspace = temp.path().join("work");
    let web_out = temp.path().join("web/src/data/data.json");

    run_pipeline(&stub, &config_path, &workspace, &web_out);

    let published = read_published(&workspace.join("published.json"))?;
    let ids = published
        .iter()
        .map(|r| r["videoId"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b", "p"]);

    let japan = by_id(&published, "a");
    assert_eq!(japan["location"], "Japan");
    assert_eq!(japan["geocode"], serde_json::json!([36.2, 138.25]));
    assert_eq!(japan["playlist"], "ap");
    assert_eq!(japan["marked"], false);
    assert!(japan.get("description").is_none());

    assert_eq!(by_id(&published, "b")["playlist"], "ap");

    let private = by_id(&published, "p");
    assert_eq!(private["location"], "no location found");
    assert_eq!(private["geocode"], Value::Null);
    assert_eq!(private["playlist"], "bfs");

    assert_eq!(fs::read_to_string(&web_out)?, fs::read_to_string(workspace.join("published.json"))?);

    let raw: Value = serde_json::from_str(&fs::read_to_string(workspace.join("raw.json"))?)?;
    assert_eq!(raw["schema"], "raw_items");
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["records"].as_array().map(Vec::len), Some(4));

    assert_eq!(stub.count("/transcripts/"), 0);
    assert_eq!(stub.count("/v1/responses"), 0);
    Ok(())
}

#[test]
fn rerun_keeps_marked_flags_and_reuses_caches() -> anyhow::Result<()> {
    let stub = ServiceStub::spawn(stub_config());
    let temp = tempfile::tempdir()?;
    let config_path = temp.path().join("catalog.yaml");
    fs::write(&config_path, CONFIG_YAML)?;
    let workspace = temp.path().join("work");
    let web_out = temp.path().join("data.json");
    let published_path = workspace.join("published.json");

    run_pipeline(&stub, &config_path, &workspace, &web_out);
    let first_geocoder_calls = stub.count("/search");

    let mut published = read_published(&published_path)?;
    for record in &mut published {
        if record["videoId"] == "a" {
            record["marked"] = Value::Bool(true);
        }
    }
    fs::write(&published_path, serde_json::to_string_pretty(&published)?)?;

    run_pipeline(&stub, &config_path, &workspace, &web_out);

    let republished = read_published(&published_path)?;
    assert_eq!(by_id(&republished, "a")["marked"], true);
    assert_eq!(by_id(&republished, "b")["marked"], false);
    assert_eq!(republished.len(), 3);

    // Only "Paris" (never resolved) is queried again.
    assert_eq!(stub.count("/search") - first_geocoder_calls, 1);
    Ok(())
}

#[test]
fn openai_engine_with_transcripts_keeps_locations_unique() -> anyhow::Result<()> {
    let mut config = stub_config();
    config.playlists.insert(
        "PL_AP".to_owned(),
        vec![vec![
            video("t1", "Episode One", "Teams start at a famous crossing."),
            video("t2", "Episode Two", "Teams search the same city."),
            video("t3", "Episode Three", "A mystery stop."),
        ]],
    );
    config.transcripts = HashMap::from([
        ("t1".to_owned(), vec!["Welcome to Shibuya,".to_owned(), "Tokyo!".to_owned()]),
    ]);
    config.transcript_failures.insert("t3".to_owned());
    config.answers = HashMap::from([
        ("Episode One".to_owned(), "Tokyo, Japan".to_owned()),
        ("Episode Two".to_owned(), "Tokyo, Japan".to_owned()),
    ]);
    let stub = ServiceStub::spawn(config);

    let temp = tempfile::tempdir()?;
    let config_path = temp.path().join("catalog.yaml");
    fs::write(
        &config_path,
        "playlists:\n  - short: ap\n    id: PL_AP\n",
    )?;
    let raw_path = temp.path().join("raw.json");
    let cache_path = temp.path().join("supplementary.json");
    let located_path = temp.path().join("located.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.env("YOUTUBE_API_KEY", "test-key")
        .args([
            "fetch",
            "--config",
            config_path.to_str().expect("utf-8 path"),
            "--out",
            raw_path.to_str().expect("utf-8 path"),
            "--youtube-base-url",
            &stub.youtube_url(),
        ])
        .assert()
        .success();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.args([
        "transcripts",
        "--items",
        raw_path.to_str().expect("utf-8 path"),
        "--cache",
        cache_path.to_str().expect("utf-8 path"),
        "--transcript-engine",
        "http",
        "--transcript-url",
        &stub.transcript_url(),
    ])
    .assert()
    .success();

    let cache: Value = serde_json::from_str(&fs::read_to_string(&cache_path)?)?;
    let records = &cache["records"];
    assert_eq!(records["t1"]["transcript"]["status"], "available");
    assert_eq!(records["t1"]["transcript"]["text"], "Welcome to Shibuya Tokyo!");
    assert_eq!(records["t2"]["transcript"]["status"], "unavailable");
    assert_eq!(records["t3"]["transcript"]["status"], "error");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.env("OPENAI_API_KEY", "test-key")
        .args([
            "locate",
            "--items",
            raw_path.to_str().expect("utf-8 path"),
            "--supplementary",
            cache_path.to_str().expect("utf-8 path"),
            "--out",
            located_path.to_str().expect("utf-8 path"),
            "--openai-base-url",
            &stub.openai_url(),
            "--attempts",
            "2",
        ])
        .assert()
        .success();

    let located: Value = serde_json::from_str(&fs::read_to_string(&located_path)?)?;
    let records = located["records"].as_array().cloned().unwrap_or_default();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["location"], serde_json::json!({ "status": "found", "text": "Tokyo, Japan" }));
    assert_eq!(
        records[1]["location"],
        serde_json::json!({ "status": "found", "text": "Site 2, Tokyo, Japan" })
    );
    assert_eq!(
        records[2]["location"],
        serde_json::json!({ "status": "not_found", "reason": "transcript_error" })
    );
    // One call for t1, two for the duplicate t2, none for t3.
    assert_eq!(stub.count("/v1/responses"), 3);
    Ok(())
}

#[test]
fn validate_reports_invalid_entries() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let config_path = temp.path().join("catalog.yaml");
    fs::write(&config_path, CONFIG_YAML)?;
    let input = temp.path().join("data.json");
    fs::write(
        &input,
        serde_json::json!([
            {
                "title": "We Raced Across Japan",
                "videoId": "a",
                "location": "Japan",
                "geocode": [36.2, 138.25],
                "playlist": "ap",
                "marked": false
            },
            {
                "title": "Old episode",
                "videoId": "z",
                "location": "Lima, Peru",
                "geocode": [],
                "playlist": "zz",
                "marked": false
            }
        ])
        .to_string(),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.args([
        "validate",
        "--input",
        input.to_str().expect("utf-8 path"),
        "--config",
        config_path.to_str().expect("utf-8 path"),
    ])
    .assert()
    .failure()
    .stdout(predicate::str::contains("1 valid, 1 invalid"))
    .stdout(predicate::str::contains("invalid entry at index 1"))
    .stderr(predicate::str::contains("1 invalid record(s)"));
    Ok(())
}

#[test]
fn geocode_migrates_legacy_located_file() -> anyhow::Result<()> {
    let stub = ServiceStub::spawn(stub_config());
    let temp = tempfile::tempdir()?;
    let located_path = temp.path().join("located.json");
    let geocoded_path = temp.path().join("geocoded.json");
    fs::write(
        &located_path,
        serde_json::json!([
            {
                "publishedAt": "2023-01-01T00:00:00Z",
                "title": "Hide and seek in Zurich",
                "description": "",
                "videoId": "b",
                "transcript": "not available",
                "location": "Zurich"
            },
            {
                "publishedAt": "2023-01-01T00:00:00Z",
                "title": "Private video",
                "description": "",
                "videoId": "p",
                "transcript": "not available",
                "location": "no location found"
            }
        ])
        .to_string(),
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tripmap");
    cmd.args([
        "geocode",
        "--items",
        located_path.to_str().expect("utf-8 path"),
        "--out",
        geocoded_path.to_str().expect("utf-8 path"),
        "--geocoder-url",
        &stub.geocoder_url(),
        "--delay-ms",
        "0",
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("migrating artifact"));

    let geocoded: Value = serde_json::from_str(&fs::read_to_string(&geocoded_path)?)?;
    let records = geocoded["records"].as_array().cloned().unwrap_or_default();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["geocode"]["tier"], "exact");
    assert_eq!(
        records[0]["geocode"]["response"]["features"][0]["geometry"]["coordinates"],
        serde_json::json!([8.54, 47.37])
    );
    assert_eq!(records[1]["geocode"], Value::Null);
    assert_eq!(stub.count("/search"), 1);
    Ok(())
}
