use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// Canned upstream data served by [`ServiceStub`].
#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// Channel handle -> uploads playlist id.
    pub uploads: HashMap<String, String>,
    /// Playlist id -> pages of `playlistItems` entries.
    pub playlists: HashMap<String, Vec<Vec<Value>>>,
    /// Video id -> transcript segments. Unknown ids answer 404.
    pub transcripts: HashMap<String, Vec<String>>,
    /// Video ids whose transcript request fails with 500.
    pub transcript_failures: HashSet<String>,
    /// Episode title -> oracle answer. Unknown titles answer "Unclear".
    pub answers: HashMap<String, String>,
    /// Geocoder query -> `[lng, lat]`. Unknown queries return no features.
    pub places: HashMap<String, [f64; 2]>,
}

/// One tiny_http server standing in for the YouTube, transcript, OpenAI and
/// Nominatim APIs, each under its own path prefix.
pub struct ServiceStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ServiceStub {
    pub fn spawn(config: StubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start service stub");
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let log = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let raw_url = request.url().to_string();
                log.lock().expect("lock request log").push(raw_url.clone());

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);

                let (status, payload) = route(&config, &raw_url, &body);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(payload.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn youtube_url(&self) -> String {
        format!("{}/youtube/v3", self.base_url)
    }

    pub fn transcript_url(&self) -> String {
        format!("{}/transcripts", self.base_url)
    }

    pub fn openai_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    pub fn geocoder_url(&self) -> String {
        format!("{}/search", self.base_url)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock request log").clone()
    }

    /// Number of requests whose path starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }
}

impl Drop for ServiceStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A `playlistItems` entry for a public video.
#[allow(dead_code)]
pub fn video(video_id: &str, title: &str, description: &str) -> Value {
    serde_json::json!({
        "kind": "youtube#playlistItem",
        "snippet": {
            "publishedAt": "2024-05-01T12:00:00Z",
            "title": title,
            "description": description,
            "resourceId": { "kind": "youtube#video", "videoId": video_id }
        },
        "status": { "privacyStatus": "public" }
    })
}

/// A `playlistItems` entry for a video that has been made private.
#[allow(dead_code)]
pub fn private_video(video_id: &str) -> Value {
    serde_json::json!({
        "snippet": {
            "publishedAt": "2024-05-01T12:00:00Z",
            "title": "Private video",
            "description": "This video is private.",
            "resourceId": { "videoId": video_id }
        },
        "status": { "privacyStatus": "private" }
    })
}

fn route(config: &StubConfig, raw_url: &str, body: &str) -> (u16, Value) {
    let url = url::Url::parse(&format!("http://stub{raw_url}")).expect("parse request url");
    let query = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect::<HashMap<_, _>>();
    let path = url.path();

    if path.starts_with("/youtube/v3/") && !query.contains_key("key") {
        return error(403, "API key missing");
    }

    match path {
        "/youtube/v3/playlistItems" => {
            let Some(pages) = query.get("playlistId").and_then(|id| config.playlists.get(id))
            else {
                return error(404, "playlist not found");
            };
            let index = query
                .get("pageToken")
                .and_then(|t| t.strip_prefix("page-"))
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            let items = pages.get(index).cloned().unwrap_or_default();
            let mut payload = serde_json::json!({ "kind": "youtube#playlistItemListResponse", "items": items });
            if index + 1 < pages.len() {
                payload["nextPageToken"] = Value::String(format!("page-{}", index + 1));
            }
            (200, payload)
        }
        "/youtube/v3/channels" => {
            let items = query
                .get("forHandle")
                .and_then(|handle| config.uploads.get(handle))
                .map(|uploads| {
                    vec![serde_json::json!({
                        "contentDetails": { "relatedPlaylists": { "uploads": uploads } }
                    })]
                })
                .unwrap_or_default();
            (200, serde_json::json!({ "items": items }))
        }
        "/v1/responses" => (200, oracle_response(config, body)),
        "/search" => {
            let point = query.get("q").and_then(|q| config.places.get(q));
            let features = point
                .map(|[lng, lat]| {
                    vec![serde_json::json!({
                        "type": "Feature",
                        "properties": {},
                        "geometry": { "type": "Point", "coordinates": [lng, lat] }
                    })]
                })
                .unwrap_or_default();
            (
                200,
                serde_json::json!({ "type": "FeatureCollection", "features": features }),
            )
        }
        _ => match path.strip_prefix("/transcripts/") {
            Some(video_id) if config.transcript_failures.contains(video_id) => {
                error(500, "transcript backend down")
            }
            Some(video_id) => match config.transcripts.get(video_id) {
                Some(segments) => (
                    200,
                    Value::Array(
                        segments
                            .iter()
                            .map(|text| serde_json::json!({ "text": text }))
                            .collect(),
                    ),
                ),
                None => error(404, "no transcript"),
            },
            None => error(404, "not found"),
        },
    }
}

fn error(status: u16, message: &str) -> (u16, Value) {
    (
        status,
        serde_json::json!({ "error": { "code": status, "message": message } }),
    )
}

fn oracle_response(config: &StubConfig, body: &str) -> Value {
    let input = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("input").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_default();
    let title = input
        .lines()
        .find_map(|line| line.strip_prefix("TITLE: "))
        .unwrap_or_default();
    let answer = config
        .answers
        .get(title)
        .cloned()
        .unwrap_or_else(|| "Unclear".to_owned());

    serde_json::json!({
        "id": "resp_stub",
        "object": "response",
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "output_text", "text": answer }]
            }
        ]
    })
}
