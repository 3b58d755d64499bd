use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every stage in a workspace directory.
    Run(RunArgs),
    /// Enumerate channel uploads and allow-listed playlists.
    Fetch(FetchArgs),
    /// Fill the transcript/description cache.
    Transcripts(TranscriptsArgs),
    /// Assign a unique filming location to every item.
    Locate(LocateArgs),
    /// Resolve locations to coordinates.
    Geocode(GeocodeArgs),
    /// Reconcile against playlist membership and publish.
    Publish(PublishArgs),
    /// Check a published artifact against the public schema.
    Validate(ValidateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct YoutubeArgs {
    /// YouTube Data API base URL.
    #[arg(long, default_value = "https://www.googleapis.com/youtube/v3")]
    pub youtube_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TranscriptEngine {
    /// Do not fetch transcripts; record them as unavailable.
    Off,
    /// Fetch from the transcript HTTP service.
    Http,
}

#[derive(Debug, Clone, Args)]
pub struct TranscriptSourceArgs {
    #[arg(long, value_enum, default_value_t = TranscriptEngine::Off)]
    pub transcript_engine: TranscriptEngine,

    /// Transcript service base URL (default: `TRANSCRIPT_API_URL`).
    #[arg(long)]
    pub transcript_url: Option<String>,

    /// Maximum concurrent transcript requests.
    #[arg(long, default_value_t = 4)]
    pub transcript_concurrency: usize,

    /// Re-fetch transcripts previously recorded as unavailable.
    #[arg(long, default_value_t = false)]
    pub retry_unavailable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OracleEngine {
    /// OpenAI Responses API.
    Openai,
    /// Offline text matching on title and description.
    Heuristic,
}

#[derive(Debug, Clone, Args)]
pub struct OracleArgs {
    #[arg(long, value_enum, default_value_t = OracleEngine::Openai)]
    pub engine: OracleEngine,

    /// OpenAI API base URL.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, default_value = "gpt-4o")]
    pub openai_model: String,

    #[arg(long, default_value_t = 0.2)]
    pub openai_temperature: f32,

    /// Oracle requests per item before forcing a disambiguated answer.
    #[arg(long, default_value_t = 3)]
    pub attempts: usize,
}

#[derive(Debug, Clone, Args)]
pub struct GeocoderArgs {
    /// Nominatim-compatible search endpoint.
    #[arg(long, default_value = "https://nominatim.openstreetmap.org/search")]
    pub geocoder_url: String,

    /// User-Agent sent to the geocoding service.
    #[arg(long, default_value = "tripmap/0.1 (batch geocoder)")]
    pub user_agent: String,

    /// Minimum delay between geocoding requests.
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// Maximum items geocoded concurrently.
    #[arg(long, default_value_t = 1)]
    pub geocode_concurrency: usize,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Catalog config (YAML).
    #[arg(long)]
    pub config: String,

    /// Workspace directory; artifacts from earlier runs are reused as caches.
    #[arg(long)]
    pub out: String,

    /// Also copy the published artifact here (e.g. the web app's data.json).
    #[arg(long)]
    pub web_out: Option<String>,

    #[command(flatten)]
    pub youtube: YoutubeArgs,

    #[command(flatten)]
    pub transcripts: TranscriptSourceArgs,

    #[command(flatten)]
    pub oracle: OracleArgs,

    #[command(flatten)]
    pub geocoder: GeocoderArgs,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Catalog config (YAML).
    #[arg(long)]
    pub config: String,

    /// Output path for the raw items artifact.
    #[arg(long)]
    pub out: String,

    #[command(flatten)]
    pub youtube: YoutubeArgs,
}

#[derive(Debug, Args)]
pub struct TranscriptsArgs {
    /// Raw items artifact (created by `fetch`).
    #[arg(long)]
    pub items: String,

    /// Supplementary cache; read if present, then rewritten.
    #[arg(long)]
    pub cache: String,

    #[command(flatten)]
    pub source: TranscriptSourceArgs,
}

#[derive(Debug, Args)]
pub struct LocateArgs {
    /// Raw items artifact (created by `fetch`).
    #[arg(long)]
    pub items: String,

    /// Supplementary cache (created by `transcripts`).
    #[arg(long)]
    pub supplementary: String,

    /// Located items artifact; earlier locations are reused.
    #[arg(long)]
    pub out: String,

    #[command(flatten)]
    pub oracle: OracleArgs,
}

#[derive(Debug, Args)]
pub struct GeocodeArgs {
    /// Located items artifact (created by `locate`).
    #[arg(long)]
    pub items: String,

    /// Geocoded items artifact; earlier valid results are reused.
    #[arg(long)]
    pub out: String,

    #[command(flatten)]
    pub geocoder: GeocoderArgs,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Geocoded items artifact (created by `geocode`).
    #[arg(long)]
    pub items: String,

    /// Catalog config (YAML); its playlists are the allow-list.
    #[arg(long)]
    pub config: String,

    /// Published artifact; `marked` flags of the previous version are kept.
    #[arg(long)]
    pub out: String,

    /// Also copy the published artifact here.
    #[arg(long)]
    pub web_out: Option<String>,

    #[command(flatten)]
    pub youtube: YoutubeArgs,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Published artifact to audit.
    #[arg(long)]
    pub input: String,

    /// Catalog config (YAML) providing the playlist allow-list.
    #[arg(long)]
    pub config: String,
}
