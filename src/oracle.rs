use async_trait::async_trait;

use crate::openai::OpenAiClient;

/// Evidence handed to a location oracle for one item.
#[derive(Debug, Clone)]
pub struct GuessRequest<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub transcript: Option<&'a str>,
    /// Locations already assigned in this run.
    pub used: &'a [String],
}

#[async_trait]
pub trait LocationOracle: Send + Sync {
    async fn guess(&self, request: &GuessRequest<'_>) -> anyhow::Result<String>;

    /// Whether repeating a request can produce a different answer.
    fn is_deterministic(&self) -> bool {
        false
    }
}

const INSTRUCTIONS: &str = "You assign filming locations to episodes of a travel competition game show.\n\
\n\
Task: From the episode evidence, name the specific place where the episode was filmed.\n\
\n\
Hard rules:\n\
- Always answer with a concrete place: a landmark, district or city. Never answer 'various locations', 'unknown' or 'unclear'.\n\
- Format: 'Landmark, City, State, Country'. Omit the landmark or state when they do not apply.\n\
- If the evidence names a landmark or building, that landmark MUST be the answer.\n\
- If the title names a country or continent, the place MUST be inside that region.\n\
- Never repeat a location listed under USED_LOCATIONS. If the same city fits again, name a different district, landmark or nearby town.\n\
- When uncertain, still make the most specific educated guess that can be found on a map.\n\
\n\
Output:\n\
- Output ONLY the location on a single line. No explanation, no quotes, no prefix.\n";

/// Location oracle backed by the OpenAI Responses API.
pub struct OpenAiOracle {
    client: OpenAiClient,
}

impl OpenAiOracle {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LocationOracle for OpenAiOracle {
    async fn guess(&self, request: &GuessRequest<'_>) -> anyhow::Result<String> {
        let input = build_input(request);
        tracing::debug!(
            model = self.client.model(),
            title = request.title,
            used = request.used.len(),
            "oracle request"
        );
        self.client.respond(INSTRUCTIONS, &input).await
    }
}

pub fn build_input(request: &GuessRequest<'_>) -> String {
    let mut input = format!("TITLE: {}\n", request.title);
    match request.transcript {
        Some(transcript) => {
            input.push_str(&format!("TRANSCRIPT_EXCERPT: {transcript}\n"));
            if !request.description.is_empty() {
                input.push_str(&format!("DESCRIPTION: {}\n", request.description));
            }
        }
        None => input.push_str(&format!("DESCRIPTION: {}\n", request.description)),
    }
    input.push_str("\nUSED_LOCATIONS:\n");
    if request.used.is_empty() {
        input.push_str("(none)\n");
    }
    for used in request.used {
        input.push_str("- ");
        input.push_str(used);
        input.push('\n');
    }
    input
}

const PLACE_PREPOSITIONS: &[&str] = &[
    "in", "at", "to", "across", "around", "through", "from", "into", "inside",
];
const CONNECTORS: &[&str] = &["of", "the", "de", "la", "del", "and", "+", "&"];
const STOP_WORDS: &[&str] = &[
    "We", "I", "You", "Our", "The", "A", "An", "This", "Every", "Each", "Episode",
    "Part", "Day", "Hide", "Seek", "Tag", "Race", "Game", "Challenge", "Season",
];

/// Offline oracle: picks the capitalized phrase that follows a place
/// preposition in the title, then in the evidence text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOracle;

#[async_trait]
impl LocationOracle for HeuristicOracle {
    async fn guess(&self, request: &GuessRequest<'_>) -> anyhow::Result<String> {
        let evidence = request.transcript.unwrap_or(request.description);
        place_after_preposition(request.title)
            .or_else(|| place_after_preposition(evidence))
            .ok_or_else(|| anyhow::anyhow!("no place name found in title or evidence"))
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

pub fn place_after_preposition(text: &str) -> Option<String> {
    let words = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '+' && c != '&' && c != '-')
        })
        .collect::<Vec<_>>();
    let raw_words = text.split_whitespace().collect::<Vec<_>>();

    for (idx, word) in words.iter().enumerate() {
        if !PLACE_PREPOSITIONS.contains(&word.to_ascii_lowercase().as_str()) {
            continue;
        }
        let mut phrase: Vec<&str> = Vec::new();
        for (offset, candidate) in words[idx + 1..].iter().enumerate() {
            let raw = raw_words[idx + 1 + offset];
            if candidate.is_empty() {
                break;
            }
            let capitalized = candidate.chars().next().is_some_and(char::is_uppercase);
            let connector = CONNECTORS.contains(&candidate.to_ascii_lowercase().as_str());
            if capitalized && !(phrase.is_empty() && STOP_WORDS.contains(candidate)) {
                phrase.push(candidate);
            } else if phrase.is_empty() && candidate.eq_ignore_ascii_case("the") {
                continue;
            } else if connector && !phrase.is_empty() {
                phrase.push(candidate);
            } else {
                break;
            }
            if raw.ends_with([',', '.', '!', '?', ':', ';', ')']) {
                break;
            }
        }
        while phrase
            .last()
            .is_some_and(|w| CONNECTORS.contains(&w.to_ascii_lowercase().as_str()))
        {
            phrase.pop();
        }
        if !phrase.is_empty() {
            return Some(phrase.join(" "));
        }
    }
    None
}
