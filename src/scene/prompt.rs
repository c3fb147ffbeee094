//! Prompt crafting for 360° scene images.
//!
//! The chat model writes the final prompt from the book metadata and the
//! fragment. When that call fails, a deterministic template built from keyword
//! scans of the fragment is used instead, so the pipeline never stalls on the
//! prompt step.

use std::sync::Arc;

use async_trait::async_trait;

use crate::gateway::ChatCompletion;
use crate::scene::types::Subject;

pub const RENDERING_HINTS: &str = concat!(
    "360 panorama, equirectangular 2:1, seamless edges, immersive VR, ",
    "ultra high detail, 8k if possible"
);

const FALLBACK_PREAMBLE: &str = "360° equirectangular panorama (2:1 aspect ratio)";

const SYNOPSIS_MAX_CHARS: usize = 200;
const FRAGMENT_MAX_CHARS: usize = 300;

const SYSTEM_PROMPT: &str = concat!(
    "You are an art director specialised in immersive 360° equirectangular images ",
    "(2:1 aspect ratio) for VR experiences.\n",
    "Write a single detailed descriptive paragraph of the setting that reflects the book's ",
    "narrative, consistent with its era, genre and tone.\n",
    "Include details about the environment, materials, colours, lighting, weather, depth, ",
    "perspective and atmospheric detail.\n",
    "Avoid overlaid text, trademarks and explicit camera instructions.\n",
    "End with a short block of rendering hints: \"360 panorama, equirectangular 2:1, ",
    "seamless edges, immersive VR, ultra high detail, 8k if possible\"."
);

struct KeywordGroup {
    keywords: &'static [&'static str],
    phrase: &'static str,
}

const ENVIRONMENT_KEYWORDS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["forest", "woods", "jungle", "bosque", "selva", "arboleda"],
        phrase: "a dense forest of towering trees",
    },
    KeywordGroup {
        keywords: &["sea", "ocean", "beach", "shore", "mar", "océano", "oceano", "playa", "costa"],
        phrase: "a vast seascape stretching to the horizon",
    },
    KeywordGroup {
        keywords: &["library", "bookshel", "biblioteca", "estanter"],
        phrase: "a library lined with towering bookshelves",
    },
    KeywordGroup {
        keywords: &["castle", "palace", "fortress", "castillo", "palacio", "fortaleza"],
        phrase: "the halls and towers of an ancient castle",
    },
    KeywordGroup {
        keywords: &["mountain", "valley", "cliff", "montaña", "montana", "valle", "acantilado"],
        phrase: "a sweeping mountain landscape",
    },
    KeywordGroup {
        keywords: &["desert", "dune", "desierto", "duna"],
        phrase: "an endless desert of rolling dunes",
    },
    KeywordGroup {
        keywords: &["city", "street", "town", "ciudad", "calle", "pueblo"],
        phrase: "bustling city streets",
    },
    KeywordGroup {
        keywords: &[
            "room",
            "house",
            "hall",
            "kitchen",
            "habitación",
            "habitacion",
            "casa",
            "salón",
            "salon",
            "cocina",
        ],
        phrase: "a richly detailed interior",
    },
];

const TIME_OF_DAY_KEYWORDS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["dawn", "sunrise", "morning", "amanecer", "alba", "mañana"],
        phrase: "at dawn, bathed in soft golden light",
    },
    KeywordGroup {
        keywords: &["noon", "midday", "mediodía", "mediodia"],
        phrase: "at midday under bright overhead light",
    },
    KeywordGroup {
        keywords: &["sunset", "dusk", "evening", "atardecer", "anochecer", "ocaso"],
        phrase: "at sunset, with warm orange and purple tones",
    },
    KeywordGroup {
        keywords: &[
            "night",
            "moon",
            "stars",
            "midnight",
            "noche",
            "luna",
            "estrellas",
            "medianoche",
        ],
        phrase: "at night under silver moonlight",
    },
];

const MOOD_KEYWORDS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["dark", "fear", "shadow", "gloom", "oscur", "miedo", "sombr", "tenebros"],
        phrase: "an ominous, shadowy atmosphere",
    },
    KeywordGroup {
        keywords: &["storm", "rain", "thunder", "tormenta", "lluvia", "trueno"],
        phrase: "a stormy sky heavy with rain",
    },
    KeywordGroup {
        keywords: &["calm", "peace", "quiet", "serene", "calma", "paz", "silencio", "tranquil"],
        phrase: "a serene, peaceful atmosphere",
    },
    KeywordGroup {
        keywords: &["joy", "happy", "laugh", "celebrat", "alegr", "feliz", "risa", "fiesta"],
        phrase: "a joyful, vibrant atmosphere",
    },
    KeywordGroup {
        keywords: &["mist", "fog", "niebla", "bruma"],
        phrase: "drifting mist softening the distance",
    },
];

const GENRE_KEYWORDS: &[KeywordGroup] = &[
    KeywordGroup {
        keywords: &["fantasy", "fantasía", "fantasia"],
        phrase: "epic fantasy art direction with subtle magical details",
    },
    KeywordGroup {
        keywords: &["science fiction", "sci-fi", "ciencia ficción", "ciencia ficcion"],
        phrase: "futuristic science-fiction design",
    },
    KeywordGroup {
        keywords: &["horror", "terror"],
        phrase: "gothic horror tones",
    },
    KeywordGroup {
        keywords: &["romance", "romántic", "romantic"],
        phrase: "romantic, soft and warm lighting",
    },
    KeywordGroup {
        keywords: &["mystery", "thriller", "misterio", "suspense", "policiac", "crime"],
        phrase: "noir mystery ambience",
    },
    KeywordGroup {
        keywords: &["histor"],
        phrase: "historically accurate period details",
    },
    KeywordGroup {
        keywords: &["adventure", "aventura"],
        phrase: "a sense of grand adventure",
    },
];

const DEFAULT_ENVIRONMENT: &str = "a setting faithful to the narrated fragment";
const DEFAULT_TIME_OF_DAY: &str = "with natural, balanced lighting";
const DEFAULT_MOOD: &str = "an atmosphere matching the tone of the story";

/// Turns a subject, a fragment and a style into an image prompt.
#[async_trait]
pub trait PromptBuilder: Send + Sync {
    async fn build(&self, subject: &Subject, fragment: &str, style: &str) -> anyhow::Result<String>;
}

/// Collects the phrase of every group with at least one keyword in `haystack`.
fn scan(haystack: &str, groups: &[KeywordGroup]) -> Vec<&'static str> {
    groups
        .iter()
        .filter(|group| group.keywords.iter().any(|keyword| haystack.contains(keyword)))
        .map(|group| group.phrase)
        .collect()
}

fn join_or(phrases: &[&str], default: &str) -> String {
    if phrases.is_empty() {
        default.to_string()
    } else {
        phrases.join(", ")
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Deterministic prompt used when the chat model is unavailable.
pub fn fallback_prompt(subject: &Subject, fragment: &str, style: &str) -> String {
    let lowered = fragment.to_lowercase();
    let environment = scan(&lowered, ENVIRONMENT_KEYWORDS);
    let time_of_day = scan(&lowered, TIME_OF_DAY_KEYWORDS);
    let mood = scan(&lowered, MOOD_KEYWORDS);

    let categories = subject.book.categories.join(" | ").to_lowercase();
    let genre = scan(&categories, GENRE_KEYWORDS);

    let mut prompt = format!(
        "{FALLBACK_PREAMBLE} of a scene from \"{}\" by {}.\n",
        subject.book.title, subject.book.author
    );
    prompt.push_str(&format!("Setting: {}.\n", join_or(&environment, DEFAULT_ENVIRONMENT)));
    prompt.push_str(&format!("Time of day: {}.\n", join_or(&time_of_day, DEFAULT_TIME_OF_DAY)));
    prompt.push_str(&format!("Mood: {}.\n", join_or(&mood, DEFAULT_MOOD)));
    if !genre.is_empty() {
        prompt.push_str(&format!("Genre styling: {}.\n", genre.join(", ")));
    }
    prompt.push_str(&format!("Visual style: {style}.\n"));
    prompt.push_str(&format!(
        "Scene: \"{}\"\n",
        truncate_chars(fragment.trim(), FRAGMENT_MAX_CHARS)
    ));
    prompt.push_str(RENDERING_HINTS);
    prompt
}

pub fn build_user_prompt(subject: &Subject, fragment: &str, style: &str) -> String {
    let book = &subject.book;
    let mut prompt = String::from("Book metadata:\n");
    prompt.push_str(&format!("- Title: {}\n", book.title));
    prompt.push_str(&format!("- Author: {}\n", book.author));
    if !book.categories.is_empty() {
        prompt.push_str(&format!("- Genres: {}\n", book.categories.join(", ")));
    }
    if let Some(synopsis) = book.synopsis.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("- Synopsis: {}\n", truncate_chars(synopsis, SYNOPSIS_MAX_CHARS)));
    }
    prompt.push_str("\nNarrated fragment:\n");
    prompt.push_str(&format!("\"{fragment}\"\n"));
    if !style.trim().is_empty() {
        prompt.push_str(&format!("\nPreferred style: {style}\n"));
    }
    prompt.push_str(
        "\nReturn ONLY the final prompt for the 360° image, without headings or quotes.",
    );
    prompt
}

/// Chat-model prompt crafting with a local fallback.
pub struct PromptCrafter {
    chat: Arc<dyn ChatCompletion>,
}

impl PromptCrafter {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl PromptBuilder for PromptCrafter {
    async fn build(
        &self,
        subject: &Subject,
        fragment: &str,
        style: &str,
    ) -> anyhow::Result<String> {
        tracing::debug!(book = %subject.book.title, style, "building scene prompt");
        let user_prompt = build_user_prompt(subject, fragment, style);
        match self.chat.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(crafted) if !crafted.trim().is_empty() => {
                tracing::debug!(chars = crafted.chars().count(), "prompt crafted by chat model");
                Ok(crafted.trim().to_string())
            }
            Ok(_) => {
                tracing::warn!("chat model returned an empty prompt, using fallback template");
                Ok(fallback_prompt(subject, fragment, style))
            }
            Err(err) => {
                tracing::warn!("prompt crafting failed, using fallback template: {err}");
                Ok(fallback_prompt(subject, fragment, style))
            }
        }
    }
}
