//! Heuristic response quality scoring.
//!
//! A score starts from a neutral base and moves by bounded increments:
//! how close the word count lands to what the requested length implies,
//! paragraph/list structure on longer answers, concrete examples, numeric
//! detail and discourse connectives. The result is clamped to `[0, 10]`.
//!
//! The weights have no deeper justification than "they rank responses
//! sensibly", so they are configuration ([`QualityWeights`]), not contract.

use serde::{Deserialize, Serialize};

use crate::types::{DesiredLength, RequestClassification};

pub const MIN_QUALITY: f32 = 0.0;
pub const MAX_QUALITY: f32 = 10.0;

/// Tunable weights for [`score_response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub base: f32,
    /// Word count within 0.5×–2× of the expected length.
    pub length_match: f32,
    /// Word count within 0.25×–4× of the expected length.
    pub length_near: f32,
    /// Word count further off than that (usually negative).
    pub length_miss: f32,
    pub structure: f32,
    pub examples: f32,
    pub numeric_detail: f32,
    pub connectives: f32,
    pub expected_words_short: u32,
    pub expected_words_medium: u32,
    pub expected_words_long: u32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            base: 5.0,
            length_match: 2.0,
            length_near: 1.0,
            length_miss: -1.0,
            structure: 1.0,
            examples: 0.75,
            numeric_detail: 0.5,
            connectives: 0.75,
            expected_words_short: 50,
            expected_words_medium: 200,
            expected_words_long: 500,
        }
    }
}

impl QualityWeights {
    fn expected_words(&self, length: DesiredLength) -> u32 {
        match length {
            DesiredLength::Short => self.expected_words_short,
            DesiredLength::Medium => self.expected_words_medium,
            DesiredLength::Long => self.expected_words_long,
        }
        .max(1)
    }
}

const EXAMPLE_MARKERS: &[&str] = &[
    "for example",
    "for instance",
    "e.g.",
    "such as",
    "par exemple",
    "exemple :",
    "example:",
    "por ejemplo",
    "zum beispiel",
];

const CONNECTIVES: &[&str] = &[
    "therefore", "however", "because", "moreover", "furthermore", "thus", "consequently", "donc",
    "cependant", "parce que", "ainsi", "en effet", "toutefois", "de plus", "por lo tanto",
    "sin embargo", "porque", "deshalb", "jedoch", "weil",
];

/// Score a response against the classification of the request it answers.
///
/// Always within `[MIN_QUALITY, MAX_QUALITY]`; empty responses score 0.
pub fn score_response(
    response: &str,
    classification: &RequestClassification,
    weights: &QualityWeights,
) -> f32 {
    let word_count = response.split_whitespace().count();
    if word_count == 0 {
        return MIN_QUALITY;
    }

    let mut score = weights.base;

    let ratio = word_count as f32 / weights.expected_words(classification.desired_length) as f32;
    score += if (0.5..=2.0).contains(&ratio) {
        weights.length_match
    } else if (0.25..=4.0).contains(&ratio) {
        weights.length_near
    } else {
        weights.length_miss
    };

    if classification.desired_length != DesiredLength::Short && has_structure(response) {
        score += weights.structure;
    }

    let lowered = response.to_lowercase();
    if EXAMPLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        score += weights.examples;
    }
    if response.chars().any(|c| c.is_ascii_digit()) {
        score += weights.numeric_detail;
    }
    let padded = word_boundary_text(&lowered);
    if CONNECTIVES
        .iter()
        .any(|c| padded.contains(&format!(" {c} ")))
    {
        score += weights.connectives;
    }

    if score.is_nan() {
        return MIN_QUALITY;
    }
    score.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Paragraph breaks, bullet/numbered lists or headings.
fn has_structure(response: &str) -> bool {
    response.contains("\n\n")
        || response.lines().any(|line| {
            let line = line.trim_start();
            line.starts_with("- ")
                || line.starts_with("* ")
                || line.starts_with('#')
                || line
                    .split_once(". ")
                    .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
}

fn word_boundary_text(lowered: &str) -> String {
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}
