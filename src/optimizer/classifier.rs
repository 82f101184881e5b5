//! Keyword-based request classification.
//!
//! Pure and deterministic: no network, no randomness, no state. The same
//! text always yields the same [`RequestClassification`], which is what
//! lets classification feed the cache key and TTL computation.
//!
//! Matching works on a normalised copy of the text (lowercased, every
//! non-alphanumeric character replaced by a space). Single keywords match
//! whole words only, multi-word phrases match on the normalised string.

use crate::types::{ContextFlags, DesiredLength, RequestClassification, RequestType};

const CREATIVE_WORDS: &[&str] = &[
    "poème", "poèmes", "poem", "poems", "poésie", "poetry", "story", "stories", "conte", "récit",
    "chanson", "song", "haiku", "haïku", "slogan", "imagine", "imagines", "imaginez", "invente",
    "inventez", "invent", "fiction", "scénario", "lyrics", "paroles", "roman", "novel", "rime",
    "rimes", "rhyme", "blague", "joke", "fable", "limerick", "sonnet",
];
const CREATIVE_PHRASES: &[&str] = &[
    "raconte moi",
    "tell me a story",
    "once upon a time",
    "il était une fois",
];

const ANALYSIS_WORDS: &[&str] = &[
    "analyse", "analyser", "analysez", "analyze", "analysis", "compare", "comparer", "comparez",
    "comparaison", "comparison", "évalue", "évaluer", "evaluate", "critique", "assess", "examine",
    "différence", "différences", "difference", "differences", "avantages", "inconvénients",
    "implications", "tendances", "trends", "tradeoffs",
];
const ANALYSIS_PHRASES: &[&str] = &[
    "pros and cons",
    "trade offs",
    "explain why",
    "explique pourquoi",
    "what are the implications",
];

const TASK_WORDS: &[&str] = &[
    "fais", "faire", "crée", "créer", "créez", "create", "génère", "générer", "generate",
    "traduis", "traduire", "translate", "résume", "résumer", "summarize", "summarise", "rédige",
    "rédiger", "draft", "liste", "list", "écris", "écrire", "write", "code", "implement",
    "implémente", "corrige", "fix", "convertis", "convert", "calcule", "calculate", "organise",
    "organize", "planifie", "build", "refactor", "debug", "reformule", "rewrite",
];

const QUESTION_LEADS: &[&str] = &[
    // fr
    "quel", "quelle", "quels", "quelles", "qui", "que", "quoi", "comment", "pourquoi", "quand",
    "où", "combien", "est", // en
    "what", "who", "whom", "which", "why", "when", "where", "how", "is", "are", "can", "could",
    "do", "does", "did", "should", "would", // es
    "qué", "quién", "cómo", "cuándo", "dónde", // de
    "was", "wer", "wie", "warum", "wann", "wo",
];

const COMPLEXITY_WORDS: &[&str] = &[
    "algorithme", "algorithm", "architecture", "optimisation", "optimization", "détaillé",
    "détaillée", "detailed", "approfondi", "approfondie", "thorough", "comprehensive", "technique",
    "technical", "mathématique", "mathematical", "proof", "démonstration", "démontre", "prove",
];
const COMPLEXITY_PHRASES: &[&str] = &["step by step", "étape par étape", "in depth", "en détail"];

const SHORT_WORDS: &[&str] = &[
    "bref", "brève", "brièvement", "briefly", "brief", "short", "court", "courte", "concise",
    "concis", "quick", "quickly", "rapidement", "tldr",
];
const SHORT_PHRASES: &[&str] = &[
    "en une phrase",
    "in one sentence",
    "one word",
    "en un mot",
    "oui ou non",
    "yes or no",
];

const LONG_WORDS: &[&str] = &[
    "détaillé", "détaillée", "detailed", "complet", "complète", "comprehensive", "thorough",
    "approfondi", "approfondie", "exhaustive", "exhaustif",
];
const LONG_PHRASES: &[&str] = &["in depth", "en détail", "step by step", "étape par étape"];

/// Stop-words per language, checked in this order (ties favour earlier entries).
const LANGUAGE_STOPWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "a", "an", "is", "are", "and", "of", "to", "in", "on", "for", "what", "how",
            "why", "with", "me", "you", "i", "it", "this", "that", "write", "can", "please",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "un", "une", "des", "est", "et", "de", "du", "en", "sur", "pour",
            "pas", "que", "qui", "je", "tu", "il", "elle", "nous", "vous", "moi", "avec", "dans",
            "ce", "cette", "quelle", "quel", "comment", "pourquoi", "écris", "l", "d", "j", "c",
            "qu",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "un", "una", "es", "y", "de", "en", "por", "para", "que",
            "qué", "cómo", "con", "favor", "escribe", "dónde",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "ein", "eine", "ist", "und", "zu", "mit", "ich", "du", "wie",
            "was", "warum", "nicht", "bitte", "schreibe",
        ],
    ),
];

/// Normalised view of the request text.
struct Normalized {
    /// Lowercased, non-alphanumerics collapsed to single spaces, padded
    /// with a space on both ends so phrases match on word boundaries.
    padded: String,
    words: Vec<String>,
}

impl Normalized {
    fn new(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<String> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_owned)
            .collect();
        let padded = format!(" {} ", words.join(" "));
        Self { padded, words }
    }

    fn has_word(&self, set: &[&str]) -> bool {
        self.words.iter().any(|w| set.contains(&w.as_str()))
    }

    fn has_phrase(&self, set: &[&str]) -> bool {
        set.iter().any(|p| self.padded.contains(&format!(" {p} ")))
    }

    fn matches(&self, words: &[&str], phrases: &[&str]) -> bool {
        self.has_word(words) || self.has_phrase(phrases)
    }
}

/// Classify raw user text.
///
/// Context flags on the result are always unset; callers merge the side
/// context they actually have with
/// [`RequestClassification::with_context`].
pub fn classify(text: &str) -> RequestClassification {
    let norm = Normalized::new(text);
    let request_type = request_type(text, &norm);
    let complexity = complexity(text, &norm);
    RequestClassification {
        request_type,
        complexity,
        desired_length: desired_length(&norm, request_type, complexity),
        language: detect_language(&norm).to_string(),
        context: ContextFlags::default(),
    }
}

fn request_type(text: &str, norm: &Normalized) -> RequestType {
    if norm.matches(CREATIVE_WORDS, CREATIVE_PHRASES) {
        RequestType::Creative
    } else if norm.matches(ANALYSIS_WORDS, ANALYSIS_PHRASES) {
        RequestType::Analysis
    } else if norm.has_word(TASK_WORDS) {
        RequestType::Task
    } else if text.trim_end().ends_with('?')
        || norm
            .words
            .first()
            .is_some_and(|w| QUESTION_LEADS.contains(&w.as_str()))
    {
        RequestType::Question
    } else {
        RequestType::Conversation
    }
}

fn complexity(text: &str, norm: &Normalized) -> u8 {
    let words = norm.words.len();
    let mut score: u8 = 1;
    for threshold in [20, 60, 150] {
        if words > threshold {
            score += 1;
        }
    }
    if norm.matches(COMPLEXITY_WORDS, COMPLEXITY_PHRASES) {
        score += 1;
    }
    if text.matches('?').count() > 1 {
        score += 1;
    }
    score.clamp(1, 5)
}

fn desired_length(norm: &Normalized, request_type: RequestType, complexity: u8) -> DesiredLength {
    if norm.matches(SHORT_WORDS, SHORT_PHRASES) {
        return DesiredLength::Short;
    }
    if norm.matches(LONG_WORDS, LONG_PHRASES) {
        return DesiredLength::Long;
    }
    match request_type {
        RequestType::Question if complexity <= 2 => DesiredLength::Short,
        RequestType::Question => DesiredLength::Medium,
        RequestType::Creative | RequestType::Analysis if complexity >= 3 => DesiredLength::Long,
        RequestType::Creative | RequestType::Analysis => DesiredLength::Medium,
        RequestType::Task if complexity >= 4 => DesiredLength::Long,
        RequestType::Task => DesiredLength::Medium,
        RequestType::Conversation if complexity <= 1 => DesiredLength::Short,
        RequestType::Conversation => DesiredLength::Medium,
    }
}

fn detect_language(norm: &Normalized) -> &'static str {
    let mut best = ("en", 0usize);
    for (lang, stopwords) in LANGUAGE_STOPWORDS {
        let hits = norm
            .words
            .iter()
            .filter(|w| stopwords.contains(&w.as_str()))
            .count();
        if hits > best.1 {
            best = (lang, hits);
        }
    }
    best.0
}
