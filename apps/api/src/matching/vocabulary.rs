//! Skill vocabulary shared by résumé parsing and job keyword extraction.
//!
//! Both sides go through the same tokenizer and the same term list, so a
//! résumé skill and a job keyword compare equal exactly when they name the
//! same vocabulary term. Terms may span several tokens ("monitoring and
//! evaluation") and match only with those tokens in that order; aliases map
//! alternative spellings to one canonical term.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Curated terms. Order is irrelevant; output is canonical lower-case.
const CURATED_TERMS: &[&str] = &[
    // programming and data
    "python", "r", "java", "javascript", "typescript", "c++", "c#", "sql",
    "postgresql", "excel", "power bi", "tableau", "stata", "spss", "gis",
    "machine learning", "data analysis", "data visualization", "statistics",
    // frameworks and tools
    "react", "django", "fastapi", "flask", "node.js", "git", "docker",
    "kubernetes", "aws", "azure", "gcp", "linux", "sap", "umoja",
    // management
    "project management", "programme management", "budget management",
    "financial management", "procurement", "supply chain", "logistics",
    "human resources", "strategic planning", "risk management",
    "results-based management", "grant management",
    // development and humanitarian work
    "monitoring and evaluation", "humanitarian", "emergency response",
    "peacekeeping", "human rights", "climate change", "gender equality",
    "sustainable development", "public health", "epidemiology", "nutrition",
    "education", "capacity building", "resource mobilization",
    "partnership", "coordination", "advocacy", "policy analysis", "research",
    "reporting", "communication", "leadership", "teamwork", "negotiation",
    "training", "translation",
    // languages
    "english", "french", "spanish", "arabic", "chinese", "russian",
    "portuguese",
];

/// Alternative spelling → canonical term.
const ALIASES: &[(&str, &str)] = &[
    ("m&e", "monitoring and evaluation"),
    ("js", "javascript"),
    ("nodejs", "node.js"),
    ("k8s", "kubernetes"),
    ("postgres", "postgresql"),
    ("ms excel", "excel"),
    ("microsoft excel", "excel"),
    ("program management", "programme management"),
    ("ml", "machine learning"),
    ("rbm", "results-based management"),
    ("google cloud", "gcp"),
    ("amazon web services", "aws"),
    ("fundraising", "resource mobilization"),
];

/// Lower-cases and splits text into tokens. `+`, `#`, `&` and inner dots
/// stay inside tokens so terms like `c++`, `c#`, `m&e` and `node.js` survive.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '&' | '.')))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
struct Phrase {
    tokens: Vec<String>,
    canonical: String,
}

#[derive(Debug, Clone)]
pub struct SkillVocabulary {
    /// Phrases indexed by their first token, longest first.
    by_first_token: HashMap<String, Vec<Phrase>>,
    terms: BTreeSet<String>,
}

impl Default for SkillVocabulary {
    fn default() -> Self {
        Self::curated()
    }
}

impl SkillVocabulary {
    pub fn curated() -> Self {
        let mut vocabulary = Self {
            by_first_token: HashMap::new(),
            terms: BTreeSet::new(),
        };
        for term in CURATED_TERMS {
            vocabulary.add(term, term);
        }
        for (alias, canonical) in ALIASES {
            vocabulary.add(alias, canonical);
        }
        vocabulary
    }

    /// Curated terms plus configured extras (case-insensitive, blank ignored).
    pub fn with_extra_terms<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Self::curated();
        for term in extra {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() {
                vocabulary.add(&term, &term);
            }
        }
        vocabulary
    }

    fn add(&mut self, spelling: &str, canonical: &str) {
        let tokens = tokenize(spelling);
        let Some(first) = tokens.first().cloned() else {
            return;
        };
        self.terms.insert(canonical.to_string());
        let phrases = self.by_first_token.entry(first).or_default();
        if phrases.iter().any(|p| p.tokens == tokens) {
            return;
        }
        phrases.push(Phrase {
            tokens,
            canonical: canonical.to_string(),
        });
        phrases.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()));
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Canonical terms found in `text`, with occurrence counts.
    pub fn extract_counts(&self, text: &str) -> BTreeMap<String, usize> {
        let tokens = tokenize(text);
        let mut counts = BTreeMap::new();
        let mut i = 0;
        while i < tokens.len() {
            let matched = self.by_first_token.get(&tokens[i]).and_then(|phrases| {
                phrases
                    .iter()
                    .find(|p| tokens[i..].starts_with(&p.tokens))
            });
            match matched {
                Some(phrase) => {
                    *counts.entry(phrase.canonical.clone()).or_insert(0) += 1;
                    i += phrase.tokens.len();
                }
                None => i += 1,
            }
        }
        counts
    }

    /// Canonical terms found in `text`.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        self.extract_counts(text).into_keys().collect()
    }
}
